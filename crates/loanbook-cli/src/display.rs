//! Terminal output for scenario runs

use colored::*;
use loanbook_collateral::CollateralPosition;
use loanbook_types::{AccountId, Amount, AssetId, ErrorCode};

/// How one scenario step turned out against what it expected
pub enum Outcome {
    /// Succeeded as expected
    Passed,
    /// Failed with the expected error code
    Refused(ErrorCode),
    /// Succeeded while an error was expected
    UnexpectedSuccess(ErrorCode),
    /// Failed with a code other than the expected one, if any was expected
    UnexpectedError {
        expected: Option<ErrorCode>,
        got: ErrorCode,
        message: String,
    },
}

impl Outcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::UnexpectedSuccess(_) | Self::UnexpectedError { .. })
    }
}

pub fn phase(title: &str) {
    println!();
    println!("{} {}", "▸".bright_blue(), title.bright_white().bold());
}

/// One line per step: a mark, the step label, and what happened
pub fn step(label: &str, outcome: &Outcome) {
    match outcome {
        Outcome::Passed => println!("  {} {}", "ok".bright_green(), label),
        Outcome::Refused(code) => {
            println!("  {} {} {}", "ok".bright_green(), label, format!("[{}]", code).bright_black())
        }
        Outcome::UnexpectedSuccess(expected) => println!(
            "  {} {}: expected {}, but it succeeded",
            "FAIL".bright_red().bold(),
            label,
            expected
        ),
        Outcome::UnexpectedError {
            expected: Some(expected),
            got,
            message,
        } => println!(
            "  {} {}: expected {}, got {} ({})",
            "FAIL".bright_red().bold(),
            label,
            expected,
            got,
            message.bright_red()
        ),
        Outcome::UnexpectedError {
            expected: None,
            got,
            message,
        } => println!(
            "  {} {}: unexpected {} ({})",
            "FAIL".bright_red().bold(),
            label,
            got,
            message.bright_red()
        ),
    }
}

pub fn note(message: &str) {
    println!("  {} {}", "-".bright_black(), message.bright_black());
}

pub fn field(key: &str, value: impl std::fmt::Display) {
    println!("    {:<16} {}", key, value.to_string().bright_cyan());
}

/// A row of the closing positions table
pub fn position_row(account: &AccountId, position: &CollateralPosition, debt: Amount, assets: &[AssetId]) {
    let assets: Vec<String> = assets.iter().map(|a| a.0.to_string()).collect();
    println!(
        "    {:<24} total {:>4}  used {:>4}  debt {:>4}  assets [{}]",
        account.to_string(),
        position.total_collateral.to_string(),
        position.used_collateral.to_string(),
        debt.to_string(),
        assets.join(", ")
    );
}

pub fn summary(steps: usize, failures: usize) {
    println!();
    if failures == 0 {
        println!("{} all {} steps behaved as expected", "PASS".bright_green().bold(), steps);
    } else {
        println!(
            "{} {} of {} steps did not behave as expected",
            "FAIL".bright_red().bold(),
            failures,
            steps
        );
    }
}
