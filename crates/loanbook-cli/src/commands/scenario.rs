//! Scripted scenario against an in-memory protocol
//!
//! Each step states the outcome it expects. The run fails if any step
//! disagrees.

use anyhow::Context;
use loanbook_protocol::{GenesisConfig, Protocol, Result as ProtocolResult};
use loanbook_types::{AccountId, Amount, ErrorCode};

use crate::display::{self, Outcome};

#[derive(Default)]
struct Tally {
    steps: usize,
    failures: usize,
}

impl Tally {
    fn record(&mut self, label: &str, outcome: Outcome) {
        display::step(label, &outcome);
        self.steps += 1;
        if outcome.is_failure() {
            self.failures += 1;
        }
    }

    fn expect_ok<T>(&mut self, label: &str, result: ProtocolResult<T>) -> Option<T> {
        match result {
            Ok(value) => {
                self.record(label, Outcome::Passed);
                Some(value)
            }
            Err(e) => {
                let outcome = Outcome::UnexpectedError {
                    expected: None,
                    got: e.code(),
                    message: e.to_string(),
                };
                self.record(label, outcome);
                None
            }
        }
    }

    fn expect_err<T>(&mut self, label: &str, expected: ErrorCode, result: ProtocolResult<T>) {
        let outcome = match result {
            Err(e) if e.code() == expected => Outcome::Refused(expected),
            Err(e) => Outcome::UnexpectedError {
                expected: Some(expected),
                got: e.code(),
                message: e.to_string(),
            },
            Ok(_) => Outcome::UnexpectedSuccess(expected),
        };
        self.record(label, outcome);
    }
}

pub async fn run(config: GenesisConfig) -> anyhow::Result<()> {
    let tree = config.allowlist_tree()?;
    let holding = config
        .initial_holdings
        .first()
        .cloned()
        .context("scenario needs at least one initial holding")?;
    let protocol = Protocol::genesis(config.clone()).await?;
    let unit = protocol.collateral_unit();
    let mut tally = Tally::default();

    display::phase("Genesis");
    display::field("admin", protocol.admin());
    display::field("merkle root", protocol.merkle_root());
    display::field("collateral unit", unit);
    display::field("debt token", &protocol.debt_token().symbol);
    display::field("logic version", protocol.version().await);

    display::phase("Borrowing without collateral");
    let stranger = AccountId::principal("stranger");
    tally.expect_err(
        "stranger borrows 3",
        ErrorCode::InsufficientCollateral,
        protocol.session(stranger.clone()).get_loan(Amount::new(3)).await,
    );

    display::phase("Claims");
    match (&tree, config.allowlist.first()) {
        (Some(tree), Some(entry)) => {
            let proof = tree.proof(0)?;
            let session = protocol.session(entry.account.clone());
            let label = format!("{} claims {}", entry.account, entry.asset_id);
            tally.expect_ok(&label, session.claim(entry.asset_id, &proof).await);
            tally.expect_err(
                &format!("{} claims {} again", entry.account, entry.asset_id),
                ErrorCode::AlreadyClaimed,
                session.claim(entry.asset_id, &proof).await,
            );
            tally.expect_err(
                &format!("stranger claims {} with a valid path", entry.asset_id),
                ErrorCode::AlreadyClaimed,
                protocol.session(stranger.clone()).claim(entry.asset_id, &proof).await,
            );
        }
        _ => display::note("no allowlist configured, skipping claims"),
    }

    display::phase("Deposit, borrow, repay");
    let borrower = holding.account.clone();
    let session = protocol.session(borrower.clone());
    tally.expect_ok(
        &format!("{} deposits {}", borrower, holding.asset_id),
        session.deposit_collateral(holding.asset_id).await,
    );
    tally.expect_ok(
        &format!("{} borrows {}", borrower, unit),
        session.get_loan(unit).await,
    );
    tally.expect_err(
        &format!("{} borrows 1 more", borrower),
        ErrorCode::InsufficientCollateral,
        session.get_loan(Amount::new(1)).await,
    );
    tally.expect_ok(
        &format!("{} repays 1", borrower),
        session.return_loan(Amount::new(1)).await,
    );
    tally.expect_err(
        &format!("{} withdraws {} while in debt", borrower, holding.asset_id),
        ErrorCode::InsufficientCollateral,
        session.withdraw_collateral(holding.asset_id).await,
    );

    display::phase("Positions");
    let mut accounts: Vec<AccountId> = config
        .allowlist
        .iter()
        .map(|e| e.account.clone())
        .chain(config.initial_holdings.iter().map(|h| h.account.clone()))
        .chain(std::iter::once(stranger))
        .collect();
    accounts.sort();
    accounts.dedup();
    for account in &accounts {
        display::position_row(
            account,
            &protocol.position(account).await,
            protocol.balance_of(account).await,
            &protocol.assets_of(account).await,
        );
    }
    display::field("total debt", protocol.total_debt().await);

    display::summary(tally.steps, tally.failures);
    if tally.failures > 0 {
        anyhow::bail!("{} scenario step(s) did not behave as expected", tally.failures);
    }
    Ok(())
}
