//! Claim tree commands - root, proof generation and verification

use anyhow::Context;
use loanbook_crypto::{claim_leaf, verify_proof, MerkleTree};
use loanbook_protocol::GenesisConfig;
use loanbook_types::{AccountId, AssetId, Digest};
use serde_json::json;

fn allowlist_tree(config: &GenesisConfig) -> anyhow::Result<MerkleTree> {
    config
        .allowlist_tree()?
        .context("genesis config has no allowlist; only a precomputed root")
}

/// Print the root, depth and leaf count of the allowlist tree
pub fn show_root(config: &GenesisConfig) -> anyhow::Result<()> {
    let tree = allowlist_tree(config)?;
    let output = json!({
        "root": tree.root(),
        "depth": tree.depth(),
        "leaves": tree.leaves().len(),
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

/// Print the proof for an allowlist entry, selected by index or by pair
pub fn show_proof(
    config: &GenesisConfig,
    index: Option<usize>,
    account: Option<&str>,
    asset: Option<u64>,
) -> anyhow::Result<()> {
    let tree = allowlist_tree(config)?;
    let index = match (index, account, asset) {
        (Some(index), _, _) => index,
        (None, Some(account), Some(asset)) => {
            let account = AccountId::parse(account)?;
            let asset_id = AssetId(asset);
            config
                .allowlist
                .iter()
                .position(|e| e.account == account && e.asset_id == asset_id)
                .with_context(|| format!("{} / {} is not on the allowlist", account, asset_id))?
        }
        _ => anyhow::bail!("pass --index, or both --account and --asset"),
    };

    let entry = config
        .allowlist
        .get(index)
        .with_context(|| format!("no allowlist entry at index {}", index))?;
    let output = json!({
        "index": index,
        "account": entry.account,
        "asset_id": entry.asset_id,
        "leaf": tree.leaves()[index],
        "proof": tree.proof(index)?,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

/// Check a proof against a root. Fails if the proof does not verify.
pub fn verify(root: &str, account: &str, asset: u64, proof: &[String]) -> anyhow::Result<()> {
    let root = Digest::from_hex(root).context("parsing --root")?;
    let account = AccountId::parse(account)?;
    let proof = proof
        .iter()
        .map(|hex| Digest::from_hex(hex))
        .collect::<Result<Vec<_>, _>>()
        .context("parsing --proof")?;

    let leaf = claim_leaf(&account, AssetId(asset));
    if !verify_proof(&root, &proof, &leaf) {
        anyhow::bail!("proof does not verify for {} / #{}", account, asset);
    }
    println!("valid");
    Ok(())
}
