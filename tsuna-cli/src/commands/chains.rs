use std::path::Path;

use tsuna::config::load_config_from;

use crate::error::Result;

/// Print the configured chains, default first.
pub async fn chains(config_path: &Path) -> Result<()> {
    let config = load_config_from(config_path).await?;
    config.validate()?;

    println!("{:<10} {:<24} {:<44} RPC", "ID", "NAME", "MULTICALL3");
    for chain in config.resolve_chains() {
        let multicall = chain
            .contracts
            .multicall3
            .map_or_else(|| "-".to_owned(), |address| address.to_string());
        let testnet = if chain.testnet { " (testnet)" } else { "" };
        println!(
            "{:<10} {:<24} {:<44} {}",
            chain.id,
            format!("{}{testnet}", chain.name),
            multicall,
            chain.default_rpc_url().unwrap_or("-"),
        );
    }
    Ok(())
}
