use super::config::{default_config_path, GatewayConfig};
use super::run::open_store;
use std::path::PathBuf;

/// Print user counts from the configured store
///
/// Only the `[store]` section is used, so the token need not be set.
pub async fn execute(config_path: Option<String>) -> Result<(), Box<dyn std::error::Error>> {
    let config_path = config_path
        .map(PathBuf::from)
        .unwrap_or_else(default_config_path);
    let config = GatewayConfig::parse_file(&config_path)?;

    let Some(store_path) = &config.store.path else {
        println!("No [store] path configured; nothing to report.");
        return Ok(());
    };

    let store = open_store(&config.store).await?;
    let counts = store.count_users().await?;

    println!("📊 Channel Gate users ({})", store_path.display());
    println!();
    println!("  Total:     {}", counts.total);
    println!("  Active:    {}", counts.active);
    println!("  Pending:   {}", counts.pending);
    println!("  Suspended: {}", counts.suspended);
    println!("  In channel: {}", counts.in_channel);
    println!();
    println!("  Basic:     {}", counts.basic);
    println!("  Premium:   {}", counts.premium);
    println!("  VIP:       {}", counts.vip);

    Ok(())
}
