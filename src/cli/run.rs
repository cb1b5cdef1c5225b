use super::config::{default_config_path, GatewayConfig, LoggingConfig, StoreConfig};
use channel_gate::admin::AdminConsole;
use channel_gate::bot::{BotConfig, GatewayBot};
use channel_gate::clock::SystemClock;
use channel_gate::distribution::SignalDistributor;
use channel_gate::gatekeeper::{RegistrationWorkflow, UserLocks};
use channel_gate::platform::{ChannelId, TelegramClient, UserId};
use channel_gate::store::{MemoryStore, RecordStore, SqliteStore, StoreResult, UserStore};
use std::collections::HashSet;
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Run the bot service
///
/// Loads the configuration (`--config`, else the default path), opens the
/// record store, connects to the Telegram Bot API and polls for updates
/// until ctrl-c.
pub async fn execute(config_path: Option<String>) -> Result<(), Box<dyn std::error::Error>> {
    let config_path = config_path
        .map(PathBuf::from)
        .unwrap_or_else(default_config_path);

    if !config_path.exists() {
        return Err(format!(
            "No config file at '{}'. Create one with `channel-gate init-config`.",
            config_path.display()
        )
        .into());
    }

    let config = GatewayConfig::load(&config_path)?;
    init_logging(&config.logging)?;
    info!(config = %config_path.display(), "Configuration loaded");

    let invite_ttl = config.invite_ttl()?;
    let request_timeout = config.request_timeout()?;
    let channel = ChannelId(config.telegram.channel_id);

    let records = open_store(&config.store).await?;
    let users = Arc::new(UserStore::new(records, Arc::new(SystemClock)));
    let client = TelegramClient::new(
        &config.telegram.api_url,
        &config.telegram.token,
        request_timeout,
    );

    let shutdown = CancellationToken::new();
    let locks = UserLocks::new();
    let workflow = Arc::new(RegistrationWorkflow::new(
        client.clone(),
        Arc::clone(&users),
        locks.clone(),
        channel,
        invite_ttl,
        request_timeout,
    ));
    let distributor = Arc::new(SignalDistributor::new(
        client.clone(),
        Arc::clone(&users),
        request_timeout,
    ));
    let admins: HashSet<UserId> = config.access.admin_ids.iter().copied().map(UserId).collect();
    let console = Arc::new(
        AdminConsole::new(
            admins,
            Arc::clone(&users),
            Arc::clone(&distributor),
            locks,
            config.access.page_size,
        )
        .with_shutdown(shutdown.clone()),
    );

    let mut bot = GatewayBot::new(
        client,
        users,
        workflow,
        distributor,
        console,
        BotConfig {
            poll_interval: config.poll_interval()?,
            request_timeout,
        },
    );

    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Shutdown signal received"),
            Err(e) => error!(error = %e, "Failed to listen for ctrl-c"),
        }
        signal_token.cancel();
    });

    info!(
        channel = %channel,
        channel_username = config.telegram.channel_username.as_deref().unwrap_or("-"),
        admins = config.access.admin_ids.len(),
        "Starting channel gate"
    );
    bot.run(shutdown).await?;
    info!("Channel gate stopped");
    Ok(())
}

/// SQLite when a path is configured, memory otherwise.
pub async fn open_store(config: &StoreConfig) -> StoreResult<Arc<dyn RecordStore>> {
    match &config.path {
        Some(path) => Ok(Arc::new(SqliteStore::open(path).await?)),
        None => {
            warn!("No store path configured, records will not survive a restart");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}

/// Install the global subscriber; `RUST_LOG` overrides the configured level.
fn init_logging(config: &LoggingConfig) -> Result<(), Box<dyn std::error::Error>> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    match &config.file {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            builder
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init()
                .map_err(|e| e.to_string())?;
        }
        None => {
            builder
                .with_writer(std::io::stderr)
                .try_init()
                .map_err(|e| e.to_string())?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::config::TOKEN_ENV;
    use channel_gate::store::User;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_run_without_config_file_fails() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("config.toml");
        let err = execute(Some(missing.to_string_lossy().to_string()))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("init-config"));
    }

    #[tokio::test]
    async fn test_run_rejects_placeholder_token() {
        let dir = TempDir::new().unwrap();
        let config_path = dir.path().join("config.toml");
        GatewayConfig::create_default(&config_path, &dir.path().join("gateway.db")).unwrap();

        if std::env::var(TOKEN_ENV).is_ok() {
            return;
        }
        let err = execute(Some(config_path.to_string_lossy().to_string()))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("telegram.token"));
    }

    #[tokio::test]
    async fn test_open_store_sqlite_persists() {
        let dir = TempDir::new().unwrap();
        let config = StoreConfig {
            path: Some(dir.path().join("data").join("gateway.db")),
        };

        let store = open_store(&config).await.unwrap();
        let user = User::new(UserId(5), 100);
        store.put_user(&user).await.unwrap();
        drop(store);

        let reopened = open_store(&config).await.unwrap();
        assert_eq!(reopened.get_user(UserId(5)).await.unwrap(), Some(user));
    }

    #[tokio::test]
    async fn test_open_store_defaults_to_memory() {
        let store = open_store(&StoreConfig::default()).await.unwrap();
        assert_eq!(store.count_users().await.unwrap().total, 0);
    }
}
