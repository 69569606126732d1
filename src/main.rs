use std::path::PathBuf;

use anyhow::{bail, Context};
use mailbox_server::config::Config;
use mailbox_server::protocol::Dispatcher;
use mailbox_server::transport::Server;
use mailbox_server::{store, utils};
use tracing::info;

/// Config file read when present; `MAILBOX_CONFIG` names another one.
const DEFAULT_CONFIG_FILE: &str = "mailbox.toml";

fn load_config() -> anyhow::Result<Config> {
    let explicit = std::env::var_os("MAILBOX_CONFIG").map(PathBuf::from);
    let path = explicit
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

    let mut config = if path.exists() {
        Config::from_file(&path).with_context(|| format!("loading {}", path.display()))?
    } else if explicit.is_some() {
        bail!("config file {} does not exist", path.display());
    } else {
        Config::default()
    };

    config
        .apply_env_overrides()
        .context("applying environment overrides")?;
    config.validate_strict()?;
    Ok(config)
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let config = load_config()?;
    utils::logging::init(&config.logging)?;

    let store = store::open(&config.store).context("opening mailbox store")?;
    let dispatcher = Dispatcher::new(store).with_close_on_error(config.server.close_on_error);

    let server = Server::bind(&config, dispatcher)
        .await
        .context("binding listener")?;
    info!(
        address = %server.local_addr()?,
        version = env!("CARGO_PKG_VERSION"),
        "Mailbox server started"
    );

    server.run().await?;
    Ok(())
}
