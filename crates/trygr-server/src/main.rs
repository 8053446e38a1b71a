//! Trygr server
//!
//! Wires configuration, storage, caches, vendor adapters, the notifier and
//! the trigger engine together, then serves the HTTP API until Ctrl-C.

mod kasa;
mod weather;

use anyhow::{Context as _, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use trygr_api::AppState;
use trygr_automation::{TemperatureRunner, TriggerEngine, TriggerStore};
use trygr_config::TrygrConfig;
use trygr_device_cache::{DeviceCache, LocationCache};
use trygr_notify::{EmailNotifier, LogNotifier, Notifier};
use trygr_storage::Storage;
use trygr_vendor::kasa::{KasaAdapter, TcpTransport};
use trygr_vendor::{AdapterRegistry, VendorAdapter};

#[derive(Debug, Parser)]
#[command(name = "trygr")]
#[command(about = "Trygr home automation trigger server", long_about = None)]
struct Args {
    /// Directory holding configuration.yaml and secrets.yaml
    #[arg(short, long, default_value = ".", env = "TRYGR_CONFIG")]
    config: PathBuf,
}

fn build_notifier(config: &TrygrConfig) -> Result<Arc<dyn Notifier>> {
    match &config.smtp {
        Some(smtp) => Ok(Arc::new(
            EmailNotifier::new(smtp).context("invalid smtp configuration")?,
        )),
        None => {
            warn!("No smtp section, notifications will only be logged");
            Ok(Arc::new(LogNotifier))
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config_dir = Args::parse().config;
    info!("Starting Trygr with config from {:?}", config_dir);

    let config = TrygrConfig::load(&config_dir).context("failed to load configuration")?;
    let storage_dir = config.storage.dir.clone().unwrap_or(config_dir);
    let storage = Arc::new(Storage::new(&storage_dir));

    let devices = Arc::new(
        DeviceCache::new(storage.clone()).with_max_age(config.device_cache.max_age()),
    );
    devices.load().await.context("failed to load devices")?;
    let locations = Arc::new(LocationCache::new());

    let triggers = Arc::new(TriggerStore::new(storage));
    triggers.load().await.context("failed to load triggers")?;
    info!("Loaded {} triggers and {} devices", triggers.len(), devices.len());

    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let mut tasks = Vec::new();

    let adapters = Arc::new(AdapterRegistry::new());
    if config.kasa.enabled {
        let transport = Arc::new(TcpTransport::new(config.kasa.timeout()));
        let kasa = Arc::new(KasaAdapter::new(devices.clone(), transport).with_port(config.kasa.port));
        adapters.register(kasa.clone() as Arc<dyn VendorAdapter>);

        if !config.kasa.hosts.is_empty() {
            tasks.push(kasa::spawn_poller(
                kasa,
                config.kasa.hosts.clone(),
                config.kasa.poll_interval(),
                shutdown_tx.subscribe(),
            ));
        }
    }
    info!("Vendor adapters: {:?}", adapters.vendors());

    let engine = TriggerEngine::new(triggers, devices, adapters, build_notifier(&config)?);

    let runner = TemperatureRunner::new(engine.clone(), locations.clone());
    if let Some(handle) = runner.start() {
        tasks.push(handle);
    }

    if config.location.is_enabled() {
        tasks.push(weather::spawn_poller(
            weather::WeatherClient::new(config.location.clone()),
            locations.clone(),
            config.location.poll_interval(),
            shutdown_tx.subscribe(),
        ));
    } else {
        info!("No location configured, weather polling disabled");
    }

    let state = AppState::new(engine, locations);
    let addr = config.api.bind_address();
    let mut api_shutdown = shutdown_tx.subscribe();
    let server = tokio::spawn(async move {
        trygr_api::start_server_with_shutdown(state, &addr, async move {
            let _ = api_shutdown.recv().await;
        })
        .await
    });

    info!("Trygr is running");
    tokio::signal::ctrl_c().await?;
    info!("Shutting down...");

    runner.stop();
    let _ = shutdown_tx.send(());
    for task in tasks {
        let _ = task.await;
    }
    server.await?.context("API server failed")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_dir_args() {
        let args = Args::try_parse_from(["trygr"]).unwrap();
        assert_eq!(args.config, PathBuf::from("."));

        let args = Args::try_parse_from(["trygr", "--config", "/etc/trygr"]).unwrap();
        assert_eq!(args.config, PathBuf::from("/etc/trygr"));

        let args = Args::try_parse_from(["trygr", "-c", "/srv/trygr"]).unwrap();
        assert_eq!(args.config, PathBuf::from("/srv/trygr"));

        let args = Args::try_parse_from(["trygr", "--config=/opt/trygr"]).unwrap();
        assert_eq!(args.config, PathBuf::from("/opt/trygr"));

        assert!(Args::try_parse_from(["trygr", "--config"]).is_err());
        assert!(Args::try_parse_from(["trygr", "--verbose"]).is_err());
    }

    #[test]
    fn test_log_notifier_without_smtp() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = TrygrConfig::load(dir.path()).unwrap();
        assert!(build_notifier(&config).is_ok());
    }
}
