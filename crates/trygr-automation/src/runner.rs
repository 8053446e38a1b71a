//! Feeds location temperature readings into the trigger engine

use crate::engine::TriggerEngine;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use trygr_device_cache::LocationCache;

/// Runs one evaluation pass per temperature reading
///
/// Location updates never wait on evaluation: readings travel over a
/// broadcast channel and each pass only spawns its dispatches.
pub struct TemperatureRunner {
    engine: TriggerEngine,
    locations: Arc<LocationCache>,
    running: Arc<AtomicBool>,
    shutdown_tx: broadcast::Sender<()>,
}

impl TemperatureRunner {
    pub fn new(engine: TriggerEngine, locations: Arc<LocationCache>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            engine,
            locations,
            running: Arc::new(AtomicBool::new(false)),
            shutdown_tx,
        }
    }

    /// Start consuming readings; `None` if already running
    pub fn start(&self) -> Option<JoinHandle<()>> {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Temperature runner already running");
            return None;
        }

        info!("Starting temperature runner");
        let mut readings = self.locations.subscribe();
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let engine = self.engine.clone();
        let running = self.running.clone();

        Some(tokio::spawn(async move {
            loop {
                tokio::select! {
                    reading = readings.recv() => match reading {
                        Ok(reading) => {
                            let dispatch = engine.trigger_by_temperature(reading.temperature);
                            debug!(
                                source = %reading.source,
                                temperature = reading.temperature,
                                pass_id = %dispatch.pass_id,
                                hits = dispatch.hits(),
                                "Evaluated reading"
                            );
                        }
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            warn!("Temperature runner lagged by {} readings", n);
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            info!("Location cache closed, stopping temperature runner");
                            break;
                        }
                    },
                    _ = shutdown_rx.recv() => {
                        info!("Received shutdown signal");
                        break;
                    }
                }
            }

            running.store(false, Ordering::SeqCst);
            info!("Temperature runner stopped");
        }))
    }

    pub fn stop(&self) {
        if !self.running.load(Ordering::SeqCst) {
            return;
        }
        info!("Stopping temperature runner");
        let _ = self.shutdown_tx.send(());
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}
