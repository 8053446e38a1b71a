//! Periodic Kasa plug observation

use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};
use trygr_vendor::kasa::KasaAdapter;

/// Poll every host once; returns how many answered
pub async fn poll_hosts(adapter: &KasaAdapter, hosts: &[String]) -> usize {
    let results = join_all(hosts.iter().map(|host| adapter.poll(host))).await;

    results
        .into_iter()
        .zip(hosts)
        .filter(|(result, host)| match result {
            Ok(device) => {
                debug!(host = %host, device_id = %device.id, "Polled Kasa plug");
                true
            }
            Err(e) => {
                warn!(host = %host, error = %e, "Kasa plug did not answer");
                false
            }
        })
        .count()
}

/// Poll the configured plugs on an interval until shutdown
pub fn spawn_poller(
    adapter: Arc<KasaAdapter>,
    hosts: Vec<String>,
    period: Duration,
    mut shutdown: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("Polling {} Kasa plugs every {:?}", hosts.len(), period);
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let answered = poll_hosts(&adapter, &hosts).await;
                    debug!(answered, total = hosts.len(), "Kasa poll complete");
                }
                _ = shutdown.recv() => break,
            }
        }
        info!("Kasa poller stopped");
    })
}
