use std::sync::Arc;

use tokio::signal::unix::SignalKind;
use tokio::signal::unix::signal;

use crate::bridge;
use osdpush_core::enrichment::ProviderRegistry;
use osdpush_core::enrichment::StaticProvider;
use osdpush_core::orchestrator::Orchestrator;
use osdpush_core::orchestrator::driver;
use osdpush_core::push::JsonLinesPush;
use osdpush_core::refresh::SystemClock;
use osdpush_core::state_store::Registries;
use osdpush_core::state_store::Snapshot;
use osdpush_core::*;

pub async fn main(config: Arc<config::Config>) -> Result<(), error::Error> {
    let registries = Arc::new(Registries::new());
    if let Some(ref path) = config.host.snapshot_json {
        let snapshot = Snapshot::load(path)?;
        registries.load_snapshot(snapshot).await;
    }

    let mut providers = ProviderRegistry::default();
    if let (Some(name), Some(path)) = (&config.enrichment.provider, &config.enrichment.data_json) {
        providers.register(Arc::new(StaticProvider::load(name.clone(), path)?));
    }

    let orchestrator = Orchestrator::new(
        config.clone(),
        registries.clone(),
        Arc::new(providers),
        JsonLinesPush::new(tokio::io::stdout()),
        Arc::new(SystemClock),
    );
    let (sender, receiver) = driver::channel(config.host.event_queue);
    let driver = tokio::spawn(driver::run(
        orchestrator,
        receiver,
        config.refresh.poll_interval,
    ));

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;

    // The sender is dropped when the bridge stops, which stops the driver.
    tokio::select! {
        result = bridge::run(tokio::io::stdin(), sender, registries) => {
            match result {
                Ok(()) => tracing::info!("Reached EOF"),
                Err(err) => tracing::error!(%err),
            }
        }
        _ = sigint.recv() => {
            tracing::info!("SIGINT received");
        }
        _ = sigterm.recv() => {
            tracing::info!("SIGTERM received");
        }
    }

    tracing::info!("Stopping...");
    match driver.await {
        Ok(state) => tracing::debug!(?state, "Stopped"),
        Err(err) => tracing::error!(%err, "Driver failed"),
    }
    Ok(())
}
