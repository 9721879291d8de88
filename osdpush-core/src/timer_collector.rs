use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::config::Config;
use crate::enrichment::Enrichment;
use crate::enrichment::Provided;
use crate::enrichment::TimerListing;
use crate::error::Error;
use crate::state_store::Registries;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CollectMode {
    /// Timers come from the enrichment provider, which also notifies timer
    /// changes on its own.
    Provider,
    /// Timers come from the primary timer store.
    Store,
}

impl CollectMode {
    pub fn of(enrichment: &Enrichment) -> Self {
        if enrichment.timer_listing().is_some() {
            CollectMode::Provider
        } else {
            CollectMode::Store
        }
    }
}

#[derive(Debug)]
pub struct Collected {
    /// The array pushed with the `timers` tag.
    pub payload: serde_json::Value,
    pub mode: CollectMode,
}

pub struct TimerCollector {
    registries: Arc<Registries>,
    lock_timeout: Duration,
    provider_timeout: Duration,
}

impl TimerCollector {
    pub fn new(config: &Config, registries: Arc<Registries>) -> Self {
        TimerCollector {
            registries,
            lock_timeout: config.registries.lock_timeout,
            provider_timeout: config.enrichment.timeout,
        }
    }

    pub async fn collect(&self, enrichment: &Enrichment) -> Result<Collected, Error> {
        match enrichment.timer_listing() {
            Some(listing) => self.collect_from_provider(listing).await,
            None => self.collect_from_store().await,
        }
    }

    async fn collect_from_provider(&self, listing: &dyn TimerListing) -> Result<Collected, Error> {
        let timers = tokio::time::timeout(self.provider_timeout, listing.list_timers())
            .await
            .map_err(|_| Error::ProviderTimedOut)??;
        let items = fold_owned(timers, |timer| {
            tracing::info!(
                timer.origin = %timer.origin,
                timer.file = %timer.file,
                "Got timer, {}",
                timer.state_label()
            );
        })?;
        Ok(Collected {
            payload: serde_json::Value::Array(items),
            mode: CollectMode::Provider,
        })
    }

    async fn collect_from_store(&self) -> Result<Collected, Error> {
        let timers = self
            .registries
            .timers
            .acquire_read(self.lock_timeout)
            .await?;
        let mut items = Vec::with_capacity(timers.len());
        for timer in timers.iter() {
            tracing::info!(timer.file = %timer.file, "Got timer, {}", timer.state_label());
            items.push(serde_json::to_value(timer)?);
        }
        Ok(Collected {
            payload: serde_json::Value::Array(items),
            mode: CollectMode::Store,
        })
    }
}

/// Serializes owned objects in order.
///
/// Each object is released as soon as it has been serialized, before the next
/// one is touched.
fn fold_owned<T, F>(objects: Vec<Provided<T>>, mut log: F) -> Result<Vec<serde_json::Value>, Error>
where
    T: Serialize,
    F: FnMut(&T),
{
    let mut items = Vec::with_capacity(objects.len());
    for object in objects {
        log(&*object);
        items.push(serde_json::to_value(&*object)?);
    }
    Ok(items)
}
