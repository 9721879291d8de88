use std::collections::HashMap;
use std::collections::HashSet;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use async_trait::async_trait;
use serde::Deserialize;

use super::EnrichmentProvider;
use super::ProgramLookup;
use super::Provided;
use super::TimerListing;
use crate::error::Error;
use crate::models::ChannelId;
use crate::models::EpgEvent;
use crate::models::EventId;
use crate::models::Timer;

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderData {
    /// Enriched events.  An event replaces an event in a primary schedule
    /// that has the same channel and event ID.
    #[serde(default)]
    pub events: Vec<ProviderEvent>,
    /// Timers managed by the provider.  `None` disables the timer listing.
    #[serde(default)]
    pub timers: Option<Vec<Timer>>,
}

impl ProviderData {
    fn validate(&self) -> anyhow::Result<()> {
        let mut keys = HashSet::new();
        for item in self.events.iter() {
            anyhow::ensure!(
                keys.insert((&item.channel_id, item.event.event_id)),
                "Duplicate event {} in {}",
                item.event.event_id,
                item.channel_id
            );
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderEvent {
    pub channel_id: ChannelId,
    #[serde(flatten)]
    pub event: EpgEvent,
}

/// An enrichment provider serving objects from data loaded in advance.
///
/// Every object is cloned out of the data for each call, so the caller owns
/// what it receives.
#[derive(Debug)]
pub struct StaticProvider {
    name: String,
    events: HashMap<(ChannelId, EventId), EpgEvent>,
    timers: Option<Vec<Timer>>,
}

impl StaticProvider {
    pub fn new(name: String, data: ProviderData) -> Self {
        let events = data
            .events
            .into_iter()
            .map(|item| ((item.channel_id, item.event.event_id), item.event))
            .collect();
        StaticProvider {
            name,
            events,
            timers: data.timers,
        }
    }

    pub fn load<P: AsRef<Path>>(name: String, path: P) -> Result<Self, Error> {
        let reader = BufReader::new(File::open(path)?);
        let data: ProviderData = serde_json::from_reader(reader)?;
        data.validate()?;
        tracing::info!(
            provider.name = name,
            num_events = data.events.len(),
            num_timers = data.timers.as_ref().map(Vec::len),
            "Loaded provider data"
        );
        Ok(Self::new(name, data))
    }
}

impl EnrichmentProvider for StaticProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn program_lookup(&self) -> Option<&dyn ProgramLookup> {
        Some(self)
    }

    fn timer_listing(&self) -> Option<&dyn TimerListing> {
        if self.timers.is_some() {
            Some(self)
        } else {
            None
        }
    }
}

#[async_trait]
impl ProgramLookup for StaticProvider {
    async fn lookup_event(
        &self,
        channel_id: &ChannelId,
        event: &EpgEvent,
    ) -> Result<Option<Provided<EpgEvent>>, Error> {
        let key = (channel_id.clone(), event.event_id);
        Ok(self.events.get(&key).cloned().map(Provided::new))
    }
}

#[async_trait]
impl TimerListing for StaticProvider {
    async fn list_timers(&self) -> Result<Vec<Provided<Timer>>, Error> {
        match self.timers {
            Some(ref timers) => Ok(timers.iter().cloned().map(Provided::new).collect()),
            None => Err(Error::ProviderFailed(format!(
                "{}: no timer listing",
                self.name
            ))),
        }
    }
}
