pub mod driver;

use std::sync::Arc;

use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;
use serde_json::json;

use crate::config::Config;
use crate::enrichment::Enrichment;
use crate::enrichment::ProviderRegistry;
use crate::error::Error;
use crate::models::ChannelNumber;
use crate::push::Push;
use crate::push::PushDispatcher;
use crate::push::PushTag;
use crate::refresh::Clock;
use crate::refresh::Phase;
use crate::refresh::RefreshScheduler;
use crate::refresh::RefreshState;
use crate::schedule_resolver::ScheduleResolver;
use crate::state_store::Registries;
use crate::timer_collector::CollectMode;
use crate::timer_collector::TimerCollector;

/// Notifications delivered by the host.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum HostEvent {
    ChannelSwitch {
        channel_number: ChannelNumber,
        #[serde(default = "HostEvent::default_live_view")]
        live_view: bool,
    },
    ProgramInfo {
        #[serde(default, with = "chrono::serde::ts_seconds_option")]
        present_time: Option<DateTime<Utc>>,
        #[serde(default)]
        present_title: Option<String>,
        #[serde(default)]
        present_subtitle: Option<String>,
        #[serde(default, with = "chrono::serde::ts_seconds_option")]
        following_time: Option<DateTime<Utc>>,
        #[serde(default)]
        following_title: Option<String>,
        #[serde(default)]
        following_subtitle: Option<String>,
    },
    Recording {
        #[serde(default)]
        name: Option<String>,
        file_name: String,
        on: bool,
    },
    Replay {
        #[serde(default)]
        name: Option<String>,
        file_name: String,
        on: bool,
    },
    TimerChange,
    /// The enrichment provider notified that its timers changed.
    ProviderTimersChanged,
}

impl HostEvent {
    fn default_live_view() -> bool {
        true
    }

    pub fn name(&self) -> &'static str {
        match self {
            HostEvent::ChannelSwitch { .. } => "ChannelSwitch",
            HostEvent::ProgramInfo { .. } => "ProgramInfo",
            HostEvent::Recording { .. } => "Recording",
            HostEvent::Replay { .. } => "Replay",
            HostEvent::TimerChange => "TimerChange",
            HostEvent::ProviderTimersChanged => "ProviderTimersChanged",
        }
    }
}

pub struct Orchestrator<P> {
    config: Arc<Config>,
    registries: Arc<Registries>,
    providers: Arc<ProviderRegistry>,
    resolver: ScheduleResolver,
    collector: TimerCollector,
    scheduler: RefreshScheduler,
    dispatcher: PushDispatcher<P>,
    clock: Arc<dyn Clock>,
    state: RefreshState,
}

impl<P> Orchestrator<P>
where
    P: Push,
{
    pub fn new(
        config: Arc<Config>,
        registries: Arc<Registries>,
        providers: Arc<ProviderRegistry>,
        transport: P,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Orchestrator {
            resolver: ScheduleResolver::new(&config, registries.clone()),
            collector: TimerCollector::new(&config, registries.clone()),
            scheduler: RefreshScheduler::new(&config.refresh),
            dispatcher: PushDispatcher::new(transport),
            config,
            registries,
            providers,
            clock,
            state: Default::default(),
        }
    }

    pub fn state(&self) -> &RefreshState {
        &self.state
    }

    pub fn phase(&self) -> Phase {
        self.state.phase()
    }

    pub async fn handle(&mut self, event: HostEvent) {
        tracing::debug!(msg.name = event.name());
        match event {
            HostEvent::ChannelSwitch {
                channel_number,
                live_view,
            } => self.channel_switch(channel_number, live_view).await,
            HostEvent::ProgramInfo {
                present_title,
                following_title,
                ..
            } => {
                self.program_info(present_title.as_deref(), following_title.as_deref())
                    .await
            }
            HostEvent::Recording {
                name,
                file_name,
                on,
            } => self.recording(name.as_deref(), &file_name, on),
            HostEvent::Replay {
                name,
                file_name,
                on,
            } => self.replay(name, file_name, on).await,
            HostEvent::TimerChange => self.timer_change().await,
            HostEvent::ProviderTimersChanged => self.provider_timers_changed(),
        }
    }

    /// Runs the updates which are due.  Called periodically by the driver.
    pub async fn poll(&mut self) {
        if self.state.is_due(self.clock.now()) {
            tracing::debug!("Refresh deadline reached");
            self.update_present_following().await;
        }
        if self.state.timer_update_pending {
            self.update_timers().await;
        }
    }

    pub async fn channel_switch(&mut self, channel_number: ChannelNumber, live_view: bool) {
        if !live_view || channel_number.is_zero() {
            return;
        }
        tracing::info!(channel.number = %channel_number, "Channel switched");
        self.state.switch_channel(channel_number);
        self.update_present_following().await;
    }

    // The host may deliver program info some time after the channel switch,
    // when the schedule was not available at the switch.
    pub async fn program_info(
        &mut self,
        present_title: Option<&str>,
        following_title: Option<&str>,
    ) {
        if self.state.have_actual_epg {
            return;
        }
        if is_empty(present_title) && is_empty(following_title) {
            return;
        }
        tracing::info!(
            present.title = present_title.unwrap_or_default(),
            following.title = following_title.unwrap_or_default(),
            "Program info arrived"
        );
        self.update_present_following().await;
    }

    pub fn recording(&self, name: Option<&str>, file_name: &str, on: bool) {
        tracing::info!(
            recording.name = name.unwrap_or_default(),
            recording.file_name = file_name,
            "Recording {}",
            if on { "started" } else { "stopped" }
        );
    }

    pub async fn replay(&mut self, name: Option<String>, file_name: String, on: bool) {
        tracing::info!(
            replay.name = name.as_deref().unwrap_or_default(),
            replay.file_name = %file_name,
            "Replay {}",
            if on { "started" } else { "stopped" }
        );
        if !on || file_name.is_empty() {
            return;
        }

        let lock_timeout = self.config.registries.lock_timeout;
        let found = match self.registries.recordings.acquire_read(lock_timeout).await {
            Ok(recordings) => recordings
                .get(&file_name)
                .map(serde_json::to_value)
                .transpose(),
            Err(err) => {
                tracing::info!(%err, "Can't get lock for recordings, retrying later");
                Ok(None)
            }
        };
        let object = match found {
            Ok(Some(object)) => object,
            Ok(None) => json!({
                "name": name.unwrap_or_default(),
                "filename": file_name,
            }),
            Err(err) => {
                tracing::error!(%err, replay.file_name = %file_name, "Failed to serialize recording");
                return;
            }
        };
        self.dispatcher.dispatch(PushTag::Replay, object).await;
    }

    pub async fn timer_change(&mut self) {
        // The provider notifies timer changes on its own.
        if self.state.provider_active {
            tracing::debug!("Timers are updated by the enrichment provider");
            return;
        }
        self.update_timers().await;
    }

    pub fn provider_timers_changed(&mut self) {
        self.state.request_timer_update();
    }

    fn enrichment(&self) -> Enrichment {
        self.providers
            .discover(self.config.enrichment.provider.as_deref())
    }

    async fn update_present_following(&mut self) {
        let channel = match self.state.channel {
            Some(channel) => channel,
            None => return,
        };
        let enrichment = self.enrichment();
        let now = self.clock.now();
        match self.resolver.resolve(channel, &enrichment, now).await {
            Ok(resolution) => {
                self.state
                    .apply_resolution(resolution.have_actual, resolution.next_refresh_at);
                tracing::debug!(
                    channel.number = %channel,
                    have_actual_epg = resolution.have_actual,
                    next_refresh_at = %resolution.next_refresh_at,
                );
                self.dispatcher
                    .dispatch(PushTag::Actual, resolution.payload)
                    .await;
            }
            Err(Error::Busy(registry)) => {
                tracing::info!(registry, "Can't get lock, retrying later");
            }
            Err(Error::ChannelNotFound) => {
                // Retried the same way as a missing schedule.
                let next_refresh_at = self.scheduler.next_deadline(false, None, now);
                tracing::warn!(channel.number = %channel, %next_refresh_at, "No such channel");
                self.state.apply_resolution(false, next_refresh_at);
            }
            Err(err) => {
                tracing::error!(%err, channel.number = %channel, "Failed to update present/following");
            }
        }
    }

    async fn update_timers(&mut self) {
        let enrichment = self.enrichment();
        if CollectMode::of(&enrichment) == CollectMode::Provider {
            self.state.mark_provider_active();
        }
        match self.collector.collect(&enrichment).await {
            Ok(collected) => {
                self.dispatcher
                    .dispatch(PushTag::Timers, collected.payload)
                    .await;
            }
            Err(Error::Busy(registry)) => {
                tracing::info!(registry, "Can't get lock for timers, retrying later");
                return;
            }
            Err(err) => {
                tracing::warn!(%err, provider.name = enrichment.name(), "Failed to collect timers");
            }
        }
        self.state.finish_timer_update();
    }
}

fn is_empty(s: Option<&str>) -> bool {
    s.map(str::is_empty).unwrap_or(true)
}
