use chrono::DateTime;
use chrono::Duration;
use chrono::Utc;

use crate::config::RefreshConfig;
use crate::models::ChannelNumber;
use crate::models::EpgEvent;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Phase {
    /// No channel has been switched to yet.
    Idle,
    /// The channel is known but its present event is not confirmed.
    AwaitingEpg,
    /// The present event of the channel is confirmed.
    Current,
}

/// State which decides when present/following is resolved again.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RefreshState {
    pub channel: Option<ChannelNumber>,
    pub have_actual_epg: bool,
    pub next_refresh_at: Option<DateTime<Utc>>,
    /// Set once an enrichment provider has been used for listing timers.
    pub provider_active: bool,
    pub timer_update_pending: bool,
}

impl RefreshState {
    pub fn phase(&self) -> Phase {
        match (self.channel, self.have_actual_epg) {
            (None, _) => Phase::Idle,
            (Some(_), false) => Phase::AwaitingEpg,
            (Some(_), true) => Phase::Current,
        }
    }

    pub fn switch_channel(&mut self, channel: ChannelNumber) {
        self.channel = Some(channel);
        self.have_actual_epg = false;
    }

    pub fn apply_resolution(&mut self, have_actual_epg: bool, next_refresh_at: DateTime<Utc>) {
        self.have_actual_epg = have_actual_epg;
        self.next_refresh_at = Some(next_refresh_at);
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        match self.next_refresh_at {
            Some(deadline) => self.channel.is_some() && now >= deadline,
            None => false,
        }
    }

    pub fn mark_provider_active(&mut self) {
        self.provider_active = true;
    }

    pub fn request_timer_update(&mut self) {
        self.timer_update_pending = true;
    }

    pub fn finish_timer_update(&mut self) {
        self.timer_update_pending = false;
    }
}

pub struct RefreshScheduler {
    following_missing_delay: Duration,
    schedule_missing_delay: Duration,
}

impl RefreshScheduler {
    pub fn new(config: &RefreshConfig) -> Self {
        RefreshScheduler {
            following_missing_delay: to_chrono(config.following_missing_delay),
            schedule_missing_delay: to_chrono(config.schedule_missing_delay),
        }
    }

    /// Computes the time at which present/following changes next.
    pub fn next_deadline(
        &self,
        schedule_found: bool,
        following: Option<&EpgEvent>,
        now: DateTime<Utc>,
    ) -> DateTime<Utc> {
        match (schedule_found, following) {
            (true, Some(following)) => following.start_time,
            (true, None) => now + self.following_missing_delay,
            (false, _) => now + self.schedule_missing_delay,
        }
    }
}

// Delays are bounded by `RefreshConfig::validate()`.
fn to_chrono(delay: std::time::Duration) -> Duration {
    Duration::milliseconds(delay.as_millis().min(i64::MAX as u128) as i64)
}
