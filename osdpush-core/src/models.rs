use std::fmt;

use chrono::DateTime;
use chrono::Duration;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;

use crate::serde_ext::duration_seconds;

#[derive(
    Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd, Deserialize, Serialize,
)]
#[serde(transparent)]
pub struct ChannelNumber(u32);

impl ChannelNumber {
    pub fn value(&self) -> u32 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for ChannelNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CH#{}", self.0)
    }
}

impl From<u32> for ChannelNumber {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

/// Identity of a channel which doesn't change when channels are renumbered.
#[derive(Clone, Debug, Eq, Hash, PartialEq, Deserialize, Serialize)]
#[serde(transparent)]
pub struct ChannelId(String);

impl ChannelId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ChannelId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for ChannelId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Deserialize, Serialize)]
#[serde(transparent)]
pub struct EventId(u32);

impl EventId {
    pub fn value(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EID#{:08X}", self.0)
    }
}

impl From<u32> for EventId {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

// channels

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Channel {
    pub number: ChannelNumber,
    pub id: ChannelId,
    pub name: String,
    #[serde(default)]
    pub provider: String,
    // Serialized separately in the `streaminfo` section.
    #[serde(default, skip_serializing)]
    pub stream_info: StreamInfo,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamInfo {
    #[serde(default)]
    pub video_pid: u16,
    #[serde(default)]
    pub audio: Vec<Track>,
    #[serde(default)]
    pub dolby: Vec<Track>,
    #[serde(default)]
    pub subtitles: Vec<Track>,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Track {
    pub pid: u16,
    #[serde(default)]
    pub language: String,
}

// schedules

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EpgEvent {
    pub event_id: EventId,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub start_time: DateTime<Utc>,
    #[serde(with = "duration_seconds")]
    pub duration: Duration,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub short_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl EpgEvent {
    pub fn new(
        event_id: EventId,
        start_time: DateTime<Utc>,
        duration: Duration,
        title: String,
    ) -> Self {
        EpgEvent {
            event_id,
            start_time,
            duration,
            title,
            short_text: None,
            description: None,
        }
    }

    /// Returns `None` if the end time is out of range.
    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        self.start_time.checked_add_signed(self.duration)
    }

    // An event without a valid end time is never on air.
    pub fn is_on_air(&self, now: DateTime<Utc>) -> bool {
        match self.end_time() {
            Some(end_time) => self.start_time <= now && now < end_time,
            None => false,
        }
    }
}

/// Events of a channel, ordered by their start times.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Schedule {
    pub channel_id: ChannelId,
    events: Vec<EpgEvent>,
}

impl Schedule {
    pub fn new(channel_id: ChannelId, mut events: Vec<EpgEvent>) -> Self {
        events.sort_by_key(|event| event.start_time);
        Schedule { channel_id, events }
    }

    pub fn events(&self) -> &[EpgEvent] {
        &self.events
    }

    /// The event on air at `now`.
    pub fn present(&self, now: DateTime<Utc>) -> Option<&EpgEvent> {
        self.events.iter().find(|event| event.is_on_air(now))
    }

    /// The event next to the present event.
    ///
    /// Returns the first upcoming event if there is no present event.
    pub fn following(&self, now: DateTime<Utc>) -> Option<&EpgEvent> {
        match self.events.iter().position(|event| event.is_on_air(now)) {
            Some(index) => self.events.get(index + 1),
            None => self.events.iter().find(|event| event.start_time > now),
        }
    }
}

impl<'de> Deserialize<'de> for Schedule {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Data {
            channel_id: ChannelId,
            #[serde(default)]
            events: Vec<EpgEvent>,
        }

        let data = Data::deserialize(deserializer)?;
        Ok(Schedule::new(data.channel_id, data.events))
    }
}

// timers

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TimerOrigin {
    #[default]
    Local,
    Remote,
}

impl fmt::Display for TimerOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            TimerOrigin::Local => write!(f, "local"),
            TimerOrigin::Remote => write!(f, "remote"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Timer {
    #[serde(default)]
    pub id: u32,
    pub channel: ChannelNumber,
    pub file: String,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub start_time: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub stop_time: DateTime<Utc>,
    #[serde(default)]
    pub recording: bool,
    #[serde(default)]
    pub origin: TimerOrigin,
}

impl Timer {
    pub fn is_local(&self) -> bool {
        self.origin == TimerOrigin::Local
    }

    pub fn state_label(&self) -> &'static str {
        if self.recording {
            "timer is recording"
        } else {
            "timer is pending"
        }
    }
}

// recordings

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Recording {
    pub name: String,
    pub file_name: String,
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub short_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub start_time: DateTime<Utc>,
    #[serde(with = "duration_seconds")]
    pub duration: Duration,
    #[serde(default)]
    pub priority: u32,
    #[serde(default)]
    pub lifetime: u32,
}
