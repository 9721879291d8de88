use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::ops::Deref;
use std::path::Path;
use std::time::Duration;

use indexmap::IndexMap;
use serde::Deserialize;
use tokio::sync::RwLock;
use tokio::sync::RwLockReadGuard;
use tokio::sync::RwLockWriteGuard;

use crate::error::Error;
use crate::models::Channel;
use crate::models::ChannelId;
use crate::models::ChannelNumber;
use crate::models::Recording;
use crate::models::Schedule;
use crate::models::Timer;

pub type Channels = IndexMap<ChannelNumber, Channel>;
pub type Schedules = IndexMap<ChannelId, Schedule>;
pub type Timers = Vec<Timer>;
// Keyed by file names.
pub type Recordings = IndexMap<String, Recording>;

/// A host-owned table shared between the host and the core.
///
/// The core reads it only through `acquire_read()`, which never waits longer
/// than the given timeout.  Write access is reserved for the host side.
pub struct Registry<T> {
    name: &'static str,
    inner: RwLock<T>,
}

impl<T> Registry<T> {
    pub fn new(name: &'static str, value: T) -> Self {
        Registry {
            name,
            inner: RwLock::new(value),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub async fn acquire_read(&self, timeout: Duration) -> Result<RegistryReadGuard<'_, T>, Error> {
        match tokio::time::timeout(timeout, self.inner.read()).await {
            Ok(guard) => {
                tracing::trace!(registry = self.name, "Acquired");
                Ok(RegistryReadGuard {
                    name: self.name,
                    guard,
                })
            }
            Err(_) => {
                tracing::debug!(
                    registry = self.name,
                    timeout = %humantime::format_duration(timeout),
                    "Busy"
                );
                Err(Error::Busy(self.name))
            }
        }
    }

    pub async fn write(&self) -> RwLockWriteGuard<'_, T> {
        self.inner.write().await
    }
}

/// A read access to a registry, released when dropped.
pub struct RegistryReadGuard<'a, T> {
    name: &'static str,
    guard: RwLockReadGuard<'a, T>,
}

impl<T> Deref for RegistryReadGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.guard
    }
}

impl<T> fmt::Debug for RegistryReadGuard<'_, T>
where
    T: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryReadGuard")
            .field("name", &self.name)
            .field("value", &*self.guard)
            .finish()
    }
}

impl<T> Drop for RegistryReadGuard<'_, T> {
    fn drop(&mut self) {
        tracing::trace!(registry = self.name, "Released");
    }
}

pub struct Registries {
    pub channels: Registry<Channels>,
    pub schedules: Registry<Schedules>,
    pub timers: Registry<Timers>,
    pub recordings: Registry<Recordings>,
}

impl Registries {
    pub fn new() -> Self {
        Registries {
            channels: Registry::new("channels", Default::default()),
            schedules: Registry::new("schedules", Default::default()),
            timers: Registry::new("timers", Default::default()),
            recordings: Registry::new("recordings", Default::default()),
        }
    }

    /// Replaces the content of every registry with the snapshot.
    ///
    /// This is a host-side operation.
    pub async fn load_snapshot(&self, snapshot: Snapshot) {
        let num_channels = snapshot.channels.len();
        let num_schedules = snapshot.schedules.len();
        let num_timers = snapshot.timers.len();
        let num_recordings = snapshot.recordings.len();

        *self.channels.write().await = snapshot
            .channels
            .into_iter()
            .map(|channel| (channel.number, channel))
            .collect();
        *self.schedules.write().await = snapshot
            .schedules
            .into_iter()
            .map(|schedule| (schedule.channel_id.clone(), schedule))
            .collect();
        *self.timers.write().await = snapshot.timers;
        *self.recordings.write().await = snapshot
            .recordings
            .into_iter()
            .map(|recording| (recording.file_name.clone(), recording))
            .collect();

        tracing::info!(
            num_channels,
            num_schedules,
            num_timers,
            num_recordings,
            "Loaded snapshot"
        );
    }
}

impl Default for Registries {
    fn default() -> Self {
        Self::new()
    }
}

/// The content of the registries in a serialized form.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    #[serde(default)]
    pub channels: Vec<Channel>,
    #[serde(default)]
    pub schedules: Vec<Schedule>,
    #[serde(default)]
    pub timers: Vec<Timer>,
    #[serde(default)]
    pub recordings: Vec<Recording>,
}

impl Snapshot {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let reader = BufReader::new(File::open(path)?);
        Ok(serde_json::from_reader(reader)?)
    }
}
