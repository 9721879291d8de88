use std::fs::File;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

pub fn load<P: AsRef<Path>>(config_path: P) -> Arc<Config> {
    let config_path = config_path.as_ref();
    let reader = File::open(config_path).unwrap_or_else(|err| {
        panic!("Failed to open {:?}: {}", config_path, err);
    });
    let config: Config = serde_yaml::from_reader(reader).unwrap_or_else(|err| {
        panic!("Failed to parse {:?}: {}", config_path, err);
    });

    config.validate();

    tracing::info!(?config_path, "Loaded");
    Arc::new(config)
}

// The upper bound of every delay below.  A delay longer than this is
// certainly a mistake in the config.
const MAX_DELAY: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub registries: RegistriesConfig,
    #[serde(default)]
    pub refresh: RefreshConfig,
    #[serde(default)]
    pub enrichment: EnrichmentConfig,
    #[serde(default)]
    pub host: HostConfig,
}

impl Config {
    pub fn validate(&self) {
        self.registries.validate();
        self.refresh.validate();
        self.enrichment.validate();
        self.host.validate();
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct RegistriesConfig {
    #[serde(default = "RegistriesConfig::default_lock_timeout")]
    #[serde(with = "humantime_serde")]
    pub lock_timeout: Duration,
}

impl RegistriesConfig {
    fn default_lock_timeout() -> Duration {
        Duration::from_millis(500)
    }

    fn validate(&self) {
        const MAX_LOCK_TIMEOUT: Duration = Duration::from_secs(10);

        assert!(
            !self.lock_timeout.is_zero(),
            "config.registries: `lock-timeout` must be a non-zero duration"
        );
        // A long wait stalls the host's own callback dispatch.
        assert!(
            self.lock_timeout <= MAX_LOCK_TIMEOUT,
            "config.registries: `lock-timeout` must be shorter than or equal to {}",
            humantime::format_duration(MAX_LOCK_TIMEOUT)
        );
    }
}

impl Default for RegistriesConfig {
    fn default() -> Self {
        RegistriesConfig {
            lock_timeout: Self::default_lock_timeout(),
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct RefreshConfig {
    #[serde(default = "RefreshConfig::default_following_missing_delay")]
    #[serde(with = "humantime_serde")]
    pub following_missing_delay: Duration,
    #[serde(default = "RefreshConfig::default_schedule_missing_delay")]
    #[serde(with = "humantime_serde")]
    pub schedule_missing_delay: Duration,
    #[serde(default = "RefreshConfig::default_poll_interval")]
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
}

impl RefreshConfig {
    fn default_following_missing_delay() -> Duration {
        Duration::from_secs(10)
    }

    fn default_schedule_missing_delay() -> Duration {
        Duration::from_secs(60)
    }

    fn default_poll_interval() -> Duration {
        Duration::from_secs(1)
    }

    fn validate(&self) {
        for (name, delay) in [
            ("following-missing-delay", self.following_missing_delay),
            ("schedule-missing-delay", self.schedule_missing_delay),
            ("poll-interval", self.poll_interval),
        ] {
            assert!(
                !delay.is_zero(),
                "config.refresh: `{}` must be a non-zero duration",
                name
            );
            assert!(
                delay <= MAX_DELAY,
                "config.refresh: `{}` must be shorter than or equal to {}",
                name,
                humantime::format_duration(MAX_DELAY)
            );
        }
    }
}

impl Default for RefreshConfig {
    fn default() -> Self {
        RefreshConfig {
            following_missing_delay: Self::default_following_missing_delay(),
            schedule_missing_delay: Self::default_schedule_missing_delay(),
            poll_interval: Self::default_poll_interval(),
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct EnrichmentConfig {
    /// Name of the enrichment provider to discover.
    #[serde(default)]
    pub provider: Option<String>,
    /// Data file for a provider backed by static data.
    #[serde(default)]
    pub data_json: Option<String>,
    /// Upper bound of a single request to the provider.
    #[serde(default = "EnrichmentConfig::default_timeout")]
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl EnrichmentConfig {
    fn default_timeout() -> Duration {
        Duration::from_millis(500)
    }

    fn validate(&self) {
        const MAX_TIMEOUT: Duration = Duration::from_secs(10);

        assert!(
            !self.timeout.is_zero(),
            "config.enrichment: `timeout` must be a non-zero duration"
        );
        // Registry locks are held while waiting for the provider.
        assert!(
            self.timeout <= MAX_TIMEOUT,
            "config.enrichment: `timeout` must be shorter than or equal to {}",
            humantime::format_duration(MAX_TIMEOUT)
        );
        if let Some(name) = self.provider.as_ref() {
            assert!(
                !name.is_empty(),
                "config.enrichment: `provider` must be a non-empty string"
            );
        }
        if let Some(data_json) = self.data_json.as_ref() {
            assert!(
                self.provider.is_some(),
                "config.enrichment: `data-json` requires `provider`"
            );
            assert!(
                Path::new(data_json).is_file(),
                "config.enrichment: `data-json` must be a path to an existing file"
            );
        }
    }
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        EnrichmentConfig {
            provider: None,
            data_json: None,
            timeout: Self::default_timeout(),
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct HostConfig {
    #[serde(default)]
    pub snapshot_json: Option<String>,
    #[serde(default = "HostConfig::default_event_queue")]
    pub event_queue: usize,
}

impl HostConfig {
    fn default_event_queue() -> usize {
        256
    }

    fn validate(&self) {
        if let Some(snapshot_json) = self.snapshot_json.as_ref() {
            assert!(
                Path::new(snapshot_json).is_file(),
                "config.host: `snapshot-json` must be a path to an existing file"
            );
        }
        assert!(
            self.event_queue > 0,
            "config.host: `event-queue` must be larger than 0"
        );
    }
}

impl Default for HostConfig {
    fn default() -> Self {
        HostConfig {
            snapshot_json: None,
            event_queue: Self::default_event_queue(),
        }
    }
}
