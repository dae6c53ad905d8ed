use std::fs::File;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::FixedOffset;
use chrono::Offset;
use chrono::Utc;
use serde::Deserialize;
use serde::Deserializer;
use url::Url;

use crate::error::Error;

pub fn load<P: AsRef<Path>>(config_path: P) -> Result<Arc<Config>, Error> {
    let config_path = config_path.as_ref();
    let reader = File::open(config_path)?;
    let config: Config = serde_yaml::from_reader(reader)?;
    config.validate();
    tracing::debug!(config.path = %config_path.display(), "Loaded");
    Ok(Arc::new(config))
}

// result

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub schedule_service: ScheduleServiceConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub push: PushConfig,
}

impl Config {
    fn validate(&self) {
        self.schedule_service.validate();
        self.scheduler.validate();
        self.push.validate();
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct ScheduleServiceConfig {
    pub base_url: Url,
    #[serde(default = "ScheduleServiceConfig::default_live_events_path")]
    pub live_events_path: String,
    // Forwarded verbatim as the `deviceId` query parameter.
    #[serde(default)]
    pub device_id: Option<String>,
    #[serde(default = "ScheduleServiceConfig::default_fetch_timeout")]
    #[serde(with = "humantime_serde")]
    pub fetch_timeout: Duration,
}

impl ScheduleServiceConfig {
    const WEEK_PATH: &'static str = "channels/with-schedules/week";

    fn default_live_events_path() -> String {
        "live-events".to_string()
    }

    fn default_fetch_timeout() -> Duration {
        Duration::from_secs(10)
    }

    fn validate(&self) {
        assert!(
            matches!(self.base_url.scheme(), "http" | "https"),
            "config.schedule-service: `base-url` must be a http or https URL"
        );
        assert!(
            !self.live_events_path.trim_matches('/').is_empty(),
            "config.schedule-service: `live-events-path` must be a non-empty path"
        );
        assert!(
            !self.fetch_timeout.is_zero(),
            "config.schedule-service: `fetch-timeout` must be larger than 0"
        );
    }

    pub fn live_status_url(&self, device_id: Option<&str>) -> Url {
        let mut url = self.join(Self::WEEK_PATH);
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("live_status", "true");
            if let Some(device_id) = device_id {
                query.append_pair("deviceId", device_id);
            }
        }
        url
    }

    pub fn events_url(&self) -> Url {
        self.join(self.live_events_path.trim_start_matches('/'))
    }

    // `Url::join()` replaces the last path segment unless the base URL ends
    // with a slash.
    fn join(&self, path: &str) -> Url {
        let mut base = self.base_url.clone();
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        base.set_query(None);
        // `path` is always relative and free of schemes, so joining never
        // fails once the base URL has been validated.
        base.join(path).unwrap_or(base)
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct SchedulerConfig {
    #[serde(default = "SchedulerConfig::default_timezone")]
    #[serde(deserialize_with = "deserialize_utc_offset")]
    pub timezone: FixedOffset,
    #[serde(default = "SchedulerConfig::default_fast_interval")]
    #[serde(with = "humantime_serde")]
    pub fast_interval: Duration,
    #[serde(default = "SchedulerConfig::default_baseline_interval")]
    #[serde(with = "humantime_serde")]
    pub baseline_interval: Duration,
    #[serde(default = "SchedulerConfig::default_imminent_window")]
    #[serde(with = "humantime_serde")]
    pub imminent_window: Duration,
    #[serde(default = "SchedulerConfig::default_grace_window")]
    #[serde(with = "humantime_serde")]
    pub grace_window: Duration,
    #[serde(default = "SchedulerConfig::default_lookahead")]
    #[serde(with = "humantime_serde")]
    pub lookahead: Duration,
}

impl SchedulerConfig {
    fn default_timezone() -> FixedOffset {
        Utc.fix()
    }

    fn default_fast_interval() -> Duration {
        Duration::from_secs(30)
    }

    fn default_baseline_interval() -> Duration {
        Duration::from_secs(5 * 60)
    }

    fn default_imminent_window() -> Duration {
        Duration::from_secs(10 * 60)
    }

    fn default_grace_window() -> Duration {
        Duration::from_secs(2 * 60)
    }

    fn default_lookahead() -> Duration {
        Duration::from_secs(60 * 60)
    }

    fn validate(&self) {
        assert!(
            !self.fast_interval.is_zero(),
            "config.scheduler: `fast-interval` must be larger than 0"
        );
        assert!(
            self.fast_interval <= self.baseline_interval,
            "config.scheduler: `fast-interval` must be smaller than or equal to `baseline-interval`"
        );
        assert!(
            self.lookahead >= self.imminent_window,
            "config.scheduler: `lookahead` must be larger than or equal to `imminent-window`"
        );
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        SchedulerConfig {
            timezone: Self::default_timezone(),
            fast_interval: Self::default_fast_interval(),
            baseline_interval: Self::default_baseline_interval(),
            imminent_window: Self::default_imminent_window(),
            grace_window: Self::default_grace_window(),
            lookahead: Self::default_lookahead(),
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct PushConfig {
    #[serde(default = "PushConfig::default_reconnect_delay")]
    #[serde(with = "humantime_serde")]
    pub reconnect_delay: Duration,
}

impl PushConfig {
    fn default_reconnect_delay() -> Duration {
        Duration::from_secs(5)
    }

    fn validate(&self) {
        assert!(
            !self.reconnect_delay.is_zero(),
            "config.push: `reconnect-delay` must be larger than 0"
        );
    }
}

impl Default for PushConfig {
    fn default() -> Self {
        PushConfig {
            reconnect_delay: Self::default_reconnect_delay(),
        }
    }
}

// helpers

fn deserialize_utc_offset<'de, D>(deserializer: D) -> Result<FixedOffset, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    parse_utc_offset(&s)
        .ok_or_else(|| serde::de::Error::custom(format!("invalid UTC offset: {}", s)))
}

// Accepts "Z" and "UTC" in addition to "+09:00" and "+0900".
fn parse_utc_offset(s: &str) -> Option<FixedOffset> {
    let s = s.trim();
    if s.eq_ignore_ascii_case("z") || s.eq_ignore_ascii_case("utc") {
        return Some(Utc.fix());
    }
    FixedOffset::from_str(s).ok()
}

// </coverage:exclude>
