use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::DateTime;
use chrono::Datelike;
use chrono::FixedOffset;
use chrono::NaiveTime;
use chrono::Timelike;
use chrono::Utc;
use chrono::Weekday;

use actlet::prelude::*;

use crate::config::SchedulerConfig;
use crate::models::ChannelId;
use crate::models::ScheduleId;
use crate::models::WebChannelSchedules;

/// A schedule entry of the current week.
///
/// Times are local to the reference timezone.
#[derive(Clone, Debug, PartialEq)]
pub struct ScheduleWindowEntry {
    pub channel_id: Option<ChannelId>,
    pub schedule_id: ScheduleId,
    pub day_of_week: Weekday,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
}

/// A read-only view of the schedule entries of the current week.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ScheduleWindowIndex {
    entries: Vec<ScheduleWindowEntry>,
}

impl ScheduleWindowIndex {
    pub fn new(entries: Vec<ScheduleWindowEntry>) -> Self {
        ScheduleWindowIndex { entries }
    }

    pub fn entries(&self) -> &[ScheduleWindowEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries_on(&self, day: Weekday) -> impl Iterator<Item = &ScheduleWindowEntry> {
        self.entries
            .iter()
            .filter(move |entry| entry.day_of_week == day)
    }
}

impl From<&[WebChannelSchedules]> for ScheduleWindowIndex {
    fn from(channels: &[WebChannelSchedules]) -> Self {
        let mut entries = vec![];
        for channel in channels.iter() {
            for schedule in channel.schedules.iter() {
                let day_of_week = schedule.day_of_week.as_deref().and_then(parse_weekday);
                let start_time = schedule.start_time.as_deref().and_then(parse_time);
                let end_time = schedule.end_time.as_deref().and_then(parse_time);
                match (day_of_week, start_time, end_time) {
                    (Some(day_of_week), Some(start_time), Some(end_time)) => {
                        entries.push(ScheduleWindowEntry {
                            channel_id: channel.channel.id.clone(),
                            schedule_id: schedule.id.clone(),
                            day_of_week,
                            start_time,
                            end_time,
                        });
                    }
                    _ => {
                        tracing::debug!(
                            %schedule.id,
                            ?schedule.day_of_week,
                            ?schedule.start_time,
                            ?schedule.end_time,
                            "Ignore a schedule having malformed day or time",
                        );
                    }
                }
            }
        }
        ScheduleWindowIndex::new(entries)
    }
}

fn parse_weekday(s: &str) -> Option<Weekday> {
    Weekday::from_str(s.trim()).ok()
}

fn parse_time(s: &str) -> Option<NaiveTime> {
    let s = s.trim();
    NaiveTime::parse_from_str(s, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M:%S"))
        .ok()
}

// interval

#[derive(Clone, Debug, PartialEq)]
pub struct IntervalParams {
    pub timezone: FixedOffset,
    pub fast_interval: Duration,
    pub baseline_interval: Duration,
    pub imminent_window: Duration,
    pub grace_window: Duration,
    /// Upper bound of the scan for upcoming programs.
    ///
    /// A program starting later than this is never imminent, even when it is
    /// within the imminent window.  The configuration validation rejects a
    /// lookahead shorter than the imminent window, but parameters built
    /// directly are used as they are.
    pub lookahead: Duration,
}

impl From<&SchedulerConfig> for IntervalParams {
    fn from(config: &SchedulerConfig) -> Self {
        IntervalParams {
            timezone: config.timezone,
            fast_interval: config.fast_interval,
            baseline_interval: config.baseline_interval,
            imminent_window: config.imminent_window,
            grace_window: config.grace_window,
            lookahead: config.lookahead,
        }
    }
}

impl Default for IntervalParams {
    fn default() -> Self {
        IntervalParams::from(&SchedulerConfig::default())
    }
}

/// Computes how long to wait before the next poll.
///
/// Returns the fast interval if a program on the current day in the reference
/// timezone starts within the imminent window, or started less than the grace
/// window ago.  Otherwise returns the baseline interval.  This is a binary
/// choice.
pub fn compute_interval(
    now: DateTime<Utc>,
    index: Option<&ScheduleWindowIndex>,
    params: &IntervalParams,
) -> Duration {
    let index = match index {
        Some(index) if !index.is_empty() => index,
        _ => return params.baseline_interval,
    };

    let now = now.with_timezone(&params.timezone);
    let today = now.weekday();
    let now_secs = i64::from(now.num_seconds_from_midnight());
    let grace = params.grace_window.as_secs() as i64;
    let imminent = params.imminent_window.as_secs() as i64;
    let lookahead = params.lookahead.as_secs() as i64;

    let imminent_found = index.entries_on(today).any(|entry| {
        let until_start = i64::from(entry.start_time.num_seconds_from_midnight()) - now_secs;
        // The lookahead bounds the scan.
        if until_start < -grace || until_start > lookahead {
            return false;
        }
        until_start <= imminent
    });

    if imminent_found {
        params.fast_interval
    } else {
        params.baseline_interval
    }
}

// schedule index updated

#[derive(Clone, Debug, Message)]
pub struct ScheduleIndexUpdated {
    pub index: Arc<ScheduleWindowIndex>,
}

// clock

/// A source of the current time.
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

// <coverage:exclude>
#[cfg(test)]
pub(crate) mod stub {
    use super::*;

    pub(crate) struct FixedClock(pub DateTime<Utc>);

    impl FixedClock {
        // `datetime` is an RFC 3339 string.
        pub(crate) fn at(datetime: &str) -> Self {
            FixedClock(
                DateTime::parse_from_rfc3339(datetime)
                    .unwrap()
                    .with_timezone(&Utc),
            )
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.0
        }
    }

    /// A clock driven by the tokio clock, which can be paused in tests.
    pub(crate) struct TokioClock {
        base: DateTime<Utc>,
        origin: tokio::time::Instant,
    }

    impl TokioClock {
        pub(crate) fn starting_at(datetime: &str) -> Self {
            TokioClock {
                base: FixedClock::at(datetime).0,
                origin: tokio::time::Instant::now(),
            }
        }
    }

    impl Clock for TokioClock {
        fn now(&self) -> DateTime<Utc> {
            let elapsed = tokio::time::Instant::now() - self.origin;
            self.base + chrono::Duration::from_std(elapsed).unwrap()
        }
    }
}

// </coverage:exclude>
