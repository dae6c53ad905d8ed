use std::borrow::Borrow;
use std::fmt;

use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;

// schedule id

/// Identifies one program-airing slot.
///
/// The schedule service sends IDs either as JSON strings or as integers.  Both
/// are normalized into a string.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(transparent)]
pub struct ScheduleId(String);

impl ScheduleId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ScheduleId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl From<&str> for ScheduleId {
    fn from(id: &str) -> Self {
        ScheduleId(id.to_string())
    }
}

impl From<String> for ScheduleId {
    fn from(id: String) -> Self {
        ScheduleId(id)
    }
}

impl Borrow<str> for ScheduleId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl<'de> Deserialize<'de> for ScheduleId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(ScheduleId(deserialize_id(deserializer)?))
    }
}

// channel id

#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(transparent)]
pub struct ChannelId(String);

impl ChannelId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl From<&str> for ChannelId {
    fn from(id: &str) -> Self {
        ChannelId(id.to_string())
    }
}

impl<'de> Deserialize<'de> for ChannelId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(ChannelId(deserialize_id(deserializer)?))
    }
}

fn deserialize_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Integer(i64),
        String(String),
    }

    Ok(match RawId::deserialize(deserializer)? {
        RawId::Integer(id) => id.to_string(),
        RawId::String(id) => id,
    })
}

// live status

/// The live-status fact of a schedule entry.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveStatusEntry {
    pub schedule_id: ScheduleId,
    pub is_live: bool,
    pub stream_url: Option<String>,
}

// wire models of the live-status fetch

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct WebChannelSchedules {
    pub channel: WebChannel,
    #[serde(default)]
    pub schedules: Vec<WebSchedule>,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct WebChannel {
    #[serde(default)]
    pub id: Option<ChannelId>,
    #[serde(default)]
    pub name: Option<String>,
}

// `day_of_week`, `start_time` and `end_time` are kept as received.  They are
// parsed when building a `ScheduleWindowIndex` and malformed values exclude
// only the entry from the index.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct WebSchedule {
    pub id: ScheduleId,
    #[serde(default)]
    pub day_of_week: Option<String>,
    #[serde(default)]
    pub start_time: Option<String>,
    #[serde(default)]
    pub end_time: Option<String>,
    #[serde(default)]
    pub program: Option<WebProgram>,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct WebProgram {
    #[serde(default)]
    pub is_live: bool,
    #[serde(default)]
    pub stream_url: Option<String>,
}

impl From<&WebSchedule> for LiveStatusEntry {
    fn from(schedule: &WebSchedule) -> Self {
        let (is_live, stream_url) = match schedule.program {
            Some(ref program) => (program.is_live, program.stream_url.clone()),
            None => (false, None),
        };
        LiveStatusEntry {
            schedule_id: schedule.id.clone(),
            is_live,
            stream_url,
        }
    }
}

/// Flattens a live-status response into one entry per schedule item.
pub fn flatten_live_statuses(channels: &[WebChannelSchedules]) -> Vec<LiveStatusEntry> {
    channels
        .iter()
        .flat_map(|channel| channel.schedules.iter())
        .map(LiveStatusEntry::from)
        .collect()
}

// </coverage:exclude>
