use chrono::NaiveTime;
use enum_iterator::{all, Sequence};
use itertools::Itertools;
use serde::{de::DeserializeOwned, Deserialize, Deserializer};
use serde_json::Value;
use thiserror::Error;

use crate::catalog::TimeBlock;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Sequence)]
pub enum Day {
    Mon,
    Tue,
    Wed,
    Thu,
    Fri,
    Sat,
    Sun,
}

impl Day {
    pub fn code(self) -> &'static str {
        match self {
            Self::Mon => "M",
            Self::Tue => "T",
            Self::Wed => "W",
            Self::Thu => "Th",
            Self::Fri => "F",
            Self::Sat => "Sa",
            Self::Sun => "Su",
        }
    }
}

#[derive(Debug, PartialEq, Eq, Error)]
pub enum ClockError {
    #[error("clock {0:?} is not four digits")]
    Malformed(String),
    #[error("clock {0:?} is not a time of day")]
    OutOfRange(String),
}

/// Converts a 24-hour `"HHMM"` clock into `"H:MM AM"` / `"H:MM PM"`.
pub fn format_clock(clock: &str) -> Result<String, ClockError> {
    if clock.len() != 4 || !clock.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ClockError::Malformed(clock.to_owned()));
    }

    let time = NaiveTime::parse_from_str(clock, "%H%M")
        .map_err(|_| ClockError::OutOfRange(clock.to_owned()))?;

    Ok(time.format("%-I:%M %p").to_string())
}

/// One meeting entry of a section, as the schedule service returns it.
#[derive(Debug, Default, Deserialize)]
pub struct RemoteTime {
    #[serde(default, deserialize_with = "flag")]
    pub mon: bool,
    #[serde(default, deserialize_with = "flag")]
    pub tue: bool,
    #[serde(default, deserialize_with = "flag")]
    pub wed: bool,
    #[serde(default, deserialize_with = "flag")]
    pub thu: bool,
    #[serde(default, deserialize_with = "flag")]
    pub fri: bool,
    #[serde(default, deserialize_with = "flag")]
    pub sat: bool,
    #[serde(default, deserialize_with = "flag")]
    pub sun: bool,
    #[serde(default, deserialize_with = "opt_text")]
    pub begin_time: Option<String>,
    #[serde(default, deserialize_with = "opt_text")]
    pub end_time: Option<String>,
    #[serde(default, deserialize_with = "opt_text")]
    pub building: Option<String>,
    #[serde(default, deserialize_with = "opt_text")]
    pub room: Option<String>,
}

impl RemoteTime {
    pub fn meets_on(&self, day: Day) -> bool {
        match day {
            Day::Mon => self.mon,
            Day::Tue => self.tue,
            Day::Wed => self.wed,
            Day::Thu => self.thu,
            Day::Fri => self.fri,
            Day::Sat => self.sat,
            Day::Sun => self.sun,
        }
    }

    pub fn day_label(&self) -> String {
        all::<Day>()
            .filter(|&day| self.meets_on(day))
            .map(Day::code)
            .join(" ")
    }

    /// `Ok(None)` when the entry has no meeting days or lacks a begin or end
    /// time; such entries are not emitted at all.
    pub fn to_time_block(&self) -> Result<Option<TimeBlock>, ClockError> {
        let days = self.day_label();
        let begin = self.begin_time.as_deref().filter(|s| !s.is_empty());
        let end = self.end_time.as_deref().filter(|s| !s.is_empty());

        let (Some(begin), Some(end)) = (begin, end) else {
            return Ok(None);
        };
        if days.is_empty() {
            return Ok(None);
        }

        Ok(Some(TimeBlock {
            days,
            start_time: format_clock(begin)?,
            end_time: format_clock(end)?,
            building: self.building.clone().unwrap_or_default(),
            room: self.room.clone().unwrap_or_default(),
        }))
    }
}

#[derive(Debug, Deserialize)]
pub struct RemoteSection {
    #[serde(deserialize_with = "text")]
    pub section_number: String,
    #[serde(default, deserialize_with = "quarantined_times")]
    pub times: Option<Vec<RemoteTime>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SectionsResponse {
    #[serde(default, deserialize_with = "quarantined_sections")]
    pub sections: Option<Vec<RemoteSection>>,
}

impl SectionsResponse {
    /// First section carrying `section_number`; later duplicates are ignored.
    pub fn section(&self, section_number: &str) -> Option<&RemoteSection> {
        self.sections
            .as_deref()?
            .iter()
            .find(|section| section.section_number == section_number)
    }
}

// unreadable entries are dropped one by one, so the rest of the list keeps
// its order and its readable neighbours
fn readable<T: DeserializeOwned>(raw: Option<Vec<Value>>, what: &str) -> Option<Vec<T>> {
    raw.map(|entries| {
        entries
            .into_iter()
            .filter_map(|value| match T::deserialize(value) {
                Ok(entry) => Some(entry),
                Err(error) => {
                    log::warn!("ignoring remote {}: {}", what, error);
                    None
                }
            })
            .collect()
    })
}

fn quarantined_sections<'de, D>(deserializer: D) -> Result<Option<Vec<RemoteSection>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Vec<Value>>::deserialize(deserializer)?;
    Ok(readable(raw, "section"))
}

fn quarantined_times<'de, D>(deserializer: D) -> Result<Option<Vec<RemoteTime>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Vec<Value>>::deserialize(deserializer)?;
    Ok(readable(raw, "time entry"))
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Scalar {
    Bool(bool),
    Number(serde_json::Number),
    Text(String),
}

/// Accepts a string or a bare number, for identifiers the upstream data
/// is not consistent about.
pub(crate) fn text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Scalar::deserialize(deserializer)? {
        Scalar::Text(s) => Ok(s),
        Scalar::Number(n) => Ok(n.to_string()),
        Scalar::Bool(b) => Err(serde::de::Error::invalid_type(
            serde::de::Unexpected::Bool(b),
            &"a string or a number",
        )),
    }
}

pub(crate) fn opt_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Scalar>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Scalar::Text(s)) => Ok(Some(s)),
        Some(Scalar::Number(n)) => Ok(Some(n.to_string())),
        Some(Scalar::Bool(b)) => Err(serde::de::Error::invalid_type(
            serde::de::Unexpected::Bool(b),
            &"a string or a number",
        )),
    }
}

fn flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Scalar>::deserialize(deserializer)? {
        None => false,
        Some(Scalar::Bool(b)) => b,
        Some(Scalar::Number(n)) => n.as_f64().is_some_and(|n| n != 0.),
        Some(Scalar::Text(s)) => !matches!(s.trim(), "" | "0" | "false" | "False" | "N" | "n"),
    })
}
