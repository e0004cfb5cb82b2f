//! Interpret the sweeping schedule stored in a [`Feature`]'s properties.

use std::collections::BTreeMap;
use std::fmt;

use crate::feature::{Feature, property};
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Weekday {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    Sunday,
}

impl Weekday {
    /// Parse the day codes used by the sweeping layer. Tuesday is written `Tues` in the data.
    pub fn from_code(code: &str) -> Option<Self> {
        Some(match code {
            "Mon" => Weekday::Monday,
            "Tues" | "Tue" => Weekday::Tuesday,
            "Wed" => Weekday::Wednesday,
            "Thu" => Weekday::Thursday,
            "Fri" => Weekday::Friday,
            "Sat" => Weekday::Saturday,
            "Sun" => Weekday::Sunday,
            _ => return None,
        })
    }

    pub fn is_weekend(self) -> bool {
        matches!(self, Weekday::Saturday | Weekday::Sunday)
    }
}

impl fmt::Display for Weekday {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Weekday::Monday => "Monday",
            Weekday::Tuesday => "Tuesday",
            Weekday::Wednesday => "Wednesday",
            Weekday::Thursday => "Thursday",
            Weekday::Friday => "Friday",
            Weekday::Saturday => "Saturday",
            Weekday::Sunday => "Sunday",
        };
        f.write_str(s)
    }
}

pub fn weekday(feature: &Feature) -> Option<Weekday> {
    feature.property(property::WEEKDAY).and_then(Weekday::from_code)
}

/// Hours are the first two characters of a `HH:MM` string.
pub fn hour(time: &str) -> Result<u32> {
    parse_slice(time, 0..2)
}

/// Minutes are the fourth and fifth characters of a `HH:MM` string.
pub fn minute(time: &str) -> Result<u32> {
    parse_slice(time, 3..5)
}

fn parse_slice(time: &str, range: std::ops::Range<usize>) -> Result<u32> {
    time.get(range)
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| Error::InvalidTime(time.to_string()))
}

fn required<'a>(feature: &'a Feature, name: &'static str) -> Result<&'a str> {
    feature.property(name).ok_or(Error::MissingProperty(name))
}

pub fn start_hour(feature: &Feature) -> Result<u32> {
    hour(required(feature, property::FROM_HOUR)?)
}

pub fn start_minute(feature: &Feature) -> Result<u32> {
    minute(required(feature, property::FROM_HOUR)?)
}

pub fn end_hour(feature: &Feature) -> Result<u32> {
    hour(required(feature, property::TO_HOUR)?)
}

pub fn end_minute(feature: &Feature) -> Result<u32> {
    minute(required(feature, property::TO_HOUR)?)
}

fn flag(feature: &Feature, name: &str) -> bool {
    feature.property(name) == Some("Y")
}

pub fn week_one(feature: &Feature) -> bool {
    flag(feature, property::WEEK_ONE)
}

pub fn week_two(feature: &Feature) -> bool {
    flag(feature, property::WEEK_TWO)
}

pub fn week_three(feature: &Feature) -> bool {
    flag(feature, property::WEEK_THREE)
}

pub fn week_four(feature: &Feature) -> bool {
    flag(feature, property::WEEK_FOUR)
}

/// Whether the segment is skipped at least one week of the month.
pub fn any_weeks_off(feature: &Feature) -> bool {
    !(week_one(feature) && week_two(feature) && week_three(feature) && week_four(feature))
}

/// Same as [`Feature::key`] but never fails, a missing `BLOCKSWEEP` gives an empty key.
pub fn unique_key(feature: &Feature) -> &str {
    feature.property(property::BLOCK_SWEEP).unwrap_or_default()
}

/// Both sides of a street share a `CNN`, this identifies one of them.
pub fn block_side_key(feature: &Feature) -> String {
    format!(
        "{}_{}",
        feature.property(property::CNN).unwrap_or_default(),
        feature.property(property::BLOCK_SIDE).unwrap_or_default()
    )
}

fn time_range(feature: &Feature) -> String {
    format!(
        "{}-{}",
        feature.property(property::FROM_HOUR).unwrap_or_default(),
        feature.property(property::TO_HOUR).unwrap_or_default()
    )
}

pub fn cluster_by_day<'a>(
    features: impl IntoIterator<Item = &'a Feature>,
) -> BTreeMap<String, Vec<&'a Feature>> {
    cluster_by(features, |feature| {
        feature.property(property::WEEKDAY).unwrap_or_default().to_string()
    })
}

/// Cluster on the `FROMHOUR-TOHOUR` string.
pub fn cluster_by_time<'a>(
    features: impl IntoIterator<Item = &'a Feature>,
) -> BTreeMap<String, Vec<&'a Feature>> {
    cluster_by(features, time_range)
}

fn cluster_by<'a>(
    features: impl IntoIterator<Item = &'a Feature>,
    key: impl Fn(&Feature) -> String,
) -> BTreeMap<String, Vec<&'a Feature>> {
    let mut clustered: BTreeMap<String, Vec<&Feature>> = BTreeMap::new();
    for feature in features {
        clustered.entry(key(feature)).or_default().push(feature);
    }
    clustered
}

/// Human readable list of the days the features are swept on.
/// Monday to Friday and nothing else is shortened to `Weekdays`.
pub fn days_summary<'a>(features: impl IntoIterator<Item = &'a Feature>) -> String {
    let mut days: Vec<&str> = Vec::new();
    for feature in features {
        let day = feature.property(property::WEEKDAY).unwrap_or_default();
        if !days.contains(&day) {
            days.push(day);
        }
    }

    let mut weekdays: Vec<Weekday> = days.iter().filter_map(|d| Weekday::from_code(d)).collect();
    weekdays.sort_unstable();
    weekdays.dedup();
    let only_weekdays = weekdays.len() == days.len() && weekdays.iter().all(|d| !d.is_weekend());
    if only_weekdays && weekdays.len() == 5 {
        String::from("Weekdays")
    } else {
        days.join(", ")
    }
}
