//! Topic grammar and feed key validation for the telemetry service
//!
//! Every address on the messaging channel is a `/`-separated topic of the form
//! `{owner}/{resource-type}/{resource-key}[/{sub-channel}]`. This module builds those
//! topics and classifies inbound ones. Nothing here performs I/O.

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

/// Longest feed key the service accepts
pub const MAX_FEED_KEY_LEN: usize = 128;

static FEED_KEY_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9-]+((/|\.)[A-Za-z0-9-]+)?$").expect("feed key pattern is valid")
});

/// Feed key validation failures, raised before anything reaches the network
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FeedKeyError {
    /// Value error: the key is longer than [`MAX_FEED_KEY_LEN`]
    #[error("Feed key must be at most {MAX_FEED_KEY_LEN} characters, got {len}")]
    TooLong { len: usize },
    /// Format error: the key does not follow the naming scheme
    #[error(
        "Feed key '{key}' must contain English letters, numbers, dash, and at most one period or forward slash"
    )]
    Malformed { key: String },
}

/// Validate a feed (or group) key against the service naming rules.
pub fn validate_feed_key(feed_key: &str) -> Result<(), FeedKeyError> {
    if feed_key.len() > MAX_FEED_KEY_LEN {
        return Err(FeedKeyError::TooLong {
            len: feed_key.len(),
        });
    }

    if !FEED_KEY_PATTERN.is_match(feed_key) {
        return Err(FeedKeyError::Malformed {
            key: feed_key.to_string(),
        });
    }

    Ok(())
}

/// Server time topic units
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeUnit {
    Seconds,
    Millis,
    Iso,
}

impl TimeUnit {
    /// Parse a unit name (`seconds`, `millis` or `iso`)
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "seconds" => Some(TimeUnit::Seconds),
            "millis" => Some(TimeUnit::Millis),
            "iso" => Some(TimeUnit::Iso),
            _ => None,
        }
    }

    /// Topic segment used by the service for this unit
    pub fn segment(&self) -> &'static str {
        match self {
            TimeUnit::Seconds => "seconds",
            TimeUnit::Millis => "millis",
            TimeUnit::Iso => "ISO-8601",
        }
    }
}

/// Account-level notification topics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemTopic {
    Throttle,
    Errors,
}

/// Topic construction for a single owner namespace
pub struct TopicBuilder;

impl TopicBuilder {
    /// Build feed topic: `{owner}/feeds/{key}`
    pub fn feed(owner: &str, key: &str) -> String {
        format!("{owner}/feeds/{key}")
    }

    /// Build CSV feed topic: `{owner}/feeds/{key}/csv`
    pub fn feed_csv(owner: &str, key: &str) -> String {
        format!("{owner}/feeds/{key}/csv")
    }

    /// Build retained value request topic: `{owner}/feeds/{key}/get`
    pub fn feed_get(owner: &str, key: &str) -> String {
        format!("{owner}/feeds/{key}/get")
    }

    /// Build group topic: `{owner}/groups/{key}`
    pub fn group(owner: &str, key: &str) -> String {
        format!("{owner}/groups/{key}")
    }

    /// Build `{owner}/throttle` or `{owner}/errors`
    pub fn system(owner: &str, kind: SystemTopic) -> String {
        match kind {
            SystemTopic::Throttle => format!("{owner}/throttle"),
            SystemTopic::Errors => format!("{owner}/errors"),
        }
    }

    /// Build words integration topic: `{owner}/integration/words/{id}`
    pub fn words(owner: &str, id: u32) -> String {
        format!("{owner}/integration/words/{id}")
    }

    /// Build weather integration topic: `{owner}/integration/weather/{record}/{forecast}`
    pub fn weather(owner: &str, record: u32, forecast: &str) -> String {
        format!("{owner}/integration/weather/{record}/{forecast}")
    }

    /// Build server time topic: `time/{seconds|millis|ISO-8601}`
    pub fn time(unit: TimeUnit) -> String {
        format!("time/{}", unit.segment())
    }
}

/// Classification of an inbound topic
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// Group fan-out message; payload is `{"feeds": {name: value, ...}}`
    GroupMessage { group_key: String },
    /// Rate limit notice for the account
    ThrottleNotice,
    /// Server time notice; `unit` is the topic's second segment
    TimeNotice { unit: String },
    /// Ordinary message for a single channel
    FeedMessage { feed_key: String },
}

/// Classify an inbound topic.
///
/// Rules apply in order: `groups` in segment 1, `throttle` in segment 1, `time` in
/// segment 0, and anything else is a feed message.
pub fn parse_inbound(topic: &str) -> Inbound {
    let segments: Vec<&str> = topic.split('/').collect();
    let second = segments.get(1).copied().unwrap_or_default();

    if second == "groups" {
        return Inbound::GroupMessage {
            group_key: segments.get(2).copied().unwrap_or_default().to_string(),
        };
    }

    if second == "throttle" {
        return Inbound::ThrottleNotice;
    }

    if segments[0] == "time" {
        return Inbound::TimeNotice {
            unit: second.to_string(),
        };
    }

    let feed_key = if second == "feeds" && segments.len() > 2 {
        // Keys may carry one `/`, so keep everything after the resource type
        topic.splitn(3, '/').nth(2).unwrap_or_default()
    } else if let Some(key) = segments.get(2) {
        key
    } else {
        segments.last().copied().unwrap_or_default()
    };

    Inbound::FeedMessage {
        feed_key: feed_key.to_string(),
    }
}
