//! Outbound topic and payload planning
//!
//! Pure functions that turn publish options and subscription targets into the exact
//! topic and payload handed to the transport. Validation happens here, so nothing
//! malformed ever reaches the network.

use crate::error::{ClientError, ClientResult};
use crate::protocol::{
    format_csv_payload, validate_feed_key, TopicBuilder, RETAINED_REQUEST_PAYLOAD,
};
use std::fmt::Display;

/// A topic and payload ready for the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub topic: String,
    pub payload: String,
}

/// Options for a single publish
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishOptions {
    pub feed_key: String,
    /// Stringified value
    pub value: String,
    /// `lat,lon,ele` location metadata; sends a CSV publish to the feed's `/csv` topic
    pub metadata: Option<String>,
    /// Publish to another account's feed
    pub shared_owner: Option<String>,
    /// Treat `feed_key` as a group key
    pub group: bool,
}

impl PublishOptions {
    pub fn new(feed_key: impl Into<String>, value: impl Display) -> Self {
        Self {
            feed_key: feed_key.into(),
            value: value.to_string(),
            metadata: None,
            shared_owner: None,
            group: false,
        }
    }

    pub fn metadata(mut self, metadata: impl Into<String>) -> Self {
        self.metadata = Some(metadata.into());
        self
    }

    pub fn shared_owner(mut self, owner: impl Into<String>) -> Self {
        self.shared_owner = Some(owner.into());
        self
    }

    pub fn group(mut self) -> Self {
        self.group = true;
        self
    }
}

/// Subscription target: a feed, a group, or another account's feed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Target {
    pub feed_key: Option<String>,
    pub group_key: Option<String>,
    pub shared_owner: Option<String>,
}

impl Target {
    pub fn feed(feed_key: impl Into<String>) -> Self {
        Self {
            feed_key: Some(feed_key.into()),
            ..Self::default()
        }
    }

    pub fn group(group_key: impl Into<String>) -> Self {
        Self {
            group_key: Some(group_key.into()),
            ..Self::default()
        }
    }

    pub fn shared_feed(owner: impl Into<String>, feed_key: impl Into<String>) -> Self {
        Self {
            feed_key: Some(feed_key.into()),
            shared_owner: Some(owner.into()),
            ..Self::default()
        }
    }

    /// Resolve to a topic.
    ///
    /// A shared owner with a feed key wins, then a group key, then a plain feed key.
    pub fn resolve(&self, owner: &str) -> ClientResult<String> {
        match (&self.shared_owner, &self.group_key, &self.feed_key) {
            (Some(shared), _, Some(feed_key)) => {
                validate_owner(shared)?;
                validate_feed_key(feed_key)?;
                Ok(TopicBuilder::feed(shared, feed_key))
            }
            (_, Some(group_key), _) => {
                validate_feed_key(group_key)?;
                Ok(TopicBuilder::group(owner, group_key))
            }
            (_, None, Some(feed_key)) => {
                validate_feed_key(feed_key)?;
                Ok(TopicBuilder::feed(owner, feed_key))
            }
            (_, None, None) => Err(ClientError::configuration(
                "Must provide a feed_key or group_key",
            )),
        }
    }
}

/// Plan a single publish.
///
/// `group` cannot be combined with `shared_owner` or `metadata`; every plan has
/// exactly one destination.
pub fn plan_publish(owner: &str, options: &PublishOptions) -> ClientResult<OutboundMessage> {
    validate_feed_key(&options.feed_key)?;

    if options.group {
        if options.shared_owner.is_some() || options.metadata.is_some() {
            return Err(ClientError::configuration(
                "A group publish cannot be combined with shared_owner or metadata",
            ));
        }
        return Ok(OutboundMessage {
            topic: TopicBuilder::group(owner, &options.feed_key),
            payload: options.value.clone(),
        });
    }

    let feed_owner = match &options.shared_owner {
        Some(shared) => {
            validate_owner(shared)?;
            shared.as_str()
        }
        None => owner,
    };

    Ok(match &options.metadata {
        Some(metadata) => OutboundMessage {
            topic: TopicBuilder::feed_csv(feed_owner, &options.feed_key),
            payload: format_csv_payload(&options.value, metadata),
        },
        None => OutboundMessage {
            topic: TopicBuilder::feed(feed_owner, &options.feed_key),
            payload: options.value.clone(),
        },
    })
}

/// Plan a request for the feed's retained value
pub fn plan_retained_request(owner: &str, feed_key: &str) -> ClientResult<OutboundMessage> {
    validate_feed_key(feed_key)?;
    Ok(OutboundMessage {
        topic: TopicBuilder::feed_get(owner, feed_key),
        payload: RETAINED_REQUEST_PAYLOAD.to_string(),
    })
}

fn validate_owner(owner: &str) -> ClientResult<()> {
    if owner.is_empty() || owner.contains(['/', '+', '#']) {
        return Err(ClientError::configuration(format!(
            "Shared owner '{owner}' must be a single topic segment"
        )));
    }
    Ok(())
}
