//! Inbound message dispatch
//!
//! Classifies one `(topic, payload)` pair and hands it to the right handler. Dispatch
//! is synchronous and performs no I/O.

use super::callbacks::CallbackRegistry;
use super::session::Session;
use crate::error::{ClientError, ClientResult};
use crate::protocol::{parse_inbound, GroupPayload, Inbound};
use tracing::{debug, warn};

/// What a single inbound message turns into
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// One feed value; per-feed override first, then the general handler
    Feed { feed_key: String, payload: String },
    /// One general handler call per `(feed, value)`, in payload order
    Fanout { values: Vec<(String, String)> },
    /// Server time; the unit is the channel
    Time { unit: String, payload: String },
    /// Throttle notice; no handler runs
    RateLimited { message: String },
}

/// Decide how an inbound message is delivered (pure function)
pub fn plan_delivery(topic: &str, payload: &[u8]) -> ClientResult<Delivery> {
    Ok(match parse_inbound(topic) {
        Inbound::GroupMessage { .. } => {
            let group = GroupPayload::decode(payload).map_err(|source| ClientError::GroupPayload {
                topic: topic.to_string(),
                source,
            })?;
            Delivery::Fanout {
                values: group.into_values(),
            }
        }
        Inbound::ThrottleNotice => Delivery::RateLimited {
            message: payload_text(payload),
        },
        Inbound::TimeNotice { unit } => Delivery::Time {
            unit,
            payload: payload_text(payload),
        },
        Inbound::FeedMessage { feed_key } => Delivery::Feed {
            feed_key,
            payload: payload_text(payload),
        },
    })
}

/// Dispatch one inbound message to the registered handlers
pub fn dispatch(
    callbacks: &mut CallbackRegistry,
    session: &mut Session,
    topic: &str,
    payload: &[u8],
) -> ClientResult<()> {
    let _span = crate::dispatch_span!(topic = %topic).entered();

    match plan_delivery(topic, payload)? {
        Delivery::Feed { feed_key, payload } => {
            debug!(topic = %topic, feed_key = %feed_key, "Dispatching feed message");
            callbacks.deliver_feed(session, &feed_key, &payload)
        }
        Delivery::Fanout { values } => {
            debug!(topic = %topic, feeds = values.len(), "Dispatching group message");
            for (feed, value) in &values {
                callbacks.deliver(session, feed, value)?;
            }
            Ok(())
        }
        Delivery::Time { unit, payload } => callbacks.deliver(session, &unit, &payload),
        Delivery::RateLimited { message } => {
            warn!(topic = %topic, "Throttle notice received: {}", message);
            Err(ClientError::RateLimitExceeded(message))
        }
    }
}

/// Payloads are text; invalid UTF-8 is replaced rather than rejected
fn payload_text(payload: &[u8]) -> String {
    String::from_utf8_lossy(payload).into_owned()
}
