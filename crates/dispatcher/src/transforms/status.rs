//! StatusReducer - strips status objects down to the fields the destination reads

use bytes::Bytes;
use contracts::ItemTransform;
use serde_json::{Map, Value};
use tracing::{debug, warn};

const RELEVANT_KEYS: [&str; 6] = [
    "id",
    "in_reply_to_status_id",
    "in_reply_to_user_id",
    "retweeted_status",
    "text",
    "user",
];

/// Keeps statuses (reduced), deletion and limit notices (verbatim).
/// Everything else is dropped.
#[derive(Debug, Clone, Copy, Default)]
pub struct StatusReducer;

impl StatusReducer {
    fn reduce(status: &Map<String, Value>) -> Value {
        let reduced = RELEVANT_KEYS
            .iter()
            .map(|key| {
                let value = status.get(*key).cloned().unwrap_or(Value::Null);
                let value = match *key {
                    "retweeted_status" => pick(value, &["id"]),
                    "user" => pick(value, &["id", "screen_name"]),
                    _ => value,
                };
                (key.to_string(), value)
            })
            .collect();
        Value::Object(reduced)
    }
}

/// Project an object onto `fields`; non-objects pass through
fn pick(value: Value, fields: &[&str]) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            fields
                .iter()
                .filter_map(|field| map.get(*field).map(|v| (field.to_string(), v.clone())))
                .collect(),
        ),
        other => other,
    }
}

impl ItemTransform for StatusReducer {
    fn name(&self) -> &str {
        "status"
    }

    fn transform(&self, item: &[u8]) -> Option<Bytes> {
        let value: Value = match serde_json::from_slice(item) {
            Ok(value) => value,
            Err(e) => {
                warn!(error = %e, "item is not valid JSON, dropped");
                return None;
            }
        };
        let Some(object) = value.as_object() else {
            warn!("item is not a JSON object, dropped");
            return None;
        };

        if object.contains_key("in_reply_to_status_id") {
            serde_json::to_vec(&Self::reduce(object))
                .ok()
                .map(Bytes::from)
        } else if object.contains_key("delete") || object.contains_key("limit") {
            Some(Bytes::copy_from_slice(item))
        } else {
            debug!("unrecognised item dropped");
            None
        }
    }
}
