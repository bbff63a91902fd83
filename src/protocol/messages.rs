use serde::{Deserialize, Serialize};
use serde_json::Value;

/// JSON body of EVENT and ACK frames: a named remote call with ordered,
/// opaque arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventPayload {
    pub name: String,
    pub args: Vec<Value>,
}

/// First argument of the `joinProjectResponse` confirmation.
///
/// The nested project metadata tree is a static schema this crate does not
/// model; it is carried opaquely so callers can still inspect it.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinProjectArgs {
    pub public_id: String,
    pub project: Value,
    pub permissions_level: String,
    pub protocol_version: i64,
}

/// Body of an ERROR frame: `reason` and `advice` joined by the first '+'.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorPayload {
    pub reason: String,
    pub advice: String,
}

impl ErrorPayload {
    pub(crate) fn from_wire(payload: &str) -> Self {
        let (reason, advice) = payload.split_once('+').unwrap_or((payload, ""));
        ErrorPayload {
            reason: reason.to_string(),
            advice: advice.to_string(),
        }
    }
}
