use crate::error::{ObsError, ObsResult};
use serde::Serialize;
use serde_json::{Map, Value};

/// Untyped, string-keyed message body as it appears on the wire.
pub type Record = Map<String, Value>;

pub const FIELD_REQUEST_TYPE: &str = "request-type";
pub const FIELD_MESSAGE_ID: &str = "message-id";
pub const FIELD_STATUS: &str = "status";
pub const FIELD_ERROR: &str = "error";
pub const FIELD_UPDATE_TYPE: &str = "update-type";

#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub message_id: String,
    pub request_type: String,
    pub params: Record,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplyStatus {
    Ok,
    Error,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub message_id: String,
    pub status: ReplyStatus,
    pub error: Option<String>,
    /// Every field except `message-id`, `status` and `error`.
    pub payload: Record,
}

impl Reply {
    pub fn from_record(mut record: Record) -> ObsResult<Self> {
        let message_id = match record.remove(FIELD_MESSAGE_ID) {
            Some(Value::String(id)) => id,
            Some(other) => {
                return Err(ObsError::MalformedMessage(format!(
                    "message-id must be a string, got {other}"
                )))
            }
            None => return Err(ObsError::MalformedMessage("missing message-id".to_string())),
        };
        let status = match record.remove(FIELD_STATUS) {
            Some(Value::String(s)) if s == "ok" => ReplyStatus::Ok,
            Some(Value::String(s)) if s == "error" => ReplyStatus::Error,
            Some(other) => {
                return Err(ObsError::MalformedMessage(format!(
                    "reply {message_id} has invalid status {other}"
                )))
            }
            None => {
                return Err(ObsError::MalformedMessage(format!(
                    "reply {message_id} is missing status"
                )))
            }
        };
        let error = match record.remove(FIELD_ERROR) {
            Some(Value::String(msg)) => Some(msg),
            Some(Value::Null) | None => None,
            Some(other) => Some(other.to_string()),
        };
        Ok(Self {
            message_id,
            status,
            error,
            payload: record,
        })
    }

    pub fn is_ok(&self) -> bool {
        self.status == ReplyStatus::Ok
    }

    /// Converts an error reply into `ObsError::Protocol`.
    pub fn into_result(self, request_type: &str) -> ObsResult<Self> {
        match self.status {
            ReplyStatus::Ok => Ok(self),
            ReplyStatus::Error => Err(ObsError::Protocol {
                request_type: request_type.to_string(),
                message: self
                    .error
                    .unwrap_or_else(|| "unspecified error".to_string()),
            }),
        }
    }

    fn required_str(&self, key: &str) -> ObsResult<String> {
        match self.payload.get(key) {
            Some(Value::String(s)) => Ok(s.clone()),
            Some(other) => Err(ObsError::MalformedMessage(format!(
                "field {key} must be a string, got {other}"
            ))),
            None => Err(ObsError::MalformedMessage(format!(
                "reply {} is missing field {key}",
                self.message_id
            ))),
        }
    }

    fn optional_str(&self, key: &str) -> ObsResult<Option<String>> {
        match self.payload.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(_) => self.required_str(key).map(Some),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub event_type: String,
    /// Every field except `update-type`.
    pub payload: Record,
}

impl Event {
    pub fn from_record(mut record: Record) -> Option<Self> {
        match record.remove(FIELD_UPDATE_TYPE) {
            Some(Value::String(event_type)) => Some(Self {
                event_type,
                payload: record,
            }),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AuthChallenge {
    pub auth_required: bool,
    pub challenge: String,
    pub salt: String,
}

impl AuthChallenge {
    pub fn from_reply(reply: &Reply) -> ObsResult<Self> {
        let auth_required = match reply.payload.get("authRequired") {
            Some(Value::Bool(b)) => *b,
            Some(other) => {
                return Err(ObsError::MalformedMessage(format!(
                    "authRequired must be a bool, got {other}"
                )))
            }
            None => {
                return Err(ObsError::MalformedMessage(
                    "auth-info reply is missing authRequired".to_string(),
                ))
            }
        };
        if !auth_required {
            return Ok(Self::default());
        }
        Ok(Self {
            auth_required,
            challenge: reply.required_str("challenge")?,
            salt: reply.required_str("salt")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VersionInfo {
    pub obs_studio_version: String,
    pub obs_websocket_version: String,
    pub supported_image_export_formats: Vec<String>,
}

impl VersionInfo {
    pub fn from_reply(reply: &Reply) -> ObsResult<Self> {
        let formats = reply
            .optional_str("supported-image-export-formats")?
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        Ok(Self {
            obs_studio_version: reply.required_str("obs-studio-version")?,
            obs_websocket_version: reply.required_str("obs-websocket-version")?,
            supported_image_export_formats: formats,
        })
    }
}
