use crate::error::{ObsError, ObsResult};
use crate::model::{Record, Request, FIELD_MESSAGE_ID, FIELD_REQUEST_TYPE, FIELD_UPDATE_TYPE};
use serde_json::Value;

/// Decoded inbound record, split by its discriminator field.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// Carries a `message-id`; answers one of our requests.
    Reply { message_id: String, record: Record },
    /// Carries an `update-type` and no `message-id`.
    Event(Record),
    Unrecognized(Record),
}

pub fn encode(request: &Request) -> ObsResult<String> {
    let mut body = Record::with_capacity(request.params.len() + 2);
    for (key, value) in &request.params {
        if key == FIELD_REQUEST_TYPE || key == FIELD_MESSAGE_ID {
            tracing::debug!(key = %key, "ignoring reserved request parameter");
            continue;
        }
        body.insert(key.clone(), value.clone());
    }
    body.insert(
        FIELD_REQUEST_TYPE.to_string(),
        Value::String(request.request_type.clone()),
    );
    body.insert(
        FIELD_MESSAGE_ID.to_string(),
        Value::String(request.message_id.clone()),
    );
    encode_record(&body)
}

pub fn encode_record(record: &Record) -> ObsResult<String> {
    Ok(serde_json::to_string(record)?)
}

pub fn decode(text: &str) -> ObsResult<Record> {
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(record)) => Ok(record),
        Ok(other) => Err(ObsError::MalformedMessage(format!(
            "expected a JSON object, got {}",
            json_kind(&other)
        ))),
        Err(err) => Err(ObsError::MalformedMessage(err.to_string())),
    }
}

pub fn classify(record: Record) -> Inbound {
    if let Some(Value::String(id)) = record.get(FIELD_MESSAGE_ID) {
        let message_id = id.clone();
        return Inbound::Reply { message_id, record };
    }
    if matches!(record.get(FIELD_UPDATE_TYPE), Some(Value::String(_))) {
        return Inbound::Event(record);
    }
    Inbound::Unrecognized(record)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
