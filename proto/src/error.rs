use thiserror::Error;

/// Reasons a push frame failed schema validation
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("payload is not valid JSON: {0}")]
    InvalidJson(serde_json::Error),
    #[error("payload is not a JSON object")]
    NotAnObject,
    #[error("unknown message type `{0}`")]
    UnknownType(String),
    #[error("message does not match the {kind} schema: {source}")]
    Schema { kind: &'static str, source: serde_json::Error },
    #[error("invalid id: {0}")]
    InvalidId(String),
}
