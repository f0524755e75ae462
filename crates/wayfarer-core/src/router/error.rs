use thiserror::Error;

#[derive(Error, Debug)]
pub enum RouteError {
    #[error("Invalid JSON in {event} event: {source}")]
    InvalidJson {
        event: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid {event} payload: {reason}")]
    InvalidPayload { event: String, reason: String },
}

impl RouteError {
    pub fn invalid_json(event: &str, source: serde_json::Error) -> Self {
        RouteError::InvalidJson {
            event: event.to_string(),
            source,
        }
    }

    pub fn invalid_payload(event: &str, reason: impl Into<String>) -> Self {
        RouteError::InvalidPayload {
            event: event.to_string(),
            reason: reason.into(),
        }
    }
}
