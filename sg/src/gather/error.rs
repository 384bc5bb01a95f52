//! Gatherer error types

use thiserror::Error;

/// Errors that can occur while correlating a reply
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatherError {
    #[error("Reply {message_id} carries no correlation key")]
    MissingCorrelation { message_id: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_correlation_message() {
        let err = GatherError::MissingCorrelation {
            message_id: "msg-1".to_string(),
        };
        assert!(err.to_string().contains("msg-1"));
    }
}
