//! Error types for tally-track input validation.

use thiserror::Error;

/// Input rejected before anything is queued.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    /// An event was built without an event token.
    #[error("missing event token")]
    MissingEventToken,

    /// The event token has the wrong shape.
    #[error("malformed event token: {0:?}")]
    MalformedEventToken(String),

    /// The app token is empty or has the wrong shape.
    #[error("malformed app token: {0:?}")]
    MalformedAppToken(String),

    /// Revenue is negative or not a finite number.
    #[error("invalid revenue amount: {0}")]
    InvalidRevenue(f64),

    /// Revenue currency is empty or not a three-letter code.
    #[error("invalid currency: {0:?}")]
    InvalidCurrency(String),

    /// A callback or partner parameter has an empty key.
    #[error("empty {section} parameter key")]
    EmptyParameterKey {
        /// Which parameter set the key belongs to.
        section: &'static str,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = ValidationError::MissingEventToken;
        assert_eq!(err.to_string(), "missing event token");

        let err = ValidationError::EmptyParameterKey { section: "callback" };
        assert_eq!(err.to_string(), "empty callback parameter key");
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<ValidationError>();
    }
}
