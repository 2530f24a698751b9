//! Schema for a tracked in-app event.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::ValidationError;

/// Longest accepted event token.
const MAX_TOKEN_LEN: usize = 64;

/// Revenue attached to an event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Revenue {
    /// Amount in the given currency.
    pub amount: f64,
    /// ISO 4217 currency code (e.g. "EUR").
    pub currency: String,
}

/// An in-app event to be tracked.
///
/// Built with [`Event::new`] and the `with_*` methods, then handed to the
/// tracker. Validation happens when the package is built, not here, so a
/// half-filled event can be passed around freely.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Token identifying the event on the collector side.
    pub token: String,
    /// Optional revenue.
    pub revenue: Option<Revenue>,
    /// Optional id the collector uses to drop duplicate events.
    pub deduplication_id: Option<String>,
    /// Parameters forwarded to the app's own callback endpoint.
    pub callback_params: BTreeMap<String, String>,
    /// Parameters forwarded to ad network partners.
    pub partner_params: BTreeMap<String, String>,
}

impl Event {
    /// Create an event with the given token.
    pub fn new(token: &str) -> Self {
        Self {
            token: token.to_string(),
            ..Self::default()
        }
    }

    /// Attach revenue.
    pub fn with_revenue(mut self, amount: f64, currency: &str) -> Self {
        self.revenue = Some(Revenue {
            amount,
            currency: currency.to_string(),
        });
        self
    }

    /// Attach a deduplication id.
    pub fn with_deduplication_id(mut self, id: &str) -> Self {
        self.deduplication_id = Some(id.to_string());
        self
    }

    /// Add a callback parameter. A repeated key overwrites the earlier value.
    pub fn with_callback_param(mut self, key: &str, value: &str) -> Self {
        self.callback_params
            .insert(key.to_string(), value.to_string());
        self
    }

    /// Add a partner parameter. A repeated key overwrites the earlier value.
    pub fn with_partner_param(mut self, key: &str, value: &str) -> Self {
        self.partner_params
            .insert(key.to_string(), value.to_string());
        self
    }

    /// Check the event against the package schema.
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_event_token(&self.token)?;

        if let Some(revenue) = &self.revenue {
            if !revenue.amount.is_finite() || revenue.amount < 0.0 {
                return Err(ValidationError::InvalidRevenue(revenue.amount));
            }
            let currency = &revenue.currency;
            if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_alphabetic()) {
                return Err(ValidationError::InvalidCurrency(currency.clone()));
            }
        }

        if self.callback_params.keys().any(|k| k.is_empty()) {
            return Err(ValidationError::EmptyParameterKey {
                section: "callback",
            });
        }
        if self.partner_params.keys().any(|k| k.is_empty()) {
            return Err(ValidationError::EmptyParameterKey { section: "partner" });
        }

        Ok(())
    }
}

/// Check that an event token is present and well-formed.
pub(crate) fn validate_event_token(token: &str) -> Result<(), ValidationError> {
    if token.is_empty() {
        return Err(ValidationError::MissingEventToken);
    }
    if token.len() > MAX_TOKEN_LEN || !token.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(ValidationError::MalformedEventToken(token.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_event_is_valid() {
        assert!(Event::new("abc123").validate().is_ok());
    }

    #[test]
    fn empty_token_is_missing() {
        let err = Event::new("").validate().unwrap_err();
        assert_eq!(err, ValidationError::MissingEventToken);
    }

    #[test]
    fn token_with_symbols_is_malformed() {
        let err = Event::new("abc 12!").validate().unwrap_err();
        assert!(matches!(err, ValidationError::MalformedEventToken(_)));
    }

    #[test]
    fn overlong_token_is_malformed() {
        let token = "a".repeat(MAX_TOKEN_LEN + 1);
        let err = Event::new(&token).validate().unwrap_err();
        assert!(matches!(err, ValidationError::MalformedEventToken(_)));
    }

    #[test]
    fn negative_revenue_rejected() {
        let err = Event::new("abc123")
            .with_revenue(-1.0, "EUR")
            .validate()
            .unwrap_err();
        assert!(matches!(err, ValidationError::InvalidRevenue(_)));
    }

    #[test]
    fn nan_revenue_rejected() {
        let err = Event::new("abc123")
            .with_revenue(f64::NAN, "EUR")
            .validate()
            .unwrap_err();
        assert!(matches!(err, ValidationError::InvalidRevenue(_)));
    }

    #[test]
    fn revenue_requires_currency_code() {
        let err = Event::new("abc123")
            .with_revenue(1.5, "")
            .validate()
            .unwrap_err();
        assert!(matches!(err, ValidationError::InvalidCurrency(_)));

        assert!(Event::new("abc123")
            .with_revenue(1.5, "USD")
            .validate()
            .is_ok());
    }

    #[test]
    fn empty_parameter_keys_rejected() {
        let err = Event::new("abc123")
            .with_callback_param("", "x")
            .validate()
            .unwrap_err();
        assert_eq!(
            err,
            ValidationError::EmptyParameterKey {
                section: "callback"
            }
        );

        let err = Event::new("abc123")
            .with_partner_param("", "x")
            .validate()
            .unwrap_err();
        assert_eq!(
            err,
            ValidationError::EmptyParameterKey { section: "partner" }
        );
    }

    #[test]
    fn repeated_param_key_overwrites() {
        let event = Event::new("abc123")
            .with_callback_param("k", "1")
            .with_callback_param("k", "2");
        assert_eq!(event.callback_params.len(), 1);
        assert_eq!(event.callback_params["k"], "2");
    }
}
