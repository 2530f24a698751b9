//! Package construction.
//!
//! Turns a [`PackageRequest`] plus the current [`ActivityState`] into an
//! [`ActivityPackage`]. Pure: the timestamp comes in through
//! [`BuildContext`], so two builds with identical inputs differ only in the
//! generated package id.

use std::collections::BTreeMap;

use track_types::{
    ActivityKind, ActivityPackage, ActivityState, Environment, Event, ParamValue, Parameters,
    ValidationError,
};

/// Inputs shared by every package.
#[derive(Debug, Clone, Copy)]
pub struct BuildContext<'a> {
    /// App token identifying the host app.
    pub app_token: &'a str,
    /// Sandbox or production.
    pub environment: Environment,
    /// Creation time in milliseconds since the Unix epoch.
    pub now: u64,
}

/// What to build.
#[derive(Debug, Clone, PartialEq)]
pub enum PackageRequest {
    /// A session started.
    SessionStart,
    /// The app left the foreground.
    SessionEnd,
    /// An in-app event. The state passed to [`build`] must already count it.
    Event(Event),
    /// Ask the collector for the current attribution.
    AttributionRequest,
    /// Ask the collector to forget this install.
    GdprForgetMe,
}

impl PackageRequest {
    /// Kind of package this request produces.
    pub fn kind(&self) -> ActivityKind {
        match self {
            Self::SessionStart => ActivityKind::SessionStart,
            Self::SessionEnd => ActivityKind::SessionEnd,
            Self::Event(_) => ActivityKind::Event,
            Self::AttributionRequest => ActivityKind::AttributionRequest,
            Self::GdprForgetMe => ActivityKind::GdprForgetMe,
        }
    }
}

/// Check an app token: non-empty, ASCII alphanumeric.
pub fn validate_app_token(token: &str) -> Result<(), ValidationError> {
    if token.is_empty() || !token.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(ValidationError::MalformedAppToken(token.to_string()));
    }
    Ok(())
}

/// Build a package for `request`.
pub fn build(
    request: &PackageRequest,
    state: &ActivityState,
    ctx: &BuildContext<'_>,
) -> Result<ActivityPackage, ValidationError> {
    validate_app_token(ctx.app_token)?;

    let mut params = Parameters::new();
    put(&mut params, "app_token", ctx.app_token);
    put(&mut params, "environment", ctx.environment.as_str());
    put(&mut params, "install_id", state.install_id().to_string());
    put(&mut params, "created_at", ctx.now);

    match request {
        PackageRequest::SessionStart | PackageRequest::SessionEnd => {
            session_params(&mut params, state);
        }
        PackageRequest::Event(event) => {
            event.validate()?;
            event_params(&mut params, event, state);
        }
        PackageRequest::AttributionRequest | PackageRequest::GdprForgetMe => {}
    }

    Ok(ActivityPackage::new(request.kind(), params, ctx.now))
}

fn session_params(params: &mut Parameters, state: &ActivityState) {
    put(params, "session_count", state.session_count());
    put(params, "subsession_count", state.subsession_count());
    put(params, "session_length", state.session_length());
    put(params, "time_spent", state.time_spent());
    put(params, "last_interval", state.last_interval());
}

fn event_params(params: &mut Parameters, event: &Event, state: &ActivityState) {
    put(params, "event_token", event.token.as_str());
    put(params, "event_count", state.event_count());
    put(params, "session_count", state.session_count());

    if let Some(revenue) = &event.revenue {
        put(params, "revenue", revenue.amount);
        put(params, "currency", revenue.currency.to_ascii_uppercase());
    }
    if let Some(id) = &event.deduplication_id {
        put(params, "deduplication_id", id.as_str());
    }
    if let Some(json) = encode_map(&event.callback_params) {
        put(params, "callback_params", json);
    }
    if let Some(json) = encode_map(&event.partner_params) {
        put(params, "partner_params", json);
    }
}

/// JSON-encode a non-empty string map. Empty maps are left out.
fn encode_map(map: &BTreeMap<String, String>) -> Option<String> {
    if map.is_empty() {
        return None;
    }
    // A map of strings always serializes.
    serde_json::to_string(map).ok()
}

fn put(params: &mut Parameters, key: &str, value: impl Into<ParamValue>) {
    params.insert(key.to_string(), value.into());
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: u64 = 1_700_000_000_000;

    fn ctx() -> BuildContext<'static> {
        BuildContext {
            app_token: "app123",
            environment: Environment::Sandbox,
            now: NOW,
        }
    }

    fn session_state() -> ActivityState {
        let mut state = ActivityState::new();
        state.begin_session(NOW - 10_000, 0);
        state.accrue_foreground(NOW - 4_000);
        state
    }

    fn str_param<'a>(pkg: &'a ActivityPackage, key: &str) -> &'a str {
        match pkg.parameter(key) {
            Some(ParamValue::Str(s)) => s,
            other => panic!("{} is not a string: {:?}", key, other),
        }
    }

    #[test]
    fn every_package_has_common_parameters() {
        let state = ActivityState::new();
        for request in [
            PackageRequest::SessionStart,
            PackageRequest::SessionEnd,
            PackageRequest::Event(Event::new("abc123")),
            PackageRequest::AttributionRequest,
            PackageRequest::GdprForgetMe,
        ] {
            let pkg = build(&request, &state, &ctx()).unwrap();
            assert_eq!(pkg.kind(), request.kind());
            assert_eq!(str_param(&pkg, "app_token"), "app123");
            assert_eq!(str_param(&pkg, "environment"), "sandbox");
            assert_eq!(str_param(&pkg, "install_id"), state.install_id().to_string());
            assert_eq!(pkg.parameter("created_at"), Some(&ParamValue::Int(NOW as i64)));
            assert_eq!(pkg.created_at(), NOW);
            assert_eq!(pkg.retries(), 0);
        }
    }

    #[test]
    fn session_package_carries_counters() {
        let state = session_state();
        let pkg = build(&PackageRequest::SessionStart, &state, &ctx()).unwrap();

        assert_eq!(pkg.path(), "/session");
        assert_eq!(pkg.parameter("session_count"), Some(&ParamValue::Int(1)));
        assert_eq!(pkg.parameter("subsession_count"), Some(&ParamValue::Int(1)));
        assert_eq!(pkg.parameter("time_spent"), Some(&ParamValue::Int(6_000)));
        assert_eq!(pkg.parameter("session_length"), Some(&ParamValue::Int(6_000)));
        assert_eq!(pkg.parameter("last_interval"), Some(&ParamValue::Int(0)));
        assert!(pkg.parameter("event_token").is_none());
    }

    #[test]
    fn event_package_carries_event_fields() {
        let mut state = session_state();
        state.record_event();
        let event = Event::new("abc123")
            .with_revenue(0.99, "eur")
            .with_deduplication_id("order-7")
            .with_callback_param("user", "42")
            .with_partner_param("campaign", "spring");

        let pkg = build(&PackageRequest::Event(event), &state, &ctx()).unwrap();

        assert_eq!(pkg.path(), "/event");
        assert_eq!(str_param(&pkg, "event_token"), "abc123");
        assert_eq!(pkg.parameter("event_count"), Some(&ParamValue::Int(1)));
        assert_eq!(pkg.parameter("revenue"), Some(&ParamValue::Float(0.99)));
        assert_eq!(str_param(&pkg, "currency"), "EUR");
        assert_eq!(str_param(&pkg, "deduplication_id"), "order-7");
        assert_eq!(str_param(&pkg, "callback_params"), r#"{"user":"42"}"#);
        assert_eq!(str_param(&pkg, "partner_params"), r#"{"campaign":"spring"}"#);
    }

    #[test]
    fn plain_event_omits_optional_fields() {
        let pkg = build(
            &PackageRequest::Event(Event::new("abc123")),
            &ActivityState::new(),
            &ctx(),
        )
        .unwrap();

        for key in ["revenue", "currency", "deduplication_id", "callback_params", "partner_params"] {
            assert!(pkg.parameter(key).is_none(), "{} should be absent", key);
        }
    }

    #[test]
    fn event_without_token_is_rejected() {
        let err = build(
            &PackageRequest::Event(Event::new("")),
            &ActivityState::new(),
            &ctx(),
        )
        .unwrap_err();
        assert_eq!(err, ValidationError::MissingEventToken);
    }

    #[test]
    fn negative_revenue_is_rejected() {
        let event = Event::new("abc123").with_revenue(-1.0, "EUR");
        let err = build(&PackageRequest::Event(event), &ActivityState::new(), &ctx()).unwrap_err();
        assert_eq!(err, ValidationError::InvalidRevenue(-1.0));
    }

    #[test]
    fn revenue_without_currency_is_rejected() {
        let event = Event::new("abc123").with_revenue(1.0, "");
        let err = build(&PackageRequest::Event(event), &ActivityState::new(), &ctx()).unwrap_err();
        assert_eq!(err, ValidationError::InvalidCurrency(String::new()));
    }

    #[test]
    fn bad_app_token_is_rejected() {
        let ctx = BuildContext {
            app_token: "",
            ..ctx()
        };
        let err = build(&PackageRequest::SessionStart, &ActivityState::new(), &ctx).unwrap_err();
        assert!(matches!(err, ValidationError::MalformedAppToken(_)));
    }

    #[test]
    fn identical_inputs_build_identical_parameters() {
        let state = session_state();
        let a = build(&PackageRequest::SessionStart, &state, &ctx()).unwrap();
        let b = build(&PackageRequest::SessionStart, &state, &ctx()).unwrap();

        assert_eq!(a.parameters(), b.parameters());
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn app_token_validation() {
        assert!(validate_app_token("abc123XYZ").is_ok());
        assert!(validate_app_token("").is_err());
        assert!(validate_app_token("has space").is_err());
    }
}
