//! Douyin open platform integration.
//!
//! Two clients over the platform's REST surface:
//!
//! - [`AuthFlow`] — authorization URL building, code-for-token exchange,
//!   token refresh
//! - [`MetricsClient`] — the per-metric data endpoints, the user profile
//!   endpoint and the video list
//!
//! The platform signals failure with an embedded error code, not the HTTP
//! status: a 200 response with a non-zero code is still a failure. The code
//! sits in different places per endpoint family (`error_code` nested under
//! `data` for the OAuth endpoints, top-level `err_no` for the data
//! endpoints, `extra.error_code` for the video list); [`unwrap_envelope`]
//! normalizes all three.

pub mod auth;
pub mod metrics;

pub use auth::AuthFlow;
pub use metrics::{Metric, MetricsClient, MetricsReport};

use serde_json::Value;

use crate::error::{Error, Result, UpstreamKind};

/// Classify a provider error code.
///
/// Known codes map to a cause and a readable message; anything else falls
/// through with no message so the response's own description wins. The
/// classification only improves diagnostics — callers decide what to do.
pub(crate) fn classify_error_code(code: i64) -> (UpstreamKind, Option<&'static str>) {
    match code {
        20028001003 => (
            UpstreamKind::TokenInvalid,
            Some("access token is invalid, re-authorization required"),
        ),
        20028001008 => (
            UpstreamKind::TokenExpired,
            Some("access token has expired, refresh or re-authorize"),
        ),
        20028001005 => (UpstreamKind::Other, Some("platform internal error, retry later")),
        20028001006 => (UpstreamKind::Other, Some("platform network error, retry later")),
        20028001007 => (UpstreamKind::Other, Some("invalid request parameters")),
        20028001014 => (
            UpstreamKind::CapabilityMissing,
            Some("application has not been granted any capability"),
        ),
        20028001018 => (
            UpstreamKind::CapabilityMissing,
            Some("application lacks this capability"),
        ),
        20028003017 => (
            UpstreamKind::QuotaExhausted,
            Some("api quota is used up, contact the platform"),
        ),
        20028001019 => (
            UpstreamKind::AppBanned,
            Some("this capability is banned for the application"),
        ),
        20028001016 => (
            UpstreamKind::AppBanned,
            Some("application is banned or offline"),
        ),
        _ => (UpstreamKind::Other, None),
    }
}

fn embedded_code(value: &Value) -> Option<i64> {
    value
        .get("err_no")
        .and_then(Value::as_i64)
        .or_else(|| value.get("error_code").and_then(Value::as_i64))
}

fn embedded_message(value: &Value) -> Option<String> {
    for key in ["description", "err_msg", "message"] {
        if let Some(msg) = value.get(key).and_then(Value::as_str) {
            if !msg.is_empty() && msg != "success" {
                return Some(msg.to_string());
            }
        }
    }
    None
}

/// Reduce a raw response body to its `data` payload, or a typed upstream
/// error when the embedded code is non-zero (or absent entirely).
pub(crate) fn unwrap_envelope(body: Value) -> Result<Value> {
    let data = body.get("data").cloned();
    let extra = body.get("extra").cloned();

    let code = embedded_code(&body)
        .or_else(|| data.as_ref().and_then(embedded_code))
        .or_else(|| extra.as_ref().and_then(embedded_code));

    match code {
        Some(0) => Ok(data.unwrap_or(body)),
        Some(code) => {
            let (kind, table_message) = classify_error_code(code);
            let message = data
                .as_ref()
                .and_then(embedded_message)
                .or_else(|| embedded_message(&body))
                .or_else(|| table_message.map(str::to_string))
                .unwrap_or_else(|| format!("douyin api request failed (code {})", code));
            Err(Error::upstream(kind, message))
        }
        None => Err(Error::upstream(
            UpstreamKind::Other,
            "douyin api response carried no embedded error code",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_unwrap_top_level_err_no() {
        let body = json!({"err_no": 0, "err_msg": "", "data": {"fans_count": 12}});
        let data = unwrap_envelope(body).unwrap();
        assert_eq!(data["fans_count"], 12);
    }

    #[test]
    fn test_unwrap_nested_error_code() {
        let body = json!({"data": {"error_code": 0, "access_token": "at"}, "message": "success"});
        let data = unwrap_envelope(body).unwrap();
        assert_eq!(data["access_token"], "at");
    }

    #[test]
    fn test_unwrap_extra_error_code() {
        let body = json!({"extra": {"error_code": 0}, "data": {"list": []}});
        let data = unwrap_envelope(body).unwrap();
        assert!(data["list"].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_http_200_with_nonzero_code_is_failure() {
        let body = json!({
            "data": {"error_code": 10008, "description": "bad authorization code"}
        });
        let err = unwrap_envelope(body).unwrap_err();
        assert_eq!(err.to_string(), "bad authorization code");
    }

    #[test]
    fn test_known_code_maps_to_kind_and_cause() {
        let body = json!({"err_no": 20028001008i64, "err_msg": "", "data": null});
        let err = unwrap_envelope(body).unwrap_err();
        assert!(err.is_token_problem());
        assert!(err.to_string().contains("expired"));

        let body = json!({"err_no": 20028003017i64, "data": null});
        match unwrap_envelope(body).unwrap_err() {
            Error::Upstream { kind, .. } => assert_eq!(kind, UpstreamKind::QuotaExhausted),
            other => panic!("expected Upstream, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_code_keeps_provider_message() {
        let body = json!({"err_no": 99999, "err_msg": "mystery failure"});
        let err = unwrap_envelope(body).unwrap_err();
        assert_eq!(err.to_string(), "mystery failure");
    }

    #[test]
    fn test_unknown_code_without_message_gets_generic_text() {
        let body = json!({"err_no": 99999});
        let err = unwrap_envelope(body).unwrap_err();
        assert_eq!(err.to_string(), "douyin api request failed (code 99999)");
    }

    #[test]
    fn test_missing_code_is_failure() {
        let body = json!({"data": {"fans_count": 3}});
        assert!(unwrap_envelope(body).is_err());
    }
}
