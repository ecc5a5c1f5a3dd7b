//! Mapping from transport and endpoint failures to the canonical error
//! classes the router acts on.
//!
//! Status codes decide the class: 429 is rate-limit, 401/403 is auth,
//! other 4xx is an invalid request, 5xx and transport failures are
//! transient. The provider tag travels with every error.

use crate::clients::resilient::ProviderErrorBody;
use aide_types::prelude::{ProviderError, ProviderErrorKind};
use async_openai::error::OpenAIError;

const MAX_ERROR_MESSAGE_LEN: usize = 256;

pub fn truncate_error_msg(msg: &str) -> String {
    if msg.len() > MAX_ERROR_MESSAGE_LEN {
        let mut end = MAX_ERROR_MESSAGE_LEN;
        while !msg.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &msg[..end])
    } else {
        msg.to_string()
    }
}

pub fn classify_status(status: u16) -> ProviderErrorKind {
    match status {
        429 => ProviderErrorKind::RateLimited,
        401 | 403 => ProviderErrorKind::Auth,
        400..=499 => ProviderErrorKind::Invalid,
        _ => ProviderErrorKind::Transient,
    }
}

pub fn map_openai_error(provider: &str, error: OpenAIError) -> ProviderError {
    match error {
        OpenAIError::ApiError(api_error) => {
            let kind = match api_error.code.as_deref() {
                Some("429") | Some("rate_limit_exceeded") => ProviderErrorKind::RateLimited,
                Some("401") | Some("403") | Some("invalid_api_key")
                | Some("account_deactivated") => ProviderErrorKind::Auth,
                Some(code) if code.starts_with('5') => ProviderErrorKind::Transient,
                Some("server_error") | Some("service_unavailable") => ProviderErrorKind::Transient,
                _ => {
                    let message = api_error.message.to_lowercase();
                    if message.contains("rate limit") {
                        ProviderErrorKind::RateLimited
                    } else if message.contains("invalid api key")
                        || message.contains("unauthorized")
                    {
                        ProviderErrorKind::Auth
                    } else {
                        ProviderErrorKind::Invalid
                    }
                }
            };
            ProviderError::new(provider, kind, truncate_error_msg(&api_error.message))
        }
        OpenAIError::Reqwest(reqwest_error) => {
            let kind = if reqwest_error.is_timeout() {
                ProviderErrorKind::Timeout
            } else if let Some(status) = reqwest_error.status() {
                classify_status(status.as_u16())
            } else {
                ProviderErrorKind::Transient
            };
            ProviderError::new(provider, kind, truncate_error_msg(&reqwest_error.to_string()))
        }
        OpenAIError::StreamError(stream_error) => {
            let text = stream_error.to_string();
            let lower = text.to_lowercase();
            let kind = if lower.contains("429") || lower.contains("rate limit") {
                ProviderErrorKind::RateLimited
            } else if lower.contains("401") || lower.contains("unauthorized") {
                ProviderErrorKind::Auth
            } else if lower.contains("timeout") {
                ProviderErrorKind::Timeout
            } else {
                ProviderErrorKind::Transient
            };
            ProviderError::new(provider, kind, truncate_error_msg(&text))
        }
        OpenAIError::JSONDeserialize(json_error, content) => {
            // The body may still be a well-formed provider error payload.
            if let Ok(body) = serde_json::from_str::<ProviderErrorBody>(&content) {
                let message = match body {
                    ProviderErrorBody::Standard { error } => error.message,
                    ProviderErrorBody::Simple { detail } => detail,
                };
                return ProviderError::new(
                    provider,
                    ProviderErrorKind::Invalid,
                    truncate_error_msg(&message),
                );
            }
            ProviderError::new(
                provider,
                ProviderErrorKind::Invalid,
                truncate_error_msg(&json_error.to_string()),
            )
        }
        other => ProviderError::new(
            provider,
            ProviderErrorKind::Invalid,
            truncate_error_msg(&other.to_string()),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_openai::error::ApiError;

    #[test]
    fn status_codes_map_to_their_classes() {
        assert_eq!(classify_status(429), ProviderErrorKind::RateLimited);
        assert_eq!(classify_status(401), ProviderErrorKind::Auth);
        assert_eq!(classify_status(403), ProviderErrorKind::Auth);
        assert_eq!(classify_status(400), ProviderErrorKind::Invalid);
        assert_eq!(classify_status(404), ProviderErrorKind::Invalid);
        assert_eq!(classify_status(500), ProviderErrorKind::Transient);
        assert_eq!(classify_status(503), ProviderErrorKind::Transient);
    }

    #[test]
    fn api_error_codes_map_to_kinds() {
        let rate_limited = map_openai_error(
            "fast-remote",
            OpenAIError::ApiError(ApiError {
                message: "slow down".into(),
                r#type: None,
                param: None,
                code: Some("429".into()),
            }),
        );
        assert_eq!(rate_limited.kind, ProviderErrorKind::RateLimited);
        assert_eq!(rate_limited.provider, "fast-remote");

        let auth = map_openai_error(
            "fast-remote",
            OpenAIError::ApiError(ApiError {
                message: "bad key".into(),
                r#type: None,
                param: None,
                code: Some("invalid_api_key".into()),
            }),
        );
        assert_eq!(auth.kind, ProviderErrorKind::Auth);

        let transient = map_openai_error(
            "fast-remote",
            OpenAIError::ApiError(ApiError {
                message: "upstream died".into(),
                r#type: None,
                param: None,
                code: Some("503".into()),
            }),
        );
        assert_eq!(transient.kind, ProviderErrorKind::Transient);
    }

    #[test]
    fn json_error_recovers_provider_message() {
        let parse_error = serde_json::from_str::<u32>("x").unwrap_err();
        let mapped = map_openai_error(
            "local",
            OpenAIError::JSONDeserialize(
                parse_error,
                r#"{"error": {"message": "model not loaded"}}"#.to_string(),
            ),
        );
        assert_eq!(mapped.kind, ProviderErrorKind::Invalid);
        assert!(mapped.message.contains("model not loaded"));
    }

    #[test]
    fn long_messages_are_truncated() {
        let long = "x".repeat(1000);
        let truncated = truncate_error_msg(&long);
        assert!(truncated.len() <= MAX_ERROR_MESSAGE_LEN + 3);
        assert!(truncated.ends_with("..."));
    }
}
