//! Typed provider error plus the structured classification taxonomy (§4.1).

use thiserror::Error;

use crate::llm::types::{ProviderErrorKind, ProviderErrorMeta};

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("http transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("provider returned an error: {0:?}")]
    Provider(ProviderErrorMeta),
    #[error("authentication precondition failed for {provider_type}")]
    AuthPrecondition { provider_type: String },
    #[error("response decode error: {0}")]
    Decode(#[from] serde_json::Error),
}

impl ProviderError {
    pub fn meta(&self) -> Option<&ProviderErrorMeta> {
        match self {
            ProviderError::Provider(meta) => Some(meta),
            _ => None,
        }
    }
}

/// Classify an HTTP status + response body into the structured error
/// taxonomy. Tie-break order is rate_limit, context_overflow, auth_error,
/// unknown — the first matching class wins.
pub fn classify_error(
    status: u16,
    body: &str,
    model: &str,
    provider_type: &str,
) -> ProviderErrorMeta {
    let lower = body.to_ascii_lowercase();

    if status == 429 || lower.contains("rate limit") {
        let rate_limit_count = extract_number_after(&lower, "limit of");
        let rate_limit_seconds = extract_number_after(&lower, "per");
        let wait_seconds = extract_number_after(&lower, "retry after")
            .or_else(|| extract_number_after(&lower, "try again in"));
        return ProviderErrorMeta {
            kind: ProviderErrorKind::RateLimit,
            status_code: Some(status),
            model: model.to_string(),
            provider_type: provider_type.to_string(),
            message: body.to_string(),
            rate_limit_count,
            rate_limit_seconds,
            wait_seconds,
            max_context_tokens: None,
            requested_tokens: None,
        };
    }

    if lower.contains("context length")
        || lower.contains("too large")
        || lower.contains("max_tokens")
    {
        return ProviderErrorMeta {
            kind: ProviderErrorKind::ContextOverflow,
            status_code: Some(status),
            model: model.to_string(),
            provider_type: provider_type.to_string(),
            message: body.to_string(),
            rate_limit_count: None,
            rate_limit_seconds: None,
            wait_seconds: None,
            max_context_tokens: extract_number_after(&lower, "maximum context length is")
                .or_else(|| extract_number_after(&lower, "max_tokens is")),
            requested_tokens: extract_number_after(&lower, "requested"),
        };
    }

    if status == 401 || status == 403 {
        return ProviderErrorMeta {
            kind: ProviderErrorKind::AuthError,
            status_code: Some(status),
            model: model.to_string(),
            provider_type: provider_type.to_string(),
            message: body.to_string(),
            rate_limit_count: None,
            rate_limit_seconds: None,
            wait_seconds: None,
            max_context_tokens: None,
            requested_tokens: None,
        };
    }

    ProviderErrorMeta {
        kind: ProviderErrorKind::Unknown,
        status_code: Some(status),
        model: model.to_string(),
        provider_type: provider_type.to_string(),
        message: body.to_string(),
        rate_limit_count: None,
        rate_limit_seconds: None,
        wait_seconds: None,
        max_context_tokens: None,
        requested_tokens: None,
    }
}

/// Best-effort extraction of the first integer following `marker` in `text`.
fn extract_number_after(text: &str, marker: &str) -> Option<u32> {
    let idx = text.find(marker)?;
    let rest = &text[idx + marker.len()..];
    let digits: String = rest
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_wins_over_other_matches() {
        let meta = classify_error(429, "rate limit exceeded, context length also large", "gpt-4o", "default");
        assert_eq!(meta.kind, ProviderErrorKind::RateLimit);
    }

    #[test]
    fn context_overflow_detected_by_body_text() {
        let meta = classify_error(400, "This model's maximum context length is 8192 tokens. Requested 9000.", "gpt-4o", "default");
        assert_eq!(meta.kind, ProviderErrorKind::ContextOverflow);
        assert_eq!(meta.max_context_tokens, Some(8192));
    }

    #[test]
    fn auth_error_on_401_403() {
        assert_eq!(classify_error(401, "unauthorized", "m", "p").kind, ProviderErrorKind::AuthError);
        assert_eq!(classify_error(403, "forbidden", "m", "p").kind, ProviderErrorKind::AuthError);
    }

    #[test]
    fn unknown_otherwise() {
        assert_eq!(classify_error(500, "internal error", "m", "p").kind, ProviderErrorKind::Unknown);
    }
}
