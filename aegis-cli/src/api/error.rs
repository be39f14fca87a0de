//! Error taxonomy for remote API operations
//!
//! Every failure from the remote source is classified into one of these
//! variants so the import and push engines can decide between suppressing,
//! retrying, falling back, and aborting without string-matching at call sites.

/// Classified failure from the remote resource source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// 401/403 for a single resource type. Expected; the type gets disabled
    /// for this tenant until an explicit reset.
    Unauthorized(String),
    /// The tenant is not licensed for this resource type. Treated like
    /// Unauthorized for import purposes.
    NotEntitled(String),
    /// A same-named resource already exists in the target (409). Push falls
    /// back to a name lookup plus update.
    Conflict(String),
    /// Network error, rate limit, 5xx, or timeout. Eligible for retry on a
    /// later pass; never silently dropped.
    Transient(String),
    /// Tenant-level failure (auth, malformed input). Aborts the whole run.
    Fatal(String),
}

impl ApiError {
    /// True for the per-type entitlement failures that disable a resource
    /// type instead of failing the run.
    pub fn is_entitlement(&self) -> bool {
        matches!(self, Self::Unauthorized(_) | Self::NotEntitled(_))
    }

    /// True for failures worth retrying on a later push pass.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal(_))
    }

    /// Classify an HTTP status + response body into an ApiError.
    pub fn from_status(status: u16, body: &str) -> Self {
        let detail = format!("HTTP {}: {}", status, truncate(body, 200));
        match status {
            401 => Self::Unauthorized(detail),
            403 => {
                if is_entitlement_body(body) {
                    Self::NotEntitled(detail)
                } else {
                    Self::Unauthorized(detail)
                }
            }
            409 => Self::Conflict(detail),
            429 => Self::Transient(detail),
            s if s >= 500 => Self::Transient(detail),
            s if is_entitlement_body(body) && s >= 400 => Self::NotEntitled(detail),
            _ => Self::Fatal(detail),
        }
    }
}

/// Subscription-gap markers seen in API error bodies.
fn is_entitlement_body(body: &str) -> bool {
    let upper = body.to_uppercase();
    upper.contains("NOT_SUBSCRIBED") || upper.contains("NOT LICENSED") || upper.contains("SKU")
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unauthorized(d) => write!(f, "unauthorized: {}", d),
            Self::NotEntitled(d) => write!(f, "not entitled: {}", d),
            Self::Conflict(d) => write!(f, "conflict: {}", d),
            Self::Transient(d) => write!(f, "transient: {}", d),
            Self::Fatal(d) => write!(f, "fatal: {}", d),
        }
    }
}

impl std::error::Error for ApiError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert!(matches!(ApiError::from_status(401, ""), ApiError::Unauthorized(_)));
        assert!(matches!(ApiError::from_status(403, ""), ApiError::Unauthorized(_)));
        assert!(matches!(
            ApiError::from_status(403, "{\"code\":\"NOT_SUBSCRIBED\"}"),
            ApiError::NotEntitled(_)
        ));
        assert!(matches!(ApiError::from_status(409, "exists"), ApiError::Conflict(_)));
        assert!(matches!(ApiError::from_status(429, ""), ApiError::Transient(_)));
        assert!(matches!(ApiError::from_status(502, ""), ApiError::Transient(_)));
        assert!(matches!(ApiError::from_status(400, "bad request"), ApiError::Fatal(_)));
    }

    #[test]
    fn test_entitlement_predicate() {
        assert!(ApiError::Unauthorized("x".into()).is_entitlement());
        assert!(ApiError::NotEntitled("x".into()).is_entitlement());
        assert!(!ApiError::Transient("x".into()).is_entitlement());
        assert!(!ApiError::Conflict("x".into()).is_entitlement());
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        let s = "héllo wörld";
        assert_eq!(truncate(s, 4), "héll");
        assert_eq!(truncate("short", 200), "short");
    }
}
