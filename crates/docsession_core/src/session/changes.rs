//! Change tokens for resumable incremental synchronization.
//!
//! # Invariants
//! - The empty token means "from the beginning" (watermark 0).
//! - A continuation token is never smaller than the token it follows.
//! - Two calls with the same token and no intervening writes return an
//!   empty changed set and the same token back.

use crate::session::{SessionError, SessionResult};
use std::fmt::{Display, Formatter};

/// Opaque monotonic watermark handed back to callers between change
/// queries. Caller-held state, not session state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeToken(String);

impl ChangeToken {
    /// Token meaning "start from the beginning of the change history".
    pub fn beginning() -> Self {
        Self(String::new())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Decodes the watermark carried by this token.
    pub(crate) fn watermark(&self) -> SessionResult<i64> {
        if self.0.is_empty() {
            return Ok(0);
        }
        self.0.parse::<i64>().map_err(|_| {
            SessionError::InvalidArgument(format!("malformed change token `{}`", self.0))
        })
    }

    pub(crate) fn from_watermark(watermark: i64) -> Self {
        Self(watermark.to_string())
    }
}

impl Default for ChangeToken {
    fn default() -> Self {
        Self::beginning()
    }
}

impl Display for ChangeToken {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ChangeToken {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Aggregates changed since a token, plus the continuation to resume from.
#[derive(Debug, Clone)]
pub struct ChangeSet<T> {
    pub changed: Vec<T>,
    pub continuation: ChangeToken,
}

/// Derives the continuation from the versions observed in one scan.
///
/// Returns the unchanged input token when the scan saw nothing newer.
pub(crate) fn continuation_for(
    token: &ChangeToken,
    since: i64,
    observed_versions: impl Iterator<Item = i64>,
) -> ChangeToken {
    match observed_versions.max() {
        Some(highest) if highest > since => ChangeToken::from_watermark(highest),
        _ => token.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::{continuation_for, ChangeToken};
    use crate::session::SessionError;

    #[test]
    fn empty_token_decodes_to_watermark_zero() {
        assert_eq!(ChangeToken::beginning().watermark().unwrap(), 0);
    }

    #[test]
    fn malformed_token_is_an_invalid_argument() {
        let err = ChangeToken::from("not-a-number").watermark().unwrap_err();
        assert!(matches!(err, SessionError::InvalidArgument(_)));
    }

    #[test]
    fn continuation_echoes_the_input_when_nothing_changed() {
        let token = ChangeToken::from_watermark(7);
        let next = continuation_for(&token, 7, std::iter::empty());
        assert_eq!(next, token);
    }

    #[test]
    fn continuation_takes_the_highest_observed_version() {
        let token = ChangeToken::from_watermark(3);
        let next = continuation_for(&token, 3, [4_i64, 9, 5].into_iter());
        assert_eq!(next.as_str(), "9");
    }

    #[test]
    fn continuation_never_goes_backwards() {
        // A misbehaving adapter reporting stale versions must not
        // shrink the watermark.
        let token = ChangeToken::from_watermark(10);
        let next = continuation_for(&token, 10, [4_i64].into_iter());
        assert_eq!(next, token);
    }
}
