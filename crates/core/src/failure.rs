//! Failure classification shared by every provider call.
//!
//! Providers report a status code (when there is one) and a message. The
//! classifier maps them onto the small set of behaviours the retry loops
//! know about.

/// How a failed provider call should be handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
  /// Quota or rate limit hit: cool the credential down and rotate
  RateLimited,
  /// Connection-level failure: retry with bounded linear backoff
  TransientNetwork,
  /// Malformed streaming response: bounded retry
  StreamParseGlitch,
  /// Anything else: propagate
  Fatal,
}

impl FailureKind {
  pub fn is_retryable(&self) -> bool {
    !matches!(self, Self::Fatal)
  }
}

const RATE_LIMIT_MARKERS: &[&str] = &[
  "429",
  "503",
  "rate limit",
  "rate_limit",
  "ratelimit",
  "too many requests",
  "quota",
  "resource_exhausted",
  "resource exhausted",
  "overloaded",
];

const NETWORK_MARKERS: &[&str] = &[
  "econnreset",
  "connection reset",
  "connection refused",
  "connection closed",
  "timed out",
  "timeout",
  "socket hang up",
  "broken pipe",
  "network",
  "502",
  "504",
];

/// Classify a failure by status code and message.
///
/// Status codes win over message text. Message matching is case-insensitive.
pub fn classify(status: Option<u16>, message: &str) -> FailureKind {
  match status {
    Some(429 | 503) => return FailureKind::RateLimited,
    Some(502 | 504 | 408) => return FailureKind::TransientNetwork,
    _ => {}
  }

  let lower = message.to_lowercase();
  if RATE_LIMIT_MARKERS.iter().any(|m| lower.contains(m)) {
    FailureKind::RateLimited
  } else if NETWORK_MARKERS.iter().any(|m| lower.contains(m)) {
    FailureKind::TransientNetwork
  } else {
    FailureKind::Fatal
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_status_codes() {
    assert_eq!(classify(Some(429), ""), FailureKind::RateLimited);
    assert_eq!(classify(Some(503), ""), FailureKind::RateLimited);
    assert_eq!(classify(Some(504), ""), FailureKind::TransientNetwork);
    assert_eq!(classify(Some(400), "bad request"), FailureKind::Fatal);
  }

  #[test]
  fn test_message_keywords() {
    assert_eq!(
      classify(None, "Resource has been exhausted (e.g. check quota)."),
      FailureKind::RateLimited
    );
    assert_eq!(classify(None, "Rate limit reached for requests"), FailureKind::RateLimited);
    assert_eq!(classify(None, "read ECONNRESET"), FailureKind::TransientNetwork);
    assert_eq!(classify(None, "operation timed out"), FailureKind::TransientNetwork);
    assert_eq!(classify(None, "invalid api key"), FailureKind::Fatal);
  }

  #[test]
  fn test_rate_limit_wins_over_network() {
    assert_eq!(classify(None, "network error: 429 too many requests"), FailureKind::RateLimited);
  }
}
