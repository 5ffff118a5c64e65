/// Fetch outcome definitions reported back into the frontier
///
/// The fetch collaborator stamps one of these on a `CrawlUri` before the worker
/// calls `Frontier::finished`. The frontier only cares about which bucket an
/// outcome falls in, see [`FetchStatus::disposition`].
use std::fmt;

/// Outcome code of the most recent fetch attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FetchStatus {
    /// No attempt has been made yet
    Unattempted,

    // ===== Success =====
    /// Any well-formed protocol response, including HTTP 404/500
    Success(u16),

    // ===== Retryable =====
    /// TCP connect failed
    ConnectFailed,

    /// Connection dropped mid-transfer
    ConnectLost,

    /// Request timed out
    Timeout,

    /// Host name could not be resolved
    DomainUnresolvable,

    // ===== Terminal failures =====
    /// Malformed or otherwise unfetchable URI
    Unfetchable,

    /// Retry budget used up
    RetriesExhausted,

    /// Processing chain failed internally
    RuntimeError,

    // ===== Disregarded =====
    /// robots.txt forbids the fetch
    RobotsPrecluded,

    /// Scope rules rejected the URI
    OutOfScope,

    /// Too far from a seed
    TooManyHops,

    /// Removed by an operator while queued or in flight
    DeletedByOperator,

    // ===== Special =====
    /// A prerequisite must be fetched first; requeue without penalty
    Deferred,
}

/// How `finished` disposes of a URI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Disposition {
    /// Fetched; permanently removed
    Success,
    /// Will be offered again later
    Retry,
    /// Dropped without counting as a failure
    Disregard,
    /// Dropped and counted as a failure
    Failure,
}

impl FetchStatus {
    /// Returns true for transport failures worth another attempt
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ConnectFailed | Self::ConnectLost | Self::Timeout | Self::DomainUnresolvable
        )
    }

    /// Returns true if the status was produced by a protocol response
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Returns true for outcomes that never touched the remote host
    pub fn is_disregarded(&self) -> bool {
        matches!(
            self,
            Self::RobotsPrecluded | Self::OutOfScope | Self::TooManyHops | Self::DeletedByOperator
        )
    }

    /// Returns true for failures that must never be retried
    pub fn is_terminal_failure(&self) -> bool {
        matches!(
            self,
            Self::Unattempted | Self::Unfetchable | Self::RetriesExhausted | Self::RuntimeError
        )
    }

    /// Returns true for outcomes whose retry should wait the extra retry delay
    ///
    /// Connection-level problems tend to persist for a while, so these get
    /// `retry-delay-ms` on top of ordinary politeness.
    pub fn wants_retry_delay(&self) -> bool {
        matches!(
            self,
            Self::ConnectFailed | Self::ConnectLost | Self::DomainUnresolvable
        )
    }

    /// Classifies the outcome, ignoring retry budgets
    ///
    /// `Deferred` maps to `Retry`; the caller distinguishes it because it
    /// neither costs an attempt nor triggers a politeness delay.
    pub fn disposition(&self) -> Disposition {
        if self.is_success() {
            Disposition::Success
        } else if self.is_retryable() || *self == Self::Deferred {
            Disposition::Retry
        } else if self.is_disregarded() {
            Disposition::Disregard
        } else {
            Disposition::Failure
        }
    }

    /// Converts the status to its database string representation
    pub fn to_db_string(&self) -> String {
        match self {
            Self::Unattempted => "unattempted".to_string(),
            Self::Success(code) => format!("success:{}", code),
            Self::ConnectFailed => "connect_failed".to_string(),
            Self::ConnectLost => "connect_lost".to_string(),
            Self::Timeout => "timeout".to_string(),
            Self::DomainUnresolvable => "domain_unresolvable".to_string(),
            Self::Unfetchable => "unfetchable".to_string(),
            Self::RetriesExhausted => "retries_exhausted".to_string(),
            Self::RuntimeError => "runtime_error".to_string(),
            Self::RobotsPrecluded => "robots_precluded".to_string(),
            Self::OutOfScope => "out_of_scope".to_string(),
            Self::TooManyHops => "too_many_hops".to_string(),
            Self::DeletedByOperator => "deleted_by_operator".to_string(),
            Self::Deferred => "deferred".to_string(),
        }
    }

    /// Parses a status from its database string representation
    pub fn from_db_string(s: &str) -> Option<Self> {
        if let Some(code) = s.strip_prefix("success:") {
            return code.parse().ok().map(Self::Success);
        }
        match s {
            "unattempted" => Some(Self::Unattempted),
            "connect_failed" => Some(Self::ConnectFailed),
            "connect_lost" => Some(Self::ConnectLost),
            "timeout" => Some(Self::Timeout),
            "domain_unresolvable" => Some(Self::DomainUnresolvable),
            "unfetchable" => Some(Self::Unfetchable),
            "retries_exhausted" => Some(Self::RetriesExhausted),
            "runtime_error" => Some(Self::RuntimeError),
            "robots_precluded" => Some(Self::RobotsPrecluded),
            "out_of_scope" => Some(Self::OutOfScope),
            "too_many_hops" => Some(Self::TooManyHops),
            "deleted_by_operator" => Some(Self::DeletedByOperator),
            "deferred" => Some(Self::Deferred),
            _ => None,
        }
    }
}

impl Default for FetchStatus {
    fn default() -> Self {
        Self::Unattempted
    }
}

impl fmt::Display for FetchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}

impl fmt::Display for Disposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Success => "success",
            Self::Retry => "retry",
            Self::Disregard => "disregard",
            Self::Failure => "failure",
        };
        write!(f, "{}", name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_errors_are_successful_fetches() {
        assert_eq!(FetchStatus::Success(200).disposition(), Disposition::Success);
        assert_eq!(FetchStatus::Success(404).disposition(), Disposition::Success);
        assert_eq!(FetchStatus::Success(500).disposition(), Disposition::Success);
    }

    #[test]
    fn test_transport_failures_retry() {
        for status in [
            FetchStatus::ConnectFailed,
            FetchStatus::ConnectLost,
            FetchStatus::Timeout,
            FetchStatus::DomainUnresolvable,
        ] {
            assert!(status.is_retryable());
            assert_eq!(status.disposition(), Disposition::Retry);
        }
        assert_eq!(FetchStatus::Deferred.disposition(), Disposition::Retry);
        assert!(!FetchStatus::Deferred.is_retryable());
    }

    #[test]
    fn test_terminal_and_disregarded() {
        assert_eq!(FetchStatus::Unfetchable.disposition(), Disposition::Failure);
        assert_eq!(FetchStatus::RetriesExhausted.disposition(), Disposition::Failure);
        assert_eq!(FetchStatus::RobotsPrecluded.disposition(), Disposition::Disregard);
        assert_eq!(FetchStatus::OutOfScope.disposition(), Disposition::Disregard);
        assert_eq!(FetchStatus::TooManyHops.disposition(), Disposition::Disregard);
    }

    #[test]
    fn test_retry_delay_only_for_connection_problems() {
        assert!(FetchStatus::ConnectFailed.wants_retry_delay());
        assert!(FetchStatus::DomainUnresolvable.wants_retry_delay());
        assert!(!FetchStatus::Timeout.wants_retry_delay());
        assert!(!FetchStatus::Success(200).wants_retry_delay());
    }

    #[test]
    fn test_db_string_parsing() {
        assert_eq!(
            FetchStatus::from_db_string("success:404"),
            Some(FetchStatus::Success(404))
        );
        assert_eq!(
            FetchStatus::from_db_string("timeout"),
            Some(FetchStatus::Timeout)
        );
        assert_eq!(FetchStatus::from_db_string("success:abc"), None);
        assert_eq!(FetchStatus::from_db_string("bogus"), None);
        assert_eq!(FetchStatus::Deferred.to_string(), "deferred");
    }
}
