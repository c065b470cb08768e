//! Disconnect classification.

use courier_core::events::CloseReason;

/// What the supervisor does after a close event. Exactly one branch runs
/// per close.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartPolicy {
    /// Re-pairing required: clear credentials and terminate non-zero.
    Terminal,
    /// Reconnect with no delay.
    Immediate,
    /// Reconnect after the configured backoff.
    Delayed,
}

/// Map a close reason to its restart policy.
///
/// Unrecognized codes select the delayed restart, not termination: an
/// unknown close is more likely a new transient condition than a revoked
/// session, so the loop fails open toward availability.
#[must_use]
pub const fn restart_policy(reason: &CloseReason) -> RestartPolicy {
    match reason {
        CloseReason::LoggedOut
        | CloseReason::Forbidden
        | CloseReason::MultideviceMismatch
        | CloseReason::QrAttemptsEnded
        | CloseReason::ProxyTimedOut => RestartPolicy::Terminal,

        CloseReason::RestartRequired
        | CloseReason::ConnectionLost
        | CloseReason::ConnectionClosed
        | CloseReason::ServiceUnavailable
        | CloseReason::ConnectionReplaced
        | CloseReason::TimedOut
        | CloseReason::BadSession => RestartPolicy::Immediate,

        CloseReason::TransportFailure | CloseReason::Unknown(_) => RestartPolicy::Delayed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_reasons_require_repairing() {
        for reason in [
            CloseReason::LoggedOut,
            CloseReason::Forbidden,
            CloseReason::MultideviceMismatch,
            CloseReason::QrAttemptsEnded,
            CloseReason::ProxyTimedOut,
        ] {
            assert_eq!(restart_policy(&reason), RestartPolicy::Terminal, "{reason}");
        }
    }

    #[test]
    fn transient_reasons_restart_immediately() {
        for reason in [
            CloseReason::RestartRequired,
            CloseReason::ConnectionLost,
            CloseReason::ConnectionClosed,
            CloseReason::ServiceUnavailable,
            CloseReason::ConnectionReplaced,
            CloseReason::TimedOut,
            CloseReason::BadSession,
        ] {
            assert_eq!(
                restart_policy(&reason),
                RestartPolicy::Immediate,
                "{reason}"
            );
        }
    }

    #[test]
    fn transport_and_unknown_reasons_back_off() {
        assert_eq!(
            restart_policy(&CloseReason::TransportFailure),
            RestartPolicy::Delayed
        );
        assert_eq!(
            restart_policy(&CloseReason::Unknown(999)),
            RestartPolicy::Delayed
        );
    }
}
