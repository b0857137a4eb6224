use crate::api::ApiError;
use crate::error::BridgeError;
use crate::hub::{DOMAIN, Hub, Issue, IssueSeverity};
use crate::logging::StructuredLogger;
use std::sync::atomic::{AtomicU32, Ordering};

/// Consecutive transient failures of one coordinator
#[derive(Debug)]
pub struct FailureCounter {
    count: AtomicU32,
    threshold: u32,
}

impl FailureCounter {
    /// Escalate once the count exceeds `threshold`
    pub fn new(threshold: u32) -> Self {
        Self {
            count: AtomicU32::new(0),
            threshold,
        }
    }

    /// Count a transient failure; true when it must be escalated
    pub fn record(&self) -> bool {
        let count = self.count.fetch_add(1, Ordering::SeqCst) + 1;
        count > self.threshold
    }

    pub fn reset(&self) {
        self.count.store(0, Ordering::SeqCst);
    }

    pub fn count(&self) -> u32 {
        self.count.load(Ordering::SeqCst)
    }
}

/// What a refresh does with a vendor failure
#[derive(Debug)]
pub enum Handling {
    /// Keep serving the previous snapshot
    KeepStale,
    /// Surface the error; listeners see the coordinator as failed
    Fail(BridgeError),
}

/// Classify a vendor failure during a refresh
///
/// Transient server errors are absorbed until the counter escalates.
/// Surfacing any error resets the counter. Account problems also raise a
/// non-fixable issue keyed by `issue_id`.
pub fn handle_api_error(
    err: &ApiError,
    failures: &FailureCounter,
    hub: &Hub,
    issue_id: &str,
    logger: &StructuredLogger,
) -> Handling {
    if err.is_transient() {
        if failures.record() {
            failures.reset();
            return Handling::Fail(BridgeError::update_failed("Multiple 5xx failures"));
        }
        logger.debug(&format!(
            "Transient error ({}), keeping previous data: {}",
            failures.count(),
            err
        ));
        return Handling::KeepStale;
    }

    failures.reset();
    match err {
        ApiError::InvalidToken => Handling::Fail(BridgeError::auth(err.message())),
        _ if err.is_account_problem() => {
            hub.issues().create(Issue {
                domain: DOMAIN.to_string(),
                issue_id: issue_id.to_string(),
                is_fixable: false,
                severity: IssueSeverity::Error,
                translation_key: err.key().to_lowercase(),
            });
            Handling::Fail(BridgeError::update_failed(err.message()))
        }
        _ => Handling::Fail(BridgeError::update_failed(err.message())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::get_logger;

    fn classify(err: ApiError, failures: &FailureCounter, hub: &Hub) -> Handling {
        handle_api_error(&err, failures, hub, "VIN", &get_logger("test"))
    }

    #[test]
    fn test_third_transient_error_escalates() {
        let hub = Hub::new();
        let failures = FailureCounter::new(2);
        assert!(matches!(
            classify(ApiError::ServiceUnavailable, &failures, &hub),
            Handling::KeepStale
        ));
        assert!(matches!(
            classify(ApiError::GatewayTimeout, &failures, &hub),
            Handling::KeepStale
        ));
        match classify(ApiError::InternalServerError, &failures, &hub) {
            Handling::Fail(BridgeError::UpdateFailed { message }) => {
                assert_eq!(message, "Multiple 5xx failures")
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(failures.count(), 0);
    }

    #[test]
    fn test_account_problem_creates_issue() {
        let hub = Hub::new();
        let failures = FailureCounter::new(2);
        let handling = classify(ApiError::SubscriptionRequired, &failures, &hub);
        assert!(matches!(
            handling,
            Handling::Fail(BridgeError::UpdateFailed { .. })
        ));
        let issue = hub.issues().get(DOMAIN, "VIN").unwrap();
        assert_eq!(issue.translation_key, "subscription_required");
        assert!(!issue.is_fixable);
        assert_eq!(issue.severity, IssueSeverity::Error);
    }

    #[test]
    fn test_invalid_token_is_auth_failure() {
        let hub = Hub::new();
        let failures = FailureCounter::new(2);
        failures.record();
        match classify(ApiError::InvalidToken, &failures, &hub) {
            Handling::Fail(err) => assert!(err.is_auth()),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(failures.count(), 0);
        assert!(hub.issues().list().is_empty());
    }

    #[test]
    fn test_other_errors_carry_vendor_message() {
        let hub = Hub::new();
        let failures = FailureCounter::new(2);
        match classify(ApiError::other("rate_limited", "Too many requests"), &failures, &hub) {
            Handling::Fail(err) => assert_eq!(err.to_string(), "Update failed: Too many requests"),
            other => panic!("unexpected {:?}", other),
        }
        match classify(ApiError::InvalidResponse, &failures, &hub) {
            Handling::Fail(err) => assert_eq!(
                err.to_string(),
                "Update failed: Invalid response from Teslemetry"
            ),
            other => panic!("unexpected {:?}", other),
        }
    }
}
