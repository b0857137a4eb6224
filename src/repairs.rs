//! Fix flows for account issues
//!
//! Coordinators raise an issue when the vendor reports a subscription,
//! permission or login problem. Once the user has fixed the account, the
//! confirm step re-tests the token and clears the issue.

use crate::api::TeslemetryApi;
use crate::hub::{DOMAIN, Hub, Issue};
use crate::logging::{LogContext, get_logger_with_context};
use std::sync::Arc;

/// Issue kinds that have a fix flow
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepairKind {
    SubscriptionRequired,
    UnauthorizedMissingScopes,
    LoginRequired,
}

impl RepairKind {
    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            "subscription_required" => Some(RepairKind::SubscriptionRequired),
            "unauthorized_missing_scopes" => Some(RepairKind::UnauthorizedMissingScopes),
            "login_required" => Some(RepairKind::LoginRequired),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RepairKind::SubscriptionRequired => "subscription_required",
            RepairKind::UnauthorizedMissingScopes => "unauthorized_missing_scopes",
            RepairKind::LoginRequired => "login_required",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepairOutcome {
    /// Issue removed; the integration must be reloaded
    Fixed,
    /// The account still fails the test; show the confirm step again
    NotFixed,
}

/// Confirm flow for one raised issue
pub struct RepairFlow {
    issue: Issue,
    kind: RepairKind,
}

impl RepairFlow {
    pub fn issue(&self) -> &Issue {
        &self.issue
    }

    pub fn kind(&self) -> RepairKind {
        self.kind
    }

    /// Re-test the account and clear the issue when it passes
    pub async fn confirm(&self, api: &Arc<dyn TeslemetryApi>, hub: &Hub) -> RepairOutcome {
        let logger = get_logger_with_context(
            LogContext::new("repairs").with_field("issue", self.issue.issue_id.clone()),
        );
        if let Err(e) = api.test().await {
            logger.info(&format!("{} not fixed yet: {}", self.kind.as_str(), e));
            return RepairOutcome::NotFixed;
        }
        hub.issues().delete(DOMAIN, &self.issue.issue_id);
        hub.request_reload();
        logger.info(&format!("{} fixed, reloading", self.kind.as_str()));
        RepairOutcome::Fixed
    }
}

/// Fix flow for an issue, if its kind has one
pub fn create_fix_flow(issue: &Issue) -> Option<RepairFlow> {
    let kind = RepairKind::from_key(&issue.translation_key)?;
    Some(RepairFlow {
        issue: issue.clone(),
        kind,
    })
}
