mod common;

use common::{MockAccount, all_scopes};
use serde_json::json;
use std::sync::Arc;
use teslemetry_bridge::api::{ApiError, TeslemetryApi};
use teslemetry_bridge::hub::{DOMAIN, Hub, Issue, IssueSeverity};
use teslemetry_bridge::repairs::{RepairKind, RepairOutcome, create_fix_flow};

fn raise(hub: &Hub, key: &str) -> Issue {
    let issue = Issue {
        domain: DOMAIN.to_string(),
        issue_id: "123456".to_string(),
        is_fixable: false,
        severity: IssueSeverity::Error,
        translation_key: key.to_string(),
    };
    hub.issues().create(issue.clone());
    issue
}

#[tokio::test]
async fn confirm_clears_issue_and_reloads() {
    let account = MockAccount::new(&all_scopes(), json!([]));
    let api: Arc<dyn TeslemetryApi> = account;
    let hub = Hub::new();
    let issue = raise(&hub, "subscription_required");

    let flow = create_fix_flow(&issue).unwrap();
    assert_eq!(flow.kind(), RepairKind::SubscriptionRequired);
    assert_eq!(flow.confirm(&api, &hub).await, RepairOutcome::Fixed);

    assert!(hub.issues().get(DOMAIN, "123456").is_none());
    assert!(hub.take_reload());
    assert!(!hub.take_reload());
}

#[tokio::test]
async fn confirm_keeps_issue_while_account_still_fails() {
    let account = MockAccount::new(&all_scopes(), json!([]));
    account.set_test(Err(ApiError::SubscriptionRequired));
    let api: Arc<dyn TeslemetryApi> = account;
    let hub = Hub::new();
    let issue = raise(&hub, "subscription_required");

    let flow = create_fix_flow(&issue).unwrap();
    assert_eq!(flow.confirm(&api, &hub).await, RepairOutcome::NotFixed);

    assert!(hub.issues().get(DOMAIN, "123456").is_some());
    assert!(!hub.take_reload());
}

#[test]
fn only_account_issues_have_flows() {
    let hub = Hub::new();
    assert!(create_fix_flow(&raise(&hub, "login_required")).is_some());
    assert!(create_fix_flow(&raise(&hub, "unauthorized_missing_scopes")).is_some());
    assert!(create_fix_flow(&raise(&hub, "internal_server_error")).is_none());
}
