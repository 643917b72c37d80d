use anyhow::Result;
use httpmock::prelude::*;
use mining_erp::domain::approval::{ApprovalKind, ApprovalStatus, Decision};
use mining_erp::{AppConfig, AppContext, ErpError};
use serde_json::json;
use tempfile::TempDir;

fn config_for(server: &MockServer, temp_dir: &TempDir) -> AppConfig {
    let mut config = AppConfig::default();
    config.api.base_url = server.base_url();
    config.storage.data_dir = temp_dir.path().to_string_lossy().to_string();
    config
}

fn approval(id: &str, kind: &str, status: &str) -> serde_json::Value {
    json!({
        "id": id,
        "kind": kind,
        "referenceId": format!("ref-{}", id),
        "title": "Pending item",
        "requestedBy": "u-req",
        "status": status
    })
}

fn mock_login_as_finance(server: &MockServer) {
    server.mock(|when, then| {
        when.method(POST).path("/auth/login");
        then.status(201).json_body(json!({
            "accessToken": "jwt-fin",
            "user": {"id": "u-fin", "email": "fin@mine.io", "role": "FINANCE_OFFICER"}
        }));
    });
}

fn mock_pending(server: &MockServer) {
    server.mock(|when, then| {
        when.method(GET)
            .path("/approvals")
            .query_param("status", "PENDING");
        then.status(200).json_body(json!([
            approval("ap-inv", "INVOICE", "PENDING"),
            approval("ap-it", "IT_REQUEST", "PENDING"),
            approval("ap-pay", "PAYMENT_REQUEST", "PENDING")
        ]));
    });
}

#[tokio::test]
async fn test_pending_list_is_filtered_by_signed_in_role() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let server = MockServer::start();
    mock_login_as_finance(&server);
    mock_pending(&server);

    let ctx = AppContext::init(config_for(&server, &temp_dir)).await?;

    let err = ctx.actionable_approvals().await.unwrap_err();
    assert!(matches!(err, ErpError::Api(ref e) if e.status == Some(401)));

    ctx.api().client().login("fin@mine.io", "pw").await?;
    let kinds: Vec<ApprovalKind> = ctx
        .actionable_approvals()
        .await?
        .into_iter()
        .map(|a| a.kind)
        .collect();
    assert_eq!(kinds, vec![ApprovalKind::Invoice, ApprovalKind::PaymentRequest]);

    // a restart keeps the signed-in role
    ctx.shutdown().await;
    let reopened = AppContext::init(config_for(&server, &temp_dir)).await?;
    assert_eq!(reopened.actionable_approvals().await?.len(), 2);
    Ok(())
}

#[tokio::test]
async fn test_decision_is_checked_before_it_is_sent() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let server = MockServer::start();
    mock_login_as_finance(&server);
    mock_pending(&server);

    let it_decision = server.mock(|when, then| {
        when.method(POST).path("/approvals/ap-it/decision");
        then.status(200).json_body(approval("ap-it", "IT_REQUEST", "APPROVED"));
    });
    let invoice_decision = server.mock(|when, then| {
        when.method(POST)
            .path("/approvals/ap-inv/decision")
            .json_body(json!({"decision": "REJECT", "comment": "wrong PO number"}));
        then.status(200).json_body(approval("ap-inv", "INVOICE", "REJECTED"));
    });

    let ctx = AppContext::init(config_for(&server, &temp_dir)).await?;
    ctx.api().client().login("fin@mine.io", "pw").await?;

    let err = ctx
        .decide_approval("ap-it", Decision::Approve, None)
        .await
        .unwrap_err();
    assert!(matches!(err, ErpError::Forbidden { .. }));
    it_decision.assert_hits(0);

    let err = ctx
        .decide_approval("ap-inv", Decision::Reject, Some("  ".to_string()))
        .await
        .unwrap_err();
    assert!(matches!(err, ErpError::ValidationError { .. }));

    let err = ctx
        .decide_approval("ap-gone", Decision::Approve, None)
        .await
        .unwrap_err();
    assert!(matches!(err, ErpError::NotFound { .. }));

    let decided = ctx
        .decide_approval("ap-inv", Decision::Reject, Some(" wrong PO number ".to_string()))
        .await?;
    assert_eq!(decided.status, ApprovalStatus::Rejected);
    invoice_decision.assert_hits(1);
    Ok(())
}
