//! Generic pending actions (invoices, purchase/IT/payment requests) awaiting a role-gated decision.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::model::Actor;
use crate::domain::policy::{self, Action};
use crate::utils::error::{ErpError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApprovalKind {
    Invoice,
    PurchaseRequest,
    ItRequest,
    PaymentRequest,
}

impl ApprovalKind {
    pub fn action(&self) -> Action {
        match self {
            ApprovalKind::Invoice => Action::DecideInvoice,
            ApprovalKind::PurchaseRequest => Action::DecidePurchaseRequest,
            ApprovalKind::ItRequest => Action::DecideItRequest,
            ApprovalKind::PaymentRequest => Action::DecidePaymentRequest,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Decision {
    Approve,
    Reject,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Approval {
    pub id: String,
    pub kind: ApprovalKind,
    pub reference_id: String,
    pub title: String,
    #[serde(default)]
    pub amount: Option<f64>,
    pub requested_by: String,
    pub status: ApprovalStatus,
    #[serde(default)]
    pub decided_by: Option<String>,
    #[serde(default)]
    pub decided_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionRequest {
    pub decision: Decision,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

/// Applies `decision` to a pending approval on behalf of `actor`.
pub fn decide(
    actor: &Actor,
    approval: &mut Approval,
    decision: Decision,
    comment: Option<String>,
) -> Result<()> {
    policy::ensure_allowed(actor.role, approval.kind.action())?;
    if approval.status != ApprovalStatus::Pending {
        return Err(ErpError::InvalidTransition {
            action: "decide".to_string(),
            status: format!("{:?}", approval.status).to_uppercase(),
        });
    }
    let comment = comment.map(|c| c.trim().to_string()).filter(|c| !c.is_empty());
    if decision == Decision::Reject && comment.is_none() {
        return Err(ErpError::validation("a rejection needs a comment"));
    }

    approval.status = match decision {
        Decision::Approve => ApprovalStatus::Approved,
        Decision::Reject => ApprovalStatus::Rejected,
    };
    approval.decided_by = Some(actor.user_id.clone());
    approval.decided_at = Some(Utc::now());
    approval.comment = comment;

    tracing::info!(
        id = %approval.id,
        kind = ?approval.kind,
        decision = ?decision,
        actor = %actor.user_id,
        "approval decided"
    );
    Ok(())
}

/// Pending approvals `actor` is allowed to act on.
pub fn actionable_for<'a>(actor: &Actor, approvals: &'a [Approval]) -> Vec<&'a Approval> {
    approvals
        .iter()
        .filter(|a| a.status == ApprovalStatus::Pending)
        .filter(|a| policy::is_allowed(actor.role, a.kind.action()))
        .collect()
}
