//! Procurement requisitions: draft, submission and the staged approval chain.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::model::{Actor, AuditEntry};
use crate::domain::policy::{self, Action, Role};
use crate::domain::ports::RequisitionRepository;
use crate::utils::error::{ErpError, Result};
use crate::utils::validation::validate_non_empty_string;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequisitionStatus {
    Draft,
    PendingApproval,
    Approved,
    Rejected,
    Cancelled,
}

impl fmt::Display for RequisitionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RequisitionStatus::Draft => "DRAFT",
            RequisitionStatus::PendingApproval => "PENDING_APPROVAL",
            RequisitionStatus::Approved => "APPROVED",
            RequisitionStatus::Rejected => "REJECTED",
            RequisitionStatus::Cancelled => "CANCELLED",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequisitionItem {
    pub description: String,
    pub quantity: u32,
    pub unit_price: f64,
}

impl RequisitionItem {
    pub fn new(description: impl Into<String>, quantity: u32, unit_price: f64) -> Self {
        Self {
            description: description.into(),
            quantity,
            unit_price,
        }
    }

    pub fn line_total(&self) -> f64 {
        self.quantity as f64 * self.unit_price
    }

    fn validate(&self) -> Result<()> {
        validate_non_empty_string("item description", &self.description)?;
        if self.quantity == 0 {
            return Err(ErpError::validation("item quantity must be at least 1"));
        }
        if !self.unit_price.is_finite() || self.unit_price < 0.0 {
            return Err(ErpError::validation(
                "item unit price must be a non-negative amount",
            ));
        }
        Ok(())
    }
}

/// One recorded approval in the chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageDecision {
    pub stage: u32,
    pub role: Role,
    pub actor_id: String,
    pub comment: Option<String>,
    pub decided_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Requisition {
    pub id: String,
    pub title: String,
    pub department: String,
    pub requester_id: String,
    pub status: RequisitionStatus,
    pub current_stage: u32,
    pub items: Vec<RequisitionItem>,
    #[serde(default)]
    pub decisions: Vec<StageDecision>,
    #[serde(default)]
    pub rejection_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Requisition {
    pub fn total_amount(&self) -> f64 {
        self.items.iter().map(RequisitionItem::line_total).sum()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewRequisition {
    pub title: String,
    pub department: String,
    #[serde(default)]
    pub items: Vec<RequisitionItem>,
}

/// Who may act on requisitions and the ordered roles of the approval chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowPolicy {
    pub approval_stages: Vec<Role>,
    pub approve_roles: Vec<Role>,
    pub reject_roles: Vec<Role>,
    pub cancel_roles: Vec<Role>,
}

impl Default for WorkflowPolicy {
    fn default() -> Self {
        Self {
            approval_stages: vec![Role::Manager, Role::FinanceOfficer],
            approve_roles: policy::allowed_roles(Action::ApproveRequisition).to_vec(),
            reject_roles: policy::allowed_roles(Action::RejectRequisition).to_vec(),
            cancel_roles: policy::allowed_roles(Action::CancelRequisition).to_vec(),
        }
    }
}

impl WorkflowPolicy {
    fn stage_count(&self) -> u32 {
        self.approval_stages.len().max(1) as u32
    }

    /// Role required at `stage`; `None` when any allowed approver may act.
    fn stage_role(&self, stage: u32) -> Option<Role> {
        self.approval_stages.get(stage as usize).copied()
    }
}

fn forbidden(actor: &Actor, action: Action) -> ErpError {
    ErpError::Forbidden {
        role: actor.role.to_string(),
        action: action.describe().to_string(),
    }
}

fn invalid_transition(action: &str, status: RequisitionStatus) -> ErpError {
    ErpError::InvalidTransition {
        action: action.to_string(),
        status: status.to_string(),
    }
}

pub struct RequisitionService<R: RequisitionRepository> {
    repository: R,
    policy: WorkflowPolicy,
}

impl<R: RequisitionRepository> RequisitionService<R> {
    pub fn new(repository: R, policy: WorkflowPolicy) -> Self {
        Self { repository, policy }
    }

    pub fn policy(&self) -> &WorkflowPolicy {
        &self.policy
    }

    pub async fn create(&self, actor: &Actor, new: NewRequisition) -> Result<Requisition> {
        policy::ensure_allowed(actor.role, Action::CreateRequisition)?;
        validate_non_empty_string("title", &new.title)?;
        validate_non_empty_string("department", &new.department)?;
        for item in &new.items {
            item.validate()?;
        }

        let now = Utc::now();
        let requisition = Requisition {
            id: uuid::Uuid::new_v4().to_string(),
            title: new.title.trim().to_string(),
            department: new.department.trim().to_string(),
            requester_id: actor.user_id.clone(),
            status: RequisitionStatus::Draft,
            current_stage: 0,
            items: new.items,
            decisions: Vec::new(),
            rejection_reason: None,
            created_at: now,
            updated_at: now,
        };

        self.repository.insert(requisition.clone()).await?;
        self.audit(actor, &requisition, "create", None).await?;
        tracing::info!(id = %requisition.id, requester = %actor.user_id, "requisition created");
        Ok(requisition)
    }

    pub async fn get(&self, id: &str) -> Result<Requisition> {
        self.repository
            .get(id)
            .await?
            .ok_or_else(|| ErpError::not_found("Requisition", id))
    }

    pub async fn list(&self) -> Result<Vec<Requisition>> {
        self.repository.list().await
    }

    pub async fn add_item(
        &self,
        actor: &Actor,
        id: &str,
        item: RequisitionItem,
    ) -> Result<Requisition> {
        let mut requisition = self.get(id).await?;
        self.ensure_owner_or_admin(actor, &requisition, Action::CreateRequisition)?;
        if requisition.status != RequisitionStatus::Draft {
            return Err(invalid_transition("add items to", requisition.status));
        }
        item.validate()?;

        requisition.items.push(item);
        requisition.updated_at = Utc::now();
        self.repository.update(requisition.clone()).await?;
        Ok(requisition)
    }

    pub async fn submit(&self, actor: &Actor, id: &str) -> Result<Requisition> {
        policy::ensure_allowed(actor.role, Action::SubmitRequisition)?;
        let mut requisition = self.get(id).await?;
        self.ensure_owner_or_admin(actor, &requisition, Action::SubmitRequisition)?;
        if requisition.status != RequisitionStatus::Draft {
            return Err(invalid_transition("submit", requisition.status));
        }
        if requisition.items.is_empty() {
            return Err(ErpError::validation(
                "a requisition needs at least one item before it can be submitted",
            ));
        }

        self.transition(actor, &mut requisition, RequisitionStatus::PendingApproval, "submit")
            .await?;
        Ok(requisition)
    }

    pub async fn approve(
        &self,
        actor: &Actor,
        id: &str,
        comment: Option<String>,
    ) -> Result<Requisition> {
        if !self.policy.approve_roles.contains(&actor.role) {
            return Err(forbidden(actor, Action::ApproveRequisition));
        }
        let mut requisition = self.get(id).await?;
        if requisition.status != RequisitionStatus::PendingApproval {
            return Err(invalid_transition("approve", requisition.status));
        }
        if let Some(required) = self.policy.stage_role(requisition.current_stage) {
            if actor.role != required && actor.role != Role::Admin {
                return Err(ErpError::Forbidden {
                    role: actor.role.to_string(),
                    action: format!(
                        "approve stage {} (requires {})",
                        requisition.current_stage, required
                    ),
                });
            }
        }

        requisition.decisions.push(StageDecision {
            stage: requisition.current_stage,
            role: actor.role,
            actor_id: actor.user_id.clone(),
            comment,
            decided_at: Utc::now(),
        });
        requisition.current_stage += 1;

        if requisition.current_stage >= self.policy.stage_count() {
            self.transition(actor, &mut requisition, RequisitionStatus::Approved, "approve")
                .await?;
        } else {
            requisition.updated_at = Utc::now();
            self.repository.update(requisition.clone()).await?;
            self.audit(
                actor,
                &requisition,
                "approve_stage",
                Some(RequisitionStatus::PendingApproval),
            )
            .await?;
            tracing::info!(
                id = %requisition.id,
                stage = requisition.current_stage,
                "requisition advanced to next approval stage"
            );
        }
        Ok(requisition)
    }

    pub async fn reject(&self, actor: &Actor, id: &str, reason: &str) -> Result<Requisition> {
        if !self.policy.reject_roles.contains(&actor.role) {
            return Err(forbidden(actor, Action::RejectRequisition));
        }
        validate_non_empty_string("rejection reason", reason)?;
        let mut requisition = self.get(id).await?;
        if requisition.status != RequisitionStatus::PendingApproval {
            return Err(invalid_transition("reject", requisition.status));
        }

        requisition.rejection_reason = Some(reason.trim().to_string());
        self.transition(actor, &mut requisition, RequisitionStatus::Rejected, "reject")
            .await?;
        Ok(requisition)
    }

    /// Cancels a draft or pending requisition. The requester may always cancel
    /// their own; anyone else needs a role on the cancel allow-list.
    pub async fn cancel(&self, actor: &Actor, id: &str) -> Result<Requisition> {
        let mut requisition = self.get(id).await?;
        let is_requester = requisition.requester_id == actor.user_id;
        if !is_requester && !self.policy.cancel_roles.contains(&actor.role) {
            return Err(forbidden(actor, Action::CancelRequisition));
        }
        if !matches!(
            requisition.status,
            RequisitionStatus::Draft | RequisitionStatus::PendingApproval
        ) {
            return Err(invalid_transition("cancel", requisition.status));
        }

        self.transition(actor, &mut requisition, RequisitionStatus::Cancelled, "cancel")
            .await?;
        Ok(requisition)
    }

    pub async fn audit_trail(&self, id: &str) -> Result<Vec<AuditEntry>> {
        self.repository.audit_for(id).await
    }

    fn ensure_owner_or_admin(
        &self,
        actor: &Actor,
        requisition: &Requisition,
        action: Action,
    ) -> Result<()> {
        if requisition.requester_id == actor.user_id || actor.role == Role::Admin {
            Ok(())
        } else {
            Err(forbidden(actor, action))
        }
    }

    async fn transition(
        &self,
        actor: &Actor,
        requisition: &mut Requisition,
        to: RequisitionStatus,
        action: &str,
    ) -> Result<()> {
        let from = requisition.status;
        requisition.status = to;
        requisition.updated_at = Utc::now();
        self.repository.update(requisition.clone()).await?;
        self.audit(actor, requisition, action, Some(from)).await?;
        tracing::info!(
            id = %requisition.id,
            actor = %actor.user_id,
            from = %from,
            to = %to,
            "requisition transition"
        );
        Ok(())
    }

    async fn audit(
        &self,
        actor: &Actor,
        requisition: &Requisition,
        action: &str,
        from: Option<RequisitionStatus>,
    ) -> Result<()> {
        self.repository
            .append_audit(AuditEntry {
                entity: "requisition".to_string(),
                entity_id: requisition.id.clone(),
                action: action.to_string(),
                actor_id: actor.user_id.clone(),
                from_status: from.map(|s| s.to_string()),
                to_status: requisition.status.to_string(),
                at: Utc::now(),
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::memory::InMemoryRequisitionRepository;

    fn service() -> RequisitionService<InMemoryRequisitionRepository> {
        RequisitionService::new(InMemoryRequisitionRepository::new(), WorkflowPolicy::default())
    }

    fn employee() -> Actor {
        Actor::new("u-employee", Role::Employee)
    }

    fn new_requisition(items: Vec<RequisitionItem>) -> NewRequisition {
        NewRequisition {
            title: "Conveyor belt spares".into(),
            department: "Maintenance".into(),
            items,
        }
    }

    #[tokio::test]
    async fn test_create_starts_as_draft_at_stage_zero() {
        let svc = service();
        let req = svc
            .create(&employee(), new_requisition(vec![RequisitionItem::new("Idler", 4, 120.0)]))
            .await
            .unwrap();

        assert_eq!(req.status, RequisitionStatus::Draft);
        assert_eq!(req.current_stage, 0);
        assert_eq!(req.requester_id, "u-employee");
        assert_eq!(req.total_amount(), 480.0);
    }

    #[tokio::test]
    async fn test_create_rejects_blank_title() {
        let svc = service();
        let mut new = new_requisition(vec![]);
        new.title = "  ".into();
        let err = svc.create(&employee(), new).await.unwrap_err();
        assert!(matches!(err, ErpError::ValidationError { .. }));
    }

    #[tokio::test]
    async fn test_submit_without_items_is_rejected() {
        let svc = service();
        let req = svc.create(&employee(), new_requisition(vec![])).await.unwrap();

        let err = svc.submit(&employee(), &req.id).await.unwrap_err();
        assert!(matches!(err, ErpError::ValidationError { .. }));
        assert_eq!(svc.get(&req.id).await.unwrap().status, RequisitionStatus::Draft);
    }

    #[tokio::test]
    async fn test_submit_with_items_moves_to_pending() {
        let svc = service();
        let req = svc.create(&employee(), new_requisition(vec![])).await.unwrap();
        svc.add_item(&employee(), &req.id, RequisitionItem::new("Gloves", 20, 3.5))
            .await
            .unwrap();

        let submitted = svc.submit(&employee(), &req.id).await.unwrap();
        assert_eq!(submitted.status, RequisitionStatus::PendingApproval);
        assert_eq!(submitted.current_stage, 0);
    }

    #[tokio::test]
    async fn test_two_stage_approval_chain() {
        let svc = service();
        let req = svc
            .create(&employee(), new_requisition(vec![RequisitionItem::new("Drill bits", 10, 45.0)]))
            .await
            .unwrap();
        svc.submit(&employee(), &req.id).await.unwrap();

        let finance = Actor::new("u-fin", Role::FinanceOfficer);
        let err = svc.approve(&finance, &req.id, None).await.unwrap_err();
        assert!(matches!(err, ErpError::Forbidden { .. }));

        let manager = Actor::new("u-mgr", Role::Manager);
        let after_first = svc.approve(&manager, &req.id, Some("ok".into())).await.unwrap();
        assert_eq!(after_first.status, RequisitionStatus::PendingApproval);
        assert_eq!(after_first.current_stage, 1);

        let approved = svc.approve(&finance, &req.id, None).await.unwrap();
        assert_eq!(approved.status, RequisitionStatus::Approved);
        assert_eq!(approved.decisions.len(), 2);
    }

    #[tokio::test]
    async fn test_employee_cannot_approve_or_reject() {
        let svc = service();
        let req = svc
            .create(&employee(), new_requisition(vec![RequisitionItem::new("Helmets", 5, 30.0)]))
            .await
            .unwrap();
        svc.submit(&employee(), &req.id).await.unwrap();

        assert!(matches!(
            svc.approve(&employee(), &req.id, None).await,
            Err(ErpError::Forbidden { .. })
        ));
        assert!(matches!(
            svc.reject(&employee(), &req.id, "no").await,
            Err(ErpError::Forbidden { .. })
        ));
    }

    #[tokio::test]
    async fn test_approve_requires_pending_status() {
        let svc = service();
        let req = svc.create(&employee(), new_requisition(vec![])).await.unwrap();
        let admin = Actor::new("u-admin", Role::Admin);

        let err = svc.approve(&admin, &req.id, None).await.unwrap_err();
        assert!(matches!(err, ErpError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn test_reject_records_reason_and_audit() {
        let svc = service();
        let req = svc
            .create(&employee(), new_requisition(vec![RequisitionItem::new("Cable", 100, 2.0)]))
            .await
            .unwrap();
        svc.submit(&employee(), &req.id).await.unwrap();

        let manager = Actor::new("u-mgr", Role::Manager);
        assert!(svc.reject(&manager, &req.id, "   ").await.is_err());
        let rejected = svc.reject(&manager, &req.id, "Over budget").await.unwrap();
        assert_eq!(rejected.status, RequisitionStatus::Rejected);
        assert_eq!(rejected.rejection_reason.as_deref(), Some("Over budget"));

        let trail = svc.audit_trail(&req.id).await.unwrap();
        let actions: Vec<&str> = trail.iter().map(|e| e.action.as_str()).collect();
        assert_eq!(actions, vec!["create", "submit", "reject"]);
        assert_eq!(trail[2].from_status.as_deref(), Some("PENDING_APPROVAL"));
    }

    #[tokio::test]
    async fn test_cancel_rules() {
        let svc = service();
        let req = svc.create(&employee(), new_requisition(vec![])).await.unwrap();

        let stranger = Actor::new("u-other", Role::Employee);
        assert!(matches!(
            svc.cancel(&stranger, &req.id).await,
            Err(ErpError::Forbidden { .. })
        ));

        let cancelled = svc.cancel(&employee(), &req.id).await.unwrap();
        assert_eq!(cancelled.status, RequisitionStatus::Cancelled);

        let admin = Actor::new("u-admin", Role::Admin);
        assert!(matches!(
            svc.cancel(&admin, &req.id).await,
            Err(ErpError::InvalidTransition { .. })
        ));
    }

    #[tokio::test]
    async fn test_single_stage_policy_from_allow_list() {
        let policy = WorkflowPolicy {
            approval_stages: vec![],
            approve_roles: vec![Role::Supervisor],
            ..WorkflowPolicy::default()
        };
        let svc = RequisitionService::new(InMemoryRequisitionRepository::new(), policy);
        let req = svc
            .create(&employee(), new_requisition(vec![RequisitionItem::new("Rope", 1, 10.0)]))
            .await
            .unwrap();
        svc.submit(&employee(), &req.id).await.unwrap();

        let manager = Actor::new("u-mgr", Role::Manager);
        assert!(svc.approve(&manager, &req.id, None).await.is_err());

        let supervisor = Actor::new("u-sup", Role::Supervisor);
        let approved = svc.approve(&supervisor, &req.id, None).await.unwrap();
        assert_eq!(approved.status, RequisitionStatus::Approved);
    }

    #[tokio::test]
    async fn test_missing_requisition_is_not_found() {
        let svc = service();
        let err = svc.submit(&employee(), "nope").await.unwrap_err();
        assert!(matches!(err, ErpError::NotFound { .. }));
    }
}
