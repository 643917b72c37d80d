//! Dry run of the configured requisition workflow against an in-memory repository.

use crate::core::memory::InMemoryRequisitionRepository;
use crate::domain::model::{Actor, AuditEntry};
use crate::domain::policy::Role;
use crate::domain::requisition::{
    NewRequisition, Requisition, RequisitionService, RequisitionStatus, WorkflowPolicy,
};
use crate::utils::error::Result;

#[derive(Debug, Clone)]
pub struct WorkflowRun {
    pub requisition: Requisition,
    pub audit: Vec<AuditEntry>,
}

fn approver_for(policy: &WorkflowPolicy, stage: u32) -> Actor {
    let role = policy
        .approval_stages
        .get(stage as usize)
        .or_else(|| policy.approve_roles.first())
        .copied()
        .unwrap_or(Role::Admin);
    Actor::new(format!("sim-{}", role.as_str().to_lowercase()), role)
}

/// Creates, submits and decides one requisition stage by stage, each stage
/// acted on by a user holding that stage's role. `reject_at` rejects at the
/// given 0-based stage instead of approving.
pub async fn simulate_requisition(
    policy: WorkflowPolicy,
    new: NewRequisition,
    reject_at: Option<u32>,
) -> Result<WorkflowRun> {
    let service = RequisitionService::new(InMemoryRequisitionRepository::new(), policy.clone());
    let requester = Actor::new("sim-requester", Role::Employee);

    let draft = service.create(&requester, new).await?;
    let mut current = service.submit(&requester, &draft.id).await?;

    while current.status == RequisitionStatus::PendingApproval {
        let stage = current.current_stage;
        let approver = approver_for(&policy, stage);
        tracing::debug!(stage, role = %approver.role, "simulating decision");
        current = if reject_at == Some(stage) {
            service
                .reject(&approver, &draft.id, "rejected during workflow simulation")
                .await?
        } else {
            service.approve(&approver, &draft.id, None).await?
        };
    }

    let audit = service.audit_trail(&draft.id).await?;
    Ok(WorkflowRun {
        requisition: current,
        audit,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::requisition::RequisitionItem;
    use crate::utils::error::ErpError;

    fn new_requisition() -> NewRequisition {
        NewRequisition {
            title: "Drill bits".into(),
            department: "Drilling".into(),
            items: vec![RequisitionItem::new("Button bit 89mm", 12, 310.0)],
        }
    }

    #[tokio::test]
    async fn test_default_workflow_runs_every_stage() {
        let run = simulate_requisition(WorkflowPolicy::default(), new_requisition(), None)
            .await
            .unwrap();
        assert_eq!(run.requisition.status, RequisitionStatus::Approved);
        let roles: Vec<Role> = run.requisition.decisions.iter().map(|d| d.role).collect();
        assert_eq!(roles, vec![Role::Manager, Role::FinanceOfficer]);
        assert_eq!(run.audit.last().map(|e| e.action.as_str()), Some("approve"));
    }

    #[tokio::test]
    async fn test_rejection_at_second_stage() {
        let run = simulate_requisition(WorkflowPolicy::default(), new_requisition(), Some(1))
            .await
            .unwrap();
        assert_eq!(run.requisition.status, RequisitionStatus::Rejected);
        assert_eq!(run.requisition.decisions.len(), 1);
    }

    #[tokio::test]
    async fn test_stage_role_missing_from_approvers_is_reported() {
        let policy = WorkflowPolicy {
            approval_stages: vec![Role::Manager, Role::HrOfficer],
            ..WorkflowPolicy::default()
        };
        let err = simulate_requisition(policy, new_requisition(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ErpError::Forbidden { .. }));
    }
}
