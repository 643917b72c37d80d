use anyhow::Result;
use mining_erp::core::csv_io;
use mining_erp::core::memory::InMemoryRequisitionRepository;
use mining_erp::domain::model::Actor;
use mining_erp::domain::policy::{Capabilities, Role};
use mining_erp::domain::requisition::{NewRequisition, RequisitionStatus};
use mining_erp::{AppConfig, ErpError, RequisitionService};

const CONFIG: &str = r#"
[workflow]
approval_stages = ["MANAGER", "FINANCE_OFFICER"]
cancel_roles = ["ADMIN"]
"#;

const ITEMS_CSV: &str = "description,quantity,unit_price
Hydraulic hose 2in,4,180.00
Grease cartridge,24,6.50
";

fn service() -> Result<RequisitionService<InMemoryRequisitionRepository>> {
    let config = AppConfig::from_toml_str(CONFIG)?;
    Ok(RequisitionService::new(
        InMemoryRequisitionRepository::new(),
        config.workflow_policy()?,
    ))
}

#[tokio::test]
async fn test_requisition_moves_through_both_stages() -> Result<()> {
    let service = service()?;
    let requester = Actor::new("u-fitter", Role::Employee);
    let manager = Actor::new("u-manager", Role::Manager);
    let finance = Actor::new("u-finance", Role::FinanceOfficer);

    assert!(Capabilities::for_role(requester.role).can_create_requisition);
    assert!(!Capabilities::for_role(requester.role).can_approve);

    let items = csv_io::import_requisition_items(ITEMS_CSV.as_bytes())?;
    let draft = service
        .create(
            &requester,
            NewRequisition {
                title: "Excavator 3 service kit".to_string(),
                department: "Maintenance".to_string(),
                items,
            },
        )
        .await?;
    assert_eq!(draft.status, RequisitionStatus::Draft);
    assert!((draft.total_amount() - 876.0).abs() < 1e-9);

    service.submit(&requester, &draft.id).await?;

    // finance cannot skip the manager stage
    let err = service
        .approve(&finance, &draft.id, None)
        .await
        .unwrap_err();
    assert!(matches!(err, ErpError::Forbidden { .. }));

    let after_manager = service
        .approve(&manager, &draft.id, Some("ok for Q3 budget".to_string()))
        .await?;
    assert_eq!(after_manager.status, RequisitionStatus::PendingApproval);
    assert_eq!(after_manager.current_stage, 1);

    let approved = service.approve(&finance, &draft.id, None).await?;
    assert_eq!(approved.status, RequisitionStatus::Approved);
    assert_eq!(approved.decisions.len(), 2);

    let actions: Vec<String> = service
        .audit_trail(&draft.id)
        .await?
        .into_iter()
        .map(|e| e.action)
        .collect();
    assert_eq!(actions, vec!["create", "submit", "approve_stage", "approve"]);

    let csv = csv_io::export_requisitions(&service.list().await?)?;
    assert!(csv.contains("Excavator 3 service kit,Maintenance,APPROVED,2,2,876.00"));
    Ok(())
}

#[tokio::test]
async fn test_cancel_follows_configured_allow_list() -> Result<()> {
    let service = service()?;
    let requester = Actor::new("u-geologist", Role::Employee);
    let manager = Actor::new("u-manager", Role::Manager);

    let new = NewRequisition {
        title: "Core sample trays".to_string(),
        department: "Exploration".to_string(),
        items: csv_io::import_requisition_items(ITEMS_CSV.as_bytes())?,
    };
    let first = service.create(&requester, new.clone()).await?;
    let second = service.create(&requester, new).await?;

    // MANAGER is on the built-in cancel list but the config narrowed it to ADMIN
    let err = service.cancel(&manager, &first.id).await.unwrap_err();
    assert!(matches!(err, ErpError::Forbidden { .. }));

    let cancelled = service.cancel(&requester, &first.id).await?;
    assert_eq!(cancelled.status, RequisitionStatus::Cancelled);

    service.submit(&requester, &second.id).await?;
    let rejected = service
        .reject(&manager, &second.id, "duplicate of an open order")
        .await?;
    assert_eq!(rejected.status, RequisitionStatus::Rejected);

    let err = service.cancel(&requester, &second.id).await.unwrap_err();
    assert!(matches!(err, ErpError::InvalidTransition { .. }));
    Ok(())
}
