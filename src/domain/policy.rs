//! Role-based access policy.
//!
//! One static table maps every [`Action`] to the roles allowed to perform it.
//! Workflow services evaluate it server-side; [`Capabilities`] is derived from
//! the same table so clients can gate UI without keeping their own copy.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::utils::error::ErpError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Admin,
    Manager,
    ProcurementOfficer,
    FinanceOfficer,
    HrOfficer,
    SafetyOfficer,
    Supervisor,
    Employee,
}

impl Role {
    pub const ALL: [Role; 8] = [
        Role::Admin,
        Role::Manager,
        Role::ProcurementOfficer,
        Role::FinanceOfficer,
        Role::HrOfficer,
        Role::SafetyOfficer,
        Role::Supervisor,
        Role::Employee,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "ADMIN",
            Role::Manager => "MANAGER",
            Role::ProcurementOfficer => "PROCUREMENT_OFFICER",
            Role::FinanceOfficer => "FINANCE_OFFICER",
            Role::HrOfficer => "HR_OFFICER",
            Role::SafetyOfficer => "SAFETY_OFFICER",
            Role::Supervisor => "SUPERVISOR",
            Role::Employee => "EMPLOYEE",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ErpError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase().replace(['-', ' '], "_");
        Role::ALL
            .into_iter()
            .find(|r| r.as_str() == normalized)
            .ok_or_else(|| ErpError::validation(format!("Unknown role: {}", s)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    CreateRequisition,
    SubmitRequisition,
    ApproveRequisition,
    RejectRequisition,
    CancelRequisition,
    DecideInvoice,
    DecidePurchaseRequest,
    DecideItRequest,
    DecidePaymentRequest,
    ReportIncident,
    ManageInventory,
    ViewFinance,
    ManageHr,
}

impl Action {
    pub fn describe(&self) -> &'static str {
        match self {
            Action::CreateRequisition => "create requisitions",
            Action::SubmitRequisition => "submit requisitions",
            Action::ApproveRequisition => "approve requisitions",
            Action::RejectRequisition => "reject requisitions",
            Action::CancelRequisition => "cancel requisitions",
            Action::DecideInvoice => "decide invoices",
            Action::DecidePurchaseRequest => "decide purchase requests",
            Action::DecideItRequest => "decide IT requests",
            Action::DecidePaymentRequest => "decide payment requests",
            Action::ReportIncident => "report incidents",
            Action::ManageInventory => "manage inventory",
            Action::ViewFinance => "view finance",
            Action::ManageHr => "manage HR records",
        }
    }
}

use Role::*;

const EVERYONE: &[Role] = &[
    Admin,
    Manager,
    ProcurementOfficer,
    FinanceOfficer,
    HrOfficer,
    SafetyOfficer,
    Supervisor,
    Employee,
];

/// Roles allowed to perform `action`.
pub fn allowed_roles(action: Action) -> &'static [Role] {
    match action {
        Action::CreateRequisition | Action::SubmitRequisition | Action::ReportIncident => EVERYONE,
        Action::ApproveRequisition | Action::RejectRequisition => {
            &[Admin, Manager, ProcurementOfficer, FinanceOfficer]
        }
        Action::CancelRequisition => &[Admin, Manager, ProcurementOfficer],
        Action::DecideInvoice | Action::DecidePaymentRequest => &[Admin, FinanceOfficer],
        Action::DecidePurchaseRequest => &[Admin, Manager, ProcurementOfficer],
        Action::DecideItRequest => &[Admin, Manager],
        Action::ManageInventory => &[Admin, ProcurementOfficer, Supervisor],
        Action::ViewFinance => &[Admin, Manager, FinanceOfficer],
        Action::ManageHr => &[Admin, HrOfficer],
    }
}

pub fn is_allowed(role: Role, action: Action) -> bool {
    allowed_roles(action).contains(&role)
}

pub fn ensure_allowed(role: Role, action: Action) -> crate::utils::error::Result<()> {
    if is_allowed(role, action) {
        Ok(())
    } else {
        Err(ErpError::Forbidden {
            role: role.to_string(),
            action: action.describe().to_string(),
        })
    }
}

/// UI gating flags derived from the policy table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Capabilities {
    pub can_approve: bool,
    pub can_reject: bool,
    pub can_cancel: bool,
    pub can_create_requisition: bool,
    pub can_report_incident: bool,
    pub can_manage_inventory: bool,
    pub can_view_finance: bool,
    pub can_manage_hr: bool,
}

impl Capabilities {
    pub fn for_role(role: Role) -> Self {
        Self {
            can_approve: is_allowed(role, Action::ApproveRequisition),
            can_reject: is_allowed(role, Action::RejectRequisition),
            can_cancel: is_allowed(role, Action::CancelRequisition),
            can_create_requisition: is_allowed(role, Action::CreateRequisition),
            can_report_incident: is_allowed(role, Action::ReportIncident),
            can_manage_inventory: is_allowed(role, Action::ManageInventory),
            can_view_finance: is_allowed(role, Action::ViewFinance),
            can_manage_hr: is_allowed(role, Action::ManageHr),
        }
    }
}
