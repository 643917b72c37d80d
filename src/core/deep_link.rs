//! `miningerp://` deep links and error-driven navigation.

use crate::utils::error::ApiError;
use serde::Serialize;
use url::Url;

pub const SCHEME: &str = "miningerp";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "screen", rename_all = "camelCase")]
pub enum Screen {
    Home,
    Requisitions,
    RequisitionDetail { id: String },
    Approvals,
    ApprovalDetail { id: String },
    IncidentDetail { id: String },
    NewIncident,
    ExpenseDetail { id: String },
    DocumentDetail { id: String },
    Notifications,
    Outbox,
    NoAccess,
    NotFound,
}

/// Route patterns understood by [`resolve`], for help output.
pub const ROUTES: &[&str] = &[
    "home",
    "requisitions",
    "requisitions/:id",
    "approvals",
    "approvals/:id",
    "incidents/new",
    "incidents/:id",
    "expenses/:id",
    "documents/:id",
    "notifications",
    "outbox",
];

/// Maps a deep link to a screen. Returns `None` for foreign schemes and unknown routes.
pub fn resolve(link: &str) -> Option<Screen> {
    let url = Url::parse(link.trim()).ok()?;
    if url.scheme() != SCHEME {
        return None;
    }

    let host = url.host_str().unwrap_or_default();
    let mut segments: Vec<&str> = Vec::new();
    if !host.is_empty() {
        segments.push(host);
    }
    segments.extend(url.path().split('/').filter(|s| !s.is_empty()));

    let screen = match segments.as_slice() {
        [] | ["home"] => Screen::Home,
        ["requisitions"] => Screen::Requisitions,
        ["requisitions", id] => Screen::RequisitionDetail { id: id.to_string() },
        ["approvals"] => Screen::Approvals,
        ["approvals", id] => Screen::ApprovalDetail { id: id.to_string() },
        ["incidents", "new"] => Screen::NewIncident,
        ["incidents", id] => Screen::IncidentDetail { id: id.to_string() },
        ["expenses", id] => Screen::ExpenseDetail { id: id.to_string() },
        ["documents", id] => Screen::DocumentDetail { id: id.to_string() },
        ["notifications"] => Screen::Notifications,
        ["outbox"] => Screen::Outbox,
        _ => {
            tracing::debug!("no route for deep link {}", link);
            return None;
        }
    };
    Some(screen)
}

impl ApiError {
    /// Screen to show instead of an inline error when loading a detail view fails.
    pub fn detail_route(&self) -> Option<Screen> {
        match self.status {
            Some(403) => Some(Screen::NoAccess),
            Some(404) => Some(Screen::NotFound),
            _ => None,
        }
    }
}
