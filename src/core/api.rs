use crate::core::http_client::ApiClient;
use crate::domain::approval::{Approval, Decision, DecisionRequest};
use crate::domain::model::{DeviceRegistration, DocumentUpload, IncidentDraft, UploadedDocument};
use crate::domain::requisition::{NewRequisition, Requisition};
use crate::utils::error::{ApiError, ApiResult};
use serde::{Deserialize, Serialize};
use url::Url;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteIncident {
    pub id: String,
    #[serde(default)]
    pub photo_urls: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct UnreadCount {
    count: u64,
}

/// Builds `/a/b/c`, percent-encoding each segment so an id can never add or climb path levels.
fn resource_path(segments: &[&str]) -> ApiResult<String> {
    let mut url = Url::parse("http://localhost/").map_err(|e| ApiError::unknown(e.to_string()))?;
    {
        let mut path = url
            .path_segments_mut()
            .map_err(|_| ApiError::unknown("base URL cannot hold a path"))?;
        for segment in segments {
            if segment.trim().is_empty() || *segment == "." || *segment == ".." {
                return Err(ApiError::unknown(format!("invalid path segment {:?}", segment)));
            }
            path.push(segment);
        }
    }
    Ok(url.path().to_string())
}

/// Typed wrappers over the backend REST endpoints.
#[derive(Clone)]
pub struct ErpApi {
    client: ApiClient,
}

impl ErpApi {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &ApiClient {
        &self.client
    }

    pub async fn create_incident(&self, draft: &IncidentDraft) -> ApiResult<RemoteIncident> {
        self.client.post_json("/safety/incidents", draft).await
    }

    pub async fn patch_incident_photos(
        &self,
        incident_id: &str,
        photo_urls: &[String],
    ) -> ApiResult<()> {
        let body = serde_json::json!({ "photoUrls": photo_urls });
        self.client
            .patch_json::<_, serde_json::Value>(
                &resource_path(&["safety", "incidents", incident_id])?,
                &body,
            )
            .await
            .map(|_| ())
    }

    pub async fn patch_expense_receipt(
        &self,
        expense_id: &str,
        receipt: &UploadedDocument,
    ) -> ApiResult<()> {
        let body = serde_json::json!({
            "receiptUrl": receipt.url,
            "receiptDocumentId": receipt.id,
        });
        self.client
            .patch_json::<_, serde_json::Value>(
                &resource_path(&["finance", "expenses", expense_id])?,
                &body,
            )
            .await
            .map(|_| ())
    }

    pub async fn upload_document(&self, upload: DocumentUpload) -> ApiResult<UploadedDocument> {
        self.client.upload_document(upload).await
    }

    pub async fn list_requisitions(&self) -> ApiResult<Vec<Requisition>> {
        self.client.get_json("/procurement/requisitions").await
    }

    pub async fn get_requisition(&self, id: &str) -> ApiResult<Requisition> {
        self.client
            .get_json(&resource_path(&["procurement", "requisitions", id])?)
            .await
    }

    pub async fn create_requisition(&self, new: &NewRequisition) -> ApiResult<Requisition> {
        self.client.post_json("/procurement/requisitions", new).await
    }

    pub async fn submit_requisition(&self, id: &str) -> ApiResult<Requisition> {
        self.requisition_action(id, "submit", serde_json::json!({}))
            .await
    }

    pub async fn approve_requisition(
        &self,
        id: &str,
        comment: Option<&str>,
    ) -> ApiResult<Requisition> {
        self.requisition_action(id, "approve", serde_json::json!({ "comment": comment }))
            .await
    }

    pub async fn reject_requisition(&self, id: &str, reason: &str) -> ApiResult<Requisition> {
        self.requisition_action(id, "reject", serde_json::json!({ "reason": reason }))
            .await
    }

    pub async fn cancel_requisition(&self, id: &str) -> ApiResult<Requisition> {
        self.requisition_action(id, "cancel", serde_json::json!({}))
            .await
    }

    async fn requisition_action(
        &self,
        id: &str,
        action: &str,
        body: serde_json::Value,
    ) -> ApiResult<Requisition> {
        self.client
            .post_json(
                &resource_path(&["procurement", "requisitions", id, action])?,
                &body,
            )
            .await
    }

    pub async fn pending_approvals(&self) -> ApiResult<Vec<Approval>> {
        self.client.get_json("/approvals?status=PENDING").await
    }

    pub async fn decide_approval(
        &self,
        id: &str,
        decision: Decision,
        comment: Option<String>,
    ) -> ApiResult<Approval> {
        let body = DecisionRequest { decision, comment };
        self.client
            .post_json(&resource_path(&["approvals", id, "decision"])?, &body)
            .await
    }

    pub async fn register_device(&self, registration: &DeviceRegistration) -> ApiResult<()> {
        self.client
            .post_json::<_, serde_json::Value>("/notifications/devices", registration)
            .await
            .map(|_| ())
    }

    pub async fn unread_notification_count(&self) -> ApiResult<u64> {
        let unread: UnreadCount = self.client.get_json("/notifications/unread-count").await?;
        Ok(unread.count)
    }

    pub async fn is_reachable(&self) -> bool {
        self.client.probe("/health").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::http_client::SessionStore;
    use crate::core::storage::MemoryKeyValueStore;
    use crate::domain::model::Platform;
    use httpmock::prelude::*;
    use std::sync::Arc;
    use std::time::Duration;

    async fn api_for(server: &MockServer) -> ErpApi {
        let session = SessionStore::load(Arc::new(MemoryKeyValueStore::new()))
            .await
            .unwrap();
        ErpApi::new(ApiClient::new(&server.base_url(), Duration::from_secs(5), session).unwrap())
    }

    #[tokio::test]
    async fn test_register_device_payload() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/notifications/devices")
                .json_body(serde_json::json!({
                    "deviceId": "dev-42",
                    "platform": "android",
                    "pushToken": "ExponentPushToken[xyz]",
                    "appVersion": "2.3.1"
                }));
            then.status(201).json_body(serde_json::json!({"id": "reg-1"}));
        });

        let api = api_for(&server).await;
        api.register_device(&DeviceRegistration {
            device_id: "dev-42".into(),
            platform: Platform::Android,
            push_token: "ExponentPushToken[xyz]".into(),
            app_version: "2.3.1".into(),
        })
        .await
        .unwrap();

        mock.assert();
    }

    #[tokio::test]
    async fn test_decide_approval_posts_decision() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/approvals/ap-9/decision")
                .json_body(serde_json::json!({"decision": "REJECT", "comment": "duplicate"}));
            then.status(200).json_body(serde_json::json!({
                "id": "ap-9",
                "kind": "INVOICE",
                "referenceId": "inv-3",
                "title": "Explosives supplier invoice",
                "requestedBy": "u-2",
                "status": "REJECTED",
                "decidedBy": "u-fin",
                "comment": "duplicate"
            }));
        });

        let api = api_for(&server).await;
        let approval = api
            .decide_approval("ap-9", Decision::Reject, Some("duplicate".into()))
            .await
            .unwrap();

        mock.assert();
        assert_eq!(
            approval.status,
            crate::domain::approval::ApprovalStatus::Rejected
        );
    }

    #[tokio::test]
    async fn test_unread_count_and_forbidden_detail() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/notifications/unread-count");
            then.status(200).json_body(serde_json::json!({"count": 7}));
        });
        server.mock(|when, then| {
            when.method(GET).path("/procurement/requisitions/r-1");
            then.status(403)
                .json_body(serde_json::json!({"statusCode": 403, "message": "Forbidden resource"}));
        });

        let api = api_for(&server).await;
        assert_eq!(api.unread_notification_count().await.unwrap(), 7);

        let err = api.get_requisition("r-1").await.unwrap_err();
        assert_eq!(err.status, Some(403));
        assert_eq!(err.message, "Forbidden resource");
    }

    #[test]
    fn test_resource_path_encodes_ids() {
        assert_eq!(
            resource_path(&["procurement", "requisitions", "r-1", "cancel"]).unwrap(),
            "/procurement/requisitions/r-1/cancel"
        );
        assert_eq!(
            resource_path(&["approvals", "../admin", "decision"]).unwrap(),
            "/approvals/..%2Fadmin/decision"
        );
        assert_eq!(
            resource_path(&["finance", "expenses", "exp 9?x=1"]).unwrap(),
            "/finance/expenses/exp%209%3Fx=1"
        );
        assert!(resource_path(&["approvals", "..", "decision"]).is_err());
        assert!(resource_path(&["safety", "incidents", ""]).is_err());
    }

    #[tokio::test]
    async fn test_dot_segment_id_never_reaches_the_server() {
        let server = MockServer::start();
        let any = server.mock(|when, then| {
            when.path_contains("requisitions");
            then.status(200).json_body(serde_json::json!({}));
        });

        let api = api_for(&server).await;
        assert!(api.cancel_requisition("..").await.is_err());
        assert!(api.get_requisition(" ").await.is_err());
        any.assert_hits(0);
    }
}
