//! Offline delivery of expense receipts: upload the file, then attach it to the expense.

use crate::core::api::ErpApi;
use crate::domain::model::{DocumentUpload, LocalAttachment, UploadedDocument};
use crate::domain::ports::{Checkpoint, QueueJob};
use crate::utils::error::{ApiError, Result};
use crate::utils::validation::{
    validate_file_extensions, validate_non_empty_string, ATTACHMENT_EXTENSIONS,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub const RECEIPT_QUEUE_KEY: &str = "outbox.receipts";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiptSubmission {
    pub expense_id: String,
    pub receipt: LocalAttachment,
    #[serde(default)]
    pub uploaded: Option<UploadedDocument>,
}

impl ReceiptSubmission {
    pub fn new(expense_id: impl Into<String>, receipt: LocalAttachment) -> Result<Self> {
        let expense_id = expense_id.into();
        validate_non_empty_string("expense id", &expense_id)?;
        validate_file_extensions(
            "receipt",
            std::slice::from_ref(&receipt.path),
            ATTACHMENT_EXTENSIONS,
        )?;
        Ok(Self {
            expense_id,
            receipt,
            uploaded: None,
        })
    }
}

pub struct ReceiptJob {
    api: ErpApi,
}

impl ReceiptJob {
    pub fn new(api: ErpApi) -> Self {
        Self { api }
    }
}

#[async_trait]
impl QueueJob for ReceiptJob {
    type Payload = ReceiptSubmission;

    fn storage_key(&self) -> &'static str {
        RECEIPT_QUEUE_KEY
    }

    fn label(&self) -> &'static str {
        "receipts"
    }

    async fn deliver(
        &self,
        item_id: &str,
        payload: &mut ReceiptSubmission,
        checkpoint: &dyn Checkpoint<ReceiptSubmission>,
    ) -> std::result::Result<(), ApiError> {
        let uploaded = match &payload.uploaded {
            Some(doc) => doc.clone(),
            None => {
                let bytes = tokio::fs::read(&payload.receipt.path).await.map_err(|e| {
                    ApiError::unknown(format!("cannot read {}: {}", payload.receipt.path, e))
                })?;
                let doc = self
                    .api
                    .upload_document(DocumentUpload {
                        category: "RECEIPT".to_string(),
                        module: "finance".to_string(),
                        reference_id: payload.expense_id.clone(),
                        client_upload_id: Some(format!("{}:0", item_id)),
                        file_name: payload.receipt.file_name(),
                        mime_type: payload.receipt.mime_type.clone(),
                        bytes,
                    })
                    .await?;
                payload.uploaded = Some(doc.clone());
                checkpoint.save(payload).await;
                doc
            }
        };

        self.api
            .patch_expense_receipt(&payload.expense_id, &uploaded)
            .await?;
        tracing::debug!(item = item_id, expense = %payload.expense_id, "receipt attached");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_receipt_submission_validation() {
        assert!(ReceiptSubmission::new("exp-1", LocalAttachment::from_path("r.pdf")).is_ok());
        assert!(ReceiptSubmission::new("", LocalAttachment::from_path("r.pdf")).is_err());
        assert!(ReceiptSubmission::new("exp-1", LocalAttachment::from_path("r.docx")).is_err());
    }
}
