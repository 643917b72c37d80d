//! Offline delivery of safety incident reports with photos.
//!
//! Delivery is three steps: create the incident, upload each photo, then link
//! the photo URLs to the incident. Progress is stored on the payload so a retry
//! resumes where the last attempt stopped.

use crate::core::api::ErpApi;
use crate::domain::model::{DocumentUpload, IncidentDraft, LocalAttachment};
use crate::domain::ports::{Checkpoint, QueueJob};
use crate::utils::error::{ApiError, Result};
use crate::utils::validation::{
    validate_file_extensions, validate_non_empty_string, ATTACHMENT_EXTENSIONS,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub const INCIDENT_QUEUE_KEY: &str = "outbox.incidents";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadedPhoto {
    pub index: usize,
    pub document_id: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncidentSubmission {
    pub draft: IncidentDraft,
    #[serde(default)]
    pub photos: Vec<LocalAttachment>,
    #[serde(default)]
    pub remote_incident_id: Option<String>,
    #[serde(default)]
    pub uploaded_photos: Vec<UploadedPhoto>,
    #[serde(default)]
    pub photos_linked: bool,
}

impl IncidentSubmission {
    pub fn new(draft: IncidentDraft, photos: Vec<LocalAttachment>) -> Result<Self> {
        validate_non_empty_string("location", &draft.location)?;
        validate_non_empty_string("description", &draft.description)?;
        let paths: Vec<String> = photos.iter().map(|p| p.path.clone()).collect();
        validate_file_extensions("photos", &paths, ATTACHMENT_EXTENSIONS)?;

        Ok(Self {
            draft,
            photos,
            remote_incident_id: None,
            uploaded_photos: Vec::new(),
            photos_linked: false,
        })
    }

    pub fn pending_photo_count(&self) -> usize {
        self.photos.len() - self.uploaded_photos.len().min(self.photos.len())
    }
}

pub struct IncidentJob {
    api: ErpApi,
}

impl IncidentJob {
    pub fn new(api: ErpApi) -> Self {
        Self { api }
    }
}

async fn read_attachment(attachment: &LocalAttachment) -> std::result::Result<Vec<u8>, ApiError> {
    tokio::fs::read(&attachment.path)
        .await
        .map_err(|e| ApiError::unknown(format!("cannot read {}: {}", attachment.path, e)))
}

#[async_trait]
impl QueueJob for IncidentJob {
    type Payload = IncidentSubmission;

    fn storage_key(&self) -> &'static str {
        INCIDENT_QUEUE_KEY
    }

    fn label(&self) -> &'static str {
        "incidents"
    }

    async fn deliver(
        &self,
        item_id: &str,
        payload: &mut IncidentSubmission,
        checkpoint: &dyn Checkpoint<IncidentSubmission>,
    ) -> std::result::Result<(), ApiError> {
        let incident_id = match &payload.remote_incident_id {
            Some(id) => id.clone(),
            None => {
                let created = self.api.create_incident(&payload.draft).await?;
                tracing::debug!(item = item_id, incident = %created.id, "incident created");
                payload.remote_incident_id = Some(created.id.clone());
                checkpoint.save(payload).await;
                created.id
            }
        };

        for (index, photo) in payload.photos.iter().enumerate() {
            if payload.uploaded_photos.iter().any(|p| p.index == index) {
                continue;
            }
            let bytes = read_attachment(photo).await?;
            let uploaded = self
                .api
                .upload_document(DocumentUpload {
                    category: "INCIDENT_PHOTO".to_string(),
                    module: "safety".to_string(),
                    reference_id: incident_id.clone(),
                    client_upload_id: Some(format!("{}:{}", item_id, index)),
                    file_name: photo.file_name(),
                    mime_type: photo.mime_type.clone(),
                    bytes,
                })
                .await?;
            payload.uploaded_photos.push(UploadedPhoto {
                index,
                document_id: uploaded.id,
                url: uploaded.url,
            });
            checkpoint.save(payload).await;
        }

        if !payload.photos.is_empty() && !payload.photos_linked {
            let mut uploaded = payload.uploaded_photos.clone();
            uploaded.sort_by_key(|p| p.index);
            let urls: Vec<String> = uploaded.into_iter().map(|p| p.url).collect();
            self.api.patch_incident_photos(&incident_id, &urls).await?;
            payload.photos_linked = true;
        }

        Ok(())
    }
}
