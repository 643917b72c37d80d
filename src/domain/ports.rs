use crate::domain::model::AuditEntry;
use crate::domain::requisition::Requisition;
use crate::utils::error::{ApiError, Result};
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};

/// On-device key-value storage holding JSON blobs (session, queues).
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: &str) -> Result<()>;
    async fn remove(&self, key: &str) -> Result<()>;
}

/// Answers "can we reach the backend right now?" before a flush does network I/O.
#[async_trait]
pub trait Connectivity: Send + Sync {
    async fn is_online(&self) -> bool;
}

/// Saves a job's partial progress onto its queue item while delivery is still running.
#[async_trait]
pub trait Checkpoint<P: Send + Sync>: Send + Sync {
    async fn save(&self, payload: &P);
}

/// A unit of work the offline queue knows how to deliver.
///
/// `deliver` receives the payload mutably so that multi-step jobs can record
/// progress (remote ids, finished uploads). Each finished step is handed to
/// `checkpoint` so the progress survives a crash before delivery returns.
#[async_trait]
pub trait QueueJob: Send + Sync {
    type Payload: Serialize + DeserializeOwned + Clone + Send + Sync + 'static;

    /// Storage key the queue is persisted under.
    fn storage_key(&self) -> &'static str;

    /// Short name used in logs.
    fn label(&self) -> &'static str;

    async fn deliver(
        &self,
        item_id: &str,
        payload: &mut Self::Payload,
        checkpoint: &dyn Checkpoint<Self::Payload>,
    ) -> std::result::Result<(), ApiError>;
}

/// Persistence for requisitions and their audit trail.
pub trait RequisitionRepository: Clone + Send + Sync + 'static {
    fn insert(
        &self,
        requisition: Requisition,
    ) -> impl std::future::Future<Output = Result<()>> + Send;

    fn get(
        &self,
        id: &str,
    ) -> impl std::future::Future<Output = Result<Option<Requisition>>> + Send;

    fn update(
        &self,
        requisition: Requisition,
    ) -> impl std::future::Future<Output = Result<()>> + Send;

    fn list(&self) -> impl std::future::Future<Output = Result<Vec<Requisition>>> + Send;

    fn append_audit(
        &self,
        entry: AuditEntry,
    ) -> impl std::future::Future<Output = Result<()>> + Send;

    fn audit_for(
        &self,
        entity_id: &str,
    ) -> impl std::future::Future<Output = Result<Vec<AuditEntry>>> + Send;
}
