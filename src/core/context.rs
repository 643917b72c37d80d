//! Process-wide wiring: storage, session, API client, queues and the outbox worker.
//!
//! Built once at startup with [`AppContext::init`] and torn down with
//! [`AppContext::shutdown`], which stops the worker after its current flush.

use crate::config::toml_config::AppConfig;
use crate::core::api::ErpApi;
use crate::core::connectivity::{NetworkMonitor, ReachabilityCheck};
use crate::core::http_client::{ApiClient, SessionStore};
use crate::core::incident_queue::IncidentJob;
use crate::core::outbox::{FlushReport, OfflineQueue};
use crate::core::receipt_queue::ReceiptJob;
use crate::core::storage::FileKeyValueStore;
use crate::core::worker::{Flushable, OutboxWorker};
use crate::domain::approval::{self, Approval, Decision};
use crate::domain::model::{Actor, DeviceRegistration};
use crate::domain::ports::{Connectivity, KeyValueStore};
use crate::utils::error::{ApiError, ErpError, Result};
use crate::utils::validation::{validate_non_empty_string, validate_required_field, Validate};
use std::sync::Arc;

pub struct AppContext {
    config: AppConfig,
    store: Arc<dyn KeyValueStore>,
    api: ErpApi,
    network: NetworkMonitor,
    incidents: Arc<OfflineQueue<IncidentJob>>,
    receipts: Arc<OfflineQueue<ReceiptJob>>,
    worker: Option<OutboxWorker>,
}

impl AppContext {
    /// Validates the config and opens the on-disk store under `storage.data_dir`.
    pub async fn init(config: AppConfig) -> Result<Self> {
        config.validate()?;
        let store: Arc<dyn KeyValueStore> =
            Arc::new(FileKeyValueStore::new(&config.storage.data_dir));
        Self::with_store(config, store).await
    }

    pub async fn with_store(config: AppConfig, store: Arc<dyn KeyValueStore>) -> Result<Self> {
        let session = SessionStore::load(store.clone()).await?;
        let client = ApiClient::new(&config.api.base_url, config.request_timeout(), session)?;
        client.set_sign_out_handler(|| {
            tracing::warn!("session expired, signed out");
        });
        let api = ErpApi::new(client);

        let network = NetworkMonitor::new(true);
        let connectivity: Arc<dyn Connectivity> =
            Arc::new(ReachabilityCheck::new(network.clone(), api.clone()));

        let incidents = OfflineQueue::load(
            IncidentJob::new(api.clone()),
            store.clone(),
            connectivity.clone(),
            config.backoff(),
        )
        .await?;
        let receipts = OfflineQueue::load(
            ReceiptJob::new(api.clone()),
            store.clone(),
            connectivity,
            config.backoff(),
        )
        .await?;

        tracing::debug!(
            base_url = %config.api.base_url,
            data_dir = %config.storage.data_dir,
            "application context ready"
        );

        Ok(Self {
            config,
            store,
            api,
            network,
            incidents: Arc::new(incidents),
            receipts: Arc::new(receipts),
            worker: None,
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn KeyValueStore> {
        &self.store
    }

    pub fn api(&self) -> &ErpApi {
        &self.api
    }

    /// Feed platform network events here; the worker flushes on the offline → online edge.
    pub fn network(&self) -> &NetworkMonitor {
        &self.network
    }

    pub fn incidents(&self) -> &Arc<OfflineQueue<IncidentJob>> {
        &self.incidents
    }

    pub fn receipts(&self) -> &Arc<OfflineQueue<ReceiptJob>> {
        &self.receipts
    }

    fn queues(&self) -> Vec<Arc<dyn Flushable>> {
        vec![
            self.incidents.clone() as Arc<dyn Flushable>,
            self.receipts.clone() as Arc<dyn Flushable>,
        ]
    }

    /// Flushes every queue in turn and reports per queue.
    pub async fn flush_outbox(&self, force: bool) -> Result<Vec<(&'static str, FlushReport)>> {
        let mut reports = Vec::new();
        for queue in self.queues() {
            let report = queue.flush(force).await?;
            reports.push((queue.label(), report));
        }
        Ok(reports)
    }

    pub fn start_worker(&mut self) {
        if self.worker.as_ref().is_some_and(|w| w.is_running()) {
            tracing::debug!("outbox worker already running");
            return;
        }
        self.worker = Some(OutboxWorker::start(
            self.queues(),
            self.config.tick_interval(),
            self.network.subscribe(),
        ));
    }

    pub fn is_worker_running(&self) -> bool {
        self.worker.as_ref().is_some_and(|w| w.is_running())
    }

    pub async fn shutdown(mut self) {
        if let Some(worker) = self.worker.take() {
            worker.shutdown().await;
        }
        tracing::info!("application context shut down");
    }

    /// The user of the stored session, or a 401-style error when nobody signed in.
    pub async fn signed_in_actor(&self) -> Result<Actor> {
        self.api.client().session().actor().await.ok_or_else(|| {
            ErpError::Api(ApiError::http(401, "Not signed in. Run `mining-erp login` first."))
        })
    }

    /// Pending approvals the signed-in user may decide.
    pub async fn actionable_approvals(&self) -> Result<Vec<Approval>> {
        let actor = self.signed_in_actor().await?;
        let pending = self.api.pending_approvals().await?;
        let actionable: Vec<Approval> = approval::actionable_for(&actor, &pending)
            .into_iter()
            .cloned()
            .collect();
        tracing::debug!(
            pending = pending.len(),
            actionable = actionable.len(),
            role = %actor.role,
            "approvals filtered by role"
        );
        Ok(actionable)
    }

    /// Checks the decision locally against the role policy, then sends it.
    pub async fn decide_approval(
        &self,
        id: &str,
        decision: Decision,
        comment: Option<String>,
    ) -> Result<Approval> {
        let actor = self.signed_in_actor().await?;
        let mut local = self
            .api
            .pending_approvals()
            .await?
            .into_iter()
            .find(|a| a.id == id)
            .ok_or_else(|| ErpError::not_found("pending approval", id))?;
        approval::decide(&actor, &mut local, decision, comment)?;

        Ok(self.api.decide_approval(id, decision, local.comment).await?)
    }

    /// Registers this device for push notifications under `device.device_id`.
    pub async fn register_device(&self, push_token: &str) -> Result<DeviceRegistration> {
        validate_non_empty_string("push token", push_token)?;
        let device_id = validate_required_field("device.device_id", &self.config.device.device_id)?;

        let registration = DeviceRegistration {
            device_id: device_id.clone(),
            platform: self.config.platform()?,
            push_token: push_token.trim().to_string(),
            app_version: self.config.device.app_version.clone(),
        };
        self.api.register_device(&registration).await?;
        tracing::info!(device = %registration.device_id, "device registered for push");
        Ok(registration)
    }
}
