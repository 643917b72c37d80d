use crate::domain::model::AuditEntry;
use crate::domain::ports::RequisitionRepository;
use crate::domain::requisition::Requisition;
use crate::utils::error::{ErpError, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct Tables {
    requisitions: HashMap<String, Requisition>,
    // insertion order, so listings are stable
    order: Vec<String>,
    audit: Vec<AuditEntry>,
}

/// Process-local requisition repository.
#[derive(Debug, Clone, Default)]
pub struct InMemoryRequisitionRepository {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryRequisitionRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RequisitionRepository for InMemoryRequisitionRepository {
    async fn insert(&self, requisition: Requisition) -> Result<()> {
        let mut tables = self.tables.write().await;
        if tables.requisitions.contains_key(&requisition.id) {
            return Err(ErpError::StorageError {
                message: format!("requisition {} already exists", requisition.id),
            });
        }
        tables.order.push(requisition.id.clone());
        tables.requisitions.insert(requisition.id.clone(), requisition);
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Requisition>> {
        Ok(self.tables.read().await.requisitions.get(id).cloned())
    }

    async fn update(&self, requisition: Requisition) -> Result<()> {
        let mut tables = self.tables.write().await;
        match tables.requisitions.get_mut(&requisition.id) {
            Some(slot) => {
                *slot = requisition;
                Ok(())
            }
            None => Err(ErpError::not_found("Requisition", &requisition.id)),
        }
    }

    async fn list(&self) -> Result<Vec<Requisition>> {
        let tables = self.tables.read().await;
        Ok(tables
            .order
            .iter()
            .filter_map(|id| tables.requisitions.get(id).cloned())
            .collect())
    }

    async fn append_audit(&self, entry: AuditEntry) -> Result<()> {
        self.tables.write().await.audit.push(entry);
        Ok(())
    }

    async fn audit_for(&self, entity_id: &str) -> Result<Vec<AuditEntry>> {
        Ok(self
            .tables
            .read()
            .await
            .audit
            .iter()
            .filter(|e| e.entity_id == entity_id)
            .cloned()
            .collect())
    }
}
