use crate::core::api::ErpApi;
use crate::domain::ports::Connectivity;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::watch;

/// Last known network state, fed by the platform's network listener.
///
/// Subscribers get a `watch` receiver so they can react to the
/// offline → online edge.
#[derive(Debug, Clone)]
pub struct NetworkMonitor {
    sender: Arc<watch::Sender<bool>>,
}

impl NetworkMonitor {
    pub fn new(online: bool) -> Self {
        let (sender, _) = watch::channel(online);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn set_online(&self, online: bool) {
        let changed = self.sender.send_if_modified(|state| {
            if *state == online {
                false
            } else {
                *state = online;
                true
            }
        });
        if changed {
            tracing::info!(online, "network state changed");
        }
    }

    pub fn is_online_now(&self) -> bool {
        *self.sender.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.sender.subscribe()
    }
}

#[async_trait]
impl Connectivity for NetworkMonitor {
    async fn is_online(&self) -> bool {
        self.is_online_now()
    }
}

/// Trusts the monitor when it says offline, otherwise confirms the backend answers.
pub struct ReachabilityCheck {
    monitor: NetworkMonitor,
    api: ErpApi,
}

impl ReachabilityCheck {
    pub fn new(monitor: NetworkMonitor, api: ErpApi) -> Self {
        Self { monitor, api }
    }
}

#[async_trait]
impl Connectivity for ReachabilityCheck {
    async fn is_online(&self) -> bool {
        if !self.monitor.is_online_now() {
            return false;
        }
        let reachable = self.api.is_reachable().await;
        if !reachable {
            tracing::debug!("network up but backend unreachable");
        }
        reachable
    }
}
