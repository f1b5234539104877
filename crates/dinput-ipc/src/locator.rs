//! Service lookup and availability notifications.

use std::sync::Arc;

use async_trait::async_trait;
use dinput_types::ServiceRole;
use tokio::sync::mpsc;

use crate::error::IpcError;
use crate::service::{SinkService, SourceService};

/// Whether a service came up or went away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AvailabilityKind {
    Added,
    Removed,
}

/// A system-wide service availability change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AvailabilityEvent {
    pub role: ServiceRole,
    pub kind: AvailabilityKind,
}

/// Platform service discovery.
///
/// Lookups may block while the service is loading; callers bound them with a
/// timeout.
#[async_trait]
pub trait ServiceLocator: Send + Sync + 'static {
    /// Look up the source service, `None` if it is not running.
    async fn get_source_service(&self) -> Option<Arc<dyn SourceService>>;

    /// Look up the sink service, `None` if it is not running.
    async fn get_sink_service(&self) -> Option<Arc<dyn SinkService>>;

    /// Subscribe to add/remove notifications for both services.
    fn subscribe(&self, tx: mpsc::UnboundedSender<AvailabilityEvent>) -> Result<(), IpcError>;
}
