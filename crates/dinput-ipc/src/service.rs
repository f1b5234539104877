//! The remote source and sink service contracts.

use std::sync::Arc;

use async_trait::async_trait;
use dinput_types::{
    DeviceId, DhId, EnableParams, InputTypeMask, ListenerId, ProxyToken, SessionPeer,
};
use tokio::sync::mpsc;

use crate::callback::{
    DelWhiteListCallback, PrepareCallback, RegisterCallback, ScreenInfoCallback,
    SessionStateCallback, SharingDhIdListener, SimulationEventListener, StartCallback,
    StartStopDhIdsCallback, StopCallback, UnprepareCallback, UnregisterCallback,
    WhiteListCallback,
};
use crate::error::IpcError;

/// Identity and liveness of an object living in another process.
pub trait RemoteObject: Send + Sync + 'static {
    /// Stable identity of this incarnation of the object.
    fn token(&self) -> ProxyToken;

    /// Whether the hosting process is still alive.
    fn is_alive(&self) -> bool;

    /// Ask to be told (with this object's token) when it dies.
    ///
    /// Returns `false` if the object is already dead.
    fn add_death_recipient(&self, tx: mpsc::UnboundedSender<ProxyToken>) -> bool;

    /// Drop a death recipient added earlier.
    fn remove_death_recipient(&self);
}

/// The service hosting the source role.
///
/// Every method returns once the request has been handed over. Requests that
/// take a one-shot callback complete later through it; an `Err` return means
/// the request never reached the service and its callback will not fire.
#[async_trait]
pub trait SourceService: RemoteObject {
    async fn init(&self) -> Result<(), IpcError>;

    async fn release(&self) -> Result<(), IpcError>;

    async fn register_distributed_hardware(
        &self,
        device_id: &DeviceId,
        dh_id: &DhId,
        params: &EnableParams,
        callback: Arc<dyn RegisterCallback>,
    ) -> Result<(), IpcError>;

    async fn unregister_distributed_hardware(
        &self,
        device_id: &DeviceId,
        dh_id: &DhId,
        callback: Arc<dyn UnregisterCallback>,
    ) -> Result<(), IpcError>;

    async fn prepare_remote_input(
        &self,
        peer: &SessionPeer,
        callback: Arc<dyn PrepareCallback>,
    ) -> Result<(), IpcError>;

    async fn unprepare_remote_input(
        &self,
        peer: &SessionPeer,
        callback: Arc<dyn UnprepareCallback>,
    ) -> Result<(), IpcError>;

    async fn start_remote_input(
        &self,
        peer: &SessionPeer,
        input_types: InputTypeMask,
        callback: Arc<dyn StartCallback>,
    ) -> Result<(), IpcError>;

    async fn stop_remote_input(
        &self,
        peer: &SessionPeer,
        input_types: InputTypeMask,
        callback: Arc<dyn StopCallback>,
    ) -> Result<(), IpcError>;

    async fn start_remote_input_dhids(
        &self,
        peer: &SessionPeer,
        dh_ids: &[DhId],
        callback: Arc<dyn StartStopDhIdsCallback>,
    ) -> Result<(), IpcError>;

    async fn stop_remote_input_dhids(
        &self,
        peer: &SessionPeer,
        dh_ids: &[DhId],
        callback: Arc<dyn StartStopDhIdsCallback>,
    ) -> Result<(), IpcError>;

    async fn register_simulation_event_listener(
        &self,
        id: ListenerId,
        listener: Arc<dyn SimulationEventListener>,
    ) -> Result<(), IpcError>;

    async fn unregister_simulation_event_listener(&self, id: ListenerId) -> Result<(), IpcError>;

    async fn register_session_state_cb(
        &self,
        id: ListenerId,
        callback: Arc<dyn SessionStateCallback>,
    ) -> Result<(), IpcError>;

    async fn unregister_session_state_cb(&self, id: ListenerId) -> Result<(), IpcError>;

    async fn register_add_white_list_callback(
        &self,
        callback: Arc<dyn WhiteListCallback>,
    ) -> Result<(), IpcError>;

    async fn register_del_white_list_callback(
        &self,
        callback: Arc<dyn DelWhiteListCallback>,
    ) -> Result<(), IpcError>;
}

/// The service hosting the sink role.
#[async_trait]
pub trait SinkService: RemoteObject {
    async fn init(&self) -> Result<(), IpcError>;

    async fn release(&self) -> Result<(), IpcError>;

    async fn register_sharing_dhid_listener(
        &self,
        listener: Arc<dyn SharingDhIdListener>,
    ) -> Result<(), IpcError>;

    async fn register_screen_info_callback(
        &self,
        callback: Arc<dyn ScreenInfoCallback>,
    ) -> Result<(), IpcError>;
}
