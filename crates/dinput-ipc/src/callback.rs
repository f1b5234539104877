//! Callback interfaces the remote services invoke.
//!
//! One-shot callbacks are handed over with a single request and receive
//! exactly one `on_result`. Listener-style callbacks stay registered and may
//! fire any number of times until unregistered or the service dies.
//!
//! Status arguments are remote status codes; [`dinput_types::DH_SUCCESS`]
//! means success.

use dinput_types::{DeviceId, DhId, InputTypeMask, SessionPeer};

/// Completion of `register_distributed_hardware`.
pub trait RegisterCallback: Send + Sync + 'static {
    fn on_result(&self, device_id: &DeviceId, dh_id: &DhId, status: i32);
}

/// Completion of `unregister_distributed_hardware`.
pub trait UnregisterCallback: Send + Sync + 'static {
    fn on_result(&self, device_id: &DeviceId, dh_id: &DhId, status: i32);
}

/// Completion of `prepare_remote_input`, local or relay.
pub trait PrepareCallback: Send + Sync + 'static {
    fn on_result(&self, peer: &SessionPeer, status: i32);
}

/// Completion of `unprepare_remote_input`, local or relay.
pub trait UnprepareCallback: Send + Sync + 'static {
    fn on_result(&self, peer: &SessionPeer, status: i32);
}

/// Completion of a start request selected by input type.
pub trait StartCallback: Send + Sync + 'static {
    fn on_result(&self, peer: &SessionPeer, input_types: InputTypeMask, status: i32);
}

/// Completion of a stop request selected by input type.
pub trait StopCallback: Send + Sync + 'static {
    fn on_result(&self, peer: &SessionPeer, input_types: InputTypeMask, status: i32);
}

/// Completion of a start or stop request selected by dhId list.
pub trait StartStopDhIdsCallback: Send + Sync + 'static {
    fn on_result(&self, peer: &SessionPeer, dh_ids: &[DhId], status: i32);
}

/// Receives simulated input events injected by the sink.
pub trait SimulationEventListener: Send + Sync + 'static {
    fn on_simulation_event(&self, event_type: u32, code: u32, value: i32);
}

/// Receives session state transitions for a remote device.
pub trait SessionStateCallback: Send + Sync + 'static {
    fn on_result(&self, device_id: &DeviceId, state: u32);
}

/// Told when a local dhId starts or stops being shared to a sink.
pub trait SharingDhIdListener: Send + Sync + 'static {
    fn on_sharing(&self, dh_id: &DhId);
    fn on_no_sharing(&self, dh_id: &DhId);
}

/// Delivers a key whitelist for a device as a JSON payload.
pub trait WhiteListCallback: Send + Sync + 'static {
    fn on_result(&self, device_id: &DeviceId, payload: &str);
}

/// Told when a device's key whitelist is withdrawn.
pub trait DelWhiteListCallback: Send + Sync + 'static {
    fn on_result(&self, device_id: &DeviceId);
}

/// Delivers the sink's rendered screen rectangles as a JSON payload.
pub trait ScreenInfoCallback: Send + Sync + 'static {
    fn on_result(&self, payload: &str);
}
