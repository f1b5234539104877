//! Callbacks handed to the remote services on the caller's behalf.
//!
//! One-shot bridges resolve the matching registry entry and forward the
//! result to the caller's callback. A completion that finds no entry was
//! already settled (synchronous failure, service death, teardown) and is
//! dropped. Streaming bridges feed the local caches.

use std::collections::BTreeSet;
use std::sync::Arc;

use dinput_ipc::{
    DelWhiteListCallback, PrepareCallback, RegisterCallback, ScreenInfoCallback,
    SharingDhIdListener, StartCallback, StartStopDhIdsCallback, StopCallback, UnprepareCallback,
    UnregisterCallback, WhiteListCallback,
};
use dinput_types::{DeviceId, DhId, ErrorKind, InputTypeMask, SessionPeer, DH_SUCCESS};
use tracing::{debug, warn};

use crate::filter::ScreenFilter;
use crate::registry::CallRegistry;
use crate::sharing::SharingDhIds;
use crate::whitelist::WhiteListStore;

fn log_status(kind: &'static str, key: &dyn std::fmt::Display, status: i32) {
    if status == DH_SUCCESS {
        debug!(kind, key = %key, "request completed");
    } else {
        warn!(
            kind,
            key = %key,
            status,
            error = %ErrorKind::from_code(status),
            "remote reported failure"
        );
    }
}

struct HardwareDisplay<'a>(&'a DeviceId, &'a DhId);

impl std::fmt::Display for HardwareDisplay<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.0, self.1)
    }
}

pub(crate) struct RegisterBridge(pub Arc<CallRegistry>);

impl RegisterCallback for RegisterBridge {
    fn on_result(&self, device_id: &DeviceId, dh_id: &DhId, status: i32) {
        log_status("register", &HardwareDisplay(device_id, dh_id), status);
        if let Some(cb) = self.0.register.complete(&(device_id.clone(), dh_id.clone())) {
            cb.on_result(device_id, dh_id, status);
        }
    }
}

pub(crate) struct UnregisterBridge(pub Arc<CallRegistry>);

impl UnregisterCallback for UnregisterBridge {
    fn on_result(&self, device_id: &DeviceId, dh_id: &DhId, status: i32) {
        log_status("unregister", &HardwareDisplay(device_id, dh_id), status);
        if let Some(cb) = self.0.unregister.complete(&(device_id.clone(), dh_id.clone())) {
            cb.on_result(device_id, dh_id, status);
        }
    }
}

pub(crate) struct PrepareBridge(pub Arc<CallRegistry>);

impl PrepareCallback for PrepareBridge {
    fn on_result(&self, peer: &SessionPeer, status: i32) {
        log_status("prepare", peer, status);
        if let Some(cb) = self.0.prepare.complete(peer) {
            cb.on_result(peer, status);
        }
    }
}

pub(crate) struct UnprepareBridge(pub Arc<CallRegistry>);

impl UnprepareCallback for UnprepareBridge {
    fn on_result(&self, peer: &SessionPeer, status: i32) {
        log_status("unprepare", peer, status);
        if let Some(cb) = self.0.unprepare.complete(peer) {
            cb.on_result(peer, status);
        }
    }
}

pub(crate) struct StartBridge(pub Arc<CallRegistry>);

impl StartCallback for StartBridge {
    fn on_result(&self, peer: &SessionPeer, input_types: InputTypeMask, status: i32) {
        log_status("start", peer, status);
        if let Some(cb) = self.0.start.complete(&(peer.clone(), input_types)) {
            cb.on_result(peer, input_types, status);
        }
    }
}

pub(crate) struct StopBridge(pub Arc<CallRegistry>);

impl StopCallback for StopBridge {
    fn on_result(&self, peer: &SessionPeer, input_types: InputTypeMask, status: i32) {
        log_status("stop", peer, status);
        if let Some(cb) = self.0.stop.complete(&(peer.clone(), input_types)) {
            cb.on_result(peer, input_types, status);
        }
    }
}

/// Which dhId-list request a [`DhIdsBridge`] settles.
#[derive(Debug, Clone, Copy)]
pub(crate) enum DhIdsOp {
    Start,
    Stop,
}

pub(crate) struct DhIdsBridge {
    pub registry: Arc<CallRegistry>,
    pub op: DhIdsOp,
}

impl StartStopDhIdsCallback for DhIdsBridge {
    fn on_result(&self, peer: &SessionPeer, dh_ids: &[DhId], status: i32) {
        let key = (peer.clone(), dh_ids.iter().cloned().collect::<BTreeSet<_>>());
        let pending = match self.op {
            DhIdsOp::Start => {
                log_status("start-dhids", peer, status);
                self.registry.start_dhids.complete(&key)
            }
            DhIdsOp::Stop => {
                log_status("stop-dhids", peer, status);
                self.registry.stop_dhids.complete(&key)
            }
        };
        if let Some(cb) = pending {
            cb.on_result(peer, dh_ids, status);
        }
    }
}

/// Feeds whitelists pushed by the source service into the store.
pub(crate) struct WhiteListBridge(pub Arc<WhiteListStore>);

impl WhiteListCallback for WhiteListBridge {
    fn on_result(&self, device_id: &DeviceId, payload: &str) {
        // Rejections are logged by the store.
        let _ = self.0.add(device_id, payload);
    }
}

pub(crate) struct DelWhiteListBridge(pub Arc<WhiteListStore>);

impl DelWhiteListCallback for DelWhiteListBridge {
    fn on_result(&self, device_id: &DeviceId) {
        self.0.remove(device_id);
    }
}

pub(crate) struct SharingBridge(pub Arc<SharingDhIds>);

impl SharingDhIdListener for SharingBridge {
    fn on_sharing(&self, dh_id: &DhId) {
        self.0.on_sharing(dh_id);
    }

    fn on_no_sharing(&self, dh_id: &DhId) {
        self.0.on_no_sharing(dh_id);
    }
}

pub(crate) struct ScreenInfoBridge(pub Arc<ScreenFilter>);

impl ScreenInfoCallback for ScreenInfoBridge {
    fn on_result(&self, payload: &str) {
        let _ = self.0.update(payload);
    }
}
