//! Mock services and locator for testing.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use dinput_types::{
    DeviceId, DhId, EnableParams, InputTypeMask, ListenerId, ProxyToken, ServiceRole, SessionPeer,
    DH_SUCCESS,
};
use tokio::sync::{mpsc, Notify};
use tracing::debug;

use crate::callback::{
    DelWhiteListCallback, PrepareCallback, RegisterCallback, ScreenInfoCallback,
    SessionStateCallback, SharingDhIdListener, SimulationEventListener, StartCallback,
    StartStopDhIdsCallback, StopCallback, UnprepareCallback, UnregisterCallback,
    WhiteListCallback,
};
use crate::error::IpcError;
use crate::locator::{AvailabilityEvent, AvailabilityKind, ServiceLocator};
use crate::service::{RemoteObject, SinkService, SourceService};

/// How a mock service completes one-shot requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// Complete on a spawned task with the given status.
    Auto(i32),
    /// Hold completions until [`MockSourceService::complete_pending`].
    Manual,
}

impl Default for Completion {
    fn default() -> Self {
        Self::Auto(DH_SUCCESS)
    }
}

type Deferred = Box<dyn FnOnce(i32) + Send>;

// ---------------------------------------------------------------------------
// Remote object plumbing
// ---------------------------------------------------------------------------

struct MockRemote {
    token: ProxyToken,
    alive: AtomicBool,
    recipients: Mutex<Vec<mpsc::UnboundedSender<ProxyToken>>>,
}

impl MockRemote {
    fn new() -> Self {
        Self {
            token: ProxyToken::new(),
            alive: AtomicBool::new(true),
            recipients: Mutex::new(Vec::new()),
        }
    }

    fn check(&self, fail_transport: bool) -> Result<(), IpcError> {
        if !self.alive.load(Ordering::SeqCst) {
            return Err(IpcError::Dead);
        }
        if fail_transport {
            return Err(IpcError::Transport("injected failure".to_string()));
        }
        Ok(())
    }

    fn kill(&self) {
        self.alive.store(false, Ordering::SeqCst);
        let recipients = std::mem::take(&mut *self.recipients.lock().unwrap());
        debug!(token = %self.token, recipients = recipients.len(), "mock service killed");
        for tx in recipients {
            let _ = tx.send(self.token);
        }
    }

    fn add_recipient(&self, tx: mpsc::UnboundedSender<ProxyToken>) -> bool {
        if !self.alive.load(Ordering::SeqCst) {
            return false;
        }
        self.recipients.lock().unwrap().push(tx);
        true
    }

    fn has_recipient(&self) -> bool {
        !self.recipients.lock().unwrap().is_empty()
    }
}

// ---------------------------------------------------------------------------
// MockSourceService
// ---------------------------------------------------------------------------

/// A request observed by [`MockSourceService`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceCall {
    Init,
    Release,
    Register { device_id: DeviceId, dh_id: DhId },
    Unregister { device_id: DeviceId, dh_id: DhId },
    Prepare(SessionPeer),
    Unprepare(SessionPeer),
    Start { peer: SessionPeer, input_types: InputTypeMask },
    Stop { peer: SessionPeer, input_types: InputTypeMask },
    StartDhIds { peer: SessionPeer, dh_ids: Vec<DhId> },
    StopDhIds { peer: SessionPeer, dh_ids: Vec<DhId> },
    RegisterSimulationListener(ListenerId),
    UnregisterSimulationListener(ListenerId),
    RegisterSessionState(ListenerId),
    UnregisterSessionState(ListenerId),
    RegisterAddWhiteList,
    RegisterDelWhiteList,
}

#[derive(Default)]
struct MockSourceState {
    calls: Vec<SourceCall>,
    completion: Completion,
    fail_transport: bool,
    deferred: Vec<Deferred>,
    reply_gate: Option<Arc<Notify>>,
    simulation_listeners: HashMap<ListenerId, Arc<dyn SimulationEventListener>>,
    session_callbacks: HashMap<ListenerId, Arc<dyn SessionStateCallback>>,
    add_white_list: Option<Arc<dyn WhiteListCallback>>,
    del_white_list: Option<Arc<dyn DelWhiteListCallback>>,
}

/// Mock source service.
///
/// Clones share state, so a test keeps one clone to script and observe the
/// service while the client holds another through the locator.
#[derive(Clone)]
pub struct MockSourceService {
    remote: Arc<MockRemote>,
    state: Arc<Mutex<MockSourceState>>,
}

impl Default for MockSourceService {
    fn default() -> Self {
        Self::new()
    }
}

impl MockSourceService {
    pub fn new() -> Self {
        Self {
            remote: Arc::new(MockRemote::new()),
            state: Arc::new(Mutex::new(MockSourceState::default())),
        }
    }

    /// Snapshot of every request that reached the service.
    pub fn calls(&self) -> Vec<SourceCall> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn set_completion(&self, completion: Completion) {
        self.state.lock().unwrap().completion = completion;
    }

    /// Make every following request fail before reaching the service.
    pub fn set_fail_transport(&self, fail: bool) {
        self.state.lock().unwrap().fail_transport = fail;
    }

    /// Hold the reply of every following one-shot request until the returned
    /// gate is notified, leaving the call in flight.
    pub fn hold_replies(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.state.lock().unwrap().reply_gate = Some(Arc::clone(&gate));
        gate
    }

    /// Number of completions held back in [`Completion::Manual`] mode.
    pub fn pending_count(&self) -> usize {
        self.state.lock().unwrap().deferred.len()
    }

    /// Deliver all held completions with `status`. Returns how many fired.
    pub fn complete_pending(&self, status: i32) -> usize {
        let deferred = std::mem::take(&mut self.state.lock().unwrap().deferred);
        let count = deferred.len();
        for complete in deferred {
            complete(status);
        }
        count
    }

    /// Simulate the hosting process dying.
    pub fn kill(&self) {
        {
            let mut state = self.state.lock().unwrap();
            state.simulation_listeners.clear();
            state.session_callbacks.clear();
            state.add_white_list = None;
            state.del_white_list = None;
        }
        self.remote.kill();
    }

    pub fn has_death_recipient(&self) -> bool {
        self.remote.has_recipient()
    }

    pub fn simulation_listener_ids(&self) -> Vec<ListenerId> {
        self.state
            .lock()
            .unwrap()
            .simulation_listeners
            .keys()
            .copied()
            .collect()
    }

    pub fn session_state_ids(&self) -> Vec<ListenerId> {
        self.state
            .lock()
            .unwrap()
            .session_callbacks
            .keys()
            .copied()
            .collect()
    }

    /// Fire a simulation event at every registered listener.
    pub fn emit_simulation_event(&self, event_type: u32, code: u32, value: i32) -> usize {
        let listeners: Vec<_> = self
            .state
            .lock()
            .unwrap()
            .simulation_listeners
            .values()
            .cloned()
            .collect();
        for listener in &listeners {
            listener.on_simulation_event(event_type, code, value);
        }
        listeners.len()
    }

    /// Fire a session state change at every registered callback.
    pub fn emit_session_state(&self, device_id: &DeviceId, session_state: u32) -> usize {
        let callbacks: Vec<_> = self
            .state
            .lock()
            .unwrap()
            .session_callbacks
            .values()
            .cloned()
            .collect();
        for callback in &callbacks {
            callback.on_result(device_id, session_state);
        }
        callbacks.len()
    }

    /// Push a whitelist through the registered add callback.
    pub fn push_white_list(&self, device_id: &DeviceId, payload: &str) -> bool {
        let Some(callback) = self.state.lock().unwrap().add_white_list.clone() else {
            return false;
        };
        callback.on_result(device_id, payload);
        true
    }

    /// Withdraw a whitelist through the registered delete callback.
    pub fn withdraw_white_list(&self, device_id: &DeviceId) -> bool {
        let Some(callback) = self.state.lock().unwrap().del_white_list.clone() else {
            return false;
        };
        callback.on_result(device_id);
        true
    }

    fn record(&self, call: SourceCall) -> Result<(), IpcError> {
        let mut state = self.state.lock().unwrap();
        self.remote.check(state.fail_transport)?;
        state.calls.push(call);
        Ok(())
    }

    /// Reply to an accepted request and arrange its completion.
    ///
    /// With a reply gate installed the reply waits for the gate; a service
    /// killed meanwhile replies `Dead` and never completes the request.
    async fn finish(&self, complete: Deferred) -> Result<(), IpcError> {
        let gate = self.state.lock().unwrap().reply_gate.clone();
        if let Some(gate) = gate {
            gate.notified().await;
            self.remote.check(false)?;
        }
        let mut state = self.state.lock().unwrap();
        match state.completion {
            Completion::Auto(status) => {
                drop(state);
                tokio::spawn(async move { complete(status) });
            }
            Completion::Manual => state.deferred.push(complete),
        }
        Ok(())
    }
}

impl RemoteObject for MockSourceService {
    fn token(&self) -> ProxyToken {
        self.remote.token
    }

    fn is_alive(&self) -> bool {
        self.remote.alive.load(Ordering::SeqCst)
    }

    fn add_death_recipient(&self, tx: mpsc::UnboundedSender<ProxyToken>) -> bool {
        self.remote.add_recipient(tx)
    }

    fn remove_death_recipient(&self) {
        self.remote.recipients.lock().unwrap().clear();
    }
}

#[async_trait]
impl SourceService for MockSourceService {
    async fn init(&self) -> Result<(), IpcError> {
        self.record(SourceCall::Init)
    }

    async fn release(&self) -> Result<(), IpcError> {
        self.record(SourceCall::Release)
    }

    async fn register_distributed_hardware(
        &self,
        device_id: &DeviceId,
        dh_id: &DhId,
        _params: &EnableParams,
        callback: Arc<dyn RegisterCallback>,
    ) -> Result<(), IpcError> {
        self.record(SourceCall::Register {
            device_id: device_id.clone(),
            dh_id: dh_id.clone(),
        })?;
        let (device_id, dh_id) = (device_id.clone(), dh_id.clone());
        self.finish(Box::new(move |status| {
            callback.on_result(&device_id, &dh_id, status);
        })).await
    }

    async fn unregister_distributed_hardware(
        &self,
        device_id: &DeviceId,
        dh_id: &DhId,
        callback: Arc<dyn UnregisterCallback>,
    ) -> Result<(), IpcError> {
        self.record(SourceCall::Unregister {
            device_id: device_id.clone(),
            dh_id: dh_id.clone(),
        })?;
        let (device_id, dh_id) = (device_id.clone(), dh_id.clone());
        self.finish(Box::new(move |status| {
            callback.on_result(&device_id, &dh_id, status);
        })).await
    }

    async fn prepare_remote_input(
        &self,
        peer: &SessionPeer,
        callback: Arc<dyn PrepareCallback>,
    ) -> Result<(), IpcError> {
        self.record(SourceCall::Prepare(peer.clone()))?;
        let peer = peer.clone();
        self.finish(Box::new(move |status| callback.on_result(&peer, status))).await
    }

    async fn unprepare_remote_input(
        &self,
        peer: &SessionPeer,
        callback: Arc<dyn UnprepareCallback>,
    ) -> Result<(), IpcError> {
        self.record(SourceCall::Unprepare(peer.clone()))?;
        let peer = peer.clone();
        self.finish(Box::new(move |status| callback.on_result(&peer, status))).await
    }

    async fn start_remote_input(
        &self,
        peer: &SessionPeer,
        input_types: InputTypeMask,
        callback: Arc<dyn StartCallback>,
    ) -> Result<(), IpcError> {
        self.record(SourceCall::Start {
            peer: peer.clone(),
            input_types,
        })?;
        let peer = peer.clone();
        self.finish(Box::new(move |status| {
            callback.on_result(&peer, input_types, status);
        })).await
    }

    async fn stop_remote_input(
        &self,
        peer: &SessionPeer,
        input_types: InputTypeMask,
        callback: Arc<dyn StopCallback>,
    ) -> Result<(), IpcError> {
        self.record(SourceCall::Stop {
            peer: peer.clone(),
            input_types,
        })?;
        let peer = peer.clone();
        self.finish(Box::new(move |status| {
            callback.on_result(&peer, input_types, status);
        })).await
    }

    async fn start_remote_input_dhids(
        &self,
        peer: &SessionPeer,
        dh_ids: &[DhId],
        callback: Arc<dyn StartStopDhIdsCallback>,
    ) -> Result<(), IpcError> {
        self.record(SourceCall::StartDhIds {
            peer: peer.clone(),
            dh_ids: dh_ids.to_vec(),
        })?;
        let (peer, dh_ids) = (peer.clone(), dh_ids.to_vec());
        self.finish(Box::new(move |status| {
            callback.on_result(&peer, &dh_ids, status);
        })).await
    }

    async fn stop_remote_input_dhids(
        &self,
        peer: &SessionPeer,
        dh_ids: &[DhId],
        callback: Arc<dyn StartStopDhIdsCallback>,
    ) -> Result<(), IpcError> {
        self.record(SourceCall::StopDhIds {
            peer: peer.clone(),
            dh_ids: dh_ids.to_vec(),
        })?;
        let (peer, dh_ids) = (peer.clone(), dh_ids.to_vec());
        self.finish(Box::new(move |status| {
            callback.on_result(&peer, &dh_ids, status);
        })).await
    }

    async fn register_simulation_event_listener(
        &self,
        id: ListenerId,
        listener: Arc<dyn SimulationEventListener>,
    ) -> Result<(), IpcError> {
        self.record(SourceCall::RegisterSimulationListener(id))?;
        self.state
            .lock()
            .unwrap()
            .simulation_listeners
            .insert(id, listener);
        Ok(())
    }

    async fn unregister_simulation_event_listener(&self, id: ListenerId) -> Result<(), IpcError> {
        self.record(SourceCall::UnregisterSimulationListener(id))?;
        self.state.lock().unwrap().simulation_listeners.remove(&id);
        Ok(())
    }

    async fn register_session_state_cb(
        &self,
        id: ListenerId,
        callback: Arc<dyn SessionStateCallback>,
    ) -> Result<(), IpcError> {
        self.record(SourceCall::RegisterSessionState(id))?;
        self.state
            .lock()
            .unwrap()
            .session_callbacks
            .insert(id, callback);
        Ok(())
    }

    async fn unregister_session_state_cb(&self, id: ListenerId) -> Result<(), IpcError> {
        self.record(SourceCall::UnregisterSessionState(id))?;
        self.state.lock().unwrap().session_callbacks.remove(&id);
        Ok(())
    }

    async fn register_add_white_list_callback(
        &self,
        callback: Arc<dyn WhiteListCallback>,
    ) -> Result<(), IpcError> {
        self.record(SourceCall::RegisterAddWhiteList)?;
        self.state.lock().unwrap().add_white_list = Some(callback);
        Ok(())
    }

    async fn register_del_white_list_callback(
        &self,
        callback: Arc<dyn DelWhiteListCallback>,
    ) -> Result<(), IpcError> {
        self.record(SourceCall::RegisterDelWhiteList)?;
        self.state.lock().unwrap().del_white_list = Some(callback);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MockSinkService
// ---------------------------------------------------------------------------

/// A request observed by [`MockSinkService`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkCall {
    Init,
    Release,
    RegisterSharingListener,
    RegisterScreenInfoCallback,
}

#[derive(Default)]
struct MockSinkState {
    calls: Vec<SinkCall>,
    fail_transport: bool,
    sharing_listener: Option<Arc<dyn SharingDhIdListener>>,
    screen_callback: Option<Arc<dyn ScreenInfoCallback>>,
}

/// Mock sink service.
#[derive(Clone)]
pub struct MockSinkService {
    remote: Arc<MockRemote>,
    state: Arc<Mutex<MockSinkState>>,
}

impl Default for MockSinkService {
    fn default() -> Self {
        Self::new()
    }
}

impl MockSinkService {
    pub fn new() -> Self {
        Self {
            remote: Arc::new(MockRemote::new()),
            state: Arc::new(Mutex::new(MockSinkState::default())),
        }
    }

    pub fn calls(&self) -> Vec<SinkCall> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn set_fail_transport(&self, fail: bool) {
        self.state.lock().unwrap().fail_transport = fail;
    }

    pub fn kill(&self) {
        {
            let mut state = self.state.lock().unwrap();
            state.sharing_listener = None;
            state.screen_callback = None;
        }
        self.remote.kill();
    }

    pub fn has_death_recipient(&self) -> bool {
        self.remote.has_recipient()
    }

    /// Report a dhId as shared (`true`) or no longer shared.
    pub fn set_sharing(&self, dh_id: &DhId, sharing: bool) -> bool {
        let Some(listener) = self.state.lock().unwrap().sharing_listener.clone() else {
            return false;
        };
        if sharing {
            listener.on_sharing(dh_id);
        } else {
            listener.on_no_sharing(dh_id);
        }
        true
    }

    /// Push a screen-info payload through the registered callback.
    pub fn push_screen_infos(&self, payload: &str) -> bool {
        let Some(callback) = self.state.lock().unwrap().screen_callback.clone() else {
            return false;
        };
        callback.on_result(payload);
        true
    }

    fn record(&self, call: SinkCall) -> Result<(), IpcError> {
        let mut state = self.state.lock().unwrap();
        self.remote.check(state.fail_transport)?;
        state.calls.push(call);
        Ok(())
    }
}

impl RemoteObject for MockSinkService {
    fn token(&self) -> ProxyToken {
        self.remote.token
    }

    fn is_alive(&self) -> bool {
        self.remote.alive.load(Ordering::SeqCst)
    }

    fn add_death_recipient(&self, tx: mpsc::UnboundedSender<ProxyToken>) -> bool {
        self.remote.add_recipient(tx)
    }

    fn remove_death_recipient(&self) {
        self.remote.recipients.lock().unwrap().clear();
    }
}

#[async_trait]
impl SinkService for MockSinkService {
    async fn init(&self) -> Result<(), IpcError> {
        self.record(SinkCall::Init)
    }

    async fn release(&self) -> Result<(), IpcError> {
        self.record(SinkCall::Release)
    }

    async fn register_sharing_dhid_listener(
        &self,
        listener: Arc<dyn SharingDhIdListener>,
    ) -> Result<(), IpcError> {
        self.record(SinkCall::RegisterSharingListener)?;
        self.state.lock().unwrap().sharing_listener = Some(listener);
        Ok(())
    }

    async fn register_screen_info_callback(
        &self,
        callback: Arc<dyn ScreenInfoCallback>,
    ) -> Result<(), IpcError> {
        self.record(SinkCall::RegisterScreenInfoCallback)?;
        self.state.lock().unwrap().screen_callback = Some(callback);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MockServiceLocator
// ---------------------------------------------------------------------------

#[derive(Default)]
struct LocatorState {
    source: Option<MockSourceService>,
    sink: Option<MockSinkService>,
    subscribers: Vec<mpsc::UnboundedSender<AvailabilityEvent>>,
    source_lookups: usize,
    sink_lookups: usize,
    lookup_delay: Option<Duration>,
    muted: bool,
}

/// Mock service discovery holding at most one source and one sink service.
#[derive(Clone, Default)]
pub struct MockServiceLocator {
    state: Arc<Mutex<LocatorState>>,
}

impl MockServiceLocator {
    /// A locator with no services running.
    pub fn new() -> Self {
        Self::default()
    }

    /// A locator with both services already running.
    pub fn with_services(source: MockSourceService, sink: MockSinkService) -> Self {
        let locator = Self::new();
        {
            let mut state = locator.state.lock().unwrap();
            state.source = Some(source);
            state.sink = Some(sink);
        }
        locator
    }

    /// Make lookups take `delay` before answering.
    pub fn set_lookup_delay(&self, delay: Option<Duration>) {
        self.state.lock().unwrap().lookup_delay = delay;
    }

    /// Stop (or resume) broadcasting availability events.
    pub fn set_muted(&self, muted: bool) {
        self.state.lock().unwrap().muted = muted;
    }

    /// Install a source service and broadcast `Added`.
    pub fn publish_source(&self, service: MockSourceService) {
        self.state.lock().unwrap().source = Some(service);
        self.notify(ServiceRole::Source, AvailabilityKind::Added);
    }

    /// Install a sink service and broadcast `Added`.
    pub fn publish_sink(&self, service: MockSinkService) {
        self.state.lock().unwrap().sink = Some(service);
        self.notify(ServiceRole::Sink, AvailabilityKind::Added);
    }

    /// Kill the running source service and broadcast `Removed`.
    pub fn crash_source(&self) {
        let source = self.state.lock().unwrap().source.take();
        if let Some(source) = source {
            source.kill();
        }
        self.notify(ServiceRole::Source, AvailabilityKind::Removed);
    }

    /// Kill the running sink service and broadcast `Removed`.
    pub fn crash_sink(&self) {
        let sink = self.state.lock().unwrap().sink.take();
        if let Some(sink) = sink {
            sink.kill();
        }
        self.notify(ServiceRole::Sink, AvailabilityKind::Removed);
    }

    pub fn source_lookups(&self) -> usize {
        self.state.lock().unwrap().source_lookups
    }

    pub fn sink_lookups(&self) -> usize {
        self.state.lock().unwrap().sink_lookups
    }

    pub fn subscriber_count(&self) -> usize {
        self.state.lock().unwrap().subscribers.len()
    }

    fn notify(&self, role: ServiceRole, kind: AvailabilityKind) {
        let mut state = self.state.lock().unwrap();
        if state.muted {
            debug!(role = %role, ?kind, "availability event muted");
            return;
        }
        state
            .subscribers
            .retain(|tx| tx.send(AvailabilityEvent { role, kind }).is_ok());
    }

    async fn delay(&self) {
        let delay = self.state.lock().unwrap().lookup_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl ServiceLocator for MockServiceLocator {
    async fn get_source_service(&self) -> Option<Arc<dyn SourceService>> {
        self.delay().await;
        let mut state = self.state.lock().unwrap();
        state.source_lookups += 1;
        state
            .source
            .clone()
            .filter(|s| s.is_alive())
            .map(|s| Arc::new(s) as Arc<dyn SourceService>)
    }

    async fn get_sink_service(&self) -> Option<Arc<dyn SinkService>> {
        self.delay().await;
        let mut state = self.state.lock().unwrap();
        state.sink_lookups += 1;
        state
            .sink
            .clone()
            .filter(|s| s.is_alive())
            .map(|s| Arc::new(s) as Arc<dyn SinkService>)
    }

    fn subscribe(&self, tx: mpsc::UnboundedSender<AvailabilityEvent>) -> Result<(), IpcError> {
        self.state.lock().unwrap().subscribers.push(tx);
        Ok(())
    }
}
