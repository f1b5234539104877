//! The client facade.

use std::fmt::Debug;
use std::hash::Hash;
use std::sync::{Arc, Mutex};

use dinput_ipc::{
    AvailabilityEvent, AvailabilityKind, IpcError, PrepareCallback, RegisterCallback,
    ServiceLocator, SessionStateCallback, SimulationEventListener, SinkService, SourceService,
    StartCallback, StartStopDhIdsCallback, StopCallback, UnprepareCallback, UnregisterCallback,
};
use dinput_types::{
    BusinessEvent, DeviceId, DhId, EnableParams, ErrorKind, InputTypeMask, ListenerId, ProxyToken,
    ServerRole, ServiceRole, SessionPeer, TouchEvent,
};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::bridge::{
    DelWhiteListBridge, DhIdsBridge, DhIdsOp, PrepareBridge, RegisterBridge, ScreenInfoBridge,
    SharingBridge, StartBridge, StopBridge, UnprepareBridge, UnregisterBridge, WhiteListBridge,
};
use crate::config::ClientConfig;
use crate::connection::ServiceConnections;
use crate::error::ClientError;
use crate::filter::ScreenFilter;
use crate::recovery::{self, RecoveryQueues, SupervisorInputs};
use crate::registry::{lock, CallRegistry, DhIdsKey, PendingCalls};
use crate::sharing::SharingDhIds;
use crate::whitelist::WhiteListStore;

/// Which roles are initialised, and which proxies have seen our registrations.
#[derive(Debug, Default)]
struct Roles {
    source: bool,
    sink: bool,
    current: ServerRole,
    source_synced: Option<ProxyToken>,
    sink_synced: Option<ProxyToken>,
}

impl Roles {
    fn synced(&self, role: ServiceRole) -> Option<ProxyToken> {
        match role {
            ServiceRole::Source => self.source_synced,
            ServiceRole::Sink => self.sink_synced,
        }
    }
}

fn precondition(what: &str) -> ClientError {
    ClientError::PreconditionFailed(what.to_string())
}

fn check_peer(peer: &SessionPeer) -> Result<(), ClientError> {
    if peer.has_empty_id() {
        return Err(precondition("empty device id"));
    }
    Ok(())
}

fn check_mask(input_types: InputTypeMask) -> Result<(), ClientError> {
    if !input_types.is_valid() {
        return Err(ClientError::PreconditionFailed(format!(
            "invalid input type mask {input_types}"
        )));
    }
    Ok(())
}

fn check_dh_ids(dh_ids: &[DhId]) -> Result<(), ClientError> {
    if dh_ids.is_empty() || dh_ids.iter().any(DhId::is_empty) {
        return Err(precondition("empty dhId list or dhId"));
    }
    Ok(())
}

/// Drop the registry entry of a request that never reached the service.
///
/// If the entry is already gone, the request was settled through its
/// callback while the call was in flight, and that status is the only one
/// the caller sees.
fn settle<K, C>(
    pending: &PendingCalls<K, C>,
    key: &K,
    sent: Result<(), IpcError>,
) -> Result<(), ClientError>
where
    K: Eq + Hash + Clone + Debug,
    C: ?Sized,
{
    let Err(e) = sent else {
        return Ok(());
    };
    if !pending.abandon(key) {
        debug!(?key, error = %e, "call failed after its request was settled");
        return Ok(());
    }
    warn!(?key, error = %e, "request not delivered");
    Err(ClientError::Transport(e))
}

/// Distributed input client.
///
/// Owns the connections to the source and sink services, the bookkeeping for
/// in-flight requests and listeners, the forwarding filters and the recovery
/// tasks. Construct one per process with [`DistributedInputClient::new`]
/// inside a tokio runtime.
pub struct DistributedInputClient {
    config: ClientConfig,
    connections: ServiceConnections,
    registry: Arc<CallRegistry>,
    screen: Arc<ScreenFilter>,
    white_lists: Arc<WhiteListStore>,
    sharing: Arc<SharingDhIds>,
    roles: Mutex<Roles>,
    recovery: RecoveryQueues,
    shutdown_tx: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl DistributedInputClient {
    /// Create a client and start its recovery tasks.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(locator: Arc<dyn ServiceLocator>, config: ClientConfig) -> Arc<Self> {
        let (death_tx, death_rx) = mpsc::unbounded_channel();
        let (availability_tx, availability_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (recovery_queues, receivers) = RecoveryQueues::new();

        let connections =
            ServiceConnections::new(locator, config.service.load_timeout(), death_tx);
        if let Err(e) = connections.register_availability_listener(availability_tx) {
            warn!(error = %e, "availability notifications unavailable");
        }
        let health_check = config.service.health_check_interval();

        let client = Arc::new(Self {
            config,
            connections,
            registry: Arc::new(CallRegistry::new()),
            screen: Arc::new(ScreenFilter::new()),
            white_lists: Arc::new(WhiteListStore::new()),
            sharing: Arc::new(SharingDhIds::new()),
            roles: Mutex::new(Roles::default()),
            recovery: recovery_queues,
            shutdown_tx,
            tasks: Mutex::new(Vec::new()),
        });

        let tasks = recovery::spawn(
            Arc::downgrade(&client),
            receivers,
            SupervisorInputs {
                deaths: death_rx,
                availability: availability_rx,
                health_check,
                shutdown: shutdown_rx,
            },
        );
        *lock(&client.tasks) = tasks;
        info!(
            load_timeout = ?client.config.service.load_timeout(),
            health_check = ?health_check,
            "distributed input client started"
        );
        client
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn registry(&self) -> &CallRegistry {
        &self.registry
    }

    pub fn connections(&self) -> &ServiceConnections {
        &self.connections
    }

    pub fn recovery(&self) -> &RecoveryQueues {
        &self.recovery
    }

    async fn source(&self) -> Result<Arc<dyn SourceService>, ClientError> {
        match self.connections.ensure_source().await {
            Ok(proxy) => Ok(proxy),
            Err(e) => {
                self.recovery.schedule(ServiceRole::Source);
                Err(e)
            }
        }
    }

    async fn sink(&self) -> Result<Arc<dyn SinkService>, ClientError> {
        match self.connections.ensure_sink().await {
            Ok(proxy) => Ok(proxy),
            Err(e) => {
                self.recovery.schedule(ServiceRole::Sink);
                Err(e)
            }
        }
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Initialise the source role.
    pub async fn init_source(&self) -> Result<(), ClientError> {
        let proxy = self.source().await?;
        proxy.init().await?;
        self.register_source_callbacks(&proxy).await?;
        {
            let mut roles = lock(&self.roles);
            roles.source = true;
            roles.current = ServerRole::Source;
            roles.source_synced = Some(proxy.token());
        }
        info!("source role initialised");
        Ok(())
    }

    /// Release the source role.
    ///
    /// Requests still waiting on the source service are completed with
    /// [`ErrorKind::ServiceUnavailable`].
    pub async fn release_source(&self) -> Result<(), ClientError> {
        let proxy = self.source().await?;
        proxy.release().await?;
        self.white_lists.clear();
        self.registry.fail_all(ErrorKind::ServiceUnavailable.code());
        {
            let mut roles = lock(&self.roles);
            roles.source = false;
            roles.source_synced = None;
            roles.current = if roles.sink {
                ServerRole::Sink
            } else {
                ServerRole::None
            };
        }
        info!("source role released");
        Ok(())
    }

    /// Initialise the sink role.
    pub async fn init_sink(&self) -> Result<(), ClientError> {
        let proxy = self.sink().await?;
        proxy.init().await?;
        self.register_sink_callbacks(&proxy).await?;
        {
            let mut roles = lock(&self.roles);
            roles.sink = true;
            roles.current = ServerRole::Sink;
            roles.sink_synced = Some(proxy.token());
        }
        info!("sink role initialised");
        Ok(())
    }

    /// Release the sink role.
    pub async fn release_sink(&self) -> Result<(), ClientError> {
        let proxy = self.sink().await?;
        proxy.release().await?;
        self.sharing.clear();
        self.screen.clear();
        {
            let mut roles = lock(&self.roles);
            roles.sink = false;
            roles.sink_synced = None;
            roles.current = if roles.source {
                ServerRole::Source
            } else {
                ServerRole::None
            };
        }
        info!("sink role released");
        Ok(())
    }

    async fn register_source_callbacks(
        &self,
        proxy: &Arc<dyn SourceService>,
    ) -> Result<(), IpcError> {
        let added = Arc::new(WhiteListBridge(Arc::clone(&self.white_lists)));
        proxy.register_add_white_list_callback(added).await?;
        let deleted = Arc::new(DelWhiteListBridge(Arc::clone(&self.white_lists)));
        proxy.register_del_white_list_callback(deleted).await
    }

    async fn register_sink_callbacks(&self, proxy: &Arc<dyn SinkService>) -> Result<(), IpcError> {
        let sharing = Arc::new(SharingBridge(Arc::clone(&self.sharing)));
        proxy.register_sharing_dhid_listener(sharing).await?;
        let screen = Arc::new(ScreenInfoBridge(Arc::clone(&self.screen)));
        proxy.register_screen_info_callback(screen).await
    }

    /// The role most recently initialised and not yet released.
    pub fn server_role(&self) -> ServerRole {
        lock(&self.roles).current
    }

    // -----------------------------------------------------------------------
    // Hardware registration
    // -----------------------------------------------------------------------

    pub async fn register_distributed_hardware(
        &self,
        device_id: &DeviceId,
        dh_id: &DhId,
        params: &EnableParams,
        callback: Arc<dyn RegisterCallback>,
    ) -> Result<(), ClientError> {
        if device_id.is_empty() || dh_id.is_empty() {
            return Err(precondition("empty device id or dhId"));
        }
        let proxy = self.source().await?;
        let key = (device_id.clone(), dh_id.clone());
        self.registry.register.begin(key.clone(), proxy.token(), callback)?;
        debug!(device = %device_id, dh_id = %dh_id, "registering distributed hardware");
        let sent = proxy
            .register_distributed_hardware(
                device_id,
                dh_id,
                params,
                Arc::new(RegisterBridge(Arc::clone(&self.registry))),
            )
            .await;
        settle(&self.registry.register, &key, sent)
    }

    pub async fn unregister_distributed_hardware(
        &self,
        device_id: &DeviceId,
        dh_id: &DhId,
        callback: Arc<dyn UnregisterCallback>,
    ) -> Result<(), ClientError> {
        if device_id.is_empty() || dh_id.is_empty() {
            return Err(precondition("empty device id or dhId"));
        }
        let proxy = self.source().await?;
        let key = (device_id.clone(), dh_id.clone());
        self.registry.unregister.begin(key.clone(), proxy.token(), callback)?;
        debug!(device = %device_id, dh_id = %dh_id, "unregistering distributed hardware");
        let sent = proxy
            .unregister_distributed_hardware(
                device_id,
                dh_id,
                Arc::new(UnregisterBridge(Arc::clone(&self.registry))),
            )
            .await;
        settle(&self.registry.unregister, &key, sent)
    }

    // -----------------------------------------------------------------------
    // Prepare / unprepare
    // -----------------------------------------------------------------------

    pub async fn prepare_remote_input(
        &self,
        sink_id: &DeviceId,
        callback: Arc<dyn PrepareCallback>,
    ) -> Result<(), ClientError> {
        self.prepare(SessionPeer::local(sink_id.clone()), callback).await
    }

    pub async fn prepare_remote_input_relay(
        &self,
        src_id: &DeviceId,
        sink_id: &DeviceId,
        callback: Arc<dyn PrepareCallback>,
    ) -> Result<(), ClientError> {
        self.prepare(SessionPeer::relay(src_id.clone(), sink_id.clone()), callback).await
    }

    async fn prepare(
        &self,
        peer: SessionPeer,
        callback: Arc<dyn PrepareCallback>,
    ) -> Result<(), ClientError> {
        check_peer(&peer)?;
        let proxy = self.source().await?;
        self.registry.prepare.begin(peer.clone(), proxy.token(), callback)?;
        debug!(peer = %peer, "preparing remote input");
        let sent = proxy
            .prepare_remote_input(&peer, Arc::new(PrepareBridge(Arc::clone(&self.registry))))
            .await;
        settle(&self.registry.prepare, &peer, sent)
    }

    pub async fn unprepare_remote_input(
        &self,
        sink_id: &DeviceId,
        callback: Arc<dyn UnprepareCallback>,
    ) -> Result<(), ClientError> {
        self.unprepare(SessionPeer::local(sink_id.clone()), callback).await
    }

    pub async fn unprepare_remote_input_relay(
        &self,
        src_id: &DeviceId,
        sink_id: &DeviceId,
        callback: Arc<dyn UnprepareCallback>,
    ) -> Result<(), ClientError> {
        self.unprepare(SessionPeer::relay(src_id.clone(), sink_id.clone()), callback).await
    }

    async fn unprepare(
        &self,
        peer: SessionPeer,
        callback: Arc<dyn UnprepareCallback>,
    ) -> Result<(), ClientError> {
        check_peer(&peer)?;
        let proxy = self.source().await?;
        self.registry.unprepare.begin(peer.clone(), proxy.token(), callback)?;
        debug!(peer = %peer, "unpreparing remote input");
        let sent = proxy
            .unprepare_remote_input(&peer, Arc::new(UnprepareBridge(Arc::clone(&self.registry))))
            .await;
        settle(&self.registry.unprepare, &peer, sent)
    }

    // -----------------------------------------------------------------------
    // Start / stop by input type
    // -----------------------------------------------------------------------

    pub async fn start_remote_input(
        &self,
        sink_id: &DeviceId,
        input_types: InputTypeMask,
        callback: Arc<dyn StartCallback>,
    ) -> Result<(), ClientError> {
        self.start(SessionPeer::local(sink_id.clone()), input_types, callback).await
    }

    pub async fn start_remote_input_relay(
        &self,
        src_id: &DeviceId,
        sink_id: &DeviceId,
        input_types: InputTypeMask,
        callback: Arc<dyn StartCallback>,
    ) -> Result<(), ClientError> {
        let peer = SessionPeer::relay(src_id.clone(), sink_id.clone());
        self.start(peer, input_types, callback).await
    }

    async fn start(
        &self,
        peer: SessionPeer,
        input_types: InputTypeMask,
        callback: Arc<dyn StartCallback>,
    ) -> Result<(), ClientError> {
        check_peer(&peer)?;
        check_mask(input_types)?;
        let proxy = self.source().await?;
        let key = (peer.clone(), input_types);
        self.registry.start.begin(key.clone(), proxy.token(), callback)?;
        debug!(peer = %peer, input_types = %input_types, "starting remote input");
        let sent = proxy
            .start_remote_input(
                &peer,
                input_types,
                Arc::new(StartBridge(Arc::clone(&self.registry))),
            )
            .await;
        settle(&self.registry.start, &key, sent)
    }

    pub async fn stop_remote_input(
        &self,
        sink_id: &DeviceId,
        input_types: InputTypeMask,
        callback: Arc<dyn StopCallback>,
    ) -> Result<(), ClientError> {
        self.stop(SessionPeer::local(sink_id.clone()), input_types, callback).await
    }

    pub async fn stop_remote_input_relay(
        &self,
        src_id: &DeviceId,
        sink_id: &DeviceId,
        input_types: InputTypeMask,
        callback: Arc<dyn StopCallback>,
    ) -> Result<(), ClientError> {
        let peer = SessionPeer::relay(src_id.clone(), sink_id.clone());
        self.stop(peer, input_types, callback).await
    }

    async fn stop(
        &self,
        peer: SessionPeer,
        input_types: InputTypeMask,
        callback: Arc<dyn StopCallback>,
    ) -> Result<(), ClientError> {
        check_peer(&peer)?;
        check_mask(input_types)?;
        let proxy = self.source().await?;
        let key = (peer.clone(), input_types);
        self.registry.stop.begin(key.clone(), proxy.token(), callback)?;
        debug!(peer = %peer, input_types = %input_types, "stopping remote input");
        let sent = proxy
            .stop_remote_input(
                &peer,
                input_types,
                Arc::new(StopBridge(Arc::clone(&self.registry))),
            )
            .await;
        settle(&self.registry.stop, &key, sent)
    }

    // -----------------------------------------------------------------------
    // Start / stop by dhId list
    // -----------------------------------------------------------------------

    pub async fn start_remote_input_dhids(
        &self,
        sink_id: &DeviceId,
        dh_ids: &[DhId],
        callback: Arc<dyn StartStopDhIdsCallback>,
    ) -> Result<(), ClientError> {
        let peer = SessionPeer::local(sink_id.clone());
        self.by_dh_ids(DhIdsOp::Start, peer, dh_ids, callback).await
    }

    pub async fn start_remote_input_relay_dhids(
        &self,
        src_id: &DeviceId,
        sink_id: &DeviceId,
        dh_ids: &[DhId],
        callback: Arc<dyn StartStopDhIdsCallback>,
    ) -> Result<(), ClientError> {
        let peer = SessionPeer::relay(src_id.clone(), sink_id.clone());
        self.by_dh_ids(DhIdsOp::Start, peer, dh_ids, callback).await
    }

    pub async fn stop_remote_input_dhids(
        &self,
        sink_id: &DeviceId,
        dh_ids: &[DhId],
        callback: Arc<dyn StartStopDhIdsCallback>,
    ) -> Result<(), ClientError> {
        let peer = SessionPeer::local(sink_id.clone());
        self.by_dh_ids(DhIdsOp::Stop, peer, dh_ids, callback).await
    }

    pub async fn stop_remote_input_relay_dhids(
        &self,
        src_id: &DeviceId,
        sink_id: &DeviceId,
        dh_ids: &[DhId],
        callback: Arc<dyn StartStopDhIdsCallback>,
    ) -> Result<(), ClientError> {
        let peer = SessionPeer::relay(src_id.clone(), sink_id.clone());
        self.by_dh_ids(DhIdsOp::Stop, peer, dh_ids, callback).await
    }

    async fn by_dh_ids(
        &self,
        op: DhIdsOp,
        peer: SessionPeer,
        dh_ids: &[DhId],
        callback: Arc<dyn StartStopDhIdsCallback>,
    ) -> Result<(), ClientError> {
        check_peer(&peer)?;
        check_dh_ids(dh_ids)?;
        let proxy = self.source().await?;
        let pending = match op {
            DhIdsOp::Start => &self.registry.start_dhids,
            DhIdsOp::Stop => &self.registry.stop_dhids,
        };
        let key: DhIdsKey = (peer.clone(), dh_ids.iter().cloned().collect());
        pending.begin(key.clone(), proxy.token(), callback)?;
        debug!(peer = %peer, ?op, count = dh_ids.len(), "remote input by dhIds");
        let bridge = Arc::new(DhIdsBridge {
            registry: Arc::clone(&self.registry),
            op,
        });
        let sent = match op {
            DhIdsOp::Start => proxy.start_remote_input_dhids(&peer, dh_ids, bridge).await,
            DhIdsOp::Stop => proxy.stop_remote_input_dhids(&peer, dh_ids, bridge).await,
        };
        settle(pending, &key, sent)
    }

    // -----------------------------------------------------------------------
    // Listeners
    // -----------------------------------------------------------------------

    /// Register a listener for simulation events.
    ///
    /// The listener stays registered across service restarts until
    /// unregistered. Registering the same listener again returns its
    /// existing id.
    pub async fn register_simulation_event_listener(
        &self,
        listener: Arc<dyn SimulationEventListener>,
    ) -> Result<ListenerId, ClientError> {
        if let Some(id) = self.registry.simulation_listeners.find(&listener) {
            debug!(listener = %id, "simulation event listener already registered");
            return Ok(id);
        }
        let proxy = self.source().await?;
        let id = ListenerId::new();
        proxy
            .register_simulation_event_listener(id, Arc::clone(&listener))
            .await?;
        self.registry.simulation_listeners.insert(id, listener);
        debug!(listener = %id, "simulation event listener registered");
        Ok(id)
    }

    pub async fn unregister_simulation_event_listener(
        &self,
        id: ListenerId,
    ) -> Result<(), ClientError> {
        if !self.registry.simulation_listeners.contains(&id) {
            return Err(ClientError::PreconditionFailed(format!(
                "unknown simulation listener {id}"
            )));
        }
        let proxy = self.source().await?;
        proxy.unregister_simulation_event_listener(id).await?;
        self.registry.simulation_listeners.remove(&id);
        debug!(listener = %id, "simulation event listener unregistered");
        Ok(())
    }

    /// Register a callback for session state changes.
    ///
    /// Registering the same callback again returns its existing id.
    pub async fn register_session_state_cb(
        &self,
        callback: Arc<dyn SessionStateCallback>,
    ) -> Result<ListenerId, ClientError> {
        if let Some(id) = self.registry.session_state_callbacks.find(&callback) {
            debug!(listener = %id, "session state callback already registered");
            return Ok(id);
        }
        let proxy = self.source().await?;
        let id = ListenerId::new();
        proxy
            .register_session_state_cb(id, Arc::clone(&callback))
            .await?;
        self.registry.session_state_callbacks.insert(id, callback);
        debug!(listener = %id, "session state callback registered");
        Ok(id)
    }

    pub async fn unregister_session_state_cb(&self, id: ListenerId) -> Result<(), ClientError> {
        if !self.registry.session_state_callbacks.contains(&id) {
            return Err(ClientError::PreconditionFailed(format!(
                "unknown session state callback {id}"
            )));
        }
        let proxy = self.source().await?;
        proxy.unregister_session_state_cb(id).await?;
        self.registry.session_state_callbacks.remove(&id);
        debug!(listener = %id, "session state callback unregistered");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Forwarding filters
    // -----------------------------------------------------------------------

    /// Replace the cached sink screen geometry.
    pub fn update_sink_screen_infos(&self, payload: &str) -> Result<(), ClientError> {
        self.screen.update(payload).map(|_| ())
    }

    pub fn is_touch_event_need_filter_out(&self, event: &TouchEvent) -> bool {
        self.screen.is_touch_event_need_filter_out(event)
    }

    pub fn add_white_list_infos(
        &self,
        device_id: &DeviceId,
        payload: &str,
    ) -> Result<(), ClientError> {
        self.white_lists.add(device_id, payload).map(|_| ())
    }

    pub fn del_white_list_infos(&self, device_id: &DeviceId) -> Result<(), ClientError> {
        if device_id.is_empty() {
            return Err(precondition("empty device id"));
        }
        self.white_lists.remove(device_id);
        Ok(())
    }

    /// Whether a key event on `device_id` must stay local.
    ///
    /// Devices without a whitelist forward everything.
    pub fn is_need_filter_out(&self, device_id: &DeviceId, event: &BusinessEvent) -> bool {
        self.white_lists.is_need_filter_out(device_id, event)
    }

    // -----------------------------------------------------------------------
    // Sharing
    // -----------------------------------------------------------------------

    pub fn on_sharing(&self, dh_id: &DhId) -> Result<(), ClientError> {
        if dh_id.is_empty() {
            return Err(precondition("empty dhId"));
        }
        self.sharing.on_sharing(dh_id);
        Ok(())
    }

    pub fn on_no_sharing(&self, dh_id: &DhId) -> Result<(), ClientError> {
        if dh_id.is_empty() {
            return Err(precondition("empty dhId"));
        }
        self.sharing.on_no_sharing(dh_id);
        Ok(())
    }

    /// Whether `dh_id` is currently shared to a sink.
    pub fn is_start_distributed_input(&self, dh_id: &DhId) -> bool {
        self.sharing.contains(dh_id)
    }

    // -----------------------------------------------------------------------
    // Recovery
    // -----------------------------------------------------------------------

    fn wants(&self, role: ServiceRole) -> bool {
        let roles = lock(&self.roles);
        match role {
            ServiceRole::Source => {
                roles.source
                    || !self.registry.simulation_listeners.is_empty()
                    || !self.registry.session_state_callbacks.is_empty()
            }
            ServiceRole::Sink => roles.sink,
        }
    }

    /// Whether `role` lacks a live proxy carrying our registrations.
    async fn is_stale(&self, role: ServiceRole) -> bool {
        let live = self.connections.is_live(role).await;
        let token = self.connections.token(role).await;
        let synced = lock(&self.roles).synced(role);
        !live || token.is_none() || synced != token
    }

    /// Settle the requests owed by a dead proxy and schedule a reconcile.
    ///
    /// The token may belong to a proxy a caller already dropped as stale; its
    /// requests are failed all the same.
    pub(crate) async fn handle_remote_died(&self, token: ProxyToken) {
        let role = self.connections.on_remote_died(token).await;
        self.registry.fail_owned_by(token, ErrorKind::TransportFailure.code());
        if let Some(role) = role {
            self.recovery.schedule(role);
        }
    }

    pub(crate) async fn handle_availability(&self, event: AvailabilityEvent) {
        match event.kind {
            AvailabilityKind::Added => {
                if self.is_stale(event.role).await {
                    info!(role = %event.role, "service added, reconciling");
                    self.recovery.schedule(event.role);
                } else {
                    debug!(role = %event.role, "service added, proxy current");
                }
            }
            AvailabilityKind::Removed => {
                info!(role = %event.role, "service removed");
            }
        }
    }

    pub(crate) async fn health_check(&self) {
        for role in ServiceRole::BOTH {
            if self.wants(role) && self.is_stale(role).await {
                debug!(role = %role, "health check found stale proxy");
                self.recovery.schedule(role);
            }
        }
    }

    /// Reacquire `role`'s proxy and restore what the service should know.
    ///
    /// Failures are logged; the next death notice, availability event or
    /// health tick tries again.
    pub(crate) async fn reconcile(&self, role: ServiceRole) {
        self.recovery.take(role);
        if !self.wants(role) {
            debug!(role = %role, "nothing to restore");
            return;
        }
        let restored = match role {
            ServiceRole::Source => self.reconcile_source().await,
            ServiceRole::Sink => self.reconcile_sink().await,
        };
        if let Err(e) = restored {
            warn!(role = %role, error = %e, "reconcile failed");
        }
    }

    async fn reconcile_source(&self) -> Result<(), ClientError> {
        let proxy = self.connections.ensure_source().await?;
        let token = proxy.token();
        let initialised = {
            let roles = lock(&self.roles);
            if roles.source_synced == Some(token) {
                debug!(token = %token, "source registrations current");
                return Ok(());
            }
            roles.source
        };
        if initialised {
            proxy.init().await?;
            self.register_source_callbacks(&proxy).await?;
        }
        let listeners = self.registry.simulation_listeners.snapshot();
        let callbacks = self.registry.session_state_callbacks.snapshot();
        let replayed = listeners.len() + callbacks.len();
        for (id, listener) in listeners {
            proxy.register_simulation_event_listener(id, listener).await?;
        }
        for (id, callback) in callbacks {
            proxy.register_session_state_cb(id, callback).await?;
        }
        lock(&self.roles).source_synced = Some(token);
        info!(token = %token, initialised, replayed, "source registrations restored");
        Ok(())
    }

    async fn reconcile_sink(&self) -> Result<(), ClientError> {
        let proxy = self.connections.ensure_sink().await?;
        let token = proxy.token();
        if lock(&self.roles).sink_synced == Some(token) {
            debug!(token = %token, "sink registrations current");
            return Ok(());
        }
        proxy.init().await?;
        self.register_sink_callbacks(&proxy).await?;
        lock(&self.roles).sink_synced = Some(token);
        info!(token = %token, "sink registrations restored");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Teardown
    // -----------------------------------------------------------------------

    /// Forget all requests, listeners, caches and proxies.
    ///
    /// Pending callbacks are not invoked. Recovery tasks keep running.
    pub async fn reset(&self) {
        let purged = self.registry.purge_all();
        self.connections.reset().await;
        self.screen.clear();
        self.white_lists.clear();
        self.sharing.clear();
        *lock(&self.roles) = Roles::default();
        info!(purged, "client reset");
    }

    /// Stop the recovery tasks and tear everything down.
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
        self.recovery.stop();
        self.reset().await;
        let tasks = std::mem::take(&mut *lock(&self.tasks));
        for task in tasks {
            let _ = task.await;
        }
        info!("distributed input client shut down");
    }
}

#[cfg(test)]
mod tests {
    use dinput_ipc::mock::{MockServiceLocator, MockSinkService, MockSourceService, SourceCall};

    use super::*;

    struct Ignore;

    impl PrepareCallback for Ignore {
        fn on_result(&self, _peer: &SessionPeer, _status: i32) {}
    }

    impl StartCallback for Ignore {
        fn on_result(&self, _peer: &SessionPeer, _input_types: InputTypeMask, _status: i32) {}
    }

    impl StartStopDhIdsCallback for Ignore {
        fn on_result(&self, _peer: &SessionPeer, _dh_ids: &[DhId], _status: i32) {}
    }

    fn client_with(source: &MockSourceService) -> Arc<DistributedInputClient> {
        let locator = MockServiceLocator::with_services(source.clone(), MockSinkService::new());
        DistributedInputClient::new(Arc::new(locator), ClientConfig::default())
    }

    #[tokio::test]
    async fn invalid_arguments_never_reach_the_service() {
        let source = MockSourceService::new();
        let client = client_with(&source);
        let sink = DeviceId::new("sink");

        let err = client
            .start_remote_input(&sink, InputTypeMask::NONE, Arc::new(Ignore))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PreconditionFailed);

        let err = client
            .start_remote_input(&sink, InputTypeMask(8), Arc::new(Ignore))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PreconditionFailed);

        let err = client
            .stop_remote_input_dhids(&sink, &[], Arc::new(Ignore))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PreconditionFailed);

        let err = client
            .prepare_remote_input_relay(&DeviceId::new(""), &sink, Arc::new(Ignore))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PreconditionFailed);

        assert!(source.calls().is_empty());
        client.shutdown().await;
    }

    #[tokio::test]
    async fn relay_and_local_prepare_are_distinct_keys() {
        let source = MockSourceService::new();
        source.set_completion(dinput_ipc::mock::Completion::Manual);
        let client = client_with(&source);
        let sink = DeviceId::new("sink");

        client
            .prepare_remote_input(&sink, Arc::new(Ignore))
            .await
            .unwrap();
        client
            .prepare_remote_input_relay(&DeviceId::new("src"), &sink, Arc::new(Ignore))
            .await
            .unwrap();

        assert_eq!(client.registry().prepare.len(), 2);
        assert_eq!(
            source.calls(),
            vec![
                SourceCall::Prepare(SessionPeer::local(sink.clone())),
                SourceCall::Prepare(SessionPeer::relay(DeviceId::new("src"), sink)),
            ]
        );
        client.shutdown().await;
    }

    #[tokio::test]
    async fn server_role_tracks_latest_init() {
        let source = MockSourceService::new();
        let client = client_with(&source);
        assert_eq!(client.server_role(), ServerRole::None);

        client.init_source().await.unwrap();
        assert_eq!(client.server_role(), ServerRole::Source);
        client.init_sink().await.unwrap();
        assert_eq!(client.server_role(), ServerRole::Sink);
        client.release_sink().await.unwrap();
        assert_eq!(client.server_role(), ServerRole::Source);
        client.release_source().await.unwrap();
        assert_eq!(client.server_role(), ServerRole::None);
        client.shutdown().await;
    }

    #[tokio::test]
    async fn sharing_is_local_only() {
        let source = MockSourceService::new();
        let client = client_with(&source);
        let dh = DhId::new("Input_1");

        assert!(!client.is_start_distributed_input(&dh));
        client.on_sharing(&dh).unwrap();
        assert!(client.is_start_distributed_input(&dh));
        client.on_no_sharing(&dh).unwrap();
        assert!(!client.is_start_distributed_input(&dh));
        assert!(client.on_sharing(&DhId::new("")).is_err());
        assert!(source.calls().is_empty());
        client.shutdown().await;
    }
}
