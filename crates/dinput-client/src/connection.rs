//! Connections to the source and sink services.
//!
//! Each role has one slot holding the current proxy and its [`ProxyState`].
//! A slot is locked for the whole of a lookup so concurrent callers share a
//! single lookup instead of racing. Lookups are bounded by the configured load
//! timeout; nothing here retries.

use std::sync::Arc;
use std::time::Duration;

use dinput_ipc::{AvailabilityEvent, RemoteObject, ServiceLocator, SinkService, SourceService};
use dinput_types::{ProxyToken, ServiceRole};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

use crate::error::ClientError;
use crate::state::ProxyState;

struct Slot<S: ?Sized> {
    state: ProxyState,
    proxy: Option<Arc<S>>,
}

impl<S: RemoteObject + ?Sized> Slot<S> {
    fn new() -> Self {
        Self {
            state: ProxyState::Absent,
            proxy: None,
        }
    }

    /// The held proxy, if bound and still alive.
    fn live(&self) -> Option<Arc<S>> {
        if !self.state.is_bound() {
            return None;
        }
        self.proxy.as_ref().filter(|p| p.is_alive()).cloned()
    }

    fn token(&self) -> Option<ProxyToken> {
        self.proxy.as_ref().map(|p| p.token())
    }

    /// Let go of the held proxy and its death observer.
    fn release(&mut self, role: ServiceRole) {
        if self.state.can_die() {
            self.state = ProxyState::Dead;
        }
        if let Some(proxy) = self.proxy.take() {
            proxy.remove_death_recipient();
            debug!(role = %role, token = %proxy.token(), "proxy released");
        }
        self.state = ProxyState::Absent;
    }

    /// Install the result of a lookup.
    fn bind(
        &mut self,
        role: ServiceRole,
        found: Option<Arc<S>>,
        death_tx: &mpsc::UnboundedSender<ProxyToken>,
    ) -> Result<Arc<S>, ClientError> {
        let Some(proxy) = found else {
            self.state = ProxyState::Absent;
            warn!(role = %role, "service lookup found nothing");
            return Err(ClientError::ServiceUnavailable(role));
        };
        if !proxy.add_death_recipient(death_tx.clone()) {
            self.state = ProxyState::Absent;
            warn!(role = %role, "service died during lookup");
            return Err(ClientError::ServiceUnavailable(role));
        }
        info!(role = %role, token = %proxy.token(), "service bound");
        self.state = ProxyState::Bound;
        self.proxy = Some(Arc::clone(&proxy));
        Ok(proxy)
    }
}

/// Service Connection Manager.
pub struct ServiceConnections {
    locator: Arc<dyn ServiceLocator>,
    load_timeout: Duration,
    death_tx: mpsc::UnboundedSender<ProxyToken>,
    source: Mutex<Slot<dyn SourceService>>,
    sink: Mutex<Slot<dyn SinkService>>,
}

impl ServiceConnections {
    /// Death notices of every proxy bound here are sent to `death_tx`.
    pub fn new(
        locator: Arc<dyn ServiceLocator>,
        load_timeout: Duration,
        death_tx: mpsc::UnboundedSender<ProxyToken>,
    ) -> Self {
        Self {
            locator,
            load_timeout,
            death_tx,
            source: Mutex::new(Slot::new()),
            sink: Mutex::new(Slot::new()),
        }
    }

    /// A live source proxy, looked up if necessary.
    pub async fn ensure_source(&self) -> Result<Arc<dyn SourceService>, ClientError> {
        let role = ServiceRole::Source;
        let mut slot = self.source.lock().await;
        if let Some(proxy) = slot.live() {
            return Ok(proxy);
        }
        if let Some(token) = slot.token() {
            self.drop_dead(&mut *slot, role, token);
        }
        debug_assert!(slot.state.can_acquire());
        slot.state = ProxyState::Acquiring;
        let found = self.bounded(role, self.locator.get_source_service()).await;
        slot.bind(role, found, &self.death_tx)
    }

    /// A live sink proxy, looked up if necessary.
    pub async fn ensure_sink(&self) -> Result<Arc<dyn SinkService>, ClientError> {
        let role = ServiceRole::Sink;
        let mut slot = self.sink.lock().await;
        if let Some(proxy) = slot.live() {
            return Ok(proxy);
        }
        if let Some(token) = slot.token() {
            self.drop_dead(&mut *slot, role, token);
        }
        debug_assert!(slot.state.can_acquire());
        slot.state = ProxyState::Acquiring;
        let found = self.bounded(role, self.locator.get_sink_service()).await;
        slot.bind(role, found, &self.death_tx)
    }

    /// Release a proxy found dead before its death notice was handled.
    ///
    /// The token is posted as a death notice so the requests it owed are
    /// settled. A duplicate notice for the same token is harmless.
    fn drop_dead<S: RemoteObject + ?Sized>(
        &self,
        slot: &mut Slot<S>,
        role: ServiceRole,
        token: ProxyToken,
    ) {
        debug!(role = %role, token = %token, "dropping dead proxy");
        slot.release(role);
        let _ = self.death_tx.send(token);
    }

    async fn bounded<T>(
        &self,
        role: ServiceRole,
        lookup: impl std::future::Future<Output = Option<T>>,
    ) -> Option<T> {
        match tokio::time::timeout(self.load_timeout, lookup).await {
            Ok(found) => found,
            Err(_) => {
                warn!(role = %role, timeout = ?self.load_timeout, "service lookup timed out");
                None
            }
        }
    }

    /// Handle a death notice.
    ///
    /// Returns the role whose proxy carried `token`, or `None` for a notice
    /// about a proxy that is no longer held.
    pub async fn on_remote_died(&self, token: ProxyToken) -> Option<ServiceRole> {
        {
            let mut slot = self.source.lock().await;
            if slot.state.can_die() && slot.token() == Some(token) {
                slot.release(ServiceRole::Source);
                info!(role = %ServiceRole::Source, token = %token, "service died");
                return Some(ServiceRole::Source);
            }
        }
        {
            let mut slot = self.sink.lock().await;
            if slot.state.can_die() && slot.token() == Some(token) {
                slot.release(ServiceRole::Sink);
                info!(role = %ServiceRole::Sink, token = %token, "service died");
                return Some(ServiceRole::Sink);
            }
        }
        debug!(token = %token, "death notice for a proxy no longer held");
        None
    }

    /// Whether `role` has a bound proxy that is still alive.
    pub async fn is_live(&self, role: ServiceRole) -> bool {
        match role {
            ServiceRole::Source => self.source.lock().await.live().is_some(),
            ServiceRole::Sink => self.sink.lock().await.live().is_some(),
        }
    }

    pub async fn state(&self, role: ServiceRole) -> ProxyState {
        match role {
            ServiceRole::Source => self.source.lock().await.state,
            ServiceRole::Sink => self.sink.lock().await.state,
        }
    }

    /// Token of the proxy currently held for `role`.
    pub async fn token(&self, role: ServiceRole) -> Option<ProxyToken> {
        match role {
            ServiceRole::Source => self.source.lock().await.token(),
            ServiceRole::Sink => self.sink.lock().await.token(),
        }
    }

    /// Subscribe `tx` to service add/remove notifications.
    pub fn register_availability_listener(
        &self,
        tx: mpsc::UnboundedSender<AvailabilityEvent>,
    ) -> Result<(), ClientError> {
        self.locator.subscribe(tx)?;
        debug!("availability listener registered");
        Ok(())
    }

    /// Drop both proxies.
    pub async fn reset(&self) {
        self.source.lock().await.release(ServiceRole::Source);
        self.sink.lock().await.release(ServiceRole::Sink);
    }
}
