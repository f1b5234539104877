//! Bookkeeping for in-flight requests and registered listeners.
//!
//! Every one-shot request is entered here before the remote call is issued and
//! leaves exactly once: on its asynchronous completion, when the synchronous
//! call fails, when the service dies, or on teardown. Locks cover only the map
//! mutation; callbacks are always invoked after the lock is released.

use std::collections::{BTreeSet, HashMap};
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use dinput_ipc::{
    PrepareCallback, RegisterCallback, SessionStateCallback, SimulationEventListener,
    StartCallback, StartStopDhIdsCallback, StopCallback, UnprepareCallback, UnregisterCallback,
};
use dinput_types::{DeviceId, DhId, InputTypeMask, ListenerId, ProxyToken, SessionPeer};
use tracing::{debug, warn};

use crate::error::ClientError;

/// Key of a register/unregister request.
pub type HardwareKey = (DeviceId, DhId);
/// Key of a start/stop request selected by input type.
pub type TypesKey = (SessionPeer, InputTypeMask);
/// Key of a start/stop request selected by dhId list.
pub type DhIdsKey = (SessionPeer, BTreeSet<DhId>);

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct Entry<C: ?Sized> {
    owner: ProxyToken,
    callback: Arc<C>,
}

/// In-flight requests of one kind, at most one per key.
///
/// Each entry remembers the proxy it was sent through, so the death of that
/// proxy settles exactly the requests it owed.
pub struct PendingCalls<K, C: ?Sized> {
    name: &'static str,
    entries: Mutex<HashMap<K, Entry<C>>>,
}

impl<K, C> PendingCalls<K, C>
where
    K: Eq + Hash + Clone + Debug,
    C: ?Sized,
{
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Record a request sent through the proxy `owner`. Fails if one with
    /// the same key is in flight.
    pub fn begin(&self, key: K, owner: ProxyToken, callback: Arc<C>) -> Result<(), ClientError> {
        let mut entries = lock(&self.entries);
        if entries.contains_key(&key) {
            debug!(kind = self.name, ?key, "duplicate request suppressed");
            return Err(ClientError::AlreadyPending(format!("{} {key:?}", self.name)));
        }
        entries.insert(key, Entry { owner, callback });
        Ok(())
    }

    /// Take the callback for a completion.
    ///
    /// Returns `None` for a completion nobody is waiting for; such completions
    /// are logged and must be dropped.
    pub fn complete(&self, key: &K) -> Option<Arc<C>> {
        let callback = lock(&self.entries).remove(key).map(|e| e.callback);
        if callback.is_none() {
            warn!(kind = self.name, ?key, "completion without pending request dropped");
        }
        callback
    }

    /// Remove a request whose remote call failed synchronously.
    ///
    /// Returns `false` if the request was already settled some other way.
    pub fn abandon(&self, key: &K) -> bool {
        lock(&self.entries).remove(key).is_some()
    }

    pub fn is_pending(&self, key: &K) -> bool {
        lock(&self.entries).contains_key(key)
    }

    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove and return every in-flight request.
    pub fn drain(&self) -> Vec<(K, Arc<C>)> {
        lock(&self.entries)
            .drain()
            .map(|(key, e)| (key, e.callback))
            .collect()
    }

    /// Remove and return the requests sent through `owner`.
    pub fn drain_owned_by(&self, owner: ProxyToken) -> Vec<(K, Arc<C>)> {
        let mut entries = lock(&self.entries);
        let keys: Vec<K> = entries
            .iter()
            .filter(|(_, e)| e.owner == owner)
            .map(|(key, _)| key.clone())
            .collect();
        keys.into_iter()
            .filter_map(|key| entries.remove(&key).map(|e| (key, e.callback)))
            .collect()
    }

    fn take(&self, owner: Option<ProxyToken>) -> Vec<(K, Arc<C>)> {
        match owner {
            Some(owner) => self.drain_owned_by(owner),
            None => self.drain(),
        }
    }
}

/// Listeners registered with a remote service, replayed after reconnects.
pub struct ListenerSet<L: ?Sized> {
    entries: Mutex<HashMap<ListenerId, Arc<L>>>,
}

impl<L: ?Sized> Default for ListenerSet<L> {
    fn default() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }
}

impl<L: ?Sized> ListenerSet<L> {
    pub fn insert(&self, id: ListenerId, listener: Arc<L>) {
        lock(&self.entries).insert(id, listener);
    }

    pub fn remove(&self, id: &ListenerId) -> Option<Arc<L>> {
        lock(&self.entries).remove(id)
    }

    pub fn contains(&self, id: &ListenerId) -> bool {
        lock(&self.entries).contains_key(id)
    }

    /// The id `listener` is already registered under, compared by identity.
    pub fn find(&self, listener: &Arc<L>) -> Option<ListenerId> {
        let wanted = Arc::as_ptr(listener).cast::<()>();
        lock(&self.entries)
            .iter()
            .find(|(_, l)| Arc::as_ptr(l).cast::<()>() == wanted)
            .map(|(id, _)| *id)
    }

    pub fn snapshot(&self) -> Vec<(ListenerId, Arc<L>)> {
        lock(&self.entries)
            .iter()
            .map(|(id, l)| (*id, Arc::clone(l)))
            .collect()
    }

    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        lock(&self.entries).clear();
    }
}

/// All request and listener bookkeeping for one client.
pub struct CallRegistry {
    pub register: PendingCalls<HardwareKey, dyn RegisterCallback>,
    pub unregister: PendingCalls<HardwareKey, dyn UnregisterCallback>,
    pub prepare: PendingCalls<SessionPeer, dyn PrepareCallback>,
    pub unprepare: PendingCalls<SessionPeer, dyn UnprepareCallback>,
    pub start: PendingCalls<TypesKey, dyn StartCallback>,
    pub stop: PendingCalls<TypesKey, dyn StopCallback>,
    pub start_dhids: PendingCalls<DhIdsKey, dyn StartStopDhIdsCallback>,
    pub stop_dhids: PendingCalls<DhIdsKey, dyn StartStopDhIdsCallback>,
    pub simulation_listeners: ListenerSet<dyn SimulationEventListener>,
    pub session_state_callbacks: ListenerSet<dyn SessionStateCallback>,
}

impl Default for CallRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl CallRegistry {
    pub fn new() -> Self {
        Self {
            register: PendingCalls::new("register"),
            unregister: PendingCalls::new("unregister"),
            prepare: PendingCalls::new("prepare"),
            unprepare: PendingCalls::new("unprepare"),
            start: PendingCalls::new("start"),
            stop: PendingCalls::new("stop"),
            start_dhids: PendingCalls::new("start-dhids"),
            stop_dhids: PendingCalls::new("stop-dhids"),
            simulation_listeners: ListenerSet::default(),
            session_state_callbacks: ListenerSet::default(),
        }
    }

    /// Number of one-shot requests in flight.
    pub fn pending_count(&self) -> usize {
        self.register.len()
            + self.unregister.len()
            + self.prepare.len()
            + self.unprepare.len()
            + self.start.len()
            + self.stop.len()
            + self.start_dhids.len()
            + self.stop_dhids.len()
    }

    /// Complete every in-flight request with `status`.
    ///
    /// Used when the source role is released. Returns the number of callbacks
    /// invoked.
    pub fn fail_all(&self, status: i32) -> usize {
        self.fail(None, status)
    }

    /// Complete the requests sent through the proxy `owner` with `status`.
    ///
    /// Used when that proxy is found dead. Requests sent through any other
    /// proxy are untouched.
    pub fn fail_owned_by(&self, owner: ProxyToken, status: i32) -> usize {
        self.fail(Some(owner), status)
    }

    fn fail(&self, owner: Option<ProxyToken>, status: i32) -> usize {
        let mut count = 0;
        for ((device_id, dh_id), cb) in self.register.take(owner) {
            cb.on_result(&device_id, &dh_id, status);
            count += 1;
        }
        for ((device_id, dh_id), cb) in self.unregister.take(owner) {
            cb.on_result(&device_id, &dh_id, status);
            count += 1;
        }
        for (peer, cb) in self.prepare.take(owner) {
            cb.on_result(&peer, status);
            count += 1;
        }
        for (peer, cb) in self.unprepare.take(owner) {
            cb.on_result(&peer, status);
            count += 1;
        }
        for ((peer, input_types), cb) in self.start.take(owner) {
            cb.on_result(&peer, input_types, status);
            count += 1;
        }
        for ((peer, input_types), cb) in self.stop.take(owner) {
            cb.on_result(&peer, input_types, status);
            count += 1;
        }
        let by_dhids = self
            .start_dhids
            .take(owner)
            .into_iter()
            .chain(self.stop_dhids.take(owner));
        for ((peer, dh_ids), cb) in by_dhids {
            let dh_ids: Vec<DhId> = dh_ids.into_iter().collect();
            cb.on_result(&peer, &dh_ids, status);
            count += 1;
        }
        if count > 0 {
            match owner {
                Some(owner) => {
                    warn!(count, status, token = %owner, "failed requests owed by dead proxy");
                }
                None => warn!(count, status, "failed in-flight requests"),
            }
        }
        count
    }

    /// Forget every request and listener without invoking anything.
    pub fn purge_all(&self) -> usize {
        let count = self.register.drain().len()
            + self.unregister.drain().len()
            + self.prepare.drain().len()
            + self.unprepare.drain().len()
            + self.start.drain().len()
            + self.stop.drain().len()
            + self.start_dhids.drain().len()
            + self.stop_dhids.drain().len();
        self.simulation_listeners.clear();
        self.session_state_callbacks.clear();
        if count > 0 {
            warn!(count, "purged in-flight requests on teardown");
        }
        count
    }
}
