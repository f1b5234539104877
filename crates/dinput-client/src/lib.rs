//! Client side of the distributed input session protocol.
//!
//! [`DistributedInputClient`] is the single entry point. It validates each
//! request, binds the source or sink service on demand, records the request
//! in the [`CallRegistry`] so its asynchronous completion reaches the right
//! callback exactly once, and keeps listener registrations alive across
//! service restarts through the [`recovery`] tasks. The forwarding filters
//! ([`ScreenFilter`], [`WhiteListStore`]) answer locally whether a captured
//! touch or key event should be sent to the sink.

mod bridge;
pub mod client;
pub mod config;
pub mod connection;
pub mod error;
pub mod filter;
pub mod recovery;
pub mod registry;
pub mod setup;
pub mod sharing;
pub mod state;
pub mod whitelist;

pub use client::DistributedInputClient;
pub use config::{ClientConfig, LogConfig, ServiceConfig};
pub use connection::ServiceConnections;
pub use error::ClientError;
pub use filter::ScreenFilter;
pub use recovery::{RecoveryQueues, RecoveryTask};
pub use registry::{CallRegistry, ListenerSet, PendingCalls};
pub use sharing::SharingDhIds;
pub use state::ProxyState;
pub use whitelist::WhiteListStore;
