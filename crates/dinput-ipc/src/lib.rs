//! Remote service contracts for distributed input.
//!
//! This crate defines what the client needs from the outside world: the
//! [`SourceService`] and [`SinkService`] interfaces hosted by the privileged
//! service processes, the callback interfaces those services invoke, and the
//! [`ServiceLocator`] used to find services and watch them come and go. The
//! marshalling behind a real proxy is not part of this crate; the `mock`
//! feature provides in-process implementations for tests and demos.

pub mod callback;
pub mod error;
pub mod locator;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod service;

pub use callback::{
    DelWhiteListCallback, PrepareCallback, RegisterCallback, ScreenInfoCallback,
    SessionStateCallback, SharingDhIdListener, SimulationEventListener, StartCallback,
    StartStopDhIdsCallback, StopCallback, UnprepareCallback, UnregisterCallback,
    WhiteListCallback,
};
pub use error::IpcError;
pub use locator::{AvailabilityEvent, AvailabilityKind, ServiceLocator};
pub use service::{RemoteObject, SinkService, SourceService};
