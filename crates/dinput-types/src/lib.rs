//! Shared types for distributed input.
//!
//! This crate contains the data model shared across the workspace: device and
//! hardware identifiers, input type masks, captured events used by the
//! forwarding filters, sink screen geometry, server roles, opaque handles and
//! the closed set of status codes returned by every client operation.

pub mod device;
pub mod event;
pub mod handle;
pub mod role;
pub mod screen;
pub mod status;

pub use device::{DeviceId, DhId, EnableParams, InputTypeMask, SessionPeer};
pub use event::{BusinessEvent, KeyCombination, TouchEvent};
pub use handle::{ListenerId, ProxyToken};
pub use role::{ServerRole, ServiceRole};
pub use screen::ScreenRect;
pub use status::{ErrorKind, DH_SUCCESS};
