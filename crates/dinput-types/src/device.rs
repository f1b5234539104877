//! Device and hardware identifiers.

use serde::{Deserialize, Serialize};

/// Opaque network id of a physical device taking part in a session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DeviceId(pub String);

impl DeviceId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Display for DeviceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeviceId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Opaque id of one input hardware instance (a "dhId") on a device.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DhId(pub String);

impl DhId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Display for DhId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DhId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// The device pair a prepare/start/stop request targets.
///
/// `src` is `None` when the local device is the source; `Some` for relay
/// requests issued on behalf of another source.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionPeer {
    pub src: Option<DeviceId>,
    pub sink: DeviceId,
}

impl SessionPeer {
    #[must_use]
    pub fn local(sink: DeviceId) -> Self {
        Self { src: None, sink }
    }

    #[must_use]
    pub fn relay(src: DeviceId, sink: DeviceId) -> Self {
        Self {
            src: Some(src),
            sink,
        }
    }

    /// Whether any identifying string is empty.
    #[must_use]
    pub fn has_empty_id(&self) -> bool {
        self.sink.is_empty() || self.src.as_ref().is_some_and(DeviceId::is_empty)
    }
}

impl std::fmt::Display for SessionPeer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.src {
            Some(src) => write!(f, "{src}->{}", self.sink),
            None => write!(f, "local->{}", self.sink),
        }
    }
}

/// Bitmask over the kinds of input hardware a start/stop request covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InputTypeMask(pub u32);

impl InputTypeMask {
    pub const NONE: Self = Self(0);
    pub const MOUSE: Self = Self(1);
    pub const KEYBOARD: Self = Self(1 << 1);
    pub const TOUCHSCREEN: Self = Self(1 << 2);
    pub const ALL: Self = Self(Self::MOUSE.0 | Self::KEYBOARD.0 | Self::TOUCHSCREEN.0);

    #[must_use]
    pub fn bits(self) -> u32 {
        self.0
    }

    #[must_use]
    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    #[must_use]
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Non-empty and no bits outside [`InputTypeMask::ALL`].
    #[must_use]
    pub fn is_valid(self) -> bool {
        !self.is_empty() && self.0 & !Self::ALL.0 == 0
    }
}

impl std::ops::BitOr for InputTypeMask {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl std::fmt::Display for InputTypeMask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names = Vec::new();
        if self.contains(Self::MOUSE) {
            names.push("mouse");
        }
        if self.contains(Self::KEYBOARD) {
            names.push("keyboard");
        }
        if self.contains(Self::TOUCHSCREEN) {
            names.push("touchscreen");
        }
        if names.is_empty() {
            write!(f, "none({:#x})", self.0)
        } else {
            write!(f, "{}", names.join("|"))
        }
    }
}

/// Parameters forwarded to the source service when enabling a dhId.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnableParams {
    /// Version string of the sink implementation.
    pub version: String,
    /// Free-form attribute blob describing the hardware.
    pub attrs: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mask_all_covers_every_type() {
        assert!(InputTypeMask::ALL.contains(InputTypeMask::MOUSE));
        assert!(InputTypeMask::ALL.contains(InputTypeMask::KEYBOARD));
        assert!(InputTypeMask::ALL.contains(InputTypeMask::TOUCHSCREEN));
        assert_eq!(InputTypeMask::ALL.bits(), 7);
    }

    #[test]
    fn mask_validity() {
        assert!(InputTypeMask::MOUSE.is_valid());
        assert!((InputTypeMask::MOUSE | InputTypeMask::KEYBOARD).is_valid());
        assert!(!InputTypeMask::NONE.is_valid());
        assert!(!InputTypeMask(8).is_valid());
        assert!(!InputTypeMask(9).is_valid());
    }

    #[test]
    fn mask_display() {
        assert_eq!(InputTypeMask::ALL.to_string(), "mouse|keyboard|touchscreen");
        assert_eq!(InputTypeMask::NONE.to_string(), "none(0x0)");
    }

    #[test]
    fn ids_are_opaque() {
        let dev = DeviceId::new("a:b:c");
        assert_eq!(dev.as_str(), "a:b:c");
        assert!(!dev.is_empty());
        assert!(DhId::from("").is_empty());
    }

    #[test]
    fn session_peer_empty_ids() {
        assert!(SessionPeer::local(DeviceId::new("")).has_empty_id());
        assert!(SessionPeer::relay(DeviceId::new(""), DeviceId::new("sink")).has_empty_id());
        assert!(!SessionPeer::relay(DeviceId::new("src"), DeviceId::new("sink")).has_empty_id());
        assert_eq!(
            SessionPeer::relay(DeviceId::new("a"), DeviceId::new("b")).to_string(),
            "a->b"
        );
    }

    #[test]
    fn device_id_serde_roundtrip() {
        let id = DeviceId::new("dev1");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"dev1\"");
        let decoded: DeviceId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, decoded);
    }
}
