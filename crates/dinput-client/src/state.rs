//! Proxy connection state machine.

/// State of the connection to one remote service.
///
/// `Absent -> Acquiring -> Bound -> Dead -> Absent`. A failed lookup goes
/// from `Acquiring` straight back to `Absent`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProxyState {
    /// No reference held.
    #[default]
    Absent,
    /// Lookup in progress.
    Acquiring,
    /// Reference held and death observer installed.
    Bound,
    /// Death notice received; the reference is being released.
    Dead,
}

impl ProxyState {
    /// Whether a lookup may start from this state.
    pub fn can_acquire(self) -> bool {
        self == Self::Absent
    }

    /// Whether a death notice applies in this state.
    pub fn can_die(self) -> bool {
        self == Self::Bound
    }

    pub fn is_bound(self) -> bool {
        self == Self::Bound
    }
}

impl std::fmt::Display for ProxyState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Absent => write!(f, "Absent"),
            Self::Acquiring => write!(f, "Acquiring"),
            Self::Bound => write!(f, "Bound"),
            Self::Dead => write!(f, "Dead"),
        }
    }
}
