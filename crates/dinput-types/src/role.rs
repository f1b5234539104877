//! Local and remote service roles.

use serde::{Deserialize, Serialize};

/// Which role the local process currently fulfils.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ServerRole {
    #[default]
    None,
    Source,
    Sink,
}

impl std::fmt::Display for ServerRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Source => write!(f, "source"),
            Self::Sink => write!(f, "sink"),
        }
    }
}

/// One of the two remote services a client talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ServiceRole {
    Source,
    Sink,
}

impl ServiceRole {
    pub const BOTH: [Self; 2] = [Self::Source, Self::Sink];

    /// The local server role implied by initialising this service.
    #[must_use]
    pub fn server_role(self) -> ServerRole {
        match self {
            Self::Source => ServerRole::Source,
            Self::Sink => ServerRole::Sink,
        }
    }
}

impl std::fmt::Display for ServiceRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Source => write!(f, "source"),
            Self::Sink => write!(f, "sink"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_role_is_none() {
        assert_eq!(ServerRole::default(), ServerRole::None);
    }

    #[test]
    fn service_role_maps_to_server_role() {
        assert_eq!(ServiceRole::Source.server_role(), ServerRole::Source);
        assert_eq!(ServiceRole::Sink.server_role(), ServerRole::Sink);
    }
}
