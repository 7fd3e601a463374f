use std::net::Ipv4Addr;

/// The kind of discovery channel a peer was learned on. Only
/// [`Origin::LocalNetwork`] is currently realized by any backend in this
/// crate; the other two exist so the data model doesn't need to change when
/// one is added.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Origin {
    Bluetooth,
    LocalNetwork,
    Remote,
}

impl std::fmt::Display for Origin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Origin::Bluetooth => "bluetooth",
            Origin::LocalNetwork => "local-network",
            Origin::Remote => "remote",
        };
        f.write_str(s)
    }
}

/// Transport coordinates for dialing a peer once it's been discovered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerCoordinates {
    pub addr: Ipv4Addr,
    pub port: u16,
}

/// The (display name, origin) pair that uniquely identifies a peer. Used as
/// the registry's key instead of pointer/reference identity, since records
/// are plain owned values here rather than addresses into a shared map.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PeerIdentity {
    pub name: String,
    pub origin: Origin,
}

/// An immutable record of one discovered remote endpoint. Never mutated
/// after creation; a re-discovered peer under the same service name
/// replaces the old record wholesale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerRecord {
    pub name: String,
    pub origin: Origin,
    pub coordinates: PeerCoordinates,
}

impl PeerRecord {
    pub fn identity(&self) -> PeerIdentity {
        PeerIdentity {
            name: self.name.clone(),
            origin: self.origin,
        }
    }

    /// A minimal record used when a sender's identity can't be fully
    /// resolved (e.g. reverse-DNS failure on the receive side).
    pub fn unknown() -> Self {
        Self {
            name: "unknown".to_owned(),
            origin: Origin::LocalNetwork,
            coordinates: PeerCoordinates {
                addr: Ipv4Addr::UNSPECIFIED,
                port: 0,
            },
        }
    }
}
