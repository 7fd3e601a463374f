use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::peer::{PeerCoordinates, PeerIdentity, PeerRecord};

/// Maps discovery state onto stable peer identities. Exclusively owns
/// [`PeerRecord`]s; everyone else only ever gets read-only references
/// handed out via events.
///
/// Two independent maps, each behind its own lock: a service-name -> record
/// map, and an identity -> transport-coordinates map keyed by `(name,
/// origin)` rather than pointer identity. No operation holds both locks at
/// once; when both are needed the lock order is service-name map, then
/// coordinate map.
#[derive(Default)]
pub struct PeerRegistry {
    by_service_name: Mutex<HashMap<String, Arc<PeerRecord>>>,
    coordinates: Mutex<HashMap<PeerIdentity, PeerCoordinates>>,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts (or replaces) the record advertised under `service_name`.
    /// Last-writer-wins: a prior record under the same name is dropped.
    pub fn insert(&self, service_name: &str, record: Arc<PeerRecord>) {
        let identity = record.identity();
        let coordinates = record.coordinates;

        self.by_service_name
            .lock()
            .expect("peer registry service-name lock poisoned")
            .insert(service_name.to_owned(), record);

        self.coordinates
            .lock()
            .expect("peer registry coordinate lock poisoned")
            .insert(identity, coordinates);
    }

    /// Removes the record advertised under `service_name`, returning it if
    /// present.
    pub fn remove_by_service_name(&self, service_name: &str) -> Option<Arc<PeerRecord>> {
        let removed = self
            .by_service_name
            .lock()
            .expect("peer registry service-name lock poisoned")
            .remove(service_name);

        if let Some(record) = &removed {
            self.coordinates
                .lock()
                .expect("peer registry coordinate lock poisoned")
                .remove(&record.identity());
        }

        removed
    }

    pub fn lookup_coordinates(&self, identity: &PeerIdentity) -> Option<PeerCoordinates> {
        self.coordinates
            .lock()
            .expect("peer registry coordinate lock poisoned")
            .get(identity)
            .copied()
    }

    pub fn get_by_service_name(&self, service_name: &str) -> Option<Arc<PeerRecord>> {
        self.by_service_name
            .lock()
            .expect("peer registry service-name lock poisoned")
            .get(service_name)
            .cloned()
    }

    /// Number of peers currently resident; used by tests asserting registry
    /// consistency under interleaved add/remove events.
    pub fn len(&self) -> usize {
        self.by_service_name
            .lock()
            .expect("peer registry service-name lock poisoned")
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
