use std::path::PathBuf;
use std::sync::Arc;

use crate::snapkeep::clients::WaClient;
use crate::snapkeep::status::StatusType;
use crate::snapkeep::storage::{
    DocumentGateway, PermissionGate, SaveLocation, StorageDevice, TreeHandle,
};

/// A resolved status location. The variant doubles as the capability flag:
/// `Direct` supports plain file listing, `Mediated` only provider queries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusLocation {
    Direct { dir: PathBuf },
    Mediated { tree: TreeHandle },
}

/// Why a location could not be resolved. Both cases are normal outcomes,
/// not failures: the caller maps them to result codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unresolvable {
    /// Neither broad storage access nor a document-tree grant is available.
    PermissionDenied,
    /// Access is fine but the expected directory does not exist (client not
    /// installed, or never produced a status).
    Missing,
}

/// Resolves client status directories and the app's own saves directory,
/// selecting the direct-path or mediated strategy from the permission
/// layer's signal. Never assumes either strategy is available.
pub struct StorageLocator {
    gate: Arc<dyn PermissionGate>,
    gateway: Arc<dyn DocumentGateway>,
}

impl StorageLocator {
    pub fn new(gate: Arc<dyn PermissionGate>, gateway: Arc<dyn DocumentGateway>) -> Self {
        Self { gate, gateway }
    }

    pub fn has_storage_access(&self) -> bool {
        self.gate.has_storage_access()
    }

    /// Resolves the directory holding `client`'s status media on `device`.
    ///
    /// With broad storage access the scoped layout is probed first (newer
    /// client builds), then the legacy layout. Without it, a persisted
    /// document-tree grant is the only way in.
    pub fn locate_statuses(
        &self,
        client: WaClient,
        device: &StorageDevice,
    ) -> Result<StatusLocation, Unresolvable> {
        if self.gate.has_storage_access() {
            let scoped = device.root.join(client.scoped_status_dir());
            if scoped.is_dir() {
                return Ok(StatusLocation::Direct { dir: scoped });
            }
            let legacy = device.root.join(client.legacy_status_dir());
            if legacy.is_dir() {
                return Ok(StatusLocation::Direct { dir: legacy });
            }
            return Err(Unresolvable::Missing);
        }

        match self.gateway.status_tree(client) {
            Some(tree) => Ok(StatusLocation::Mediated { tree }),
            None => Err(Unresolvable::PermissionDenied),
        }
    }

    /// The directory saved copies are written to for the given type and
    /// save-location setting. Purely a path computation; the directory may
    /// not exist yet.
    pub fn saves_dir(
        &self,
        status_type: StatusType,
        location: SaveLocation,
        device: &StorageDevice,
    ) -> PathBuf {
        device.root.join(location.relative_saves_dir(status_type))
    }
}
