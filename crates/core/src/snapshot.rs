//! Durable JSON snapshots of tenant state.
//!
//! Each tenant is written to `<root>/<s1>/<s2>/<tenant_id>/flow.json` using the same sharded
//! layout as every other id-keyed directory. Writes go to a temporary file first and are renamed
//! into place, so a reader never sees a half-written snapshot.

use crate::constants::SNAPSHOT_FILENAME;
use crate::tenant::TenantState;
use crate::{FlowError, FlowResult};
use chrono::{DateTime, Utc};
use flow_uuid::TenantId;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// A tenant's state as persisted on disk.
#[derive(Clone, Debug, Deserialize)]
pub struct TenantSnapshot {
    pub tenant_id: TenantId,
    pub saved_at: DateTime<Utc>,
    /// Sequence of the last frame published before the snapshot was taken.
    pub last_sequence: u64,
    pub state: TenantState,
}

#[derive(Serialize)]
struct SnapshotRef<'a> {
    tenant_id: TenantId,
    saved_at: DateTime<Utc>,
    last_sequence: u64,
    state: &'a TenantState,
}

#[derive(Clone, Debug)]
pub struct SnapshotStore {
    root: PathBuf,
}

impl SnapshotStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, tenant_id: &TenantId) -> PathBuf {
        tenant_id
            .canonical()
            .sharded_dir(&self.root)
            .join(SNAPSHOT_FILENAME)
    }

    /// Persist `state` for `tenant_id`.
    ///
    /// # Errors
    ///
    /// Returns [`FlowError::Serialization`] if the state cannot be encoded and
    /// [`FlowError::SnapshotWrite`] if the directory or file cannot be written.
    pub fn save(
        &self,
        tenant_id: &TenantId,
        last_sequence: u64,
        saved_at: DateTime<Utc>,
        state: &TenantState,
    ) -> FlowResult<()> {
        let path = self.path_for(tenant_id);
        let dir = path
            .parent()
            .ok_or_else(|| FlowError::StorageUnavailable(format!("bad snapshot path {}", path.display())))?;
        fs::create_dir_all(dir).map_err(FlowError::SnapshotWrite)?;

        let json = serde_json::to_vec(&SnapshotRef {
            tenant_id: *tenant_id,
            saved_at,
            last_sequence,
            state,
        })
        .map_err(FlowError::Serialization)?;

        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(FlowError::SnapshotWrite)?;
        fs::rename(&tmp, &path).map_err(FlowError::SnapshotWrite)?;
        Ok(())
    }

    /// Load the snapshot for `tenant_id`, or `None` if none has been written yet.
    pub fn load(&self, tenant_id: &TenantId) -> FlowResult<Option<TenantSnapshot>> {
        let path = self.path_for(tenant_id);
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(FlowError::SnapshotRead(e)),
        };

        let snapshot: TenantSnapshot =
            serde_json::from_str(&contents).map_err(FlowError::Deserialization)?;
        if snapshot.tenant_id != *tenant_id {
            return Err(FlowError::Corrupt(format!(
                "snapshot {} belongs to tenant {}",
                path.display(),
                snapshot.tenant_id
            )));
        }
        Ok(Some(snapshot))
    }
}
