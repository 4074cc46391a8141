//! Patient directory lookup.
//!
//! The flow engine never owns patient demographics. It only needs to know that a patient exists
//! within a tenant (so that arrivals cannot be registered against unknown ids) and a display name
//! for queue boards. Any read-only directory can sit behind [`PatientDirectory`].

use crate::{FlowError, FlowResult};
use flow_types::NonEmptyText;
use flow_uuid::{PatientId, TenantId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::Debug;
use std::path::Path;

/// What the directory knows about a patient.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatientSummary {
    pub patient_id: PatientId,
    pub display_name: NonEmptyText,
    #[serde(default)]
    pub contact: Option<String>,
}

/// Read-only lookup from (tenant, patient) to a patient summary.
pub trait PatientDirectory: Send + Sync + Debug {
    fn lookup(&self, tenant_id: &TenantId, patient_id: &PatientId) -> Option<PatientSummary>;
}

/// One line of a directory file.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DirectoryRecord {
    pub tenant_id: TenantId,
    #[serde(flatten)]
    pub patient: PatientSummary,
}

/// Directory held entirely in memory, optionally loaded from a JSON file.
#[derive(Clone, Debug, Default)]
pub struct InMemoryDirectory {
    patients: HashMap<(TenantId, PatientId), PatientSummary>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, tenant_id: TenantId, patient: PatientSummary) {
        self.patients.insert((tenant_id, patient.patient_id), patient);
    }

    pub fn from_records(records: impl IntoIterator<Item = DirectoryRecord>) -> Self {
        let mut directory = Self::new();
        for record in records {
            directory.insert(record.tenant_id, record.patient);
        }
        directory
    }

    /// Load a JSON array of [`DirectoryRecord`]s.
    ///
    /// # Errors
    ///
    /// Returns [`FlowError::StorageUnavailable`] if the file cannot be read and
    /// [`FlowError::Validation`] if it is not a valid record list.
    pub fn load_json(path: &Path) -> FlowResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            FlowError::StorageUnavailable(format!(
                "failed to read patient directory {}: {e}",
                path.display()
            ))
        })?;
        let records: Vec<DirectoryRecord> = serde_json::from_str(&contents).map_err(|e| {
            FlowError::Validation(format!(
                "patient directory {} is not a valid record list: {e}",
                path.display()
            ))
        })?;

        tracing::info!(
            "loaded {} patient directory records from {}",
            records.len(),
            path.display()
        );
        Ok(Self::from_records(records))
    }

    pub fn len(&self) -> usize {
        self.patients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patients.is_empty()
    }
}

impl PatientDirectory for InMemoryDirectory {
    fn lookup(&self, tenant_id: &TenantId, patient_id: &PatientId) -> Option<PatientSummary> {
        self.patients.get(&(*tenant_id, *patient_id)).cloned()
    }
}
