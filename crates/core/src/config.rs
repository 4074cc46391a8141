//! Core runtime configuration.
//!
//! This module defines configuration that should be resolved once at process startup and then
//! passed into core services. Binaries read environment variables and hand the raw values to the
//! `*_from_env_value` helpers below; nothing in the core reads the environment during request
//! handling.

use crate::constants::{
    DEFAULT_BROADCAST_CAPACITY, DEFAULT_EVENT_HISTORY, MAX_UTC_OFFSET_MINUTES, SNAPSHOT_DIR_NAME,
};
use crate::{FlowError, FlowResult};
use chrono::{DateTime, FixedOffset, NaiveDate, Offset, Utc};
use flow_uuid::TenantId;
use std::path::{Path, PathBuf};

/// Core configuration resolved at startup.
#[derive(Clone, Debug)]
pub struct CoreConfig {
    data_dir: Option<PathBuf>,
    utc_offset: FixedOffset,
    event_history_capacity: usize,
    broadcast_capacity: usize,
}

impl Default for CoreConfig {
    /// In-memory only, UTC practice day, default channel sizes.
    fn default() -> Self {
        Self {
            data_dir: None,
            utc_offset: utc(),
            event_history_capacity: DEFAULT_EVENT_HISTORY,
            broadcast_capacity: DEFAULT_BROADCAST_CAPACITY,
        }
    }
}

impl CoreConfig {
    /// Create a new `CoreConfig`.
    ///
    /// # Arguments
    ///
    /// * `data_dir` - Root for tenant snapshots; `None` keeps all state in memory.
    /// * `utc_offset` - Offset of the practice's local time, used to decide what "today" means
    ///   for the one-open-encounter-per-day rule.
    /// * `event_history_capacity` - Frames retained per tenant for subscriber replay.
    /// * `broadcast_capacity` - Capacity of each tenant's broadcast channel.
    ///
    /// # Errors
    ///
    /// Returns [`FlowError::Validation`] if either capacity is zero or `data_dir` exists but is
    /// not a directory.
    pub fn new(
        data_dir: Option<PathBuf>,
        utc_offset: FixedOffset,
        event_history_capacity: usize,
        broadcast_capacity: usize,
    ) -> FlowResult<Self> {
        if event_history_capacity == 0 {
            return Err(FlowError::Validation(
                "event history capacity must be at least 1".into(),
            ));
        }
        if broadcast_capacity == 0 {
            return Err(FlowError::Validation(
                "broadcast capacity must be at least 1".into(),
            ));
        }
        if let Some(dir) = &data_dir {
            if dir.exists() && !dir.is_dir() {
                return Err(FlowError::Validation(format!(
                    "data directory is not a directory: {}",
                    dir.display()
                )));
            }
        }

        Ok(Self {
            data_dir,
            utc_offset,
            event_history_capacity,
            broadcast_capacity,
        })
    }

    pub fn data_dir(&self) -> Option<&Path> {
        self.data_dir.as_deref()
    }

    /// Root directory for tenant snapshots, if persistence is enabled.
    pub fn snapshot_root(&self) -> Option<PathBuf> {
        self.data_dir.as_ref().map(|d| d.join(SNAPSHOT_DIR_NAME))
    }

    pub fn utc_offset(&self) -> FixedOffset {
        self.utc_offset
    }

    pub fn event_history_capacity(&self) -> usize {
        self.event_history_capacity
    }

    pub fn broadcast_capacity(&self) -> usize {
        self.broadcast_capacity
    }

    /// The practice-local calendar day containing `at`.
    pub fn practice_day(&self, at: DateTime<Utc>) -> NaiveDate {
        at.with_timezone(&self.utc_offset).date_naive()
    }
}

fn utc() -> FixedOffset {
    Utc.fix()
}

/// Parse the practice UTC offset (in minutes) from an optional string value.
///
/// If `value` is `None` or empty/whitespace, returns UTC.
pub fn utc_offset_from_env_value(value: Option<String>) -> FlowResult<FixedOffset> {
    let Some(raw) = non_empty(value) else {
        return Ok(utc());
    };

    let minutes: i32 = raw.parse().map_err(|_| {
        FlowError::Validation(format!("UTC offset must be a whole number of minutes, got '{raw}'"))
    })?;
    if minutes.abs() > MAX_UTC_OFFSET_MINUTES {
        return Err(FlowError::Validation(format!(
            "UTC offset must be within ±{MAX_UTC_OFFSET_MINUTES} minutes, got {minutes}"
        )));
    }

    FixedOffset::east_opt(minutes * 60)
        .ok_or_else(|| FlowError::Validation(format!("invalid UTC offset: {minutes} minutes")))
}

/// Parse a positive capacity from an optional string value, falling back to `default`.
pub fn capacity_from_env_value(
    name: &str,
    value: Option<String>,
    default: usize,
) -> FlowResult<usize> {
    let Some(raw) = non_empty(value) else {
        return Ok(default);
    };

    match raw.parse::<usize>() {
        Ok(0) | Err(_) => Err(FlowError::Validation(format!(
            "{name} must be a positive integer, got '{raw}'"
        ))),
        Ok(n) => Ok(n),
    }
}

/// Parse a comma-separated list of canonical tenant ids.
///
/// Empty input yields an empty list; duplicates are removed while keeping first-seen order.
pub fn tenants_from_env_value(value: Option<String>) -> FlowResult<Vec<TenantId>> {
    let Some(raw) = non_empty(value) else {
        return Ok(Vec::new());
    };

    let mut tenants: Vec<TenantId> = Vec::new();
    for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let id = TenantId::parse(part)?;
        if !tenants.contains(&id) {
            tenants.push(id);
        }
    }
    Ok(tenants)
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn utc_offset_defaults_to_utc() {
        let offset = utc_offset_from_env_value(None).unwrap();
        assert_eq!(offset.local_minus_utc(), 0);
        let offset = utc_offset_from_env_value(Some("  ".into())).unwrap();
        assert_eq!(offset.local_minus_utc(), 0);
    }

    #[test]
    fn utc_offset_parses_minutes() {
        let offset = utc_offset_from_env_value(Some("-300".into())).unwrap();
        assert_eq!(offset.local_minus_utc(), -300 * 60);
    }

    #[test]
    fn utc_offset_rejects_garbage_and_out_of_range() {
        assert!(utc_offset_from_env_value(Some("east".into())).is_err());
        assert!(utc_offset_from_env_value(Some("9000".into())).is_err());
    }

    #[test]
    fn capacity_rejects_zero() {
        assert!(capacity_from_env_value("FLOW_EVENT_HISTORY", Some("0".into()), 8).is_err());
        assert_eq!(
            capacity_from_env_value("FLOW_EVENT_HISTORY", None, 8).unwrap(),
            8
        );
    }

    #[test]
    fn tenants_parse_and_dedupe() {
        let a = "00000000000000000000000000000001";
        let b = "00000000000000000000000000000002";
        let tenants = tenants_from_env_value(Some(format!("{a}, {b},{a}"))).unwrap();
        assert_eq!(tenants.len(), 2);
        assert_eq!(tenants[0].to_string(), a);
    }

    #[test]
    fn tenants_reject_non_canonical_ids() {
        assert!(tenants_from_env_value(Some("not-a-tenant".into())).is_err());
    }

    #[test]
    fn practice_day_respects_offset() {
        let offset = utc_offset_from_env_value(Some("-300".into())).unwrap();
        let cfg = CoreConfig::new(None, offset, 4, 4).unwrap();
        // 02:00 UTC is still the previous evening at UTC-5.
        let at = Utc.with_ymd_and_hms(2026, 3, 10, 2, 0, 0).unwrap();
        assert_eq!(
            cfg.practice_day(at),
            NaiveDate::from_ymd_opt(2026, 3, 9).unwrap()
        );
    }

    #[test]
    fn new_rejects_zero_capacities() {
        assert!(CoreConfig::new(None, utc(), 0, 4).is_err());
        assert!(CoreConfig::new(None, utc(), 4, 0).is_err());
    }
}
