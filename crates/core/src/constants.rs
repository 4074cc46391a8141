//! Constants used throughout the flow core crate.

/// Directory (under the configured data directory) holding per-tenant snapshots.
pub const SNAPSHOT_DIR_NAME: &str = "tenants";

/// Filename of a tenant snapshot inside its sharded directory.
pub const SNAPSHOT_FILENAME: &str = "flow.json";

/// Number of recent event frames each tenant keeps for subscriber replay.
pub const DEFAULT_EVENT_HISTORY: usize = 256;

/// Capacity of each tenant's broadcast channel.
pub const DEFAULT_BROADCAST_CAPACITY: usize = 1024;

/// Upper bound on the practice UTC offset, in minutes (UTC+14:00).
pub const MAX_UTC_OFFSET_MINUTES: i32 = 14 * 60;

/// Maximum length of free-text fields (reason, notes).
pub const MAX_FREE_TEXT_LEN: usize = 2_000;
