//! YAML inputs for `flow order` and `flow replay`.

use anyhow::{anyhow, Context};
use chrono::{DateTime, Utc};
use flow_core::{EncounterMode, JourneyAction, QueueStatus};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::path::Path;

/// A static list of entries whose "who is next" order should be printed.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OrderFile {
    pub entries: Vec<OrderEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OrderEntry {
    /// Free label printed in the output, typically the patient's name.
    pub label: String,
    #[serde(default)]
    pub priority: Option<i64>,
    pub arrived: DateTime<Utc>,
    #[serde(default = "waiting")]
    pub status: QueueStatus,
    #[serde(default)]
    pub manual_order: Option<i32>,
}

fn waiting() -> QueueStatus {
    QueueStatus::Waiting
}

/// A scripted session: patients arrive and staff act on them against a manual clock.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReplayFile {
    pub start: DateTime<Utc>,
    /// Patient labels; each becomes a directory entry for the replay tenant.
    pub patients: Vec<String>,
    pub steps: Vec<Step>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub enum Step {
    /// Move the clock forward by this many minutes.
    Advance(i64),
    Arrive {
        patient: String,
        #[serde(default)]
        priority: Option<i64>,
        #[serde(default)]
        reason: Option<String>,
    },
    Act {
        patient: String,
        action: JourneyAction,
        /// Status the acting user believes the entry is in; defaults to its current status.
        #[serde(default)]
        expected: Option<QueueStatus>,
    },
    /// Pin these patients to the front, in this order. An empty list clears every pin.
    Reorder(Vec<String>),
    Mode {
        patient: String,
        mode: EncounterMode,
    },
}

pub fn load<T: DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    parse(&text).with_context(|| format!("invalid script {}", path.display()))
}

/// Parse YAML, naming the failing field path on a schema mismatch.
pub fn parse<T: DeserializeOwned>(yaml_text: &str) -> anyhow::Result<T> {
    let deserializer = serde_yaml::Deserializer::from_str(yaml_text);
    serde_path_to_error::deserialize(deserializer).map_err(|err| {
        let path = err.path().to_string();
        let path = if path.is_empty() || path == "." {
            "<root>".to_string()
        } else {
            path
        };
        anyhow!("schema mismatch at {path}: {}", err.into_inner())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_file_defaults_status_to_waiting() {
        let file: OrderFile = parse(
            "entries:\n  - label: Ada\n    arrived: 2026-03-02T08:00:00Z\n    priority: 2\n",
        )
        .unwrap();
        assert_eq!(file.entries[0].status, QueueStatus::Waiting);
        assert_eq!(file.entries[0].priority, Some(2));
    }

    #[test]
    fn replay_steps_parse_from_tagged_maps() {
        let file: ReplayFile = parse(
            r#"
start: 2026-03-02T08:00:00Z
patients: [ada, grace]
steps:
  - arrive: { patient: ada, priority: 1 }
  - advance: 5
  - act: { patient: ada, action: call, expected: waiting }
  - reorder: [grace]
  - mode: { patient: ada, mode: team }
"#,
        )
        .unwrap();
        assert_eq!(file.steps.len(), 5);
        assert!(matches!(file.steps[1], Step::Advance(5)));
        assert!(matches!(
            file.steps[2],
            Step::Act {
                action: JourneyAction::Call,
                expected: Some(QueueStatus::Waiting),
                ..
            }
        ));
    }

    #[test]
    fn mismatch_names_the_field_path() {
        let err = parse::<OrderFile>(
            "entries:\n  - label: Ada\n    arrived: 2026-03-02T08:00:00Z\n    status: paused\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("entries[0].status"), "{err}");
    }
}
