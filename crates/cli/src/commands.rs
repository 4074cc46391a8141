//! Command implementations. Each returns the text to print so it can be asserted on in tests.

use crate::script::{OrderFile, ReplayFile, Step};
use anyhow::{anyhow, bail, Context};
use chrono::{Duration, FixedOffset, SecondsFormat};
use flow_core::constants::{DEFAULT_BROADCAST_CAPACITY, DEFAULT_EVENT_HISTORY};
use flow_core::{
    ordering, Actor, ActorId, ActorRole, CoreConfig, EntryFilter, EntryId, FlowRegistry,
    InMemoryDirectory, ManualClock, NewEntry, NonEmptyText, PatientId, PatientSummary, Priority,
    QueueEntry, QueueStatus, SnapshotStore, TenantFlow, TenantId,
};
use std::collections::HashMap;
use std::fmt::Write;
use std::path::Path;
use std::sync::Arc;

/// Print the computed "who is next" order for a static list of entries.
pub fn order(file: &OrderFile) -> anyhow::Result<String> {
    let tenant_id = TenantId::new();
    let mut labels: HashMap<EntryId, &str> = HashMap::new();
    let mut entries = Vec::with_capacity(file.entries.len());

    for (n, row) in file.entries.iter().enumerate() {
        let priority = match row.priority {
            Some(p) => Priority::new(p)
                .with_context(|| format!("entry {} ({})", n + 1, row.label))?,
            None => Priority::default(),
        };
        if let Some(position) = row.manual_order {
            flow_core::validation::validate_manual_order(position)?;
        }

        let id = EntryId::new();
        labels.insert(id, row.label.as_str());
        entries.push(QueueEntry {
            id,
            tenant_id,
            patient_id: PatientId::new(),
            status: row.status,
            priority,
            arrival_time: row.arrived,
            ready_at: None,
            manual_order: row.manual_order.filter(|_| row.status.is_pending()),
            reason: None,
            notes: None,
            assigned_practitioner: None,
            encounter_id: None,
            version: 1,
            updated_at: row.arrived,
        });
    }

    let ordered = ordering::order_queue(&entries);
    let mut out = String::new();
    if ordered.is_empty() {
        out.push_str("queue is empty\n");
    }
    for (position, entry) in ordered.iter().enumerate() {
        let label = labels.get(&entry.id).copied().unwrap_or("?");
        writeln!(out, "{:>3}. {}", position + 1, describe(label, entry))?;
    }
    Ok(out)
}

/// Run a scripted session against an in-memory tenant and report every step.
///
/// Rejected steps (a stale action, an illegal transition) are printed and the script continues,
/// so a replay can demonstrate concurrent-edit conflicts.
pub fn replay(file: &ReplayFile) -> anyhow::Result<String> {
    let tenant_id = TenantId::new();
    let mut patients: HashMap<&str, PatientId> = HashMap::new();
    let mut directory = InMemoryDirectory::new();
    for label in &file.patients {
        let patient_id = PatientId::new();
        if patients.insert(label.as_str(), patient_id).is_some() {
            bail!("patient '{label}' is listed twice");
        }
        directory.insert(
            tenant_id,
            PatientSummary {
                patient_id,
                display_name: NonEmptyText::new(label)?,
                contact: None,
            },
        );
    }

    let clock = Arc::new(ManualClock::new(file.start));
    let registry = FlowRegistry::new(CoreConfig::default(), clock.clone(), Arc::new(directory));
    let flow = registry.register_tenant(tenant_id)?;
    let actor = Actor::new(ActorId::new(), ActorRole::System);

    let names: HashMap<PatientId, &str> = patients.iter().map(|(l, p)| (*p, *l)).collect();
    let patient = |label: &str| -> anyhow::Result<PatientId> {
        patients
            .get(label)
            .copied()
            .ok_or_else(|| anyhow!("unknown patient '{label}'"))
    };

    let mut out = String::new();
    for (n, step) in file.steps.iter().enumerate() {
        let result = run_step(&flow, &clock, &actor, step, &patient);
        let at = clock_label(&flow);
        match result {
            Ok(Some(line)) => writeln!(out, "[{at}] {}: {line}", n + 1)?,
            Ok(None) => {}
            Err(err) => writeln!(out, "[{at}] {}: rejected: {err}", n + 1)?,
        }
    }

    writeln!(out, "-- queue")?;
    let ordered = flow.ordered_queue()?;
    if ordered.is_empty() {
        writeln!(out, "(empty)")?;
    }
    for (position, entry) in ordered.iter().enumerate() {
        let label = names.get(&entry.patient_id).copied().unwrap_or("?");
        writeln!(out, "{:>3}. {}", position + 1, describe(label, entry))?;
    }
    writeln!(out, "-- {} events", flow.events().last_sequence())?;

    let violations = flow.inconsistent_pairings()?;
    for violation in &violations {
        writeln!(
            out,
            "!! entry {} is {} but its encounter is {:?}",
            violation.entry_id, violation.entry_status, violation.encounter_status
        )?;
    }
    Ok(out)
}

fn run_step(
    flow: &TenantFlow,
    clock: &ManualClock,
    actor: &Actor,
    step: &Step,
    patient: &dyn Fn(&str) -> anyhow::Result<PatientId>,
) -> anyhow::Result<Option<String>> {
    match step {
        Step::Advance(minutes) => {
            if *minutes < 0 {
                bail!("cannot move the clock backwards");
            }
            clock.advance(Duration::minutes(*minutes));
            Ok(None)
        }
        Step::Arrive {
            patient: label,
            priority,
            reason,
        } => {
            let priority = match priority {
                Some(p) => Priority::new(*p)?,
                None => Priority::default(),
            };
            let entry = flow.add_entry(
                NewEntry {
                    patient_id: patient(label)?,
                    priority,
                    reason: reason.clone(),
                },
                actor,
            )?;
            Ok(Some(format!("{label} arrived (priority {})", entry.priority)))
        }
        Step::Act {
            patient: label,
            action,
            expected,
        } => {
            let entry = latest_entry(flow, patient(label)?)?
                .ok_or_else(|| anyhow!("{label} has no queue entry"))?;
            let expected = expected.unwrap_or(entry.status);
            let outcome = flow.perform(&entry.id, *action, expected, actor)?;
            let encounter = outcome
                .encounter
                .map(|e| format!(", encounter {}", e.status))
                .unwrap_or_default();
            Ok(Some(format!(
                "{label} {action}: {} -> {}{encounter}",
                outcome.from, outcome.entry.status
            )))
        }
        Step::Reorder(labels) => {
            if labels.is_empty() {
                flow.clear_manual_order(actor)?;
                return Ok(Some("manual order cleared".into()));
            }
            let mut ids = Vec::with_capacity(labels.len());
            for label in labels {
                let entry = latest_entry(flow, patient(label)?)?
                    .ok_or_else(|| anyhow!("{label} has no queue entry"))?;
                ids.push(entry.id);
            }
            flow.reorder(&ids, actor)?;
            Ok(Some(format!("pinned {}", labels.join(", "))))
        }
        Step::Mode {
            patient: label,
            mode,
        } => {
            let entry = latest_entry(flow, patient(label)?)?
                .ok_or_else(|| anyhow!("{label} has no queue entry"))?;
            let encounter_id = entry
                .encounter_id
                .ok_or_else(|| anyhow!("{label} has no encounter yet"))?;
            let encounter = flow.update_encounter_mode(&encounter_id, *mode, actor)?;
            Ok(Some(format!("{label} encounter mode {}", encounter.mode)))
        }
    }
}

/// The patient's most recent entry, open or not.
fn latest_entry(flow: &TenantFlow, patient_id: PatientId) -> anyhow::Result<Option<QueueEntry>> {
    let entries = flow.list_entries(&EntryFilter::default())?;
    Ok(entries
        .into_iter()
        .filter(|e| e.patient_id == patient_id)
        .max_by_key(|e| (!e.status.is_terminal(), e.arrival_time)))
}

fn clock_label(flow: &TenantFlow) -> String {
    flow.now()
        .with_timezone(&flow.config().utc_offset())
        .format("%H:%M")
        .to_string()
}

/// Print a tenant's persisted queue.
pub fn snapshot(data_dir: &Path, tenant: &str) -> anyhow::Result<String> {
    let tenant_id = TenantId::parse(tenant.trim())?;
    let config = CoreConfig::new(
        Some(data_dir.to_path_buf()),
        FixedOffset::east_opt(0).ok_or_else(|| anyhow!("invalid UTC offset"))?,
        DEFAULT_EVENT_HISTORY,
        DEFAULT_BROADCAST_CAPACITY,
    )?;
    let root = config
        .snapshot_root()
        .ok_or_else(|| anyhow!("no snapshot root for {}", data_dir.display()))?;
    let store = SnapshotStore::new(root);

    let Some(snapshot) = store.load(&tenant_id)? else {
        return Ok(format!(
            "no snapshot for tenant {tenant_id} under {}\n",
            data_dir.display()
        ));
    };

    let mut out = String::new();
    writeln!(
        out,
        "tenant {} saved {} at sequence {}",
        snapshot.tenant_id,
        snapshot.saved_at.to_rfc3339_opts(SecondsFormat::Secs, true),
        snapshot.last_sequence
    )?;

    let queue = &snapshot.state.queue;
    let ordered = ordering::order_queue(queue.iter());
    writeln!(out, "-- waiting ({})", ordered.len())?;
    for (position, entry) in ordered.iter().enumerate() {
        let label = entry.patient_id.to_string();
        writeln!(out, "{:>3}. {}", position + 1, describe(&label, entry))?;
    }

    let mut counts: Vec<(QueueStatus, usize)> = QueueStatus::ALL
        .iter()
        .filter(|s| !s.is_pending())
        .map(|s| (*s, queue.iter().filter(|e| e.status == *s).count()))
        .filter(|(_, n)| *n > 0)
        .collect();
    counts.sort_by_key(|(s, _)| s.as_str());
    for (status, n) in counts {
        writeln!(out, "{status}: {n}")?;
    }
    writeln!(out, "encounters: {}", snapshot.state.encounters.len())?;
    Ok(out)
}

fn describe(label: &str, entry: &QueueEntry) -> String {
    let mut line = format!(
        "{label} [{}] priority {} arrived {}",
        entry.status,
        entry.priority,
        entry.arrival_time.format("%H:%M")
    );
    if let Some(position) = entry.manual_order {
        let _ = write!(line, " pinned #{position}");
    }
    line
}
