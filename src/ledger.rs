//! Per-student, per-week attendance state.
//!
//! ```text
//! Untouched -> Unlocked -> Absent -> Untouched
//!                 |          ^
//!                 v          |
//!              Revealed -----+
//! ```
//!
//! `toggle` walks the outer cycle, `reveal` is the only way into Revealed.
//! Every operation returns a fresh ledger (or `None` when nothing changes);
//! the receiver is never mutated.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::models::{is_valid_week, AttendanceRecord, RecordWire, WeekState};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<RecordWire>", into = "Vec<RecordWire>")]
pub struct Ledger {
    records: BTreeMap<(Uuid, u8), AttendanceRecord>,
}

/// State reached by a teacher toggle from `state`.
pub fn next_on_toggle(state: WeekState) -> WeekState {
    match state {
        WeekState::Untouched => WeekState::Unlocked,
        WeekState::Unlocked | WeekState::Revealed => WeekState::Absent,
        WeekState::Absent => WeekState::Untouched,
    }
}

impl Ledger {
    pub fn state(&self, student_id: Uuid, week: u8) -> WeekState {
        self.record(student_id, week)
            .map(|record| record.state)
            .unwrap_or(WeekState::Untouched)
    }

    pub fn record(&self, student_id: Uuid, week: u8) -> Option<&AttendanceRecord> {
        self.records.get(&(student_id, week))
    }

    pub fn records_for(&self, student_id: Uuid) -> impl Iterator<Item = &AttendanceRecord> {
        self.records
            .range((student_id, 0)..=(student_id, u8::MAX))
            .map(|(_, record)| record)
    }

    pub fn iter(&self) -> impl Iterator<Item = &AttendanceRecord> {
        self.records.values()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn toggle(&self, student_id: Uuid, week: u8, now: DateTime<Utc>) -> Option<Self> {
        if !is_valid_week(week) {
            debug!(%student_id, week, "toggle ignored: week outside album");
            return None;
        }

        let from = self.state(student_id, week);
        let to = next_on_toggle(from);
        let key = (student_id, week);
        let mut records = self.records.clone();
        match to {
            WeekState::Untouched => {
                records.remove(&key);
            }
            state => {
                let record = records.entry(key).or_insert_with(|| AttendanceRecord {
                    student_id,
                    week,
                    state,
                    recovered: false,
                    timestamp: now,
                });
                record.state = state;
            }
        }

        debug!(%student_id, week, ?from, ?to, "week toggled");
        Some(Self { records })
    }

    /// Unlocked -> Revealed. Any other state is left alone.
    pub fn reveal(&self, student_id: Uuid, week: u8) -> Option<Self> {
        let record = self.record(student_id, week)?;
        if record.state != WeekState::Unlocked {
            debug!(%student_id, week, state = ?record.state, "reveal ignored");
            return None;
        }

        let mut records = self.records.clone();
        records.insert(
            (student_id, week),
            AttendanceRecord {
                state: WeekState::Revealed,
                ..record.clone()
            },
        );
        Some(Self { records })
    }

    /// Flags an existing record as recovered without touching its state.
    pub fn mark_recovered(&self, student_id: Uuid, week: u8) -> Option<Self> {
        let record = self.record(student_id, week)?;
        if record.recovered {
            return None;
        }

        let mut records = self.records.clone();
        records.insert(
            (student_id, week),
            AttendanceRecord {
                recovered: true,
                ..record.clone()
            },
        );
        Some(Self { records })
    }
}

impl FromIterator<AttendanceRecord> for Ledger {
    fn from_iter<I: IntoIterator<Item = AttendanceRecord>>(iter: I) -> Self {
        let records = iter
            .into_iter()
            .filter(|record| record.state != WeekState::Untouched && is_valid_week(record.week))
            .map(|record| ((record.student_id, record.week), record))
            .collect();
        Self { records }
    }
}

impl From<Vec<RecordWire>> for Ledger {
    fn from(wires: Vec<RecordWire>) -> Self {
        wires
            .into_iter()
            .filter_map(AttendanceRecord::from_wire)
            .collect()
    }
}

impl From<Ledger> for Vec<RecordWire> {
    fn from(ledger: Ledger) -> Self {
        ledger.records.values().map(AttendanceRecord::to_wire).collect()
    }
}
