use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::catalog::Catalog;
use crate::ledger::Ledger;
use crate::models::{Professor, StickerFields, Student, WEEK_COUNT};

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("snapshot is empty")]
    Empty,

    #[error("snapshot is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Everything the album persists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub professors: Vec<Professor>,
    pub students: Vec<Student>,
    pub stickers: Catalog,
    pub ledger: Ledger,
    #[serde(deserialize_with = "deserialize_current_week")]
    pub current_week: u8,
}

/// A single state change requested by a collaborator.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Toggle { student_id: Uuid, week: u8 },
    Reveal { student_id: Uuid, week: u8 },
    MarkRecovered { student_id: Uuid, week: u8 },
    UpsertSticker { week: u8, fields: StickerFields },
    SetCurrentWeek(u8),
    AddProfessor(Professor),
    RemoveProfessor(Uuid),
    UpsertStudent(Student),
}

impl Default for Snapshot {
    fn default() -> Self {
        Self::initial()
    }
}

impl Snapshot {
    /// 45 empty week slots, nobody enrolled, week 1.
    pub fn initial() -> Self {
        Self {
            professors: Vec::new(),
            students: Vec::new(),
            stickers: Catalog::initial(),
            ledger: Ledger::default(),
            current_week: 1,
        }
    }

    pub fn student(&self, id: Uuid) -> Option<&Student> {
        self.students.iter().find(|student| student.id == id)
    }

    /// Looks a student up by id or login.
    pub fn find_student(&self, key: &str) -> Option<&Student> {
        match Uuid::parse_str(key) {
            Ok(id) => self.student(id),
            Err(_) => self.students.iter().find(|student| student.login == key),
        }
    }

    pub fn find_professor(&self, key: &str) -> Option<&Professor> {
        match Uuid::parse_str(key) {
            Ok(id) => self.professors.iter().find(|p| p.id == id),
            Err(_) => self.professors.iter().find(|p| p.login == key),
        }
    }

    /// Returns the snapshot produced by `action`, or `None` when the action
    /// does not change anything.
    pub fn apply(&self, action: Action, now: DateTime<Utc>) -> Option<Self> {
        match action {
            Action::Toggle { student_id, week } => {
                let ledger = self.enrolled(student_id)?.ledger.toggle(student_id, week, now)?;
                Some(self.with_ledger(ledger))
            }
            Action::Reveal { student_id, week } => {
                let ledger = self.enrolled(student_id)?.ledger.reveal(student_id, week)?;
                Some(self.with_ledger(ledger))
            }
            Action::MarkRecovered { student_id, week } => {
                let ledger = self
                    .enrolled(student_id)?
                    .ledger
                    .mark_recovered(student_id, week)?;
                Some(self.with_ledger(ledger))
            }
            Action::UpsertSticker { week, fields } => {
                let stickers = self.stickers.upsert(week, fields)?;
                Some(Self {
                    stickers,
                    ..self.clone()
                })
            }
            Action::SetCurrentWeek(week) => {
                let current_week = clamp_week(week);
                if current_week == self.current_week {
                    return None;
                }
                Some(Self {
                    current_week,
                    ..self.clone()
                })
            }
            Action::AddProfessor(professor) => {
                if self.professors.iter().any(|p| p.login == professor.login) {
                    debug!(login = %professor.login, "professor login already taken");
                    return None;
                }
                let mut professors = self.professors.clone();
                professors.push(professor);
                Some(Self {
                    professors,
                    ..self.clone()
                })
            }
            Action::RemoveProfessor(id) => {
                if !self.professors.iter().any(|p| p.id == id) {
                    return None;
                }
                let professors = self
                    .professors
                    .iter()
                    .filter(|p| p.id != id)
                    .cloned()
                    .collect();
                Some(Self {
                    professors,
                    ..self.clone()
                })
            }
            Action::UpsertStudent(student) => {
                let mut students = self.students.clone();
                match students.iter_mut().find(|s| s.login == student.login) {
                    Some(existing) => {
                        let updated = Student {
                            id: existing.id,
                            ..student
                        };
                        if *existing == updated {
                            return None;
                        }
                        *existing = updated;
                    }
                    None => students.push(student),
                }
                Some(Self {
                    students,
                    ..self.clone()
                })
            }
        }
    }

    /// Like [`Snapshot::apply`] but yields the unchanged snapshot on a no-op.
    pub fn reduce(self, action: Action, now: DateTime<Utc>) -> Self {
        match self.apply(action, now) {
            Some(next) => next,
            None => self,
        }
    }

    fn enrolled(&self, student_id: Uuid) -> Option<&Self> {
        if self.student(student_id).is_none() {
            debug!(%student_id, "action ignored: unknown student");
            return None;
        }
        Some(self)
    }

    fn with_ledger(&self, ledger: Ledger) -> Self {
        Self {
            ledger,
            ..self.clone()
        }
    }

    fn normalized(self) -> Self {
        Self {
            stickers: self.stickers.with_missing_filled(),
            current_week: clamp_week(self.current_week),
            ..self
        }
    }
}

pub fn clamp_week(week: u8) -> u8 {
    week.clamp(1, WEEK_COUNT)
}

fn deserialize_current_week<'de, D>(deserializer: D) -> Result<u8, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = i64::deserialize(deserializer)?;
    Ok(raw.clamp(1, i64::from(WEEK_COUNT)) as u8)
}

pub fn encode(snapshot: &Snapshot) -> Result<String, SnapshotError> {
    Ok(serde_json::to_string_pretty(snapshot)?)
}

pub fn try_decode(bytes: &[u8]) -> Result<Snapshot, SnapshotError> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Err(SnapshotError::Empty);
    }
    let snapshot: Snapshot = serde_json::from_slice(bytes)?;
    Ok(snapshot.normalized())
}

/// Decodes a stored snapshot, starting over from [`Snapshot::initial`] when
/// the stored bytes cannot be read.
pub fn decode(bytes: &[u8]) -> Snapshot {
    match try_decode(bytes) {
        Ok(snapshot) => snapshot,
        Err(err) => {
            warn!(%err, "discarding unreadable snapshot, starting from an empty album");
            Snapshot::initial()
        }
    }
}
