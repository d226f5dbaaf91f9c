use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

pub const WEEK_COUNT: u8 = 45;
pub const COMBO_WEEKS: [u8; 4] = [42, 43, 44, 45];

pub fn is_valid_week(week: u8) -> bool {
    (1..=WEEK_COUNT).contains(&week)
}

pub fn is_combo_week(week: u8) -> bool {
    COMBO_WEEKS.contains(&week)
}

/// Reads any integer week. Values that do not fit a `u8` become 0, which
/// no album week uses, so callers drop or clamp them instead of failing
/// the whole document.
pub(crate) fn deserialize_stored_week<'de, D>(deserializer: D) -> Result<u8, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = i64::deserialize(deserializer)?;
    Ok(u8::try_from(raw).unwrap_or(0))
}

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Rarity {
    #[default]
    Normal,
    Ruby,
    Emerald,
    Obsidian,
    Gold,
    Diamond,
}

impl Rarity {
    pub fn is_epic(self) -> bool {
        matches!(self, Rarity::Obsidian | Rarity::Diamond)
    }

    pub fn label(self) -> &'static str {
        match self {
            Rarity::Normal => "Common",
            Rarity::Ruby => "Ruby",
            Rarity::Emerald => "Emerald",
            Rarity::Obsidian => "Obsidian",
            Rarity::Gold => "Gold",
            Rarity::Diamond => "Diamond",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StickerDefinition {
    pub id: String,
    #[serde(deserialize_with = "deserialize_stored_week")]
    pub week: u8,
    pub name: String,
    #[serde(default)]
    pub image_ref: String,
    #[serde(default)]
    pub rarity: Rarity,
}

/// Replacement values for a catalog slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StickerFields {
    pub name: String,
    pub image_ref: String,
    pub rarity: Rarity,
}

/// Where a (student, week) pair sits in the toggle cycle.
///
/// `Untouched` is never stored: it is the absence of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WeekState {
    Untouched,
    Unlocked,
    Revealed,
    Absent,
}

impl WeekState {
    /// Unlocked or Revealed: the student attended that week.
    pub fn is_present(self) -> bool {
        matches!(self, WeekState::Unlocked | WeekState::Revealed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttendanceRecord {
    pub student_id: Uuid,
    pub week: u8,
    pub state: WeekState,
    pub recovered: bool,
    pub timestamp: DateTime<Utc>,
}

/// Persisted shape of an attendance record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordWire {
    pub student_id: Uuid,
    pub week: i64,
    #[serde(default)]
    pub unlocked: bool,
    #[serde(default)]
    pub revealed: bool,
    #[serde(default)]
    pub recovered: bool,
    #[serde(default)]
    pub marked_absent: bool,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

impl AttendanceRecord {
    /// Normalizes a persisted record. Combinations the toggle cycle cannot
    /// produce read as "not yet decided" and yield `None`.
    pub fn from_wire(wire: RecordWire) -> Option<Self> {
        let week = u8::try_from(wire.week).ok().filter(|w| is_valid_week(*w))?;
        let state = if wire.marked_absent {
            WeekState::Absent
        } else if wire.unlocked && wire.revealed {
            WeekState::Revealed
        } else if wire.unlocked {
            WeekState::Unlocked
        } else {
            return None;
        };

        Some(Self {
            student_id: wire.student_id,
            week,
            state,
            recovered: wire.recovered,
            timestamp: wire.timestamp.unwrap_or(DateTime::<Utc>::UNIX_EPOCH),
        })
    }

    pub fn to_wire(&self) -> RecordWire {
        RecordWire {
            student_id: self.student_id,
            week: i64::from(self.week),
            unlocked: self.state.is_present(),
            revealed: self.state == WeekState::Revealed,
            recovered: self.recovered,
            marked_absent: self.state == WeekState::Absent,
            timestamp: Some(self.timestamp),
        }
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
pub enum Ciclo {
    AnosIniciais,
    AnosFinais,
    EnsinoMedio,
}

impl Ciclo {
    pub fn label(self) -> &'static str {
        match self {
            Ciclo::AnosIniciais => "Anos Iniciais",
            Ciclo::AnosFinais => "Anos Finais",
            Ciclo::EnsinoMedio => "Ensino Médio",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Professor {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub email: String,
    pub login: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Student {
    pub id: Uuid,
    pub name: String,
    pub login: String,
    #[serde(default)]
    pub professor_id: Option<Uuid>,
    #[serde(default)]
    pub serie: Option<String>,
    #[serde(default)]
    pub ciclo: Option<Ciclo>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StudentSummary {
    pub student_id: Uuid,
    pub name: String,
    pub total: usize,
    pub recovered_count: usize,
    pub epic_count: usize,
    pub max_streak: u32,
    pub combo_complete: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassificationRow {
    pub student_id: Uuid,
    pub name: String,
    pub serie: Option<String>,
    pub ciclo: Option<Ciclo>,
    pub presencas: usize,
    pub faltas: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotStatus {
    Locked,
    Scratchable,
    Revealed,
    Lost,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlbumSlot {
    pub week: u8,
    pub name: String,
    pub rarity: Option<Rarity>,
    pub status: SlotStatus,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AlbumView {
    pub student_id: Uuid,
    pub slots: Vec<AlbumSlot>,
    pub revealed: usize,
    pub recovered: usize,
    pub progress_percent: f64,
    pub combo_complete: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wire(unlocked: bool, revealed: bool, marked_absent: bool) -> RecordWire {
        RecordWire {
            student_id: Uuid::new_v4(),
            week: 3,
            unlocked,
            revealed,
            recovered: false,
            marked_absent,
            timestamp: None,
        }
    }

    #[test]
    fn wire_flags_map_onto_states() {
        let state = |w| AttendanceRecord::from_wire(w).map(|r| r.state);
        assert_eq!(state(wire(true, false, false)), Some(WeekState::Unlocked));
        assert_eq!(state(wire(true, true, false)), Some(WeekState::Revealed));
        assert_eq!(state(wire(false, false, true)), Some(WeekState::Absent));
        assert_eq!(state(wire(false, true, true)), Some(WeekState::Absent));
    }

    #[test]
    fn unreachable_flag_combinations_read_as_untouched() {
        assert!(AttendanceRecord::from_wire(wire(false, false, false)).is_none());
        assert!(AttendanceRecord::from_wire(wire(false, true, false)).is_none());
    }

    #[test]
    fn out_of_range_weeks_are_dropped() {
        let mut w = wire(true, false, false);
        w.week = 46;
        assert!(AttendanceRecord::from_wire(w.clone()).is_none());
        w.week = -1;
        assert!(AttendanceRecord::from_wire(w).is_none());
    }

    #[test]
    fn only_obsidian_and_diamond_are_epic() {
        let epic: Vec<Rarity> = [
            Rarity::Normal,
            Rarity::Ruby,
            Rarity::Emerald,
            Rarity::Obsidian,
            Rarity::Gold,
            Rarity::Diamond,
        ]
        .into_iter()
        .filter(|r| r.is_epic())
        .collect();
        assert_eq!(epic, vec![Rarity::Obsidian, Rarity::Diamond]);
    }
}
