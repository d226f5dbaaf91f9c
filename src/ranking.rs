use std::cmp::Ordering;

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;
use uuid::Uuid;

use crate::catalog::Catalog;
use crate::ledger::Ledger;
use crate::models::{
    is_combo_week, AlbumSlot, AlbumView, Ciclo, ClassificationRow, SlotStatus, Student,
    StudentSummary, WeekState, COMBO_WEEKS, WEEK_COUNT,
};

pub const STREAK_CLUB_MIN: u32 = 2;
pub const PODIUM_SIZE: usize = 3;

pub fn summarize(
    student: &Student,
    catalog: &Catalog,
    ledger: &Ledger,
    current_week: u8,
) -> StudentSummary {
    let mut total = 0;
    let mut recovered_count = 0;
    let mut epic_count = 0;

    for record in ledger.records_for(student.id) {
        if record.recovered {
            recovered_count += 1;
        }
        if record.state == WeekState::Revealed {
            total += 1;
            if catalog.rarity_of(record.week).is_some_and(|r| r.is_epic()) {
                epic_count += 1;
            }
        }
    }

    StudentSummary {
        student_id: student.id,
        name: student.name.clone(),
        total,
        recovered_count,
        epic_count,
        max_streak: max_streak(ledger, student.id, current_week),
        combo_complete: combo_complete(ledger, student.id),
    }
}

/// Leaderboard: revealed total, then recoveries, then name.
pub fn rank(
    students: &[Student],
    catalog: &Catalog,
    ledger: &Ledger,
    current_week: u8,
) -> Vec<StudentSummary> {
    let mut summaries: Vec<StudentSummary> = students
        .iter()
        .map(|student| summarize(student, catalog, ledger, current_week))
        .collect();
    summaries.sort_by(compare_summaries);
    summaries
}

pub fn compare_summaries(a: &StudentSummary, b: &StudentSummary) -> Ordering {
    b.total
        .cmp(&a.total)
        .then_with(|| b.recovered_count.cmp(&a.recovered_count))
        .then_with(|| compare_names(&a.name, &b.name))
        .then_with(|| a.student_id.cmp(&b.student_id))
}

/// Longest run of present weeks within `1..=current_week`.
pub fn max_streak(ledger: &Ledger, student_id: Uuid, current_week: u8) -> u32 {
    let last_week = current_week.min(WEEK_COUNT);
    let mut best = 0;
    let mut running = 0;

    for week in 1..=last_week {
        if ledger.state(student_id, week).is_present() {
            running += 1;
            best = best.max(running);
        } else {
            running = 0;
        }
    }

    best
}

pub fn combo_complete(ledger: &Ledger, student_id: Uuid) -> bool {
    COMBO_WEEKS
        .iter()
        .all(|week| ledger.state(student_id, *week) == WeekState::Revealed)
}

pub fn rarity_club(ranking: &[StudentSummary]) -> Vec<&StudentSummary> {
    ranking.iter().filter(|s| s.epic_count > 0).collect()
}

/// Students on a streak of at least two weeks, longest first. Ties keep
/// leaderboard order.
pub fn streak_club(ranking: &[StudentSummary]) -> Vec<&StudentSummary> {
    let mut club: Vec<&StudentSummary> = ranking
        .iter()
        .filter(|s| s.max_streak >= STREAK_CLUB_MIN)
        .collect();
    club.sort_by(|a, b| b.max_streak.cmp(&a.max_streak));
    club
}

pub fn podium(ranking: &[StudentSummary]) -> &[StudentSummary] {
    &ranking[..ranking.len().min(PODIUM_SIZE)]
}

/// Name order that ignores case and diacritics first, falling back to the
/// raw text so distinct names never compare equal.
pub fn compare_names(a: &str, b: &str) -> Ordering {
    collation_key(a)
        .cmp(&collation_key(b))
        .then_with(|| a.cmp(b))
}

/// NFD with combining marks dropped, so precomposed and decomposed
/// spellings of a name share a key.
fn collation_key(name: &str) -> String {
    name.nfd()
        .filter(|c| !is_combining_mark(*c))
        .flat_map(char::to_lowercase)
        .map(strip_stroke)
        .collect()
}

// Stroked letters have no canonical decomposition.
fn strip_stroke(c: char) -> char {
    match c {
        'ø' => 'o',
        'ł' => 'l',
        'đ' => 'd',
        'ħ' => 'h',
        other => other,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ClassificationSort {
    Presencas,
    Faltas,
}

#[derive(Debug, Clone)]
pub struct ClassificationFilter {
    pub ciclo: Option<Ciclo>,
    pub serie: Option<String>,
    pub sort: ClassificationSort,
    pub descending: bool,
}

impl Default for ClassificationFilter {
    fn default() -> Self {
        Self {
            ciclo: None,
            serie: None,
            sort: ClassificationSort::Faltas,
            descending: true,
        }
    }
}

/// Attendance and absence counts for one professor's students.
pub fn classification(
    students: &[Student],
    ledger: &Ledger,
    professor_id: Uuid,
    filter: &ClassificationFilter,
) -> Vec<ClassificationRow> {
    let serie_needle = filter
        .serie
        .as_deref()
        .map(str::to_lowercase)
        .filter(|needle| !needle.is_empty());

    let mut rows: Vec<ClassificationRow> = students
        .iter()
        .filter(|student| student.professor_id == Some(professor_id))
        .filter(|student| filter.ciclo.is_none() || student.ciclo == filter.ciclo)
        .filter(|student| match &serie_needle {
            Some(needle) => student
                .serie
                .as_deref()
                .is_some_and(|serie| serie.to_lowercase().contains(needle.as_str())),
            None => true,
        })
        .map(|student| {
            let records: Vec<_> = ledger.records_for(student.id).collect();
            ClassificationRow {
                student_id: student.id,
                name: student.name.clone(),
                serie: student.serie.clone(),
                ciclo: student.ciclo,
                presencas: records.iter().filter(|r| r.state.is_present()).count(),
                faltas: records
                    .iter()
                    .filter(|r| r.state == WeekState::Absent)
                    .count(),
            }
        })
        .collect();

    rows.sort_by(|a, b| {
        let (left, right) = match filter.sort {
            ClassificationSort::Presencas => (a.presencas, b.presencas),
            ClassificationSort::Faltas => (a.faltas, b.faltas),
        };
        let ordering = if filter.descending {
            right.cmp(&left)
        } else {
            left.cmp(&right)
        };
        ordering.then_with(|| compare_names(&a.name, &b.name))
    });
    rows
}

/// Week-by-week display status of one student's album.
pub fn album(student: &Student, catalog: &Catalog, ledger: &Ledger, current_week: u8) -> AlbumView {
    let slots = (1..=WEEK_COUNT)
        .map(|week| {
            let definition = catalog.get(week);
            let state = ledger.state(student.id, week);
            let status = match state {
                WeekState::Revealed => SlotStatus::Revealed,
                WeekState::Unlocked => SlotStatus::Scratchable,
                WeekState::Absent => SlotStatus::Lost,
                WeekState::Untouched if week < current_week => SlotStatus::Lost,
                WeekState::Untouched => SlotStatus::Locked,
            };
            AlbumSlot {
                week,
                name: definition
                    .map(|d| d.name.clone())
                    .unwrap_or_else(|| format!("W{week}")),
                rarity: definition.map(|d| d.rarity),
                status,
            }
        })
        .collect::<Vec<_>>();

    let revealed = slots
        .iter()
        .filter(|slot| slot.status == SlotStatus::Revealed)
        .count();
    let recovered = ledger
        .records_for(student.id)
        .filter(|record| record.recovered)
        .count();

    AlbumView {
        student_id: student.id,
        revealed,
        recovered,
        progress_percent: revealed as f64 / f64::from(WEEK_COUNT) * 100.0,
        combo_complete: slots
            .iter()
            .filter(|slot| is_combo_week(slot.week))
            .all(|slot| slot.status == SlotStatus::Revealed),
        slots,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Rarity, StickerFields};
    use chrono::{TimeZone, Utc};
    use proptest::prelude::*;

    fn student(name: &str) -> Student {
        Student {
            id: Uuid::new_v4(),
            name: name.to_string(),
            login: name.to_lowercase(),
            professor_id: None,
            serie: None,
            ciclo: None,
        }
    }

    fn unlock(ledger: Ledger, student: Uuid, week: u8) -> Ledger {
        let now = Utc.with_ymd_and_hms(2026, 3, 2, 8, 0, 0).unwrap();
        ledger.toggle(student, week, now).expect("valid week")
    }

    fn reveal(ledger: Ledger, student: Uuid, week: u8) -> Ledger {
        unlock(ledger, student, week)
            .reveal(student, week)
            .expect("unlocked week reveals")
    }

    fn absent(ledger: Ledger, student: Uuid, week: u8) -> Ledger {
        let now = Utc.with_ymd_and_hms(2026, 3, 2, 8, 0, 0).unwrap();
        unlock(ledger, student, week)
            .toggle(student, week, now)
            .expect("valid week")
    }

    fn with_rarity(catalog: Catalog, week: u8, rarity: Rarity) -> Catalog {
        catalog
            .upsert(
                week,
                StickerFields {
                    name: format!("Week {week}"),
                    image_ref: String::new(),
                    rarity,
                },
            )
            .expect("valid week")
    }

    #[test]
    fn streak_breaks_on_absence() {
        let s = student("Ana");
        let mut ledger = Ledger::default();
        ledger = unlock(ledger, s.id, 1);
        ledger = reveal(ledger, s.id, 2);
        ledger = unlock(ledger, s.id, 3);
        ledger = absent(ledger, s.id, 4);
        ledger = unlock(ledger, s.id, 5);

        assert_eq!(max_streak(&ledger, s.id, 5), 3);
    }

    #[test]
    fn streak_ignores_weeks_after_current() {
        let s = student("Ana");
        let mut ledger = Ledger::default();
        for week in 3..=8 {
            ledger = unlock(ledger, s.id, week);
        }
        assert_eq!(max_streak(&ledger, s.id, 5), 3);
        assert_eq!(max_streak(&ledger, s.id, 8), 6);
        assert_eq!(max_streak(&Ledger::default(), s.id, 45), 0);
    }

    #[test]
    fn streak_counts_the_final_week() {
        let s = student("Ana");
        let ledger = unlock(unlock(Ledger::default(), s.id, 6), s.id, 7);
        assert_eq!(max_streak(&ledger, s.id, 7), 2);
    }

    #[test]
    fn one_diamond_makes_the_rarity_club() {
        let diamond = student("Bia");
        let plain = student("Caio");
        let catalog = with_rarity(Catalog::initial(), 12, Rarity::Diamond);
        let mut ledger = reveal(Ledger::default(), diamond.id, 12);
        ledger = reveal(ledger, plain.id, 1);
        ledger = reveal(ledger, plain.id, 2);

        let ranking = rank(&[diamond.clone(), plain.clone()], &catalog, &ledger, 12);
        let club: Vec<Uuid> = rarity_club(&ranking).iter().map(|s| s.student_id).collect();
        assert_eq!(club, vec![diamond.id]);
    }

    #[test]
    fn unrevealed_epic_weeks_do_not_count() {
        let s = student("Bia");
        let catalog = with_rarity(Catalog::initial(), 12, Rarity::Obsidian);
        let ledger = unlock(Ledger::default(), s.id, 12);
        assert_eq!(summarize(&s, &catalog, &ledger, 12).epic_count, 0);
    }

    #[test]
    fn missing_catalog_entries_are_not_epic() {
        let s = student("Bia");
        let ledger = reveal(Ledger::default(), s.id, 20);
        let summary = summarize(&s, &Catalog::default(), &ledger, 20);
        assert_eq!(summary.total, 1);
        assert_eq!(summary.epic_count, 0);
    }

    #[test]
    fn ranking_orders_by_total_then_recovered_then_name() {
        let bruna = student("Bruna");
        let alvaro = student("Álvaro");
        let carla = student("Carla");
        let mut ledger = Ledger::default();
        for s in [&bruna, &alvaro, &carla] {
            ledger = reveal(ledger, s.id, 1);
        }
        ledger = reveal(ledger, carla.id, 2);
        ledger = absent(ledger, bruna.id, 3);
        ledger = ledger.mark_recovered(bruna.id, 3).expect("record exists");

        let ranking = rank(
            &[alvaro.clone(), bruna.clone(), carla.clone()],
            &Catalog::initial(),
            &ledger,
            3,
        );
        let names: Vec<&str> = ranking.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["Carla", "Bruna", "Álvaro"]);
    }

    #[test]
    fn accented_names_sort_with_their_base_letter() {
        assert_eq!(compare_names("Álvaro", "Bruno"), Ordering::Less);
        assert_eq!(compare_names("érica", "Eduardo"), Ordering::Greater);
        assert_eq!(compare_names("ana", "Ana"), Ordering::Greater);
        assert_eq!(compare_names("Ana", "Ana"), Ordering::Equal);
    }

    #[test]
    fn decomposed_accents_sort_like_precomposed_ones() {
        assert_eq!(compare_names("\u{c1}gata", "Ana"), Ordering::Less);
        assert_eq!(compare_names("A\u{301}gata", "Ana"), Ordering::Less);
        assert_eq!(collation_key("A\u{301}gata"), collation_key("\u{c1}gata"));
        assert_eq!(compare_names("Ørjan", "Pedro"), Ordering::Less);
        assert_eq!(compare_names("Łucja", "Marta"), Ordering::Less);
        assert_eq!(compare_names("Māra", "Mario"), Ordering::Less);
    }

    #[test]
    fn streak_club_sorts_by_streak() {
        let short = student("Ana");
        let long = student("Zeca");
        let none = student("Lia");
        let mut ledger = Ledger::default();
        for week in 1..=2 {
            ledger = reveal(ledger, short.id, week);
        }
        for week in 1..=4 {
            ledger = unlock(ledger, long.id, week);
        }
        ledger = unlock(ledger, none.id, 1);

        let ranking = rank(&[short.clone(), long.clone(), none], &Catalog::initial(), &ledger, 4);
        let club: Vec<&str> = streak_club(&ranking).iter().map(|s| s.name.as_str()).collect();
        assert_eq!(club, vec!["Zeca", "Ana"]);
    }

    #[test]
    fn combo_needs_all_four_weeks_revealed() {
        let s = student("Ana");
        let mut ledger = Ledger::default();
        for week in [42, 43, 44] {
            ledger = reveal(ledger, s.id, week);
        }
        ledger = unlock(ledger, s.id, 45);
        assert!(!combo_complete(&ledger, s.id));

        let ledger = ledger.reveal(s.id, 45).expect("unlocked week reveals");
        assert!(combo_complete(&ledger, s.id));
        assert!(summarize(&s, &Catalog::initial(), &ledger, 45).combo_complete);
    }

    #[test]
    fn podium_is_at_most_three() {
        let students: Vec<Student> = ["A", "B", "C", "D"].into_iter().map(student).collect();
        let ranking = rank(&students, &Catalog::initial(), &Ledger::default(), 1);
        assert_eq!(podium(&ranking).len(), 3);
        assert_eq!(podium(&ranking[..1]).len(), 1);
    }

    #[test]
    fn classification_filters_and_sorts() {
        let professor = Uuid::new_v4();
        let mut ana = student("Ana");
        ana.professor_id = Some(professor);
        ana.serie = Some("9B".to_string());
        ana.ciclo = Some(Ciclo::AnosFinais);
        let mut beto = student("Beto");
        beto.professor_id = Some(professor);
        beto.serie = Some("9A".to_string());
        beto.ciclo = Some(Ciclo::AnosFinais);
        let mut caio = student("Caio");
        caio.professor_id = Some(professor);
        caio.serie = Some("1A".to_string());
        caio.ciclo = Some(Ciclo::EnsinoMedio);
        let mut other = student("Duda");
        other.professor_id = Some(Uuid::new_v4());

        let mut ledger = Ledger::default();
        ledger = unlock(ledger, ana.id, 1);
        ledger = reveal(ledger, ana.id, 2);
        ledger = absent(ledger, beto.id, 1);
        ledger = absent(ledger, beto.id, 2);
        ledger = unlock(ledger, beto.id, 3);
        ledger = absent(ledger, other.id, 1);

        let students = vec![ana, beto, caio, other];
        let rows = classification(&students, &ledger, professor, &ClassificationFilter::default());
        let summary: Vec<(&str, usize, usize)> = rows
            .iter()
            .map(|r| (r.name.as_str(), r.presencas, r.faltas))
            .collect();
        assert_eq!(summary, vec![("Beto", 1, 2), ("Ana", 2, 0), ("Caio", 0, 0)]);

        let filter = ClassificationFilter {
            ciclo: Some(Ciclo::AnosFinais),
            serie: Some("9".to_string()),
            sort: ClassificationSort::Presencas,
            descending: false,
        };
        let rows = classification(&students, &ledger, professor, &filter);
        let names: Vec<&str> = rows.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["Beto", "Ana"]);
    }

    #[test]
    fn album_marks_past_untouched_weeks_as_lost() {
        let s = student("Ana");
        let mut ledger = reveal(Ledger::default(), s.id, 1);
        ledger = unlock(ledger, s.id, 3);
        ledger = absent(ledger, s.id, 5);
        ledger = ledger.mark_recovered(s.id, 5).expect("record exists");

        let view = album(&s, &Catalog::initial(), &ledger, 4);
        let status = |week: u8| view.slots[usize::from(week) - 1].status;
        assert_eq!(status(1), SlotStatus::Revealed);
        assert_eq!(status(2), SlotStatus::Lost);
        assert_eq!(status(3), SlotStatus::Scratchable);
        assert_eq!(status(4), SlotStatus::Locked);
        assert_eq!(status(5), SlotStatus::Lost);
        assert_eq!(view.revealed, 1);
        assert_eq!(view.recovered, 1);
        assert!((view.progress_percent - 100.0 / 45.0).abs() < 1e-9);
        assert!(!view.combo_complete);
    }

    proptest! {
        #[test]
        fn ranking_ignores_input_order(
            totals in proptest::collection::vec(0u8..5, 1..8),
            seed in any::<u64>(),
        ) {
            let students: Vec<Student> = totals
                .iter()
                .enumerate()
                .map(|(i, _)| student(&format!("Student {}", i % 3)))
                .collect();
            let mut ledger = Ledger::default();
            for (s, total) in students.iter().zip(&totals) {
                for week in 1..=*total {
                    ledger = reveal(ledger, s.id, week);
                }
            }

            let mut shuffled = students.clone();
            let len = shuffled.len();
            shuffled.rotate_left((seed as usize) % len);
            shuffled.reverse();

            let catalog = Catalog::initial();
            let expected: Vec<Uuid> = rank(&students, &catalog, &ledger, 5)
                .iter()
                .map(|s| s.student_id)
                .collect();
            let actual: Vec<Uuid> = rank(&shuffled, &catalog, &ledger, 5)
                .iter()
                .map(|s| s.student_id)
                .collect();
            prop_assert_eq!(expected, actual);
        }
    }
}
