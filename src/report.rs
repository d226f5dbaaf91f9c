use std::fmt::Write;

use crate::models::{Rarity, StudentSummary, WEEK_COUNT};
use crate::ranking;
use crate::snapshot::Snapshot;

const PODIUM_TITLES: [&str; 3] = ["Supreme Legend", "Silver Master", "Bronze Hero"];

pub fn rarity_mix(snapshot: &Snapshot) -> Vec<(Rarity, usize)> {
    let mut counts: Vec<(Rarity, usize)> = Vec::new();
    for definition in snapshot.stickers.iter() {
        match counts.iter_mut().find(|(r, _)| *r == definition.rarity) {
            Some(entry) => entry.1 += 1,
            None => counts.push((definition.rarity, 1)),
        }
    }
    counts.sort_by(|a, b| b.1.cmp(&a.1));
    counts
}

pub fn build_report(snapshot: &Snapshot) -> String {
    let ranking = ranking::rank(
        &snapshot.students,
        &snapshot.stickers,
        &snapshot.ledger,
        snapshot.current_week,
    );

    let mut output = String::new();
    let _ = writeln!(output, "# Sticker Album Hall of Fame");
    let _ = writeln!(
        output,
        "Week {} of {} ({} students enrolled)",
        snapshot.current_week,
        WEEK_COUNT,
        snapshot.students.len()
    );

    let _ = writeln!(output);
    let _ = writeln!(output, "## Podium");
    let podium = ranking::podium(&ranking);
    if podium.is_empty() {
        let _ = writeln!(output, "No students enrolled yet.");
    } else {
        for ((place, summary), title) in podium.iter().enumerate().zip(PODIUM_TITLES) {
            let _ = writeln!(
                output,
                "{}. {} - {}: {} stickers",
                place + 1,
                summary.name,
                title,
                summary.total
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Full Ranking");
    if ranking.is_empty() {
        let _ = writeln!(output, "No students enrolled yet.");
    } else {
        for (place, summary) in ranking.iter().enumerate() {
            let _ = writeln!(output, "{}. {}", place + 1, summary_line(summary));
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Rarity Club");
    let rare = ranking::rarity_club(&ranking);
    if rare.is_empty() {
        let _ = writeln!(output, "Nobody has revealed an Obsidian or Diamond sticker yet.");
    } else {
        for summary in rare {
            let _ = writeln!(output, "- {} ({} epic)", summary.name, summary.epic_count);
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Unstoppables");
    let streaks = ranking::streak_club(&ranking);
    if streaks.is_empty() {
        let _ = writeln!(output, "No attendance streaks of two weeks or more.");
    } else {
        for summary in streaks {
            let _ = writeln!(output, "- {}: {} weeks in a row", summary.name, summary.max_streak);
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Supreme Link");
    let linked: Vec<&StudentSummary> = ranking.iter().filter(|s| s.combo_complete).collect();
    if linked.is_empty() {
        let _ = writeln!(output, "Nobody has completed weeks 42-45 yet.");
    } else {
        for summary in linked {
            let _ = writeln!(output, "- {}", summary.name);
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Catalog Rarity Mix");
    for (rarity, count) in rarity_mix(snapshot) {
        let _ = writeln!(output, "- {}: {} weeks", rarity.label(), count);
    }

    output
}

pub fn summary_line(summary: &StudentSummary) -> String {
    let mut line = format!(
        "{}: {} stickers, {} recovered, best streak {}",
        summary.name, summary.total, summary.recovered_count, summary.max_streak
    );
    if summary.epic_count > 0 {
        let _ = write!(line, ", {} epic", summary.epic_count);
    }
    if summary.combo_complete {
        line.push_str(", Supreme Link");
    }
    line
}
