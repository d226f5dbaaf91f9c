use anyhow::Context;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::models::{Ciclo, Professor, Rarity, StickerFields, Student, WeekState};
use crate::snapshot::{self, Action, Snapshot};

pub const SNAPSHOT_KEY: &str = "album";

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

pub async fn load_snapshot(pool: &PgPool) -> anyhow::Result<Snapshot> {
    let row = sqlx::query("SELECT body FROM sticker_album.snapshots WHERE key = $1")
        .bind(SNAPSHOT_KEY)
        .fetch_optional(pool)
        .await
        .context("failed to read snapshot from Postgres")?;

    Ok(match row {
        Some(row) => {
            let body: String = row.get("body");
            snapshot::decode(body.as_bytes())
        }
        None => Snapshot::initial(),
    })
}

pub async fn save_snapshot(pool: &PgPool, snapshot: &Snapshot) -> anyhow::Result<()> {
    let body = snapshot::encode(snapshot)?;
    sqlx::query(
        r#"
        INSERT INTO sticker_album.snapshots (key, body, updated_at)
        VALUES ($1, $2, now())
        ON CONFLICT (key) DO UPDATE
        SET body = EXCLUDED.body, updated_at = EXCLUDED.updated_at
        "#,
    )
    .bind(SNAPSHOT_KEY)
    .bind(body)
    .execute(pool)
    .await
    .context("failed to write snapshot to Postgres")?;
    Ok(())
}

#[derive(Debug, Clone, Copy)]
enum DemoWeek {
    Revealed,
    Unlocked,
    AbsentRecovered,
}

impl DemoWeek {
    fn actions(self, student_id: Uuid, week: u8) -> Vec<Action> {
        let toggle = Action::Toggle { student_id, week };
        match self {
            DemoWeek::Unlocked => vec![toggle],
            DemoWeek::Revealed => vec![toggle, Action::Reveal { student_id, week }],
            DemoWeek::AbsentRecovered => vec![
                toggle.clone(),
                toggle,
                Action::MarkRecovered { student_id, week },
            ],
        }
    }
}

/// Demo album: one professor, three students and a few weeks of activity.
/// Weeks that already have a record are left alone, so seeding twice is
/// the same as seeding once.
pub fn seed(base: Snapshot, now: DateTime<Utc>) -> anyhow::Result<Snapshot> {
    let professor = Professor {
        id: Uuid::parse_str("aec7949d-40db-46db-82fd-3ae95cd80517")?,
        name: "Helena Duarte".to_string(),
        email: "helena.duarte@escola.example".to_string(),
        login: "helena".to_string(),
    };

    let students = [
        (
            Uuid::parse_str("1ce3d3d8-5b71-4ec6-b21b-ece3cb3dad80")?,
            "Bruno Tavares",
            "bruno",
            "7A",
            Ciclo::AnosFinais,
        ),
        (
            Uuid::parse_str("6371c196-52cb-4062-974c-8aa18006170a")?,
            "Íris Campos",
            "iris",
            "7A",
            Ciclo::AnosFinais,
        ),
        (
            Uuid::parse_str("bc50dab3-c8c3-433c-a485-43e356c3cfc2")?,
            "Caio Nunes",
            "caio",
            "3B",
            Ciclo::AnosIniciais,
        ),
    ];

    let stickers = [
        (1, "First Day", Rarity::Normal),
        (2, "Paper Rocket", Rarity::Ruby),
        (3, "Emerald Fern", Rarity::Emerald),
        (4, "Night Owl", Rarity::Obsidian),
        (5, "Golden Bell", Rarity::Gold),
        (6, "Crystal Comet", Rarity::Diamond),
    ];

    let mut actions = vec![Action::AddProfessor(professor.clone())];
    for (week, name, rarity) in stickers {
        actions.push(Action::UpsertSticker {
            week,
            fields: StickerFields {
                name: name.to_string(),
                image_ref: format!("stickers/week-{week}.png"),
                rarity,
            },
        });
    }
    for (id, name, login, serie, ciclo) in &students {
        actions.push(Action::UpsertStudent(Student {
            id: *id,
            name: name.to_string(),
            login: login.to_string(),
            professor_id: Some(professor.id),
            serie: Some(serie.to_string()),
            ciclo: Some(*ciclo),
        }));
    }
    actions.push(Action::SetCurrentWeek(7));
    let mut snapshot = actions
        .into_iter()
        .fold(base, |snapshot, action| snapshot.reduce(action, now));

    // Bruno scratched every week so far, Íris missed week 3 and had it
    // recovered, Caio has two stickers waiting.
    let activity: [(&str, Vec<(u8, DemoWeek)>); 3] = [
        ("bruno", (1..=6).map(|week| (week, DemoWeek::Revealed)).collect()),
        (
            "iris",
            vec![
                (1, DemoWeek::Revealed),
                (2, DemoWeek::Revealed),
                (3, DemoWeek::AbsentRecovered),
                (4, DemoWeek::Revealed),
                (5, DemoWeek::Revealed),
            ],
        ),
        ("caio", vec![(5, DemoWeek::Unlocked), (6, DemoWeek::Unlocked)]),
    ];
    for (login, weeks) in activity {
        // Upserts keep an existing student's id, so look it up again.
        let student_id = snapshot
            .find_student(login)
            .map(|s| s.id)
            .with_context(|| format!("demo student `{login}` missing after upsert"))?;
        for (week, demo) in weeks {
            if snapshot.ledger.state(student_id, week) != WeekState::Untouched {
                continue;
            }
            snapshot = demo
                .actions(student_id, week)
                .into_iter()
                .fold(snapshot, |snapshot, action| snapshot.reduce(action, now));
        }
    }

    Ok(snapshot)
}

/// Upserts students from a roster CSV. Returns the snapshot and how many
/// students were new.
pub fn import_csv(
    base: Snapshot,
    csv_path: &std::path::Path,
) -> anyhow::Result<(Snapshot, usize)> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        name: String,
        login: String,
        serie: Option<String>,
        ciclo: Option<String>,
        professor_login: Option<String>,
    }

    let mut reader = csv::Reader::from_path(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    let mut snapshot = base;
    let mut inserted = 0usize;
    let now = Utc::now();

    for (line, result) in reader.deserialize::<CsvRow>().enumerate() {
        let row = result.with_context(|| format!("invalid roster row {}", line + 1))?;
        let professor_id = match row.professor_login.as_deref().filter(|l| !l.is_empty()) {
            Some(login) => Some(
                snapshot
                    .find_professor(login)
                    .map(|p| p.id)
                    .with_context(|| format!("unknown professor `{login}` on row {}", line + 1))?,
            ),
            None => None,
        };
        let ciclo = row
            .ciclo
            .as_deref()
            .filter(|c| !c.is_empty())
            .map(parse_ciclo)
            .transpose()
            .with_context(|| format!("invalid ciclo on row {}", line + 1))?;

        // Blank columns keep whatever an enrolled student already has.
        let existing = snapshot.students.iter().find(|s| s.login == row.login);
        let is_new = existing.is_none();
        let student = Student {
            id: Uuid::new_v4(),
            professor_id: professor_id.or_else(|| existing.and_then(|s| s.professor_id)),
            serie: row
                .serie
                .filter(|s| !s.is_empty())
                .or_else(|| existing.and_then(|s| s.serie.clone())),
            ciclo: ciclo.or_else(|| existing.and_then(|s| s.ciclo)),
            name: row.name,
            login: row.login,
        };

        if let Some(next) = snapshot.apply(Action::UpsertStudent(student), now) {
            snapshot = next;
            if is_new {
                inserted += 1;
            }
        }
    }

    Ok((snapshot, inserted))
}

fn parse_ciclo(raw: &str) -> anyhow::Result<Ciclo> {
    let folded: String = raw
        .chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect();
    match folded.as_str() {
        "anosiniciais" => Ok(Ciclo::AnosIniciais),
        "anosfinais" => Ok(Ciclo::AnosFinais),
        "ensinomedio" | "ensinomédio" => Ok(Ciclo::EnsinoMedio),
        _ => anyhow::bail!("unrecognised ciclo `{raw}`"),
    }
}
