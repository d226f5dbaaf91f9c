use std::path::PathBuf;

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

mod catalog;
mod db;
mod ledger;
mod models;
mod ranking;
mod report;
mod scratch;
mod snapshot;
mod store;

use crate::models::{Ciclo, Professor, Rarity, SlotStatus, StickerFields, Student};
use crate::ranking::{ClassificationFilter, ClassificationSort};
use crate::scratch::{DisplayRect, ScratchConfig, ScratchSession, ScratchSurface};
use crate::snapshot::{Action, Snapshot};
use crate::store::Store;

#[derive(Parser)]
#[command(name = "sticker-album")]
#[command(
    about = "Weekly attendance sticker album with scratch reveals and rankings",
    long_about = None
)]
struct Cli {
    /// JSON snapshot file to use instead of Postgres
    #[arg(long, global = true)]
    store: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the Postgres schema
    InitDb,
    /// Load a demo album
    Seed,
    /// Import students from a roster CSV
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Register a professor
    AddProfessor {
        #[arg(long)]
        name: String,
        #[arg(long)]
        login: String,
        #[arg(long, default_value = "")]
        email: String,
    },
    /// Remove a professor by id or login
    RemoveProfessor {
        #[arg(long)]
        professor: String,
    },
    /// Enroll a student, or update one with the same login
    AddStudent {
        #[arg(long)]
        name: String,
        #[arg(long)]
        login: String,
        #[arg(long)]
        serie: Option<String>,
        #[arg(long, value_enum)]
        ciclo: Option<Ciclo>,
        /// Professor id or login
        #[arg(long)]
        professor: Option<String>,
    },
    /// Cycle a student's week: untouched, unlocked, absent, untouched
    Toggle {
        #[arg(long)]
        student: String,
        #[arg(long)]
        week: u8,
    },
    /// Flag a lost week as recovered
    Recover {
        #[arg(long)]
        student: String,
        #[arg(long)]
        week: u8,
    },
    /// Scratch an unlocked sticker until it is revealed
    Scratch {
        #[arg(long)]
        student: String,
        #[arg(long)]
        week: u8,
        /// Distance between sweep rows, in display pixels
        #[arg(long, default_value_t = 40.0)]
        spacing: f32,
        /// On-screen card width the sweep is drawn at
        #[arg(long, default_value_t = 340.0)]
        display_width: f32,
        /// On-screen card height the sweep is drawn at
        #[arg(long, default_value_t = 450.0)]
        display_height: f32,
    },
    /// Set the album's current week
    SetWeek {
        #[arg(long)]
        week: u8,
    },
    /// Edit a catalog slot
    Sticker {
        #[arg(long)]
        week: u8,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        image: Option<String>,
        #[arg(long, value_enum)]
        rarity: Option<Rarity>,
    },
    /// Print the leaderboard
    Ranking {
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Show one student's album
    Album {
        #[arg(long)]
        student: String,
    },
    /// Attendance and absence counts for a professor's students
    Classification {
        #[arg(long)]
        professor: String,
        #[arg(long, value_enum)]
        ciclo: Option<Ciclo>,
        #[arg(long)]
        serie: Option<String>,
        #[arg(long, value_enum, default_value = "faltas")]
        sort: ClassificationSort,
        #[arg(long)]
        ascending: bool,
    },
    /// Generate a markdown hall of fame
    Report {
        #[arg(long, default_value = "hall-of-fame.md")]
        out: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let store = Store::connect(cli.store).await?;
    let snapshot = store.load().await?;
    info!(
        students = snapshot.students.len(),
        records = snapshot.ledger.len(),
        current_week = snapshot.current_week,
        "album loaded"
    );

    match cli.command {
        Commands::InitDb => match &store {
            Store::Postgres(pool) => {
                db::init_db(pool).await?;
                println!("Schema ready.");
            }
            Store::File(path) => {
                println!("File store at {} needs no schema.", path.display());
            }
        },
        Commands::Seed => {
            let seeded = db::seed(snapshot, Utc::now())?;
            store.save(&seeded).await?;
            println!(
                "Seed data inserted ({} students, {} records).",
                seeded.students.len(),
                seeded.ledger.len()
            );
        }
        Commands::Import { csv } => {
            let (imported, inserted) = db::import_csv(snapshot, &csv)?;
            store.save(&imported).await?;
            println!("Inserted {inserted} students from {}.", csv.display());
        }
        Commands::AddProfessor { name, login, email } => {
            let action = Action::AddProfessor(Professor {
                id: Uuid::new_v4(),
                name,
                email,
                login: login.clone(),
            });
            commit(
                &store,
                &snapshot,
                action,
                &format!("Professor {login} added."),
                "That login is already taken.",
            )
            .await?;
        }
        Commands::RemoveProfessor { professor } => {
            let id = resolve_professor(&snapshot, &professor)?;
            commit(
                &store,
                &snapshot,
                Action::RemoveProfessor(id),
                "Professor removed.",
                "Nothing to remove.",
            )
            .await?;
        }
        Commands::AddStudent {
            name,
            login,
            serie,
            ciclo,
            professor,
        } => {
            let professor_id = professor
                .as_deref()
                .map(|key| resolve_professor(&snapshot, key))
                .transpose()?;
            let action = Action::UpsertStudent(Student {
                id: Uuid::new_v4(),
                name,
                login: login.clone(),
                professor_id,
                serie,
                ciclo,
            });
            commit(
                &store,
                &snapshot,
                action,
                &format!("Student {login} saved."),
                "Student already up to date.",
            )
            .await?;
        }
        Commands::Toggle { student, week } => {
            let student_id = resolve_student(&snapshot, &student)?;
            let action = Action::Toggle { student_id, week };
            let outcome =
                commit(&store, &snapshot, action, "", "Week is outside the album.").await?;
            if let Some(next) = outcome {
                println!("Week {week} is now {:?}.", next.ledger.state(student_id, week));
            }
        }
        Commands::Recover { student, week } => {
            let student_id = resolve_student(&snapshot, &student)?;
            commit(
                &store,
                &snapshot,
                Action::MarkRecovered { student_id, week },
                &format!("Week {week} marked as recovered."),
                "No record to recover for that week.",
            )
            .await?;
        }
        Commands::Scratch {
            student,
            week,
            spacing,
            display_width,
            display_height,
        } => {
            let student_id = resolve_student(&snapshot, &student)?;
            let surface = ScratchSurface::new(ScratchConfig::default());
            let Some(mut session) = ScratchSession::begin(&snapshot, student_id, week, surface)
            else {
                println!("Week {week} is not waiting to be scratched.");
                return Ok(());
            };

            let rect = DisplayRect {
                left: 0.0,
                top: 0.0,
                width: display_width,
                height: display_height,
            };
            let config = session.surface().config().clone();
            let path: Vec<_> = rect
                .sweep(spacing)
                .into_iter()
                .map(|p| rect.to_surface(&config, p.x, p.y))
                .collect();

            let mut reveal = None;
            let mut points = path.into_iter();
            if let Some(first) = points.next() {
                reveal = session.pointer_down(first);
            }
            for point in points {
                if reveal.is_some() {
                    break;
                }
                reveal = session.pointer_move(point);
            }
            session.pointer_up();

            match reveal {
                Some(action) => {
                    commit(&store, &snapshot, action, "", "").await?;
                    let name = snapshot
                        .stickers
                        .get(week)
                        .map(|d| d.name.clone())
                        .unwrap_or_else(|| catalog::default_name(week));
                    println!("Revealed week {week}: {name}!");
                }
                None => println!(
                    "Scratched {:.0}% of week {} ({:.0}% of the way to a reveal).",
                    session.surface().coverage() * 100.0,
                    session.week(),
                    session.surface().progress() * 100.0
                ),
            }
        }
        Commands::SetWeek { week } => {
            commit(
                &store,
                &snapshot,
                Action::SetCurrentWeek(week),
                &format!("Current week set to {}.", snapshot::clamp_week(week)),
                "Current week unchanged.",
            )
            .await?;
        }
        Commands::Sticker {
            week,
            name,
            image,
            rarity,
        } => {
            let existing = snapshot.stickers.get(week);
            let fields = StickerFields {
                name: name
                    .or_else(|| existing.map(|d| d.name.clone()))
                    .unwrap_or_else(|| catalog::default_name(week)),
                image_ref: image
                    .or_else(|| existing.map(|d| d.image_ref.clone()))
                    .unwrap_or_default(),
                rarity: rarity
                    .or_else(|| existing.map(|d| d.rarity))
                    .unwrap_or_default(),
            };
            commit(
                &store,
                &snapshot,
                Action::UpsertSticker { week, fields },
                &format!("Sticker for week {week} saved."),
                "Week is outside the album.",
            )
            .await?;
        }
        Commands::Ranking { limit } => {
            let ranking = ranking::rank(
                &snapshot.students,
                &snapshot.stickers,
                &snapshot.ledger,
                snapshot.current_week,
            );
            if ranking.is_empty() {
                println!("No students enrolled.");
                return Ok(());
            }

            println!("Top collectors:");
            for (place, summary) in ranking.iter().take(limit).enumerate() {
                println!("{:>2}. {}", place + 1, report::summary_line(summary));
            }
        }
        Commands::Album { student } => {
            let student_id = resolve_student(&snapshot, &student)?;
            let student = snapshot
                .student(student_id)
                .context("student disappeared from snapshot")?;
            let view = ranking::album(
                student,
                &snapshot.stickers,
                &snapshot.ledger,
                snapshot.current_week,
            );

            println!(
                "{}: {}/45 stickers ({:.0}%), {} recovered{}",
                student.name,
                view.revealed,
                view.progress_percent,
                view.recovered,
                if view.combo_complete { ", Supreme Link complete" } else { "" }
            );
            for slot in &view.slots {
                let status = match slot.status {
                    SlotStatus::Locked => "locked",
                    SlotStatus::Scratchable => "scratch me!",
                    SlotStatus::Revealed => "revealed",
                    SlotStatus::Lost => "lost",
                };
                let rarity = slot.rarity.map(Rarity::label).unwrap_or("?");
                println!("{:>2}. {} [{}] {}", slot.week, slot.name, rarity, status);
            }
        }
        Commands::Classification {
            professor,
            ciclo,
            serie,
            sort,
            ascending,
        } => {
            let professor_id = resolve_professor(&snapshot, &professor)?;
            let filter = ClassificationFilter {
                ciclo,
                serie,
                sort,
                descending: !ascending,
            };
            let rows = ranking::classification(
                &snapshot.students,
                &snapshot.ledger,
                professor_id,
                &filter,
            );
            if rows.is_empty() {
                println!("No students match.");
                return Ok(());
            }

            for row in rows {
                println!(
                    "- {} ({}, {}): {} present, {} absent",
                    row.name,
                    row.serie.as_deref().unwrap_or("-"),
                    row.ciclo.map(Ciclo::label).unwrap_or("-"),
                    row.presencas,
                    row.faltas
                );
            }
        }
        Commands::Report { out } => {
            let report = report::build_report(&snapshot);
            std::fs::write(&out, report)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}

/// Applies `action`, saves on change and prints the matching message.
async fn commit(
    store: &Store,
    snapshot: &Snapshot,
    action: Action,
    changed: &str,
    unchanged: &str,
) -> anyhow::Result<Option<Snapshot>> {
    let Some(next) = snapshot.apply(action, Utc::now()) else {
        if !unchanged.is_empty() {
            println!("{unchanged}");
        }
        return Ok(None);
    };

    store.save(&next).await?;
    if !changed.is_empty() {
        println!("{changed}");
    }
    Ok(Some(next))
}

fn resolve_student(snapshot: &Snapshot, key: &str) -> anyhow::Result<Uuid> {
    snapshot
        .find_student(key)
        .map(|s| s.id)
        .with_context(|| format!("no student with id or login `{key}`"))
}

fn resolve_professor(snapshot: &Snapshot, key: &str) -> anyhow::Result<Uuid> {
    snapshot
        .find_professor(key)
        .map(|p| p.id)
        .with_context(|| format!("no professor with id or login `{key}`"))
}
