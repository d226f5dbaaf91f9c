use std::path::{Path, PathBuf};

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;

use crate::db;
use crate::snapshot::{self, Snapshot};

pub const STORE_ENV: &str = "STICKER_ALBUM_STORE";

/// Where the album snapshot lives.
pub enum Store {
    File(PathBuf),
    Postgres(PgPool),
}

impl Store {
    /// An explicit path wins, then `STICKER_ALBUM_STORE`, then `DATABASE_URL`.
    pub async fn connect(path: Option<PathBuf>) -> anyhow::Result<Self> {
        if let Some(path) = path.or_else(|| std::env::var_os(STORE_ENV).map(PathBuf::from)) {
            info!(path = %path.display(), "using file store");
            return Ok(Store::File(path));
        }

        let database_url = std::env::var("DATABASE_URL").context(
            "set DATABASE_URL to a Postgres instance, or pass --store / STICKER_ALBUM_STORE",
        )?;
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(&database_url)
            .await
            .context("failed to connect to Postgres")?;
        info!("using Postgres store");
        Ok(Store::Postgres(pool))
    }

    pub async fn load(&self) -> anyhow::Result<Snapshot> {
        match self {
            Store::File(path) => load_file(path),
            Store::Postgres(pool) => db::load_snapshot(pool).await,
        }
    }

    pub async fn save(&self, snapshot: &Snapshot) -> anyhow::Result<()> {
        match self {
            Store::File(path) => save_file(path, snapshot),
            Store::Postgres(pool) => db::save_snapshot(pool, snapshot).await,
        }
    }
}

pub fn load_file(path: &Path) -> anyhow::Result<Snapshot> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(snapshot::decode(&bytes)),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Snapshot::initial()),
        Err(err) => Err(err).with_context(|| format!("failed to read {}", path.display())),
    }
}

/// Writes beside the target and renames over it so readers never see a
/// partial document.
pub fn save_file(path: &Path, snapshot: &Snapshot) -> anyhow::Result<()> {
    let body = snapshot::encode(snapshot)?;
    let mut staging = path.as_os_str().to_owned();
    staging.push(".tmp");
    let staging = PathBuf::from(staging);

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    std::fs::write(&staging, body)
        .with_context(|| format!("failed to write {}", staging.display()))?;
    std::fs::rename(&staging, path)
        .with_context(|| format!("failed to replace {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::Action;
    use chrono::Utc;

    #[test]
    fn missing_file_loads_initial_snapshot() {
        let dir = tempfile::tempdir().expect("temp dir");
        let snapshot = load_file(&dir.path().join("album.json")).expect("loads");
        assert_eq!(snapshot, Snapshot::initial());
    }

    #[test]
    fn saved_snapshot_reloads_identically() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("nested").join("album.json");
        let snapshot = db::seed(Snapshot::initial(), Utc::now()).expect("seed builds");

        save_file(&path, &snapshot).expect("saves");
        assert!(!dir.path().join("nested").join("album.json.tmp").exists());
        assert_eq!(load_file(&path).expect("loads"), snapshot);

        let next = snapshot.reduce(Action::SetCurrentWeek(9), Utc::now());
        save_file(&path, &next).expect("saves again");
        assert_eq!(load_file(&path).expect("loads").current_week, 9);
    }

    #[test]
    fn corrupt_file_loads_initial_snapshot() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("album.json");
        std::fs::write(&path, b"{\"students\": [").expect("writes");
        assert_eq!(load_file(&path).expect("loads"), Snapshot::initial());
    }
}
