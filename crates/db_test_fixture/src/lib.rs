use std::path::Path;

use anyhow::{Context, Result};
use db::SqliteStore;
use sqlx::SqlitePool;
use tempfile::TempDir;

/// Freshly migrated store for one test. File-backed fixtures keep their
/// directory alive until dropped.
pub struct DbFixture {
    store: SqliteStore,
    dir: Option<TempDir>,
}

impl DbFixture {
    pub async fn in_memory() -> Result<Self> {
        let store = SqliteStore::connect("sqlite::memory:")
            .await
            .context("open in-memory sqlite")?;
        Ok(Self { store, dir: None })
    }

    pub async fn file_backed() -> Result<Self> {
        let dir = tempfile::tempdir().context("create temp dir")?;
        let url = sqlite_url(&dir.path().join("cache.db"));
        let store = SqliteStore::connect(&url)
            .await
            .with_context(|| format!("open {url}"))?;
        Ok(Self {
            store,
            dir: Some(dir),
        })
    }

    pub fn store(&self) -> &SqliteStore {
        &self.store
    }

    pub fn pool(&self) -> &SqlitePool {
        self.store.pool()
    }

    /// Database URL of a file-backed fixture, for reopening it.
    pub fn database_url(&self) -> Option<String> {
        self.dir
            .as_ref()
            .map(|dir| sqlite_url(&dir.path().join("cache.db")))
    }
}

fn sqlite_url(path: &Path) -> String {
    format!("sqlite://{}", path.display())
}
