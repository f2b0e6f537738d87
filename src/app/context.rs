use std::path::PathBuf;
use std::sync::Arc;

use crate::app::error::{FreshetError, Result};
use crate::config::{FileSettings, Settings, SettingsProvider, StaticSettings};
use crate::fetcher::http_fetcher::HttpFetcher;
use crate::fetcher::Fetcher;
use crate::pipeline::Pipeline;
use crate::scheduler::Scheduler;
use crate::store::sqlite::SqliteStore;

pub struct AppContext {
    pub store: Arc<SqliteStore>,
    pub settings: Arc<dyn SettingsProvider>,
    pub scheduler: Arc<Scheduler<SqliteStore>>,
}

impl AppContext {
    pub fn new(config_path: Option<PathBuf>, db_path: Option<PathBuf>) -> Result<Self> {
        let db_path = match db_path {
            Some(p) => p,
            None => Self::default_db_path()?,
        };
        let settings: Arc<dyn SettingsProvider> = match config_path {
            Some(path) => Arc::new(FileSettings::new(path)),
            None => Arc::new(
                FileSettings::default_location().map_err(|e| FreshetError::Config(e.to_string()))?,
            ),
        };

        let store = Arc::new(SqliteStore::new(&db_path)?);
        Self::assemble(store, settings)
    }

    /// In-memory database with fixed settings.
    pub fn in_memory(settings: Settings) -> Result<Self> {
        let store = Arc::new(SqliteStore::in_memory()?);
        Self::assemble(store, Arc::new(StaticSettings::new(settings)))
    }

    /// The fetcher starts with the default timeout. Each run applies the
    /// configured one.
    fn assemble(store: Arc<SqliteStore>, settings: Arc<dyn SettingsProvider>) -> Result<Self> {
        let fetcher: Arc<dyn Fetcher + Send + Sync> = Arc::new(HttpFetcher::new()?);
        let pipeline = Arc::new(Pipeline::new(store.clone(), fetcher, settings.clone()));
        let scheduler = Arc::new(Scheduler::new(pipeline));

        Ok(Self {
            store,
            settings,
            scheduler,
        })
    }

    fn default_db_path() -> Result<PathBuf> {
        let data_dir = dirs::data_dir()
            .ok_or_else(|| FreshetError::Config("Could not find data directory".into()))?;
        let freshet_dir = data_dir.join("freshet");
        std::fs::create_dir_all(&freshet_dir)?;
        Ok(freshet_dir.join("freshet.db"))
    }
}
