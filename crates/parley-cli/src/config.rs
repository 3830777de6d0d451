use std::path::PathBuf;

/// Runtime settings, read from the environment (after `.env` is loaded) and
/// overridable from the command line.
#[derive(Debug, Clone)]
pub struct Config {
    pub db_path: PathBuf,
    pub prefs_dir: PathBuf,
    pub push_token: Option<String>,
}

impl Config {
    pub fn from_env() -> Self {
        let db_path = std::env::var("PARLEY_DB_PATH").unwrap_or_else(|_| "parley.db".into());
        let prefs_dir = std::env::var("PARLEY_PREFS_DIR").unwrap_or_else(|_| ".parley".into());
        let push_token = std::env::var("PARLEY_PUSH_TOKEN")
            .ok()
            .filter(|t| !t.trim().is_empty());

        Self {
            db_path: db_path.into(),
            prefs_dir: prefs_dir.into(),
            push_token,
        }
    }

    pub fn with_overrides(mut self, db: Option<PathBuf>, prefs_dir: Option<PathBuf>) -> Self {
        if let Some(db) = db {
            self.db_path = db;
        }
        if let Some(dir) = prefs_dir {
            self.prefs_dir = dir;
        }
        self
    }
}
