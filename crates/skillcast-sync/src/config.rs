use std::path::PathBuf;

/// Paths and scheduling read from the environment. Pipeline tuning lives in
/// [`skillcast_core::PipelineConfig`], loaded from `config_path`.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub workspace_root: PathBuf,
    pub data_dir: PathBuf,
    pub config_path: PathBuf,
    pub postings_dir: PathBuf,
    pub vocabulary_path: PathBuf,
    pub regions_path: PathBuf,
    pub scheduler_enabled: bool,
    pub sync_cron: String,
    pub web_port: u16,
    /// Days of postings each scheduled ingest covers, ending today.
    pub window_days: i64,
}

impl SyncConfig {
    pub fn from_env() -> Self {
        let workspace_root = std::env::var("SKILLCAST_WORKSPACE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("."));
        Self::with_lookup(workspace_root, |name| std::env::var(name).ok())
    }

    fn with_lookup(workspace_root: PathBuf, var: impl Fn(&str) -> Option<String>) -> Self {
        let path_or = |name: &str, default: PathBuf| var(name).map(PathBuf::from).unwrap_or(default);
        Self {
            data_dir: path_or("SKILLCAST_DATA_DIR", workspace_root.join("data")),
            config_path: path_or("SKILLCAST_CONFIG", workspace_root.join("skillcast.yaml")),
            postings_dir: path_or("SKILLCAST_POSTINGS_DIR", workspace_root.join("fixtures").join("postings")),
            vocabulary_path: path_or("SKILLCAST_VOCABULARY", workspace_root.join("fixtures").join("vocabulary.yaml")),
            regions_path: path_or("SKILLCAST_REGIONS", workspace_root.join("fixtures").join("regions.yaml")),
            scheduler_enabled: var("SKILLCAST_SCHEDULER_ENABLED")
                .map(|v| matches!(v.as_str(), "1" | "true" | "TRUE" | "True"))
                .unwrap_or(false),
            sync_cron: var("SKILLCAST_SYNC_CRON").unwrap_or_else(|| "0 0 6 * * *".to_string()),
            web_port: var("SKILLCAST_WEB_PORT")
                .and_then(|v| v.parse().ok())
                .unwrap_or(8000),
            window_days: var("SKILLCAST_WINDOW_DAYS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(28),
            workspace_root,
        }
    }

    pub fn series_path(&self) -> PathBuf {
        self.data_dir.join("series.json")
    }

    pub fn forecasts_path(&self) -> PathBuf {
        self.data_dir.join("forecasts.json")
    }

    pub fn reports_dir(&self) -> PathBuf {
        self.data_dir.join("reports")
    }
}
