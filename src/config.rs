use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
	pub data_dir: PathBuf,
	pub ledger_path: PathBuf,
	/// Hub download cache; `None` leaves the choice to hf-hub.
	pub hub_cache_dir: Option<PathBuf>,
	#[serde(skip_serializing)]
	pub hf_token: Option<String>,
	pub progress: bool,
}

impl Config {
	pub fn new() -> crate::error::Result<Self> {
		let project_dirs = ProjectDirs::from("", "", "hubstash")
			.ok_or_else(|| crate::error::Error::ConfigError("Could not determine data directory".to_string()))?;

		Self::with_data_dir(project_dirs.data_dir().to_path_buf())
	}

	pub fn with_data_dir(data_dir: PathBuf) -> crate::error::Result<Self> {
		let ledger_path = data_dir.join("bundles.toml");

		std::fs::create_dir_all(&data_dir)
			.map_err(|e| crate::error::Error::filesystem(&data_dir, e))?;

		Ok(Self {
			data_dir,
			ledger_path,
			hub_cache_dir: None,
			hf_token: None,
			progress: true,
		})
	}

	pub fn from_env() -> crate::error::Result<Self> {
		let mut config = match non_empty_var("HUBSTASH_DATA_DIR") {
			Some(data_dir) => Self::with_data_dir(PathBuf::from(data_dir))?,
			None => Self::new()?,
		};

		// HF_HOME and the saved login token are read by hf-hub itself.
		config.hub_cache_dir = non_empty_var("HF_HUB_CACHE").map(PathBuf::from);
		config.hf_token = non_empty_var("HF_TOKEN");
		config.progress = non_empty_var("HUBSTASH_NO_PROGRESS").is_none();

		Ok(config)
	}
}

fn non_empty_var(key: &str) -> Option<String> {
	std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}
