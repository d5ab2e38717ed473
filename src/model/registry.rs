use crate::config::Config;
use crate::error::{Error, Result};
use crate::model::FetchedBundle;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BundleRecord {
    pub identifier: String,
    pub revision: String,
    pub destination: std::path::PathBuf,
    pub files: Vec<String>,
    pub total_bytes: u64,
    pub fetched_at: String,
}

impl From<FetchedBundle> for BundleRecord {
    fn from(bundle: FetchedBundle) -> Self {
        Self {
            identifier: bundle.identifier,
            revision: bundle.revision,
            destination: bundle.destination,
            files: bundle.files,
            total_bytes: bundle.total_bytes,
            fetched_at: bundle.fetched_at,
        }
    }
}

/// Bundles fetched by this tool, keyed by destination directory.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct BundleLedger {
    bundles: BTreeMap<String, BundleRecord>,
}

impl BundleLedger {
    pub fn load(config: &Config) -> Result<Self> {
        if !config.ledger_path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&config.ledger_path)
            .map_err(|e| Error::filesystem(&config.ledger_path, e))?;
        let ledger: BundleLedger = toml::from_str(&content)?;
        Ok(ledger)
    }

    pub fn save(&self, config: &Config) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        fs::write(&config.ledger_path, content)
            .map_err(|e| Error::filesystem(&config.ledger_path, e))?;
        Ok(())
    }

    /// Re-fetching into the same destination replaces the older record.
    pub fn record(&mut self, record: BundleRecord) {
        let key = record.destination.to_string_lossy().into_owned();
        self.bundles.insert(key, record);
    }

    pub fn list(&self) -> Vec<&BundleRecord> {
        self.bundles.values().collect()
    }
}
