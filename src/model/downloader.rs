use crate::error::{Error, ErrorKind, Result};
use crate::model::convert;
use crate::model::hub::{RegistryClient, ResolvedFile};
use crate::model::ArtifactSpec;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// How far a fetch got. A failure carries the last stage reached, which
/// tells the caller what the destination holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchStage {
    Unresolved,
    TokenizerFetched,
    TokenizerSaved,
    WeightsFetched,
    WeightsSaved,
}

impl fmt::Display for FetchStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FetchStage::Unresolved => "unresolved",
            FetchStage::TokenizerFetched => "tokenizer fetched",
            FetchStage::TokenizerSaved => "tokenizer saved",
            FetchStage::WeightsFetched => "weights fetched",
            FetchStage::WeightsSaved => "weights saved",
        };
        f.write_str(name)
    }
}

#[derive(Debug)]
pub struct FetchFailure {
    pub spec: ArtifactSpec,
    pub stage: FetchStage,
    pub error: Error,
}

impl FetchFailure {
    pub fn kind(&self) -> ErrorKind {
        self.error.kind()
    }

    /// True when the failure happened before anything was written to the
    /// destination. A crashed fetch task never counts as untouched.
    pub fn destination_untouched(&self) -> bool {
        self.stage == FetchStage::Unresolved && !matches!(self.error, Error::TaskFailed(_))
    }
}

impl fmt::Display for FetchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} -> {:?} failed [{}] after stage '{}': {}",
            self.spec.identifier,
            self.spec.destination_path,
            self.kind(),
            self.stage,
            self.error
        )
    }
}

impl std::error::Error for FetchFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchedBundle {
    pub identifier: String,
    pub revision: String,
    pub destination: PathBuf,
    pub files: Vec<String>,
    pub total_bytes: u64,
    pub fetched_at: String,
}

#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    pub convert_safetensors: bool,
}

/// Fetches artifacts from a registry and persists them into local bundles.
pub struct ArtifactFetcher<C> {
    client: Arc<C>,
    options: FetchOptions,
}

impl<C> Clone for ArtifactFetcher<C> {
    fn clone(&self) -> Self {
        Self {
            client: Arc::clone(&self.client),
            options: self.options.clone(),
        }
    }
}

impl<C: RegistryClient> ArtifactFetcher<C> {
    pub fn new(client: C, options: FetchOptions) -> Self {
        Self {
            client: Arc::new(client),
            options,
        }
    }

    pub fn fetch_and_persist(
        &self,
        spec: &ArtifactSpec,
    ) -> std::result::Result<FetchedBundle, FetchFailure> {
        let mut stage = FetchStage::Unresolved;
        self.run(spec, &mut stage).map_err(|error| FetchFailure {
            spec: spec.clone(),
            stage,
            error,
        })
    }

    fn run(&self, spec: &ArtifactSpec, stage: &mut FetchStage) -> Result<FetchedBundle> {
        spec.validate()?;
        let dest = spec.destination_path.as_path();

        tracing::info!("Resolving tokenizer for {} ({})", spec.identifier, spec.revision);
        let tokenizer = self.client.resolve_tokenizer(spec)?;
        *stage = FetchStage::TokenizerFetched;

        fs::create_dir_all(dest).map_err(|e| Error::filesystem(dest, e))?;
        let mut files = persist_files(&tokenizer.files, dest)?;
        *stage = FetchStage::TokenizerSaved;
        tracing::info!(
            "Saved {} tokenizer files for {} to {:?}",
            files.len(),
            tokenizer.identifier,
            dest
        );

        tracing::info!("Resolving weights for {} ({})", spec.identifier, spec.revision);
        let weights = self.client.resolve_weights(spec)?;
        *stage = FetchStage::WeightsFetched;

        let weight_files = persist_files(&weights.files, dest)?;
        *stage = FetchStage::WeightsSaved;
        tracing::info!(
            "Saved {} weight files for {} to {:?}",
            weight_files.len(),
            weights.identifier,
            dest
        );
        let wrote_pytorch = weight_files.iter().any(|f| f == convert::PYTORCH_WEIGHTS);
        files.extend(weight_files);

        // Only a checkpoint written by this fetch is converted; the result
        // replaces any safetensors file already in the destination.
        if self.options.convert_safetensors && wrote_pytorch && convert::ensure_safetensors(dest)? {
            files.retain(|f| f != convert::PYTORCH_WEIGHTS);
            files.push(convert::SAFETENSORS_WEIGHTS.to_string());
        }

        files.sort();
        files.dedup();
        let total_bytes = files
            .iter()
            .map(|f| fs::metadata(dest.join(f)).map_or(0, |m| m.len()))
            .sum();

        Ok(FetchedBundle {
            identifier: spec.identifier.clone(),
            revision: spec.revision.clone(),
            destination: dest.to_path_buf(),
            files,
            total_bytes,
            fetched_at: chrono::Utc::now().to_rfc3339(),
        })
    }
}

/// Copies resolved files into `dest`, overwriting whatever is there. Writes
/// are not atomic: a failure part-way leaves earlier files in place.
fn persist_files(files: &[ResolvedFile], dest: &Path) -> Result<Vec<String>> {
    let mut written = Vec::with_capacity(files.len());

    for file in files {
        let target = dest.join(&file.name);
        tracing::debug!("Writing {:?}", target);
        fs::copy(&file.local_path, &target).map_err(|e| Error::filesystem(&target, e))?;
        written.push(file.name.clone());
    }

    Ok(written)
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::model::hub::{TokenizerBundle, WeightsBundle};
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Debug, Clone, Copy)]
    pub enum Failure {
        NotFound,
        Network,
    }

    impl Failure {
        fn to_error(self, identifier: &str) -> Error {
            match self {
                Failure::NotFound => Error::NotFound(identifier.to_string()),
                Failure::Network => Error::Network(format!("{}: connection reset", identifier)),
            }
        }
    }

    /// Registry stand-in serving files from a scratch cache directory.
    pub struct FakeRegistry {
        cache: PathBuf,
        models: HashMap<String, (Vec<String>, Vec<String>)>,
        weights_failure: HashMap<String, Failure>,
        panicking: Option<String>,
        offline: bool,
        pub calls: Mutex<Vec<String>>,
    }

    impl FakeRegistry {
        pub fn new(cache: &Path) -> Self {
            Self {
                cache: cache.to_path_buf(),
                models: HashMap::new(),
                weights_failure: HashMap::new(),
                panicking: None,
                offline: false,
                calls: Mutex::new(Vec::new()),
            }
        }

        /// Publishes a sentencepiece T5 repository.
        pub fn with_t5(self, identifier: &str) -> Self {
            self.with_model(
                identifier,
                &[
                    ("spiece.model", "sentencepiece"),
                    ("special_tokens_map.json", "{\"eos_token\": \"</s>\"}"),
                    ("tokenizer_config.json", "{\"model_max_length\": 512}"),
                ],
                &[
                    ("config.json", "{\"model_type\": \"t5\"}"),
                    ("model.safetensors", "weights"),
                ],
            )
        }

        /// Publishes a T5 repository whose weights are a real PyTorch
        /// checkpoint with the given values.
        pub fn with_pytorch_t5(self, identifier: &str, values: [f32; 4]) -> Self {
            let registry = self.with_model(
                identifier,
                &[("spiece.model", "sentencepiece")],
                &[
                    ("config.json", "{\"model_type\": \"t5\"}"),
                    (convert::PYTORCH_WEIGHTS, ""),
                ],
            );
            let repo_dir = registry.cache.join(identifier.replace('/', "--"));
            crate::model::convert::testing::write_pytorch_checkpoint(
                &repo_dir.join(convert::PYTORCH_WEIGHTS),
                values,
            );
            registry
        }

        pub fn with_model(
            mut self,
            identifier: &str,
            tokenizer: &[(&str, &str)],
            weights: &[(&str, &str)],
        ) -> Self {
            let repo_dir = self.cache.join(identifier.replace('/', "--"));
            fs::create_dir_all(&repo_dir).unwrap();
            let write = |entries: &[(&str, &str)]| {
                entries
                    .iter()
                    .map(|(name, body)| {
                        fs::write(repo_dir.join(name), format!("{}:{}", identifier, body)).unwrap();
                        name.to_string()
                    })
                    .collect::<Vec<_>>()
            };
            let tokenizer = write(tokenizer);
            let weights = write(weights);
            self.models.insert(identifier.to_string(), (tokenizer, weights));
            self
        }

        pub fn failing_weights(mut self, identifier: &str, failure: Failure) -> Self {
            self.weights_failure.insert(identifier.to_string(), failure);
            self
        }

        /// Makes tokenizer resolution for `identifier` panic.
        pub fn panicking_on(mut self, identifier: &str) -> Self {
            self.panicking = Some(identifier.to_string());
            self
        }

        pub fn offline(mut self) -> Self {
            self.offline = true;
            self
        }

        fn resolve(&self, identifier: &str, names: &[String]) -> Vec<ResolvedFile> {
            let repo_dir = self.cache.join(identifier.replace('/', "--"));
            names
                .iter()
                .map(|name| ResolvedFile {
                    name: name.clone(),
                    local_path: repo_dir.join(name),
                })
                .collect()
        }

        fn lookup(&self, spec: &ArtifactSpec, what: &str) -> Result<&(Vec<String>, Vec<String>)> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("{}:{}", what, spec.identifier));
            if self.panicking.as_deref() == Some(spec.identifier.as_str()) {
                panic!("registry client crashed on {}", spec.identifier);
            }
            if self.offline {
                return Err(Failure::Network.to_error(&spec.identifier));
            }
            self.models
                .get(&spec.identifier)
                .ok_or_else(|| Failure::NotFound.to_error(&spec.identifier))
        }
    }

    impl RegistryClient for FakeRegistry {
        fn resolve_tokenizer(&self, spec: &ArtifactSpec) -> Result<TokenizerBundle> {
            let (tokenizer, _) = self.lookup(spec, "tokenizer")?;
            Ok(TokenizerBundle {
                identifier: spec.identifier.clone(),
                files: self.resolve(&spec.identifier, tokenizer),
            })
        }

        fn resolve_weights(&self, spec: &ArtifactSpec) -> Result<WeightsBundle> {
            let (_, weights) = self.lookup(spec, "weights")?;
            if let Some(failure) = self.weights_failure.get(&spec.identifier) {
                return Err(failure.to_error(&spec.identifier));
            }
            Ok(WeightsBundle {
                identifier: spec.identifier.clone(),
                files: self.resolve(&spec.identifier, weights),
            })
        }
    }

    pub fn snapshot(dir: &Path) -> Vec<(String, Vec<u8>)> {
        let mut entries: Vec<_> = fs::read_dir(dir)
            .unwrap()
            .map(|e| {
                let e = e.unwrap();
                (
                    e.file_name().to_string_lossy().into_owned(),
                    fs::read(e.path()).unwrap(),
                )
            })
            .collect();
        entries.sort();
        entries
    }
}
