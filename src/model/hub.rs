use crate::config::Config;
use crate::error::{Error, Result};
use crate::model::ArtifactSpec;
use hf_hub::api::sync::{Api, ApiBuilder, ApiError, ApiRepo};
use hf_hub::{Repo, RepoType};
use std::path::PathBuf;

const TOKENIZER_FILES: &[&str] = &[
    "tokenizer.json",
    "tokenizer_config.json",
    "special_tokens_map.json",
    "added_tokens.json",
    "vocab.txt",
    "vocab.json",
    "merges.txt",
    "spiece.model",
];

const WEIGHT_FILES: &[&str] = &[
    "config.json",
    "generation_config.json",
    "model.safetensors.index.json",
    "pytorch_model.bin.index.json",
];

/// A file resolved from the registry: its name inside the repository and
/// where the registry client left a local copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedFile {
    pub name: String,
    pub local_path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct TokenizerBundle {
    pub identifier: String,
    pub files: Vec<ResolvedFile>,
}

#[derive(Debug, Clone)]
pub struct WeightsBundle {
    pub identifier: String,
    pub files: Vec<ResolvedFile>,
}

pub trait RegistryClient: Send + Sync {
    fn resolve_tokenizer(&self, spec: &ArtifactSpec) -> Result<TokenizerBundle>;
    fn resolve_weights(&self, spec: &ArtifactSpec) -> Result<WeightsBundle>;
}

pub fn is_tokenizer_file(name: &str) -> bool {
    if name.contains('/') {
        return false;
    }
    TOKENIZER_FILES.contains(&name) || name.ends_with(".model")
}

pub fn is_weight_file(name: &str) -> bool {
    if name.contains('/') {
        return false;
    }
    WEIGHT_FILES.contains(&name)
        || name.ends_with(".safetensors")
        || (name.starts_with("pytorch_model") && name.ends_with(".bin"))
}

/// Picks the weight files to fetch from a repository listing. PyTorch
/// checkpoints are skipped when safetensors are published.
pub fn select_weight_files<'a>(names: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let candidates: Vec<&str> = names.into_iter().filter(|n| is_weight_file(n)).collect();
    let has_safetensors = candidates.iter().any(|n| n.ends_with(".safetensors"));

    candidates
        .into_iter()
        .filter(|n| !(has_safetensors && (n.ends_with(".bin") || *n == "pytorch_model.bin.index.json")))
        .map(str::to_string)
        .collect()
}

pub fn select_tokenizer_files<'a>(names: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    names
        .into_iter()
        .filter(|n| is_tokenizer_file(n))
        .map(str::to_string)
        .collect()
}

/// Maps a failed hub request onto the fetch error taxonomy. Anonymous
/// requests for unknown repositories come back as 401, missing files as 404.
pub fn classify_request_failure(identifier: &str, message: &str) -> Error {
    if message.contains("status code 404") || message.contains("status code 401") {
        Error::NotFound(format!("{} ({})", identifier, message))
    } else {
        Error::Network(format!("{}: {}", identifier, message))
    }
}

fn map_api_error(identifier: &str, err: ApiError) -> Error {
    match err {
        ApiError::RequestError(e) => classify_request_failure(identifier, &e.to_string()),
        ApiError::IoError(e) => Error::IoError(e),
        other => Error::Network(format!("{}: {}", identifier, other)),
    }
}

/// Registry client backed by the Hugging Face Hub.
pub struct HfHubClient {
    api: Api,
}

impl HfHubClient {
    /// Starts from the hub's own environment handling (`HF_HOME`,
    /// `HF_ENDPOINT`, the saved login token) and only overrides what the
    /// config sets explicitly.
    pub fn new(config: &Config) -> Result<Self> {
        let mut builder = ApiBuilder::from_env().with_progress(config.progress);

        if let Some(token) = &config.hf_token {
            builder = builder.with_token(Some(token.clone()));
        }
        if let Some(cache_dir) = &config.hub_cache_dir {
            builder = builder.with_cache_dir(cache_dir.clone());
        }

        let api = builder
            .build()
            .map_err(|e| Error::ConfigError(format!("Failed to initialize hub client: {}", e)))?;

        Ok(Self { api })
    }

    fn repo(&self, spec: &ArtifactSpec) -> ApiRepo {
        self.api.repo(Repo::with_revision(
            spec.identifier.clone(),
            RepoType::Model,
            spec.revision.clone(),
        ))
    }

    fn list_files(&self, spec: &ArtifactSpec) -> Result<Vec<String>> {
        let info = self
            .repo(spec)
            .info()
            .map_err(|e| map_api_error(&spec.identifier, e))?;

        Ok(info.siblings.into_iter().map(|s| s.rfilename).collect())
    }

    fn download(&self, spec: &ArtifactSpec, names: Vec<String>) -> Result<Vec<ResolvedFile>> {
        let repo = self.repo(spec);
        let mut files = Vec::with_capacity(names.len());

        for name in names {
            tracing::debug!("Downloading {}/{}", spec.identifier, name);
            let local_path = repo
                .get(&name)
                .map_err(|e| map_api_error(&spec.identifier, e))?;
            files.push(ResolvedFile { name, local_path });
        }

        Ok(files)
    }
}

/// Tokenizer files to fetch from a repository listing; a repository
/// without any is treated as unknown.
pub fn tokenizer_files_from_listing(identifier: &str, listing: &[String]) -> Result<Vec<String>> {
    let names = select_tokenizer_files(listing.iter().map(String::as_str));

    if names.is_empty() {
        return Err(Error::NotFound(format!(
            "{} publishes no tokenizer files",
            identifier
        )));
    }

    Ok(names)
}

/// Weight files to fetch from a repository listing; config files alone do
/// not make a model.
pub fn weight_files_from_listing(identifier: &str, listing: &[String]) -> Result<Vec<String>> {
    let names = select_weight_files(listing.iter().map(String::as_str));

    if !names.iter().any(|n| n.ends_with(".safetensors") || n.ends_with(".bin")) {
        return Err(Error::NotFound(format!(
            "{} publishes no PyTorch or safetensors weights",
            identifier
        )));
    }

    Ok(names)
}

impl RegistryClient for HfHubClient {
    fn resolve_tokenizer(&self, spec: &ArtifactSpec) -> Result<TokenizerBundle> {
        let listing = self.list_files(spec)?;
        let names = tokenizer_files_from_listing(&spec.identifier, &listing)?;

        Ok(TokenizerBundle {
            identifier: spec.identifier.clone(),
            files: self.download(spec, names)?,
        })
    }

    fn resolve_weights(&self, spec: &ArtifactSpec) -> Result<WeightsBundle> {
        let listing = self.list_files(spec)?;
        let names = weight_files_from_listing(&spec.identifier, &listing)?;

        Ok(WeightsBundle {
            identifier: spec.identifier.clone(),
            files: self.download(spec, names)?,
        })
    }
}
