use crate::error::{Error, Result};
use candle_core::{pickle, DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::t5;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TokenizerKind {
    /// A `tokenizer.json` that loads with the tokenizers library.
    Json { vocab_size: usize },
    /// A SentencePiece model file; loadable by SentencePiece-aware clients.
    SentencePiece { file: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct VerifyReport {
    pub bundle_dir: PathBuf,
    pub tokenizer: TokenizerKind,
    pub model_type: Option<String>,
    pub weight_files: Vec<String>,
    pub tensor_count: usize,
    pub model_loaded: bool,
}

/// Checks, without network access, that `bundle_dir` holds a tokenizer, a
/// config and deserializable weights. With `load_model`, also builds a T5
/// encoder-decoder from the weights.
pub fn verify(bundle_dir: &Path, load_model: bool) -> Result<VerifyReport> {
    if !bundle_dir.is_dir() {
        return Err(Error::LoadFailed(format!("{:?} is not a directory", bundle_dir)));
    }

    let tokenizer = check_tokenizer(bundle_dir)?;
    tracing::info!("Tokenizer OK: {:?}", tokenizer);

    let config_path = bundle_dir.join("config.json");
    let config_content = fs::read_to_string(&config_path)
        .map_err(|e| Error::LoadFailed(format!("Failed to read config: {}", e)))?;
    let config: Value = serde_json::from_str(&config_content)
        .map_err(|e| Error::LoadFailed(format!("Failed to parse config: {}", e)))?;
    let model_type = config
        .get("model_type")
        .and_then(|v| v.as_str())
        .map(str::to_string);

    let weight_files = weight_files(bundle_dir)?;
    if weight_files.is_empty() {
        return Err(Error::LoadFailed(format!(
            "No safetensors or PyTorch weights in {:?}",
            bundle_dir
        )));
    }

    let mut tensors = HashMap::new();
    for name in &weight_files {
        let loaded = read_tensors(&bundle_dir.join(name))?;
        tracing::debug!("{}: {} tensors", name, loaded.len());
        tensors.extend(loaded);
    }
    let tensor_count = tensors.len();
    tracing::info!("Weights OK: {} tensors in {} files", tensor_count, weight_files.len());

    let model_loaded = if load_model {
        build_t5(&config, &config_content, tensors)?;
        tracing::info!("T5 model built from bundle");
        true
    } else {
        false
    };

    Ok(VerifyReport {
        bundle_dir: bundle_dir.to_path_buf(),
        tokenizer,
        model_type,
        weight_files,
        tensor_count,
        model_loaded,
    })
}

fn check_tokenizer(bundle_dir: &Path) -> Result<TokenizerKind> {
    let tokenizer_json = bundle_dir.join("tokenizer.json");
    if tokenizer_json.exists() {
        let tokenizer = tokenizers::Tokenizer::from_file(&tokenizer_json)
            .map_err(|e| Error::LoadFailed(format!("Failed to load tokenizer: {}", e)))?;
        return Ok(TokenizerKind::Json {
            vocab_size: tokenizer.get_vocab_size(true),
        });
    }

    let mut sentencepiece: Vec<String> = fs::read_dir(bundle_dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .filter(|name| name.ends_with(".model"))
        .collect();
    sentencepiece.sort();

    sentencepiece
        .into_iter()
        .next()
        .map(|file| TokenizerKind::SentencePiece { file })
        .ok_or_else(|| Error::LoadFailed(format!("No tokenizer files in {:?}", bundle_dir)))
}

fn weight_files(bundle_dir: &Path) -> Result<Vec<String>> {
    let mut names: Vec<String> = fs::read_dir(bundle_dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .filter(|name| {
            name.ends_with(".safetensors") || (name.starts_with("pytorch_model") && name.ends_with(".bin"))
        })
        .collect();
    names.sort();
    Ok(names)
}

fn read_tensors(path: &Path) -> Result<HashMap<String, Tensor>> {
    let is_safetensors = path.extension().is_some_and(|ext| ext == "safetensors");

    if is_safetensors {
        candle_core::safetensors::load(path, &Device::Cpu)
            .map_err(|e| Error::LoadFailed(format!("Failed to read {:?}: {}", path, e)))
    } else {
        pickle::read_all(path)
            .map(|tensors| tensors.into_iter().collect())
            .map_err(|e| Error::LoadFailed(format!("Failed to read {:?}: {}", path, e)))
    }
}

fn build_t5(config: &Value, config_content: &str, tensors: HashMap<String, Tensor>) -> Result<()> {
    let is_t5 = config.get("model_type").and_then(|v| v.as_str()) == Some("t5");
    let is_encoder_decoder = config
        .get("is_encoder_decoder")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);

    if !is_t5 || !is_encoder_decoder {
        return Err(Error::LoadFailed(
            "Model loading is only supported for T5 encoder-decoder bundles".to_string(),
        ));
    }

    let t5_config: t5::Config = serde_json::from_str(config_content)
        .map_err(|e| Error::LoadFailed(format!("Failed to parse T5 config: {}", e)))?;

    let vb = VarBuilder::from_tensors(tensors, DType::F32, &Device::Cpu);
    t5::T5ForConditionalGeneration::load(vb, &t5_config)
        .map_err(|e| Error::LoadFailed(format!("Failed to build T5 model: {}", e)))?;

    Ok(())
}
