use crate::error::{Error, Result};
use candle_core::pickle;
use std::collections::HashMap;
use std::path::Path;

pub const PYTORCH_WEIGHTS: &str = "pytorch_model.bin";
pub const SAFETENSORS_WEIGHTS: &str = "model.safetensors";

/// Converts `pytorch_model.bin` in `bundle_dir` to `model.safetensors`.
///
/// An existing `model.safetensors` is overwritten: it may come from an
/// earlier fetch of another model into the same directory. Returns `true`
/// when a conversion happened.
pub fn ensure_safetensors(bundle_dir: &Path) -> Result<bool> {
    let pytorch_file = bundle_dir.join(PYTORCH_WEIGHTS);
    let safetensors_file = bundle_dir.join(SAFETENSORS_WEIGHTS);

    if !pytorch_file.exists() {
        return Ok(false);
    }

    tracing::info!("Converting {} to {}...", PYTORCH_WEIGHTS, SAFETENSORS_WEIGHTS);

    let tensors_vec = pickle::read_all(&pytorch_file)
        .map_err(|e| Error::LoadFailed(format!("Failed to read PyTorch file: {}", e)))?;

    tracing::info!("Loaded {} tensors from PyTorch checkpoint", tensors_vec.len());

    let tensors: HashMap<_, _> = tensors_vec.into_iter().collect();

    candle_core::safetensors::save(&tensors, &safetensors_file)
        .map_err(|e| Error::LoadFailed(format!("Failed to save SafeTensors: {}", e)))?;

    if let Err(e) = std::fs::remove_file(&pytorch_file) {
        tracing::warn!("Could not remove {}: {}", PYTORCH_WEIGHTS, e);
    } else {
        tracing::info!("Removed {}", PYTORCH_WEIGHTS);
    }

    Ok(true)
}
