use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::time::Instant;

use candle_core::quantized::{gguf_file, GgmlDType, QTensor};
use candle_core::{DType, Device};
use candle_transformers::models::quantized_llama::ModelWeights;
use eyre::{eyre, Context, Result};
use tokenizers::Tokenizer;

use super::{utils, ModelSource};

pub const DEFAULT_REPO_ID: &str = "defog/sqlcoder-7b-2";
pub const DEFAULT_WEIGHTS_FILE: &str = "sqlcoder-7b-q5_k_m.gguf";
pub const DEFAULT_TOKENIZER_FILE: &str = "tokenizer.json";
pub const DEFAULT_CACHE_DIR: &str = "model";

/// Weight type applied before the model is written to the cache.
pub const QUANTIZATION: GgmlDType = GgmlDType::Q4K;

/// Precision the quantized matmuls and the logits are computed in.
pub const COMPUTE_DTYPE: DType = DType::F32;

const CACHED_WEIGHTS: &str = "model.gguf";
const CACHED_TOKENIZER: &str = "tokenizer.json";
const EOS_TOKEN: &str = "</s>";

#[derive(Clone)]
pub struct Model {
    pub weights: ModelWeights,
    pub tokenizer: Tokenizer,
    pub device: Device,
    pub eos_token: u32,
}

impl Model {
    /// Load a materialized model from a cache directory.
    pub fn load<P>(dir: &P, device: Device) -> Result<Self>
    where
        P: AsRef<Path> + ?Sized,
    {
        let dir = dir.as_ref();

        let start = Instant::now();

        let tokenizer_file = dir.join(CACHED_TOKENIZER);
        let tokenizer = Tokenizer::from_file(&tokenizer_file)
            .map_err(|e| eyre!(e))
            .wrap_err_with(|| format!("failed to load tokenizer {}", tokenizer_file.display()))?;

        let eos_token = tokenizer
            .token_to_id(EOS_TOKEN)
            .ok_or_else(|| eyre!("tokenizer has no {EOS_TOKEN} token"))?;

        tracing::info!(elapsed = ?start.elapsed(), "tokenizer loaded");

        let start = Instant::now();

        let weights_file = dir.join(CACHED_WEIGHTS);
        let mut file = File::open(&weights_file)
            .wrap_err_with(|| format!("failed to open {}", weights_file.display()))?;

        let content = gguf_file::Content::read(&mut file)
            .wrap_err_with(|| format!("failed to read gguf header of {}", weights_file.display()))?;

        let weights = ModelWeights::from_gguf(content, &mut file, &device)?;

        tracing::info!(elapsed = ?start.elapsed(), ?device, "weights loaded");

        Ok(Self {
            weights,
            tokenizer,
            device,
            eos_token,
        })
    }
}

/// Where the pretrained model comes from and where it is kept afterwards.
#[derive(Debug, Clone)]
pub struct PretrainedSource {
    pub repo_id: String,
    pub weights_file: String,
    pub tokenizer_file: String,
    pub cache_dir: PathBuf,
    pub cpu: bool,
    pub offline: bool,
}

impl Default for PretrainedSource {
    fn default() -> Self {
        Self {
            repo_id: DEFAULT_REPO_ID.to_string(),
            weights_file: DEFAULT_WEIGHTS_FILE.to_string(),
            tokenizer_file: DEFAULT_TOKENIZER_FILE.to_string(),
            cache_dir: PathBuf::from(DEFAULT_CACHE_DIR),
            cpu: false,
            offline: false,
        }
    }
}

impl ModelSource for PretrainedSource {
    type Handle = Model;

    fn fetch(&self) -> Result<Model> {
        let device = utils::device(self.cpu)?;

        if self.cache_dir.exists() {
            tracing::info!(cache_dir = %self.cache_dir.display(), "loading model from local cache");
            return Model::load(&self.cache_dir, device);
        }

        if self.offline {
            eyre::bail!(
                "no cached model at {} and hub access is disabled",
                self.cache_dir.display()
            );
        }

        self.materialize()?;

        Model::load(&self.cache_dir, device)
    }
}

impl PretrainedSource {
    /// Download from the hub, quantize and write the cache directory.
    ///
    /// Everything is written to a staging directory first and renamed into
    /// place at the end, so an existing cache directory is always complete.
    fn materialize(&self) -> Result<()> {
        tracing::info!(repo = %self.repo_id, "local model not found, fetching from the hub");

        let api = hf_hub::api::sync::Api::new().wrap_err("failed to create hub client")?;
        let repo = api.model(self.repo_id.clone());

        let tokenizer = repo
            .get(&self.tokenizer_file)
            .wrap_err_with(|| format!("failed to fetch {}/{}", self.repo_id, self.tokenizer_file))?;

        let start = Instant::now();

        let weights = repo
            .get(&self.weights_file)
            .wrap_err_with(|| format!("failed to fetch {}/{}", self.repo_id, self.weights_file))?;

        tracing::info!(elapsed = ?start.elapsed(), "weights fetched");

        let staging = staging_dir(&self.cache_dir);

        if staging.exists() {
            fs::remove_dir_all(&staging)?;
        }

        fs::create_dir_all(&staging)
            .wrap_err_with(|| format!("failed to create {}", staging.display()))?;

        fs::copy(&tokenizer, staging.join(CACHED_TOKENIZER))?;

        quantize_gguf(&weights, &staging.join(CACHED_WEIGHTS), QUANTIZATION)?;

        fs::rename(&staging, &self.cache_dir).wrap_err_with(|| {
            format!("failed to move model into {}", self.cache_dir.display())
        })?;

        tracing::info!(cache_dir = %self.cache_dir.display(), "model saved");

        Ok(())
    }
}

/// Rewrite a gguf file with every quantizable matrix converted to `dtype`.
pub fn quantize_gguf(src: &Path, dst: &Path, dtype: GgmlDType) -> Result<()> {
    let start = Instant::now();

    let mut reader =
        File::open(src).wrap_err_with(|| format!("failed to open {}", src.display()))?;
    let content = gguf_file::Content::read(&mut reader)?;

    let mut names = content.tensor_infos.keys().collect::<Vec<_>>();
    names.sort();

    let mut tensors = Vec::with_capacity(names.len());

    for name in names {
        let tensor = content.tensor(&mut reader, name, &Device::Cpu)?;

        let tensor = if should_quantize(tensor.shape().dims(), tensor.dtype(), dtype) {
            QTensor::quantize(&tensor.dequantize(&Device::Cpu)?, dtype)?
        } else {
            tensor
        };

        tensors.push((name.as_str(), tensor));
    }

    let metadata = content
        .metadata
        .iter()
        .map(|(key, value)| (key.as_str(), value))
        .collect::<Vec<_>>();

    let tensors = tensors
        .iter()
        .map(|(name, tensor)| (*name, tensor))
        .collect::<Vec<_>>();

    let mut out = File::create(dst).wrap_err_with(|| format!("failed to create {}", dst.display()))?;
    gguf_file::write(&mut out, &metadata, &tensors)?;

    tracing::info!(elapsed = ?start.elapsed(), ?dtype, tensors = tensors.len(), "weights quantized");

    Ok(())
}

/// Only matrices whose rows split evenly into quantization blocks are
/// converted; norms and biases keep their stored type.
fn should_quantize(dims: &[usize], current: GgmlDType, target: GgmlDType) -> bool {
    if current == target || dims.len() != 2 {
        return false;
    }

    dims.last()
        .is_some_and(|&cols| cols % target.block_size() == 0)
}

fn staging_dir(cache_dir: &Path) -> PathBuf {
    let mut name = cache_dir
        .components()
        .collect::<PathBuf>()
        .into_os_string();
    name.push(".partial");
    PathBuf::from(name)
}
