use anyhow::{Context, Result};
use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::generation::{LogitsProcessor, Sampling};
use candle_transformers::models::t5;
use hf_hub::{api::tokio::Api, Repo, RepoType};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tokenizers::Tokenizer;

use crate::config::ModelSettings;
use crate::model::{GenerationParams, SummaryModel};

/// Pre-trained T5 checkpoint run on candle.
pub struct T5Summarizer {
    // The decoder keeps a key/value cache, so one generation at a time.
    model: Mutex<t5::T5ForConditionalGeneration>,
    tokenizer: Tokenizer,
    device: Device,
    decoder_start_token_id: u32,
    eos_token_id: u32,
    use_cache: bool,
    prompt_prefix: String,
    context_tokens: usize,
}

impl T5Summarizer {
    /// Fetches the checkpoint through the local hub cache and builds it.
    pub async fn load(settings: &ModelSettings) -> Result<Self> {
        let api = Api::new().context("failed to create Hugging Face hub client")?;
        let repo = api.repo(Repo::with_revision(
            settings.model_id.clone(),
            RepoType::Model,
            settings.revision.clone(),
        ));
        let config = fetch(&repo, "config.json").await?;
        let tokenizer = fetch(&repo, "tokenizer.json").await?;
        let weights = fetch(&repo, "model.safetensors").await?;

        let settings = settings.clone();
        tokio::task::spawn_blocking(move || Self::from_files(&config, &tokenizer, &weights, &settings))
            .await
            .context("model load task panicked")?
    }

    pub fn from_files(
        config_path: &Path,
        tokenizer_path: &Path,
        weights_path: &Path,
        settings: &ModelSettings,
    ) -> Result<Self> {
        let device = Device::Cpu;
        let raw = std::fs::read_to_string(config_path)
            .with_context(|| format!("failed to read {}", config_path.display()))?;
        let config: t5::Config = serde_json::from_str(&raw).context("failed to parse model config")?;
        let tokenizer = Tokenizer::from_file(tokenizer_path).map_err(anyhow::Error::msg)?;

        let vb = load_weights(weights_path, &device)?;
        let model = t5::T5ForConditionalGeneration::load(vb, &config).context("failed to build T5 model")?;

        Ok(Self {
            model: Mutex::new(model),
            tokenizer,
            device,
            decoder_start_token_id: config.decoder_start_token_id.unwrap_or(config.pad_token_id) as u32,
            eos_token_id: config.eos_token_id as u32,
            use_cache: config.use_cache,
            prompt_prefix: settings.prompt_prefix.clone(),
            context_tokens: settings.context_tokens,
        })
    }

    fn generate(&self, text: &str, params: &GenerationParams) -> Result<String> {
        let mut logits_processor = LogitsProcessor::from_sampling(0, sampling_for(params)?);
        let prompt = format!("{}{}", self.prompt_prefix, text);
        let tokens = self
            .tokenizer
            .encode(prompt, true)
            .map_err(anyhow::Error::msg)?
            .get_ids()
            .to_vec();
        if tokens.len() > self.context_tokens {
            anyhow::bail!(
                "input of {} tokens exceeds the model context window of {} tokens",
                tokens.len(),
                self.context_tokens
            );
        }

        let mut model = self.model.lock().unwrap_or_else(PoisonError::into_inner);
        model.clear_kv_cache();

        let input_ids = Tensor::new(tokens.as_slice(), &self.device)?.unsqueeze(0)?;
        let encoder_output = model.encode(&input_ids)?;

        let mut output_ids = vec![self.decoder_start_token_id];
        let mut generated = 0;
        while generated < params.max_length {
            let decoder_ids = if generated == 0 || !self.use_cache {
                Tensor::new(output_ids.as_slice(), &self.device)?.unsqueeze(0)?
            } else {
                let last = output_ids[output_ids.len() - 1];
                Tensor::new(&[last], &self.device)?.unsqueeze(0)?
            };
            let logits = model
                .decode(&decoder_ids, &encoder_output)?
                .squeeze(0)?
                .to_dtype(DType::F32)?;
            let mut logits = logits.to_vec1::<f32>()?;
            suppress_early_eos(&mut logits, self.eos_token_id, generated, params.min_length);
            let logits = Tensor::new(logits.as_slice(), &self.device)?;

            let next = logits_processor.sample(&logits)?;
            if next == self.eos_token_id {
                break;
            }
            output_ids.push(next);
            generated += 1;
        }
        model.clear_kv_cache();
        drop(model);

        let summary = self
            .tokenizer
            .decode(&output_ids[1..], true)
            .map_err(anyhow::Error::msg)?;
        Ok(summary.trim().to_string())
    }
}

impl SummaryModel for T5Summarizer {
    fn infer(&self, text: &str, params: &GenerationParams) -> Result<Vec<Value>> {
        let summary = self.generate(text, params)?;
        Ok(vec![json!({ "summary_text": summary })])
    }
}

async fn fetch(repo: &hf_hub::api::tokio::ApiRepo, file: &str) -> Result<PathBuf> {
    repo.get(file)
        .await
        .with_context(|| format!("failed to fetch {file} from the model hub"))
}

fn load_weights(weights_path: &Path, device: &Device) -> Result<VarBuilder<'static>> {
    let bytes = std::fs::read(weights_path)
        .with_context(|| format!("failed to read {}", weights_path.display()))?;
    VarBuilder::from_buffered_safetensors(bytes, DType::F32, device).context("failed to load model weights")
}

/// Only greedy decoding is supported.
fn sampling_for(params: &GenerationParams) -> Result<Sampling> {
    if !params.deterministic {
        anyhow::bail!("sampled decoding is not supported; set deterministic");
    }
    Ok(Sampling::ArgMax)
}

/// Rules out end-of-sequence until `min_length` tokens exist.
fn suppress_early_eos(logits: &mut [f32], eos_token_id: u32, generated: usize, min_length: usize) {
    if generated < min_length {
        if let Some(logit) = logits.get_mut(eos_token_id as usize) {
            *logit = f32::NEG_INFINITY;
        }
    }
}
