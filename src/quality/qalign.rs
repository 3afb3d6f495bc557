//! Q-Align quality/aesthetic model using ONNX Runtime
//!
//! The model is a multimodal LLM asked to rate the image in words. The score
//! is the expectation over the rating words' probabilities at the position
//! following the task prompt.

use anyhow::{anyhow, bail, Result};
use ndarray::Array4;
use ort::session::Session;
use ort::value::Tensor;
use std::sync::Mutex;
use tokenizers::Tokenizer;

use super::{QualityModel, QualityTask};
use crate::config::Config;
use crate::device::Device;
use crate::image_input::Image;
use crate::models;
use crate::preprocess::{self, CLIP_MEAN, CLIP_STD};

/// Marks where the image embeddings go in the prompt
const IMAGE_PLACEHOLDER: &str = "<|image|>";

/// Rating words, best first, and the score each one stands for
const LEVEL_WORDS: [&str; 5] = ["excellent", "good", "fair", "poor", "bad"];
const LEVEL_WEIGHTS: [f32; 5] = [5.0, 4.0, 3.0, 2.0, 1.0];

pub fn task_prompt(task: QualityTask) -> String {
    let noun = match task {
        QualityTask::Quality => "quality",
        QualityTask::Aesthetic => "aesthetics",
    };
    format!(
        "USER: How would you rate the {noun} of this image?\n{IMAGE_PLACEHOLDER}\nASSISTANT: The {noun} of the image is"
    )
}

/// Token ids for a prompt with the image placeholder replaced by
/// `image_token_index`. Only the prefix gets the BOS token.
pub fn encode_prompt(tokenizer: &Tokenizer, prompt: &str, image_token_index: i64) -> Result<Vec<i64>> {
    let (prefix, suffix) = prompt
        .split_once(IMAGE_PLACEHOLDER)
        .ok_or_else(|| anyhow!("prompt has no {} placeholder", IMAGE_PLACEHOLDER))?;

    let tokenize = |text: &str| -> Result<Vec<i64>> {
        let encoding = tokenizer
            .encode(text, false)
            .map_err(|e| anyhow!("Failed to tokenize task prompt: {}", e))?;
        Ok(encoding.get_ids().iter().map(|&id| id as i64).collect())
    };

    let mut ids = Vec::new();
    if let Some(bos) = tokenizer.token_to_id("<s>") {
        ids.push(bos as i64);
    }
    ids.extend(tokenize(prefix)?);
    ids.push(image_token_index);
    ids.extend(tokenize(suffix)?);
    Ok(ids)
}

/// First token id of each rating word
pub fn level_token_ids(tokenizer: &Tokenizer) -> Result<[u32; 5]> {
    let mut ids = [0u32; 5];
    for (slot, word) in ids.iter_mut().zip(LEVEL_WORDS) {
        let encoding = tokenizer
            .encode(word, false)
            .map_err(|e| anyhow!("Failed to tokenize {}: {}", word, e))?;
        *slot = *encoding
            .get_ids()
            .first()
            .ok_or_else(|| anyhow!("rating word {} has no tokens", word))?;
    }
    Ok(ids)
}

/// Softmax over the rating words' logits, weighted by their scores.
/// `logits` is one row over the whole vocabulary.
pub fn expected_level(logits: &[f32], level_ids: &[u32; 5]) -> Result<f32> {
    let mut picked = [0f32; 5];
    for (slot, &id) in picked.iter_mut().zip(level_ids) {
        *slot = *logits
            .get(id as usize)
            .ok_or_else(|| anyhow!("token id {} outside vocabulary of {}", id, logits.len()))?;
    }

    let max = picked.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exp = picked.map(|l| (l - max).exp());
    let total: f32 = exp.iter().sum();
    if !total.is_finite() || total <= 0.0 {
        bail!("degenerate rating distribution");
    }

    Ok(exp
        .iter()
        .zip(LEVEL_WEIGHTS)
        .map(|(e, w)| e / total * w)
        .sum())
}

/// Logits row of the last sequence position. Accepts `[1, V]` and `[1, L, V]`.
fn last_position<'a>(shape: &[i64], data: &'a [f32]) -> Result<&'a [f32]> {
    let vocab = match shape {
        [1, vocab] | [1, _, vocab] => *vocab as usize,
        other => bail!("unexpected logits shape {:?}", other),
    };
    if vocab == 0 || data.len() < vocab {
        bail!("logits shape {:?} does not match {} values", shape, data.len());
    }
    Ok(&data[data.len() - vocab..])
}

struct TaskPrompts {
    quality: Vec<i64>,
    aesthetic: Vec<i64>,
}

impl TaskPrompts {
    fn get(&self, task: QualityTask) -> &[i64] {
        match task {
            QualityTask::Quality => &self.quality,
            QualityTask::Aesthetic => &self.aesthetic,
        }
    }
}

/// Q-Align (mPLUG-Owl2) rating images on a 1 to 5 scale.
pub struct QAlignModel {
    session: Mutex<Session>,
    prompts: TaskPrompts,
    level_ids: [u32; 5],
    input_size: u32,
}

impl QAlignModel {
    pub fn load(config: &Config, device: Device) -> Result<Self> {
        if config.quality.input_size == 0 {
            bail!("input_size must be positive");
        }

        let files = models::resolve_files(config, &config.quality.files)?;

        tracing::info!(model = ?files.onnx, %device, "Loading Q-Align model...");
        let session = models::build_session(&files.onnx, device, config.intra_threads)?;
        let tokenizer = models::load_tokenizer(&files.tokenizer)?;

        let index = config.quality.image_token_index;
        let prompts = TaskPrompts {
            quality: encode_prompt(&tokenizer, &task_prompt(QualityTask::Quality), index)?,
            aesthetic: encode_prompt(&tokenizer, &task_prompt(QualityTask::Aesthetic), index)?,
        };
        let level_ids = level_token_ids(&tokenizer)?;
        tracing::debug!(?level_ids, "Q-Align rating tokens");

        Ok(Self {
            session: Mutex::new(session),
            prompts,
            level_ids,
            input_size: config.quality.input_size,
        })
    }

}

/// Pad to a square with the mean colour, then resize to `input_size`.
fn pixel_values(image: &Image, input_size: u32) -> Array4<f32> {
    let square = preprocess::expand_to_square(image.as_rgb(), preprocess::mean_color(CLIP_MEAN));
    let resized = preprocess::resize(&square, input_size, input_size);
    preprocess::to_nchw(&resized, CLIP_MEAN, CLIP_STD)
}

impl QualityModel for QAlignModel {
    fn name(&self) -> &'static str {
        "Q-Align"
    }

    fn score(&self, image: &Image, task: QualityTask) -> Result<f32> {
        let prompt = self.prompts.get(task);
        let seq_len = prompt.len();

        let input_ids = Tensor::from_array(([1usize, seq_len], prompt.to_vec().into_boxed_slice()))?;
        let attention_mask = Tensor::from_array(([1usize, seq_len], vec![1i64; seq_len].into_boxed_slice()))?;
        let pixels = pixel_values(image, self.input_size);
        let pixel_values = Tensor::from_array(preprocess::tensor_parts(pixels))?;

        let mut session = self.session
            .lock()
            .map_err(|e| anyhow!("Failed to lock model: {}", e))?;

        let outputs = session.run(ort::inputs![
            "input_ids" => input_ids,
            "attention_mask" => attention_mask,
            "pixel_values" => pixel_values,
        ])?;

        let logits = outputs.get("logits")
            .ok_or_else(|| anyhow!("No logits output"))?;
        let (shape, data) = logits.try_extract_tensor::<f32>()?;

        let row = last_position(&shape[..], data)?;
        expected_level(row, &self.level_ids)
    }
}
