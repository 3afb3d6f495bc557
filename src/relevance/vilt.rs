//! ViLT image-text retrieval model using ONNX Runtime

use anyhow::{anyhow, bail, Result};
use ndarray::{Array3, Array4};
use ort::session::Session;
use ort::value::Tensor;
use std::sync::Mutex;

use super::text::BertTextEncoder;
use super::RelevanceModel;
use crate::config::Config;
use crate::device::Device;
use crate::image_input::Image;
use crate::models;
use crate::preprocess::{self, HALF_MEAN, HALF_STD};

/// ViLT (`vilt-b32-finetuned-coco`) fusing image patches and prompt tokens
/// into a single matching logit.
pub struct ViltModel {
    session: Mutex<Session>,
    text: BertTextEncoder,
    shorter_edge: u32,
    size_divisor: u32,
}

impl ViltModel {
    pub fn load(config: &Config, device: Device) -> Result<Self> {
        if config.relevance.shorter_edge == 0 || config.relevance.size_divisor == 0 {
            bail!("shorter_edge and size_divisor must be positive");
        }

        let files = models::resolve_files(config, &config.relevance.files)?;

        tracing::info!(model = ?files.onnx, %device, "Loading ViLT model...");
        let session = models::build_session(&files.onnx, device, config.intra_threads)?;
        let tokenizer = models::load_tokenizer(&files.tokenizer)?;
        let text = BertTextEncoder::new(tokenizer, config.relevance.max_text_len)?;

        Ok(Self {
            session: Mutex::new(session),
            text,
            shorter_edge: config.relevance.shorter_edge,
            size_divisor: config.relevance.size_divisor,
        })
    }

}

/// `pixel_values` `[1, 3, H, W]` and an all-ones `pixel_mask` `[1, H, W]`.
fn pixel_inputs(image: &Image, shorter_edge: u32, size_divisor: u32) -> (Array4<f32>, Array3<i64>) {
    let (width, height) =
        preprocess::shorter_edge_size(image.width(), image.height(), shorter_edge, size_divisor);
    let resized = preprocess::resize(image.as_rgb(), width, height);

    (
        preprocess::to_nchw(&resized, HALF_MEAN, HALF_STD),
        preprocess::full_pixel_mask(width, height),
    )
}

impl RelevanceModel for ViltModel {
    fn name(&self) -> &'static str {
        "ViLT"
    }

    fn score(&self, image: &Image, text: &str) -> Result<f32> {
        let encoding = self.text.encode(text)?;
        let (pixels, pixel_mask) = pixel_inputs(image, self.shorter_edge, self.size_divisor);

        let seq_len = encoding.len();
        let input_ids = Tensor::from_array(([1usize, seq_len], encoding.input_ids.into_boxed_slice()))?;
        let attention_mask =
            Tensor::from_array(([1usize, seq_len], encoding.attention_mask.into_boxed_slice()))?;
        let token_type_ids =
            Tensor::from_array(([1usize, seq_len], encoding.token_type_ids.into_boxed_slice()))?;
        let pixel_values = Tensor::from_array(preprocess::tensor_parts(pixels))?;
        let pixel_mask = Tensor::from_array(preprocess::tensor_parts(pixel_mask))?;

        let mut session = self.session
            .lock()
            .map_err(|e| anyhow!("Failed to lock model: {}", e))?;

        let outputs = session.run(ort::inputs![
            "input_ids" => input_ids,
            "attention_mask" => attention_mask,
            "token_type_ids" => token_type_ids,
            "pixel_values" => pixel_values,
            "pixel_mask" => pixel_mask,
        ])?;

        // logits: [1, 1]
        let logits = outputs.get("logits")
            .ok_or_else(|| anyhow!("No logits output"))?;
        let (_shape, data) = logits.try_extract_tensor::<f32>()?;

        data.first()
            .copied()
            .ok_or_else(|| anyhow!("Empty logits output"))
    }
}
