//! Cross-modal relevance scoring
//!
//! A joint vision-language model reads the image and the prompt together and
//! returns one unbounded matching logit. Higher means more relevant; the
//! scale is model-defined, so only compare scores from the same model.

mod text;
mod vilt;

pub use text::{BertTextEncoder, TextEncoding};
pub use vilt::ViltModel;

use crate::config::Config;
use crate::device::Device;
use crate::error::{check_finite, EvalError, Result};
use crate::image_input::Image;

/// A model that scores how well an image matches a text.
pub trait RelevanceModel: Send + Sync {
    /// Model name for logs and errors
    fn name(&self) -> &'static str;

    /// Forward pass without side effects. Over-long text is truncated.
    fn score(&self, image: &Image, text: &str) -> anyhow::Result<f32>;
}

pub struct RelevanceScorer {
    model: Box<dyn RelevanceModel>,
}

impl RelevanceScorer {
    pub fn new(model: impl RelevanceModel + 'static) -> Self {
        Self {
            model: Box::new(model),
        }
    }

    /// Load the configured ViLT model on `device`.
    pub fn load(config: &Config, device: Device) -> Result<Self> {
        let model = ViltModel::load(config, device).map_err(|e| EvalError::init("ViLT", e))?;
        Ok(Self::new(model))
    }

    pub fn model_name(&self) -> &'static str {
        self.model.name()
    }

    pub fn score_relevance(&self, image: &Image, prompt: &str) -> Result<f32> {
        let name = self.model.name();
        let score = self
            .model
            .score(image, prompt)
            .map_err(|e| EvalError::inference(name, e))?;
        check_finite(name, score)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image_input::normalize;
    use image::{Rgb, RgbImage};

    /// Counts prompt words naming the image's dominant channel.
    struct ColorWords {
        max_words: usize,
    }

    impl RelevanceModel for ColorWords {
        fn name(&self) -> &'static str {
            "color-words"
        }

        fn score(&self, image: &Image, text: &str) -> anyhow::Result<f32> {
            let pixel = image.as_rgb().get_pixel(0, 0);
            let dominant = ["red", "green", "blue"][(0..3).max_by_key(|&c| pixel[c]).unwrap()];
            let hits = text
                .split_whitespace()
                .take(self.max_words)
                .filter(|w| *w == dominant)
                .count();
            Ok(hits as f32)
        }
    }

    struct Broken;

    impl RelevanceModel for Broken {
        fn name(&self) -> &'static str {
            "broken"
        }

        fn score(&self, _image: &Image, text: &str) -> anyhow::Result<f32> {
            if text.is_empty() {
                anyhow::bail!("input shape mismatch");
            }
            Ok(f32::NAN)
        }
    }

    fn blue_square() -> Image {
        normalize(RgbImage::from_pixel(32, 32, Rgb([0, 0, 255]))).unwrap()
    }

    #[test]
    fn test_matching_prompt_scores_higher() {
        let scorer = RelevanceScorer::new(ColorWords { max_words: 40 });
        let image = blue_square();

        let matching = scorer.score_relevance(&image, "a blue square").unwrap();
        let other = scorer.score_relevance(&image, "a red triangle").unwrap();
        assert!(matching > other);
    }

    #[test]
    fn test_long_prompt_still_scores() {
        let scorer = RelevanceScorer::new(ColorWords { max_words: 40 });
        let prompt = "blue ".repeat(10_000);
        assert_eq!(scorer.score_relevance(&blue_square(), &prompt).unwrap(), 40.0);
    }

    #[test]
    fn test_model_failure_is_inference_error() {
        let scorer = RelevanceScorer::new(Broken);
        let err = scorer.score_relevance(&blue_square(), "").unwrap_err();
        assert!(matches!(err, EvalError::Inference { model: "broken", .. }));
    }

    #[test]
    fn test_nan_score_is_inference_error() {
        let scorer = RelevanceScorer::new(Broken);
        let err = scorer.score_relevance(&blue_square(), "a blue square").unwrap_err();
        assert!(matches!(err, EvalError::Inference { .. }));
    }
}
