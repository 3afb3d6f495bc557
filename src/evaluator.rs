//! Evaluation entry point: one image, one prompt, three scores.

use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::config::Config;
use crate::device::Device;
use crate::error::Result;
use crate::image_input::{self, Image, ImageInput};
use crate::quality::{QualityModel, QualityScorer};
use crate::relevance::{RelevanceModel, RelevanceScorer};

/// Scores for one (image, prompt) pair. Ranges are model-defined; treat
/// each as a ranking signal only.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    /// Image-prompt matching logit
    pub relevance: f32,
    /// Technical quality
    pub quality: f32,
    /// Aesthetic appeal
    pub aesthetic: f32,
}

/// Holds both loaded models for the process lifetime.
///
/// Construction loads everything onto one device; `evaluate` only reads the
/// models, so an `Evaluator` can be shared across threads.
pub struct Evaluator {
    relevance: RelevanceScorer,
    quality: QualityScorer,
    device: Device,
    parallel: bool,
}

impl Evaluator {
    /// Load both models with default settings. `None` picks CUDA when
    /// available, the CPU otherwise.
    pub fn new(device: Option<Device>) -> Result<Self> {
        let mut config = Config::default();
        if let Some(device) = device {
            config.device = device;
        }
        Self::from_config(&config)
    }

    /// Load both models as configured.
    ///
    /// Model files are checked before `Auto` is resolved, so missing
    /// weights fail the same way on every machine.
    pub fn from_config(config: &Config) -> Result<Self> {
        let started = Instant::now();
        let relevance = RelevanceScorer::load(config, config.device)?;
        let quality = QualityScorer::load(config, config.device)?;

        let device = config.device.resolve();
        tracing::info!(
            requested = %config.device,
            %device,
            relevance = relevance.model_name(),
            quality = quality.model_name(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Models loaded"
        );

        Ok(Self {
            relevance,
            quality,
            device,
            parallel: config.parallel,
        })
    }

    /// Build from already-constructed models.
    pub fn with_models(
        device: Device,
        relevance: impl RelevanceModel + 'static,
        quality: impl QualityModel + 'static,
    ) -> Self {
        Self {
            relevance: RelevanceScorer::new(relevance),
            quality: QualityScorer::new(quality),
            device,
            parallel: true,
        }
    }

    pub fn parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn device(&self) -> Device {
        self.device
    }

    pub fn relevance(&self) -> &RelevanceScorer {
        &self.relevance
    }

    pub fn quality(&self) -> &QualityScorer {
        &self.quality
    }

    /// Score `image_input` against `prompt`.
    ///
    /// Fails with the first error from normalization or any scorer; no
    /// partial result is returned.
    pub fn evaluate(&self, image_input: impl Into<ImageInput>, prompt: &str) -> Result<EvaluationResult> {
        let started = Instant::now();
        let image = image_input::normalize(image_input)?;

        let (relevance, quality_pair) = if self.parallel {
            rayon::join(
                || self.relevance.score_relevance(&image, prompt),
                || self.score_quality_pair(&image),
            )
        } else {
            (
                self.relevance.score_relevance(&image, prompt),
                self.score_quality_pair(&image),
            )
        };
        let relevance = relevance?;
        let (quality, aesthetic) = quality_pair?;

        let result = EvaluationResult {
            relevance,
            quality,
            aesthetic,
        };
        tracing::debug!(
            width = image.width(),
            height = image.height(),
            relevance,
            quality,
            aesthetic,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Evaluated image"
        );
        Ok(result)
    }

    fn score_quality_pair(&self, image: &Image) -> Result<(f32, f32)> {
        let quality = self.quality.score_quality(image)?;
        let aesthetic = self.quality.score_aesthetic(image)?;
        Ok((quality, aesthetic))
    }
}
