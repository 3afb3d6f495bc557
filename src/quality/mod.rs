//! Image quality and aesthetics scoring
//!
//! One metric model answers two questions about the image alone: how good it
//! is technically (sharpness, artifacts, exposure) and how appealing it is
//! (composition, subject). Each question is a separate forward pass.

mod qalign;

pub use qalign::QAlignModel;

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::Config;
use crate::device::Device;
use crate::error::{check_finite, EvalError, Result};
use crate::image_input::Image;

/// Which judgment to ask the metric model for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityTask {
    Quality,
    Aesthetic,
}

impl fmt::Display for QualityTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QualityTask::Quality => write!(f, "quality"),
            QualityTask::Aesthetic => write!(f, "aesthetic"),
        }
    }
}

/// An image-only metric model with per-task outputs.
pub trait QualityModel: Send + Sync {
    /// Model name for logs and errors
    fn name(&self) -> &'static str;

    /// Forward pass for one task. Must not mutate model state.
    fn score(&self, image: &Image, task: QualityTask) -> anyhow::Result<f32>;
}

pub struct QualityScorer {
    model: Box<dyn QualityModel>,
}

impl QualityScorer {
    pub fn new(model: impl QualityModel + 'static) -> Self {
        Self {
            model: Box::new(model),
        }
    }

    /// Load the configured Q-Align model on `device`.
    pub fn load(config: &Config, device: Device) -> Result<Self> {
        let model = QAlignModel::load(config, device).map_err(|e| EvalError::init("Q-Align", e))?;
        Ok(Self::new(model))
    }

    pub fn model_name(&self) -> &'static str {
        self.model.name()
    }

    /// Technical quality: sharpness, noise, artifacts, exposure.
    pub fn score_quality(&self, image: &Image) -> Result<f32> {
        self.score_task(image, QualityTask::Quality)
    }

    /// Aesthetic appeal: composition, colour, subject.
    pub fn score_aesthetic(&self, image: &Image) -> Result<f32> {
        self.score_task(image, QualityTask::Aesthetic)
    }

    fn score_task(&self, image: &Image, task: QualityTask) -> Result<f32> {
        let name = self.model.name();
        let score = self
            .model
            .score(image, task)
            .map_err(|e| EvalError::inference(name, e.context(format!("{} task", task))))?;
        check_finite(name, score)
    }
}
