//! Image-prompt evaluation
//!
//! Given one image and one text prompt, produces three scores:
//! - relevance: how well the image matches the prompt (ViLT retrieval logit)
//! - quality: technical image quality (Q-Align, 1 to 5)
//! - aesthetic: aesthetic appeal (Q-Align, 1 to 5)
//!
//! Models run through ONNX Runtime. They are loaded once by [`Evaluator`] and
//! shared read-only by every call.
//!
//! ```no_run
//! use imgeval::{Device, Evaluator};
//!
//! let evaluator = Evaluator::new(Some(Device::Cpu))?;
//! let scores = evaluator.evaluate("car.png", "a blue muscle car on a rural road")?;
//! println!("{:?}", scores);
//! # Ok::<(), imgeval::EvalError>(())
//! ```

pub mod config;
pub mod device;
pub mod error;
pub mod evaluator;
pub mod image_input;
pub mod logging;
pub mod models;
pub mod preprocess;
pub mod quality;
pub mod relevance;

#[cfg(test)]
mod test_support;

pub use config::Config;
pub use device::Device;
pub use error::{EvalError, Result};
pub use evaluator::{EvaluationResult, Evaluator};
pub use image_input::{normalize, Image, ImageInput};
pub use quality::{QualityModel, QualityScorer, QualityTask};
pub use relevance::{RelevanceModel, RelevanceScorer};
