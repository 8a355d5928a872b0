//! Classifier adapter around an opaque two-class scorer.
//!
//! The scorer sees one timestep of both channels, shaped `[1][1][2]`, and
//! returns a two-class distribution. Index 1 is the stress class.

use crate::core::frame::Sample;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Scorer input: one batch, one timestep, two channels.
pub type ModelInput = [[[f32; 2]; 1]; 1];

/// Index of the stress class in the scorer output.
pub const STRESS_CLASS: usize = 1;

/// An opaque binary classifier.
pub trait Scorer {
    /// Score one input, returning `[relax, stress]` probabilities.
    fn score(&mut self, input: &ModelInput) -> Result<[f32; 2], ClassifierError>;
}

impl<F> Scorer for F
where
    F: FnMut(&ModelInput) -> Result<[f32; 2], ClassifierError>,
{
    fn score(&mut self, input: &ModelInput) -> Result<[f32; 2], ClassifierError> {
        self(input)
    }
}

/// Pin a closure to the scorer signature so its argument types are inferred.
pub fn scorer_fn<F>(f: F) -> F
where
    F: FnMut(&ModelInput) -> Result<[f32; 2], ClassifierError>,
{
    f
}

/// A failed scorer invocation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ClassifierError {
    #[error("scorer failed: {0}")]
    Scorer(String),

    #[error("scorer returned an invalid stress probability: {0}")]
    InvalidOutput(f32),
}

/// One classified sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Inference {
    pub sample: Sample,
    /// Stress-class probability in `[0, 1]`
    pub probability: f64,
    /// Wall-clock time spent inside the scorer
    pub latency: Duration,
}

impl Inference {
    pub fn probability_pct(&self) -> f64 {
        self.probability * 100.0
    }

    pub fn latency_ms(&self) -> f64 {
        self.latency.as_secs_f64() * 1000.0
    }
}

/// Shapes samples for the scorer and times each call.
pub struct ClassifierAdapter<S> {
    scorer: S,
}

impl<S: Scorer> ClassifierAdapter<S> {
    pub fn new(scorer: S) -> Self {
        Self { scorer }
    }

    /// Classify one sample. Latency covers the scorer call only.
    pub fn infer(&mut self, sample: Sample) -> Result<Inference, ClassifierError> {
        let input: ModelInput = [[[sample.channel_a as f32, sample.channel_b as f32]]];

        let started = Instant::now();
        let output = self.scorer.score(&input)?;
        let latency = started.elapsed();

        let stress = output[STRESS_CLASS];
        if !stress.is_finite() || !(0.0..=1.0).contains(&stress) {
            return Err(ClassifierError::InvalidOutput(stress));
        }

        Ok(Inference {
            sample,
            probability: f64::from(stress),
            latency,
        })
    }

    pub fn scorer_mut(&mut self) -> &mut S {
        &mut self.scorer
    }
}

/// Errors loading scorer weights.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("could not read model file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid model file: {0}")]
    Parse(#[from] serde_json::Error),
}

/// A dense two-in, two-out softmax layer with per-channel standardization.
///
/// Weights are stored as JSON:
///
/// ```json
/// { "mean": [512.0, 512.0], "scale": [128.0, 128.0],
///   "weights": [[0.8, -0.8], [-0.6, 0.6]], "bias": [0.1, -0.1] }
/// ```
///
/// `weights[i][j]` connects input channel `i` to output class `j`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SoftmaxScorer {
    #[serde(default)]
    pub mean: [f32; 2],
    #[serde(default = "unit_scale")]
    pub scale: [f32; 2],
    pub weights: [[f32; 2]; 2],
    pub bias: [f32; 2],
}

fn unit_scale() -> [f32; 2] {
    [1.0, 1.0]
}

impl SoftmaxScorer {
    /// Load weights from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ModelError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ModelError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Ok(serde_json::from_str(&content)?)
    }

    fn logits(&self, x: [f32; 2]) -> [f32; 2] {
        let z = [
            (x[0] - self.mean[0]) / self.scale[0],
            (x[1] - self.mean[1]) / self.scale[1],
        ];
        let mut out = self.bias;
        for (class, logit) in out.iter_mut().enumerate() {
            *logit += z[0] * self.weights[0][class] + z[1] * self.weights[1][class];
        }
        out
    }
}

impl Scorer for SoftmaxScorer {
    fn score(&mut self, input: &ModelInput) -> Result<[f32; 2], ClassifierError> {
        let logits = self.logits(input[0][0]);
        let max = logits[0].max(logits[1]);
        let exp = [(logits[0] - max).exp(), (logits[1] - max).exp()];
        let total = exp[0] + exp[1];

        if !total.is_finite() || total <= 0.0 {
            return Err(ClassifierError::Scorer(format!(
                "non-finite logits {logits:?}"
            )));
        }
        Ok([exp[0] / total, exp[1] / total])
    }
}
