//! Wake word scoring
//!
//! Acoustic inference is opaque to the gate: a scorer maps one PCM16 chunk
//! to a confidence in `[0, 1]` per keyword.

use crate::Result;

/// Confidence for one keyword on one chunk
#[derive(Debug, Clone, PartialEq)]
pub struct KeywordScore {
    /// Keyword (model) name
    pub keyword: String,
    /// Confidence in `[0, 1]`
    pub score: f32,
}

impl KeywordScore {
    /// Create a new score
    #[must_use]
    pub fn new(keyword: impl Into<String>, score: f32) -> Self {
        Self {
            keyword: keyword.into(),
            score,
        }
    }
}

/// Scores fixed-size audio chunks for wake words
pub trait WakeScorer: Send {
    /// Score one chunk of 16 kHz mono samples
    ///
    /// # Errors
    ///
    /// Returns error if inference fails; the gate logs it and drops the chunk
    fn predict(&mut self, chunk: &[i16]) -> Result<Vec<KeywordScore>>;
}

/// Scores chunks by RMS energy
///
/// Stand-in for a trained model: any sufficiently loud chunk counts as every
/// configured keyword. Useful for replaying recorded sessions without a model.
#[derive(Debug, Clone)]
pub struct EnergyScorer {
    keywords: Vec<String>,
    gain: f32,
}

impl EnergyScorer {
    /// Default gain applied to normalized RMS energy
    pub const DEFAULT_GAIN: f32 = 4.0;

    /// Create a scorer reporting `keywords`
    #[must_use]
    pub fn new(keywords: Vec<String>) -> Self {
        Self {
            keywords,
            gain: Self::DEFAULT_GAIN,
        }
    }

    /// Override the energy gain
    #[must_use]
    pub const fn with_gain(mut self, gain: f32) -> Self {
        self.gain = gain;
        self
    }
}

impl WakeScorer for EnergyScorer {
    fn predict(&mut self, chunk: &[i16]) -> Result<Vec<KeywordScore>> {
        let score = (calculate_energy(chunk) * self.gain).clamp(0.0, 1.0);
        tracing::trace!(score, "energy score");
        Ok(self
            .keywords
            .iter()
            .map(|keyword| KeywordScore::new(keyword.clone(), score))
            .collect())
    }
}

/// Calculate normalized RMS energy of PCM16 samples
#[allow(clippy::cast_precision_loss)]
fn calculate_energy(samples: &[i16]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    let sum_squares: f32 = samples
        .iter()
        .map(|&s| {
            let v = f32::from(s) / f32::from(i16::MAX);
            v * v
        })
        .sum();
    (sum_squares / samples.len() as f32).sqrt()
}
