//! Voice activation
//!
//! Wake word gating of the user-input stream. Acoustic inference sits
//! behind [`WakeScorer`]; the gate only sees per-keyword confidences.

mod activation;
mod gate;
mod scorer;

pub use activation::{ActivationHandle, ActivationState};
pub use gate::{ActivationChange, WakeGate};
pub use scorer::{EnergyScorer, KeywordScore, WakeScorer};

/// Sample rate expected by wake word detection
pub const SAMPLE_RATE: u32 = 16_000;

/// Decode little-endian PCM16 bytes into samples
///
/// A trailing odd byte is ignored.
#[must_use]
pub fn pcm16_to_samples(bytes: &[u8]) -> Vec<i16> {
    bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect()
}

/// Encode samples as little-endian PCM16 bytes
#[must_use]
pub fn samples_to_pcm16(samples: &[i16]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_le_bytes()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pcm16_is_little_endian() {
        assert_eq!(pcm16_to_samples(&[0x01, 0x00, 0xff, 0xff]), vec![1, -1]);
        assert_eq!(samples_to_pcm16(&[256, -2]), vec![0x00, 0x01, 0xfe, 0xff]);
    }

    #[test]
    fn trailing_byte_ignored() {
        assert_eq!(pcm16_to_samples(&[0x02, 0x00, 0x07]), vec![2]);
    }
}
