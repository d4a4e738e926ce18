//! Tempo chains: arbitrary playback-rate changes expressed as a sequence of
//! elementary factors the transcoder accepts.

use serde::Serialize;

use crate::error::{Result, DubsyncError, TranscodeOperation};

/// Smallest elementary factor the transcoder accepts
pub const MIN_TEMPO_FACTOR: f64 = 0.5;
/// Largest elementary factor the transcoder accepts
pub const MAX_TEMPO_FACTOR: f64 = 2.0;

const UNITY_EPSILON: f64 = 1e-9;

/// Ordered elementary tempo factors; the effective ratio is their product.
/// A factor above 1 speeds playback up and shortens the clip.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TempoChain {
    factors: Vec<f64>,
}

impl TempoChain {
    /// Chain that leaves the tempo untouched
    pub fn identity() -> Self {
        Self::default()
    }

    /// Split `ratio` into factors within `[MIN_TEMPO_FACTOR, MAX_TEMPO_FACTOR]`.
    ///
    /// Whole factors of 2.0 (or 0.5) are extracted until the remainder fits,
    /// then the remainder is appended unless it is unity.
    pub fn decompose(ratio: f64) -> Result<Self> {
        if !ratio.is_finite() || ratio <= 0.0 {
            return Err(DubsyncError::InvalidInput(format!(
                "Tempo ratio must be positive and finite, got {}",
                ratio
            )));
        }

        let mut factors = Vec::new();
        let mut remainder = ratio;
        while remainder > MAX_TEMPO_FACTOR {
            factors.push(MAX_TEMPO_FACTOR);
            remainder /= MAX_TEMPO_FACTOR;
        }
        while remainder < MIN_TEMPO_FACTOR {
            factors.push(MIN_TEMPO_FACTOR);
            remainder /= MIN_TEMPO_FACTOR;
        }
        if (remainder - 1.0).abs() > UNITY_EPSILON {
            factors.push(remainder);
        }

        Ok(Self { factors })
    }

    pub fn factors(&self) -> &[f64] {
        &self.factors
    }

    pub fn is_identity(&self) -> bool {
        self.factors.is_empty()
    }

    /// Effective playback-rate ratio
    pub fn product(&self) -> f64 {
        self.factors.iter().product()
    }

    /// Ensure every factor is within the range the transcoder enforces
    pub fn validate(&self) -> Result<()> {
        match self
            .factors
            .iter()
            .find(|f| !(MIN_TEMPO_FACTOR..=MAX_TEMPO_FACTOR).contains(*f))
        {
            Some(factor) => Err(DubsyncError::transcode(
                TranscodeOperation::Tempo,
                format!(
                    "Tempo factor {} outside [{}, {}]",
                    factor, MIN_TEMPO_FACTOR, MAX_TEMPO_FACTOR
                ),
            )),
            None => Ok(()),
        }
    }

    /// ffmpeg filter expression, e.g. `atempo=2.0,atempo=1.2`
    pub fn to_filter(&self) -> String {
        self.factors
            .iter()
            .map(|f| format!("atempo={:?}", f))
            .collect::<Vec<_>>()
            .join(",")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_bounded_product(ratio: f64) {
        let chain = TempoChain::decompose(ratio).unwrap();
        for factor in chain.factors() {
            assert!(
                (MIN_TEMPO_FACTOR..=MAX_TEMPO_FACTOR).contains(factor),
                "factor {} out of range for ratio {}",
                factor,
                ratio
            );
        }
        let relative = (chain.product() - ratio).abs() / ratio;
        assert!(relative < 1e-6, "product {} != ratio {}", chain.product(), ratio);
    }

    #[test]
    fn test_speedup_chain() {
        let chain = TempoChain::decompose(2.4).unwrap();
        assert_eq!(chain.factors().len(), 2);
        assert_eq!(chain.factors()[0], 2.0);
        assert!((chain.factors()[1] - 1.2).abs() < 1e-12);
        assert_eq!(chain.to_filter(), format!("atempo=2.0,atempo={:?}", chain.factors()[1]));
    }

    #[test]
    fn test_slowdown_chain() {
        let chain = TempoChain::decompose(0.2).unwrap();
        assert_eq!(chain.factors()[0], 0.5);
        assert_eq!(chain.factors()[1], 0.5);
        assert!((chain.factors()[2] - 0.8).abs() < 1e-12);
    }

    #[test]
    fn test_exact_powers_have_no_unity_remainder() {
        assert_eq!(TempoChain::decompose(4.0).unwrap().factors(), &[2.0, 2.0]);
        assert_eq!(TempoChain::decompose(0.25).unwrap().factors(), &[0.5, 0.5]);
        assert!(TempoChain::decompose(1.0).unwrap().is_identity());
    }

    #[test]
    fn test_boundaries_are_single_factors() {
        assert_eq!(TempoChain::decompose(2.0).unwrap().factors(), &[2.0]);
        assert_eq!(TempoChain::decompose(0.5).unwrap().factors(), &[0.5]);
    }

    #[test]
    fn test_products_match_requested_ratio() {
        for ratio in [0.01, 0.3, 0.49, 0.92, 1.07, 1.99, 2.01, 3.7, 17.0, 250.0] {
            assert_bounded_product(ratio);
        }
    }

    #[test]
    fn test_rejects_invalid_ratio() {
        assert!(TempoChain::decompose(0.0).is_err());
        assert!(TempoChain::decompose(-1.0).is_err());
        assert!(TempoChain::decompose(f64::INFINITY).is_err());
    }

    #[test]
    fn test_validate_rejects_out_of_range_factor() {
        let chain = TempoChain { factors: vec![2.5] };
        assert!(matches!(
            chain.validate(),
            Err(DubsyncError::Transcode { operation: TranscodeOperation::Tempo, .. })
        ));
        assert!(TempoChain::identity().validate().is_ok());
    }
}
