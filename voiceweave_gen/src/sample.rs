// Pitch selection from a per-cell probability distribution.
//
// The predictor hands back a probability vector over pitches for one
// (timestep, instrument) cell; this module turns it into a concrete pitch
// index. Temperature 0 is a pure argmax and consumes no randomness, so a
// seeded run's RNG stream is identical whether or not any cell happens to
// have a flat distribution. Positive temperatures rescale the distribution
// by `p^(1/temperature)` before a categorical draw.
//
// Rescaling can overflow or produce NaN for pathological distributions
// (all-zero rows, negative inputs, extreme temperatures). That surfaces as
// `SampleError::NumericInstability` rather than a silently degenerate
// draw.

use rand::Rng;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SampleError {
    #[error("rescaled pitch distribution is not finite at temperature {temperature}")]
    NumericInstability { temperature: f32 },
}

/// Pick a pitch index from a distribution row.
///
/// `temperature == 0` returns the argmax (ties broken by the lowest pitch
/// index). Otherwise each probability is rescaled by `p^(1/temperature)`,
/// the row renormalized, and one categorical sample drawn.
pub fn sample_pitch(
    distribution: &[f32],
    temperature: f32,
    rng: &mut impl Rng,
) -> Result<usize, SampleError> {
    debug_assert!(!distribution.is_empty(), "empty pitch distribution");

    if temperature == 0.0 {
        return Ok(argmax(distribution));
    }

    let exponent = 1.0 / f64::from(temperature);
    let rescaled: Vec<f64> = distribution
        .iter()
        .map(|&p| f64::from(p).powf(exponent))
        .collect();

    let total: f64 = rescaled.iter().sum();
    if !total.is_finite() || total <= 0.0 || rescaled.iter().any(|v| !v.is_finite()) {
        return Err(SampleError::NumericInstability { temperature });
    }

    // Cumulative-weight draw; no division needed since the target scales
    // with the unnormalized total.
    let target = rng.random::<f64>() * total;
    let mut cumulative = 0.0;
    for (pitch, &weight) in rescaled.iter().enumerate() {
        cumulative += weight;
        if cumulative > target {
            return Ok(pitch);
        }
    }
    // Rounding can leave the target just past the last positive weight.
    Ok(rescaled.len() - 1)
}

/// First index of the maximum value.
fn argmax(distribution: &[f32]) -> usize {
    let mut best = 0;
    for (i, &v) in distribution.iter().enumerate() {
        if v > distribution[best] {
            best = i;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn test_argmax_is_deterministic() {
        let dist = [0.1, 0.5, 0.2, 0.2];
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..20 {
            assert_eq!(sample_pitch(&dist, 0.0, &mut rng).unwrap(), 1);
        }
    }

    #[test]
    fn test_argmax_ties_break_low() {
        let dist = [0.25, 0.25, 0.25, 0.25];
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(sample_pitch(&dist, 0.0, &mut rng).unwrap(), 0);

        let dist = [0.1, 0.45, 0.45, 0.0];
        assert_eq!(sample_pitch(&dist, 0.0, &mut rng).unwrap(), 1);
    }

    #[test]
    fn test_argmax_consumes_no_rng() {
        let dist = [0.1, 0.9];
        let mut a = StdRng::seed_from_u64(42);
        let mut b = StdRng::seed_from_u64(42);
        sample_pitch(&dist, 0.0, &mut a).unwrap();
        assert_eq!(a.random::<u64>(), b.random::<u64>());
    }

    #[test]
    fn test_sampling_stays_in_range() {
        let dist = [0.05, 0.15, 0.4, 0.3, 0.1];
        let mut rng = StdRng::seed_from_u64(9);
        for _ in 0..500 {
            let pitch = sample_pitch(&dist, 1.0, &mut rng).unwrap();
            assert!(pitch < dist.len());
        }
    }

    #[test]
    fn test_low_temperature_sharpens() {
        // At temperature 0.1 the mode should dominate heavily.
        let dist = [0.1, 0.6, 0.3];
        let mut rng = StdRng::seed_from_u64(5);
        let n = 1000;
        let mode_hits = (0..n)
            .filter(|_| sample_pitch(&dist, 0.1, &mut rng).unwrap() == 1)
            .count();
        assert!(
            mode_hits > n * 9 / 10,
            "expected >90% mode hits, got {mode_hits}/{n}"
        );
    }

    #[test]
    fn test_zero_row_is_numeric_instability() {
        let dist = [0.0, 0.0, 0.0];
        let mut rng = StdRng::seed_from_u64(3);
        assert!(matches!(
            sample_pitch(&dist, 1.0, &mut rng),
            Err(SampleError::NumericInstability { .. })
        ));
    }

    #[test]
    fn test_negative_probability_is_numeric_instability() {
        // powf of a negative base with fractional exponent is NaN.
        let dist = [-0.5, 0.5, 1.0];
        let mut rng = StdRng::seed_from_u64(3);
        assert!(matches!(
            sample_pitch(&dist, 0.7, &mut rng),
            Err(SampleError::NumericInstability { .. })
        ));
    }
}
