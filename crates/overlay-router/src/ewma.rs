/// Exponentially Weighted Moving Average filter.
///
/// Smooths a noisy measurement series by weighting recent samples more
/// heavily. Used for the per-link cost estimate, fed by hello round-trip
/// times (§4.2: `cost := (1-alpha)*cost + alpha*(rtt/2)`, alpha = 0.1).
///
/// The smoothing factor `alpha` controls responsiveness:
/// - `alpha` near 1.0: tracks input closely (low smoothing)
/// - `alpha` near 0.0: retains history (high smoothing)
pub struct Ewma {
    value: f64,
    alpha: f64,
    initialized: bool,
}

impl Ewma {
    /// Creates a new EWMA filter with the given smoothing factor (`0.0 < alpha <= 1.0`).
    pub fn new(alpha: f64) -> Self {
        Self {
            value: 0.0,
            alpha,
            initialized: false,
        }
    }

    /// Feeds a new measurement into the filter, updating the smoothed value.
    ///
    /// NaN or infinite measurements are silently ignored to prevent
    /// poisoning the smoothed value.
    pub fn update(&mut self, measurement: f64) {
        if measurement.is_nan() || measurement.is_infinite() {
            return;
        }
        if !self.initialized {
            self.value = measurement;
            self.initialized = true;
        } else {
            self.value = self.value * (1.0 - self.alpha) + measurement * self.alpha;
        }
    }

    /// Returns the current smoothed value.
    pub fn value(&self) -> f64 {
        self.value
    }
}

/// The router's fixed cost-smoothing alpha (§4.2).
pub const COST_ALPHA: f64 = 0.1;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ewma_logic() {
        let mut ewma = Ewma::new(0.5);
        ewma.update(10.0);
        assert!((ewma.value() - 10.0).abs() < f64::EPSILON);
        ewma.update(20.0);
        assert!((ewma.value() - 15.0).abs() < f64::EPSILON);
        ewma.update(30.0);
        assert!((ewma.value() - 22.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_ewma_uninitialized_value_is_zero() {
        let ewma = Ewma::new(0.5);
        assert!((ewma.value() - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_ewma_ignores_nan_and_inf() {
        let mut ewma = Ewma::new(0.5);
        ewma.update(10.0);
        ewma.update(f64::NAN);
        ewma.update(f64::INFINITY);
        assert!((ewma.value() - 10.0).abs() < f64::EPSILON);
    }

    #[test]
    fn cost_contract_matches_iterated_rtt_half_ewma() {
        // §8: "after k successful RTT samples r1..rk, cost equals the
        // iterated alpha=0.1 EWMA of ri/2".
        let rtts = [0.020, 0.030, 0.010, 0.040];
        let mut ewma = Ewma::new(COST_ALPHA);
        let mut expected = 0.0;
        let mut first = true;
        for &rtt in &rtts {
            ewma.update(rtt / 2.0);
            expected = if first {
                rtt / 2.0
            } else {
                expected * (1.0 - COST_ALPHA) + (rtt / 2.0) * COST_ALPHA
            };
            first = false;
            assert!((ewma.value() - expected).abs() < 1e-12);
        }
    }
}
