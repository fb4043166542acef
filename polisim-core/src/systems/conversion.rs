use polisim_formula::round_half_even;
use serde::{Deserialize, Serialize};

/// Constants of the paper-to-model conversion curve.
///
/// The curve is a right-tail standard-normal probability at a fixed
/// threshold, scaled so that the reference paper stock maps to the anchor
/// model count (`expected_models(reference_variance) == normalize_to`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelCurve {
    pub mean: f64,
    pub threshold: f64,
    pub reference_variance: f64,
    pub normalize_to: f64,
}

impl Default for ModelCurve {
    fn default() -> Self {
        let mean = 84.17;
        Self {
            mean,
            threshold: 40.0 * mean / 19.0,
            reference_variance: 2000.0,
            normalize_to: 15.0,
        }
    }
}

impl ModelCurve {
    /// Expected cumulative model count for a cumulative paper count.
    ///
    /// Non-decreasing in `papers` for all `papers >= 0`; `expected_models(0)`
    /// is exactly 0, never NaN or infinite.
    pub fn expected_models(&self, papers: f64) -> f64 {
        if papers <= 0.0 {
            return 0.0;
        }
        let z = (self.threshold - self.mean) / papers.sqrt();
        let probability = 1.0 - std_normal_cdf(z);
        probability * self.scaling_factor()
    }

    /// Per-round model gain from paper growth.
    ///
    /// Always the difference of the curve at the two totals; evaluating the
    /// curve at an absolute total and adding it wholesale would double-count
    /// the existing model stock every round.
    pub fn model_delta(&self, old_papers: f64, new_papers: f64) -> f64 {
        self.expected_models(new_papers) - self.expected_models(old_papers)
    }

    /// The display estimate used for the superpower tracks.
    pub fn display_estimate(&self, papers: f64) -> f64 {
        round_half_even(self.expected_models(papers))
    }

    fn scaling_factor(&self) -> f64 {
        let reference_z = (self.threshold - self.mean) / self.reference_variance.sqrt();
        self.normalize_to / (1.0 - std_normal_cdf(reference_z))
    }
}

/// Standard normal CDF via the Abramowitz & Stegun 7.1.26 erf
/// approximation (|error| < 1.5e-7).
fn std_normal_cdf(z: f64) -> f64 {
    0.5 * (1.0 + erf(z / std::f64::consts::SQRT_2))
}

fn erf(x: f64) -> f64 {
    const A1: f64 = 0.254829592;
    const A2: f64 = -0.284496736;
    const A3: f64 = 1.421413741;
    const A4: f64 = -1.453152027;
    const A5: f64 = 1.061405429;
    const P: f64 = 0.3275911;

    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();
    let t = 1.0 / (1.0 + P * x);
    let y = 1.0 - (((((A5 * t + A4) * t) + A3) * t + A2) * t + A1) * t * (-x * x).exp();
    sign * y
}
