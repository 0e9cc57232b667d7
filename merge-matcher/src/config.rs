use serde::{Deserialize, Serialize};

use crate::error::{MatchError, MatchResult};

/// Policy switches for the recursive dispatcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatcherConfig {
    /// Try the equality matcher before ordered/unordered matching.
    #[serde(default = "default_true")]
    pub use_equality_matcher: bool,
    /// Skip the equality attempt for pairs already known to differ.
    #[serde(default = "default_true")]
    pub filter_did_not_match: bool,
    /// Refine the recursive result with the cost-model matcher.
    #[serde(default)]
    pub use_cost_model: bool,
    /// Keep the recursive result when the cost model fails instead of
    /// surfacing the error.
    #[serde(default = "default_true")]
    pub fallback_on_cost_model_error: bool,
    #[serde(default)]
    pub cost_model: CostModelConfig,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            use_equality_matcher: true,
            filter_did_not_match: true,
            use_cost_model: false,
            fallback_on_cost_model_error: true,
            cost_model: CostModelConfig::default(),
        }
    }
}

/// Parameters of one cost-model run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostModelConfig {
    #[serde(default = "default_iterations")]
    pub iterations: usize,
    /// Evaluate costs and bounds on the rayon thread pool.
    #[serde(default)]
    pub parallel: bool,
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// Inverse temperature of the acceptance probability.
    #[serde(default = "default_beta")]
    pub beta: f64,
    /// Success probability of the geometric distribution used to pick
    /// candidate edges from the bound-sorted list.
    #[serde(default = "default_p_assign")]
    pub p_assign: f64,
    /// Lower end of the share of matchings kept fixed between iterations.
    #[serde(default = "default_fix_lower")]
    pub fix_lower: f64,
    /// Upper end of the share of matchings kept fixed between iterations.
    #[serde(default = "default_fix_upper")]
    pub fix_upper: f64,
    /// Fix a random share of the matchings (`true`) or a random-length prefix
    /// of the matchings sorted by exact cost (`false`).
    #[serde(default = "default_true")]
    pub fix_random_percentage: bool,
    /// Renaming weight.
    #[serde(default = "default_weight")]
    pub wr: f32,
    /// No-match weight.
    #[serde(default = "default_weight")]
    pub wn: f32,
    /// Ancestry violation weight.
    #[serde(default = "default_weight")]
    pub wa: f32,
    /// Sibling group breakup weight.
    #[serde(default = "default_weight")]
    pub ws: f32,
    /// Ordering weight.
    #[serde(default = "default_weight")]
    pub wo: f32,
}

impl Default for CostModelConfig {
    fn default() -> Self {
        Self {
            iterations: default_iterations(),
            parallel: false,
            seed: default_seed(),
            beta: default_beta(),
            p_assign: default_p_assign(),
            fix_lower: default_fix_lower(),
            fix_upper: default_fix_upper(),
            fix_random_percentage: true,
            wr: default_weight(),
            wn: default_weight(),
            wa: default_weight(),
            ws: default_weight(),
            wo: default_weight(),
        }
    }
}

impl CostModelConfig {
    pub fn validate(&self) -> MatchResult<()> {
        if !(self.p_assign > 0.0 && self.p_assign <= 1.0) {
            return Err(MatchError::invalid("p_assign", format!("{} is not in (0, 1]", self.p_assign)));
        }
        for (name, value) in [("fix_lower", self.fix_lower), ("fix_upper", self.fix_upper)] {
            if !(0.0..=1.0).contains(&value) {
                return Err(MatchError::invalid(name, format!("{value} is not in [0, 1]")));
            }
        }
        if self.fix_lower > self.fix_upper {
            return Err(MatchError::invalid(
                "fix_lower",
                format!("{} exceeds fix_upper {}", self.fix_lower, self.fix_upper),
            ));
        }
        if !self.beta.is_finite() || self.beta < 0.0 {
            return Err(MatchError::invalid("beta", format!("{} is not a finite non-negative number", self.beta)));
        }
        for (name, weight) in [
            ("wr", self.wr),
            ("wn", self.wn),
            ("wa", self.wa),
            ("ws", self.ws),
            ("wo", self.wo),
        ] {
            if !weight.is_finite() || weight < 0.0 {
                return Err(MatchError::invalid(name, format!("{weight} is not a finite non-negative weight")));
            }
        }
        Ok(())
    }
}

fn default_true() -> bool {
    true
}
fn default_iterations() -> usize {
    100
}
fn default_seed() -> u64 {
    42
}
fn default_beta() -> f64 {
    30.0
}
fn default_p_assign() -> f64 {
    0.7
}
fn default_fix_lower() -> f64 {
    0.25
}
fn default_fix_upper() -> f64 {
    0.5
}
fn default_weight() -> f32 {
    1.0
}
