use serde::{Deserialize, Serialize};

use crate::mutation::BodyOperator;

/// Whether the dispatcher rolls a Bernoulli trial per structural operator
/// or unconditionally attempts every configured one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperatorGating {
    /// Attempt every operator in the table, ignoring its probability.
    Always,
    /// Gate each operator by a trial on its table probability.
    Probabilistic,
}

/// Read-only configuration for one engine invocation.
#[derive(Clone, Serialize, Deserialize)]
pub struct MutationConfig {
    /// Per-parameter probability of perturbing a brain weight or bias.
    pub p_brain_mutate: f64,
    /// Standard deviation of the zero-mean Gaussian perturbation.
    pub brain_sigma: f64,
    /// Lower clamp bound for every brain parameter.
    pub min_brain_weight: f64,
    /// Upper clamp bound for every brain parameter.
    pub max_brain_weight: f64,
    /// Probability that a crossover call performs the exchange at all.
    pub p_brain_crossover: f64,
    /// Ordered structural operator table with per-operator probabilities.
    pub operators: Vec<(BodyOperator, f64)>,
    /// Gating mode applied to the operator table.
    pub gating: OperatorGating,
    /// Attempt budget per structural operator before it is skipped.
    pub max_attempts: usize,
}

impl MutationConfig {
    /// Check the configuration for values the engine cannot run with.
    /// Engine entry points treat a failure here as a wiring bug and panic.
    pub fn validate(&self) -> Result<(), ConfigError> {
        probability("p_brain_mutate", self.p_brain_mutate)?;
        probability("p_brain_crossover", self.p_brain_crossover)?;
        for (_, p) in &self.operators {
            probability("operators", *p)?;
        }
        if !self.brain_sigma.is_finite() || self.brain_sigma < 0.0 {
            return Err(ConfigError::InvalidSigma(self.brain_sigma));
        }
        if !self.min_brain_weight.is_finite()
            || !self.max_brain_weight.is_finite()
            || self.min_brain_weight > self.max_brain_weight
        {
            return Err(ConfigError::InvalidBounds {
                min: self.min_brain_weight,
                max: self.max_brain_weight,
            });
        }
        if self.max_attempts == 0 {
            return Err(ConfigError::NoAttempts);
        }
        Ok(())
    }

    /// A configuration that fails validation at an engine entry point is a
    /// wiring bug, not a data problem, and aborts loudly.
    pub(crate) fn assert_valid(&self) {
        if let Err(e) = self.validate() {
            panic!("invalid mutation config: {}", e);
        }
    }
}

fn probability(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if !(0.0..=1.0).contains(&value) {
        return Err(ConfigError::ProbabilityOutOfRange { name, value });
    }
    Ok(())
}

/// Configuration values the engine refuses to run with.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    ProbabilityOutOfRange { name: &'static str, value: f64 },
    InvalidSigma(f64),
    InvalidBounds { min: f64, max: f64 },
    NoAttempts,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        use ConfigError::*;
        match self {
            ProbabilityOutOfRange { name, value } => {
                write!(f, "{} = {} is not a probability", name, value)
            }
            InvalidSigma(s) => write!(f, "brain_sigma = {} is not a valid spread", s),
            InvalidBounds { min, max } => {
                write!(f, "brain weight bounds [{}, {}] are not ordered", min, max)
            }
            NoAttempts => write!(f, "max_attempts must be at least 1"),
        }
    }
}

impl std::error::Error for ConfigError {}
