use log::trace;
use rand::{Rng, RngCore};

use crate::config::MutationConfig;
use crate::genome::Genome;

/// One-point crossover over the combined weights-then-biases sequences of
/// two genomes.
///
/// A trial on `p_brain_crossover` decides whether anything happens at all.
/// When it fires, both sequences must have the same combined length;
/// otherwise the call fails with [`CrossoverError::SizeMismatch`] and both
/// genomes are left exactly as they were. On success every position at or
/// after the cut point is swapped between the two genomes and both are
/// marked dirty.
pub fn crossover(
    a: &mut Genome,
    b: &mut Genome,
    conf: &MutationConfig,
    rng: &mut dyn RngCore,
) -> Result<bool, CrossoverError> {
    conf.assert_valid();
    if rng.gen::<f64>() >= conf.p_brain_crossover {
        return Ok(false);
    }
    a.sync_brain();
    b.sync_brain();
    let len = a.brain_len();
    if len != b.brain_len() {
        return Err(CrossoverError::SizeMismatch {
            left: len,
            right: b.brain_len(),
        });
    }
    if len < 2 {
        // no interior cut point exists
        return Ok(false);
    }

    let cut = select_cut_point(len, rng);
    trace!("crossover at {} of {}", cut, len);
    let mut pa = a.brain_params_mut();
    let mut pb = b.brain_params_mut();
    for i in cut..len {
        std::mem::swap(&mut *pa[i], &mut *pb[i]);
    }
    a.mark_dirty();
    b.mark_dirty();
    Ok(true)
}

/// Uniform cut point in `1..len`, so both offspring keep at least one
/// parameter from each side. Multi-point variants generalize this to a
/// sorted set of points; the swap loop above is agnostic to how the cut
/// was chosen.
fn select_cut_point(len: usize, rng: &mut dyn RngCore) -> usize {
    1 + rng.next_u32() as usize % (len - 1)
}

/// Errors reported by the crossover operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CrossoverError {
    /// The combined brain lengths of the two genomes differ.
    SizeMismatch { left: usize, right: usize },
}

impl std::fmt::Display for CrossoverError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CrossoverError::SizeMismatch { left, right } => {
                write!(f, "genomes not of same size: {} vs {}", left, right)
            }
        }
    }
}

impl std::error::Error for CrossoverError {}
