use log::debug;
use rand::{Rng, RngCore};
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

use crate::config::{MutationConfig, OperatorGating};
use crate::genome::{Genome, ORIENTATIONS};

/// Structural mutation operators the dispatcher can apply. Extending the
/// set means adding a variant and its arm in `apply`; the dispatcher loop
/// never changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BodyOperator {
    /// Remove a uniformly chosen part together with its whole subtree.
    RemoveSubtree,
    /// Re-orient a uniformly chosen part by a non-zero quarter turn.
    RotatePart,
}

impl BodyOperator {
    fn apply(self, genome: &mut Genome, rng: &mut dyn RngCore) {
        match self {
            BodyOperator::RemoveSubtree => remove_random_subtree(genome, rng),
            BodyOperator::RotatePart => rotate_random_part(genome, rng),
        }
    }
}

/// Mutate every brain weight and bias independently: a trial on
/// `p_brain_mutate` decides whether a Gaussian perturbation is added, then
/// the value is clamped into bounds either way, so out-of-range values fed
/// in from outside are normalized even on rounds that perturb nothing.
/// Returns whether any perturbation trial fired; clamping alone does not
/// count and does not dirty the genome.
pub fn mutate_brain(genome: &mut Genome, conf: &MutationConfig, rng: &mut dyn RngCore) -> bool {
    conf.assert_valid();
    genome.sync_brain();
    let perturbation =
        Normal::new(0.0, conf.brain_sigma).expect("brain_sigma validated non-negative");
    let mut mutated = false;
    for value in genome.brain_params_mut() {
        if rng.gen::<f64>() < conf.p_brain_mutate {
            mutated = true;
            *value += perturbation.sample(rng);
        }
        *value = value.clamp(conf.min_brain_weight, conf.max_brain_weight);
    }
    if mutated {
        genome.mark_dirty();
    }
    mutated
}

/// Run the configured structural operator table against a genome.
///
/// Each gated-in operator gets up to `max_attempts` tries: a fresh copy of
/// the working genome is edited and kept only if the caller's validity
/// oracle accepts it. An operator that exhausts its budget is skipped and
/// leaves no partial edit behind; the next operator starts from whatever
/// the previous one left as the working genome. Returns whether any edit
/// was applied.
pub fn mutate_body(
    genome: &mut Genome,
    conf: &MutationConfig,
    is_valid: &dyn Fn(&Genome) -> bool,
    rng: &mut dyn RngCore,
) -> bool {
    conf.assert_valid();
    let mut changed = false;
    for (op, p) in &conf.operators {
        let gated_in = match conf.gating {
            OperatorGating::Always => true,
            OperatorGating::Probabilistic => rng.gen::<f64>() < *p,
        };
        if !gated_in {
            continue;
        }
        let mut accepted = false;
        for _ in 0..conf.max_attempts {
            let mut candidate = genome.clone();
            candidate.mark_clean();
            op.apply(&mut candidate, rng);
            if is_valid(&candidate) {
                // an operator may land on a no-op (e.g. nothing left to
                // remove); only a real edit replaces the working genome
                if candidate.is_dirty() {
                    *genome = candidate;
                    changed = true;
                }
                accepted = true;
                break;
            }
        }
        if !accepted {
            debug!("{:?} exhausted {} attempts, skipped", op, conf.max_attempts);
        }
    }
    changed
}

/// Produce one offspring from a pair of parents: deep-copy the first
/// parent and body-mutate the copy. Brain mutation and crossover stay
/// separately invocable so the caller can schedule body and brain
/// evolution independently.
pub fn offspring(
    parents: (&Genome, &Genome),
    conf: &MutationConfig,
    is_valid: &dyn Fn(&Genome) -> bool,
    rng: &mut dyn RngCore,
) -> Genome {
    let (base, _mate) = parents;
    let mut child = Genome::from_parent(base);
    mutate_body(&mut child, conf, is_valid, rng);
    child
}

fn remove_random_subtree(genome: &mut Genome, rng: &mut dyn RngCore) {
    if genome.body_is_empty() {
        return;
    }
    let ids: Vec<&str> = genome.part_ids().collect();
    let pick = ids[rng.next_u32() as usize % ids.len()].to_string();
    genome
        .trim_at(&pick)
        .expect("picked id comes from the arena");
}

fn rotate_random_part(genome: &mut Genome, rng: &mut dyn RngCore) {
    if genome.body_is_empty() {
        return;
    }
    let ids: Vec<&str> = genome.part_ids().collect();
    let pick = ids[rng.next_u32() as usize % ids.len()].to_string();
    let turn = 1 + (rng.next_u32() % (ORIENTATIONS as u32 - 1)) as u8;
    genome
        .rotate_part(&pick, turn)
        .expect("picked id comes from the arena");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crossover::crossover;
    use crate::genome::PartKind;
    use rand::rngs::mock::StepRng;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use std::cell::Cell;

    fn conf() -> MutationConfig {
        MutationConfig {
            p_brain_mutate: 0.5,
            brain_sigma: 0.2,
            min_brain_weight: -3.0,
            max_brain_weight: 3.0,
            p_brain_crossover: 0.0,
            operators: vec![(BodyOperator::RemoveSubtree, 1.0)],
            gating: OperatorGating::Always,
            max_attempts: 5,
        }
    }

    fn four_legged() -> Genome {
        let mut genome = Genome::new("core", PartKind::Core, 0).unwrap();
        for (i, leg) in ["leg_n", "leg_e", "leg_s", "leg_w"].iter().enumerate() {
            genome
                .attach("core", i, leg, PartKind::ActiveHinge, 0)
                .unwrap();
        }
        genome.mark_clean();
        genome
    }

    #[test]
    fn clamp_normalizes_without_dirtying() {
        let mut genome = Genome::new("w", PartKind::ActiveWheel, 0).unwrap();
        for value in genome.brain_params_mut() {
            *value = 9.0;
        }
        let mut c = conf();
        c.p_brain_mutate = 0.0;
        let mut rng = StepRng::new(0, 0);
        let mutated = mutate_brain(&mut genome, &c, &mut rng);
        assert!(!mutated);
        assert_eq!(genome.biases(), [3.0]);
        assert!(!genome.is_dirty());
    }

    #[test]
    fn zero_probability_changes_nothing_in_range() {
        let mut genome = four_legged();
        for value in genome.brain_params_mut() {
            *value = 1.0;
        }
        genome.mark_clean();
        let mut c = conf();
        c.p_brain_mutate = 0.0;
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        assert!(!mutate_brain(&mut genome, &c, &mut rng));
        assert!(genome.weights().iter().all(|w| *w == 1.0));
        assert!(genome.biases().iter().all(|b| *b == 1.0));
        assert!(!genome.is_dirty());
    }

    #[test]
    fn saturated_trial_with_zero_sigma_dirties_but_keeps_values() {
        let mut genome = four_legged();
        for value in genome.brain_params_mut() {
            *value = 1.0;
        }
        genome.mark_clean();
        let mut c = conf();
        c.p_brain_mutate = 1.0;
        c.brain_sigma = 0.0;
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        assert!(mutate_brain(&mut genome, &c, &mut rng));
        assert!(genome.is_dirty());
        assert!(genome.weights().iter().all(|w| *w == 1.0));
        assert!(genome.biases().iter().all(|b| *b == 1.0));
    }

    #[test]
    fn values_stay_bounded_under_heavy_mutation() {
        let mut genome = four_legged();
        let mut c = conf();
        c.p_brain_mutate = 1.0;
        c.brain_sigma = 10.0;
        c.min_brain_weight = -1.0;
        c.max_brain_weight = 1.0;
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        for _ in 0..10 {
            mutate_brain(&mut genome, &c, &mut rng);
            assert!(genome
                .weights()
                .iter()
                .chain(genome.biases())
                .all(|v| (-1.0..=1.0).contains(v)));
        }
    }

    #[test]
    fn empty_brain_is_a_noop() {
        // a lone brick has no sensors and no motors
        let mut genome = Genome::new("b", PartKind::FixedBrick, 0).unwrap();
        let mut c = conf();
        c.p_brain_mutate = 1.0;
        let mut rng = StepRng::new(0, 0);
        assert!(!mutate_brain(&mut genome, &c, &mut rng));
        assert!(!genome.is_dirty());
    }

    #[test]
    fn exhausted_retries_leave_genome_alone() {
        let mut genome = Genome::new("core", PartKind::Core, 0).unwrap();
        genome.mark_clean();
        let calls = Cell::new(0usize);
        let oracle = |g: &Genome| {
            calls.set(calls.get() + 1);
            !g.body_is_empty()
        };
        let mut rng = ChaCha8Rng::seed_from_u64(4);
        // removing the only part always empties the body, so every attempt
        // is rejected
        let changed = mutate_body(&mut genome, &conf(), &oracle, &mut rng);
        assert!(!changed);
        assert_eq!(calls.get(), conf().max_attempts);
        assert_eq!(genome.part_count(), 1);
        assert!(genome.part("core").is_some());
        assert!(!genome.is_dirty());
    }

    #[test]
    fn accepted_edit_replaces_working_genome() {
        let mut genome = four_legged();
        let oracle = |_: &Genome| true;
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let changed = mutate_body(&mut genome, &conf(), &oracle, &mut rng);
        assert!(changed);
        assert!(genome.is_dirty());
        assert!(genome.part_count() < 5);
    }

    #[test]
    fn probabilistic_gating_at_zero_never_attempts() {
        let mut genome = four_legged();
        let mut c = conf();
        c.operators = vec![(BodyOperator::RemoveSubtree, 0.0)];
        c.gating = OperatorGating::Probabilistic;
        let calls = Cell::new(0usize);
        let oracle = |_: &Genome| {
            calls.set(calls.get() + 1);
            true
        };
        let mut rng = StepRng::new(0, 0);
        assert!(!mutate_body(&mut genome, &c, &oracle, &mut rng));
        assert_eq!(calls.get(), 0);
        assert_eq!(genome.part_count(), 5);
        assert!(!genome.is_dirty());
    }

    #[test]
    fn always_gating_ignores_operator_probability() {
        let mut genome = four_legged();
        let mut c = conf();
        c.operators = vec![(BodyOperator::RemoveSubtree, 0.0)];
        c.gating = OperatorGating::Always;
        let oracle = |_: &Genome| true;
        let mut rng = ChaCha8Rng::seed_from_u64(6);
        assert!(mutate_body(&mut genome, &c, &oracle, &mut rng));
        assert!(genome.part_count() < 5);
    }

    #[test]
    fn rotate_operator_changes_orientation_only() {
        let mut genome = Genome::new("core", PartKind::Core, 0).unwrap();
        genome.mark_clean();
        let mut c = conf();
        c.operators = vec![(BodyOperator::RotatePart, 1.0)];
        let oracle = |_: &Genome| true;
        let mut rng = StepRng::new(0, 0);
        assert!(mutate_body(&mut genome, &c, &oracle, &mut rng));
        assert_eq!(genome.part_count(), 1);
        assert_eq!(genome.part("core").unwrap().orientation(), 1);
        assert!(genome.is_dirty());
    }

    #[test]
    fn offspring_never_touches_the_parents() {
        let mut parent_a = four_legged();
        for value in parent_a.brain_params_mut() {
            *value = 0.5;
        }
        parent_a.mark_clean();
        let parent_b = four_legged();
        let before_a = serde_json::to_string(&parent_a).unwrap();
        let before_b = serde_json::to_string(&parent_b).unwrap();

        let oracle = |_: &Genome| true;
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let child = offspring((&parent_a, &parent_b), &conf(), &oracle, &mut rng);

        assert_eq!(serde_json::to_string(&parent_a).unwrap(), before_a);
        assert_eq!(serde_json::to_string(&parent_b).unwrap(), before_b);
        assert!(child.part_count() < parent_a.part_count());
    }

    #[test]
    fn all_probabilities_zero_yields_identical_clean_offspring() {
        let parent = four_legged();
        let mate = four_legged();
        let mut c = conf();
        c.p_brain_mutate = 0.0;
        c.p_brain_crossover = 0.0;
        c.operators = vec![(BodyOperator::RemoveSubtree, 0.0)];
        c.gating = OperatorGating::Probabilistic;
        let oracle = |_: &Genome| true;
        let mut rng = ChaCha8Rng::seed_from_u64(8);

        let mut child = offspring((&parent, &mate), &c, &oracle, &mut rng);
        assert!(!mutate_brain(&mut child, &c, &mut rng));
        let mut other = Genome::from_parent(&mate);
        assert!(!crossover(&mut child, &mut other, &c, &mut rng).unwrap());

        assert!(!child.is_dirty());
        assert_eq!(
            serde_json::to_string(&child).unwrap(),
            serde_json::to_string(&parent).unwrap()
        );
    }

    #[test]
    fn same_seed_same_offspring() {
        let parent = four_legged();
        let mate = four_legged();
        let mut c = conf();
        c.operators = vec![
            (BodyOperator::RemoveSubtree, 1.0),
            (BodyOperator::RotatePart, 1.0),
        ];
        let oracle = |_: &Genome| true;

        let mut rng1 = ChaCha8Rng::seed_from_u64(9);
        let first = offspring((&parent, &mate), &c, &oracle, &mut rng1);
        let mut rng2 = ChaCha8Rng::seed_from_u64(9);
        let second = offspring((&parent, &mate), &c, &oracle, &mut rng2);

        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }
}
