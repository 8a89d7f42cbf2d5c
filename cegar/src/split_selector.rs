//! Rating and selection of candidate splits.

use crate::abstract_state::AbstractState;
use crate::cartesian_set::VariableInfos;
use crate::types::StateId;
use rand::prelude::*;
use tessera_collections::ref_store::RefVec;
use tessera_planning::causal_graph::compute_causal_graph_levels;
use tessera_planning::hadd::{compute_hadd, HAdd};
use tessera_planning::{Fact, Task, VarId};

/// A refinement request: separate the `values` of `var` from the rest of the
/// abstract state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Split {
    pub state_id: StateId,
    pub var: VarId,
    pub values: Vec<i32>,
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum PickSplit {
    Random,
    /// Fewest values outside the wanted set.
    MinUnwanted,
    MaxUnwanted,
    /// Variable split the fewest times so far.
    MinRefined,
    MaxRefined,
    /// Smallest h^add among the wanted facts.
    MinHadd,
    MaxHadd,
    /// Lowest topological level in the causal graph.
    MinCgLevel,
    MaxCgLevel,
}

pub struct SplitSelector {
    pick: PickSplit,
    hadd: HAdd,
    cg_levels: RefVec<VarId, i32>,
    num_splits_per_var: RefVec<VarId, u32>,
}

impl SplitSelector {
    pub fn new(task: &Task, pick: PickSplit) -> Self {
        SplitSelector {
            pick,
            hadd: compute_hadd(task, false),
            cg_levels: compute_causal_graph_levels(task),
            num_splits_per_var: RefVec::with_values(task.num_variables(), 0),
        }
    }

    /// Records that `var` was split, for the refinement-count ratings.
    pub fn note_split(&mut self, var: VarId) {
        self.num_splits_per_var[var] += 1;
    }

    pub fn pick_split(
        &self,
        state: &AbstractState,
        infos: &VariableInfos,
        splits: Vec<Split>,
        rng: &mut StdRng,
    ) -> Split {
        debug_assert!(!splits.is_empty());
        if splits.len() == 1 {
            return splits.into_iter().next().unwrap();
        }
        if self.pick == PickSplit::Random {
            let index = rng.gen_range(0..splits.len());
            return splits.into_iter().nth(index).unwrap();
        }
        let best_rating = splits
            .iter()
            .map(|split| self.rate_split(state, infos, split))
            .max()
            .unwrap();
        let best: Vec<Split> = splits
            .into_iter()
            .filter(|split| self.rate_split(state, infos, split) == best_rating)
            .collect();
        let index = rng.gen_range(0..best.len());
        best.into_iter().nth(index).unwrap()
    }

    /// Higher is better; the `Min*` strategies negate their score.
    fn rate_split(&self, state: &AbstractState, infos: &VariableInfos, split: &Split) -> i64 {
        let var = split.var;
        match self.pick {
            PickSplit::Random => unreachable!("random needs no rating"),
            PickSplit::MinUnwanted => -self.num_unwanted_values(state, infos, split),
            PickSplit::MaxUnwanted => self.num_unwanted_values(state, infos, split),
            PickSplit::MinRefined => -(self.num_splits_per_var[var] as i64),
            PickSplit::MaxRefined => self.num_splits_per_var[var] as i64,
            PickSplit::MinHadd => -self.min_hadd_value(var, &split.values),
            PickSplit::MaxHadd => self.max_hadd_value(var, &split.values),
            PickSplit::MinCgLevel => -(self.cg_levels[var] as i64),
            PickSplit::MaxCgLevel => self.cg_levels[var] as i64,
        }
    }

    fn num_unwanted_values(&self, state: &AbstractState, infos: &VariableInfos, split: &Split) -> i64 {
        state.cartesian_set().count(infos, split.var) as i64 - split.values.len() as i64
    }

    fn min_hadd_value(&self, var: VarId, values: &[i32]) -> i64 {
        values
            .iter()
            .map(|&value| self.hadd.fact_cost(Fact::new(var, value)) as i64)
            .min()
            .unwrap()
    }

    fn max_hadd_value(&self, var: VarId, values: &[i32]) -> i64 {
        values
            .iter()
            .map(|&value| self.hadd.fact_cost(Fact::new(var, value)) as i64)
            .max()
            .unwrap()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::abstract_state::AbstractState;
    use tessera_planning::task::{Operator, State, Variable};

    fn variable(domain_size: usize) -> Variable {
        Variable {
            name: "v".to_string(),
            axiom_layer: -1,
            fact_names: (0..domain_size).map(|i| format!("Atom v({i})")).collect(),
        }
    }

    fn task() -> Task {
        let v0 = VarId::from(0usize);
        let v1 = VarId::from(1usize);
        Task::new(
            vec![variable(4), variable(4)],
            vec![Operator::from_facts("op", &[Fact::new(v0, 0)], &[Fact::new(v1, 1)], 1)],
            State::new(vec![0, 0]),
            vec![Fact::new(v1, 1)],
        )
    }

    #[test]
    fn test_unwanted_ratings() {
        let task = task();
        let infos = VariableInfos::new(&task.domain_sizes());
        let state = AbstractState::trivial(&infos);
        let mut rng = StdRng::seed_from_u64(0);

        let narrow = Split {
            state_id: state.id(),
            var: VarId::from(0usize),
            values: vec![0],
        };
        let wide = Split {
            state_id: state.id(),
            var: VarId::from(1usize),
            values: vec![0, 1, 2],
        };

        let selector = SplitSelector::new(&task, PickSplit::MaxUnwanted);
        let picked = selector.pick_split(&state, &infos, vec![narrow.clone(), wide.clone()], &mut rng);
        assert_eq!(picked.var, narrow.var);

        let selector = SplitSelector::new(&task, PickSplit::MinUnwanted);
        let picked = selector.pick_split(&state, &infos, vec![narrow, wide.clone()], &mut rng);
        assert_eq!(picked.var, wide.var);
    }

    #[test]
    fn test_refined_counts() {
        let task = task();
        let infos = VariableInfos::new(&task.domain_sizes());
        let state = AbstractState::trivial(&infos);
        let mut rng = StdRng::seed_from_u64(0);

        let mut selector = SplitSelector::new(&task, PickSplit::MinRefined);
        selector.note_split(VarId::from(0usize));
        selector.note_split(VarId::from(0usize));
        let splits = vec![
            Split {
                state_id: state.id(),
                var: VarId::from(0usize),
                values: vec![0],
            },
            Split {
                state_id: state.id(),
                var: VarId::from(1usize),
                values: vec![0],
            },
        ];
        let picked = selector.pick_split(&state, &infos, splits, &mut rng);
        assert_eq!(picked.var, VarId::from(1usize));
    }
}
