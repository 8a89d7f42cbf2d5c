//! Per-operator data shared by the transition oracles, and the ordering
//! applied to operator lists returned from queries.

use crate::refinement_hierarchy::{Matcher, MatcherVariable};
use rand::prelude::*;
use std::cell::RefCell;
use tessera_collections::ref_store::RefVec;
use tessera_planning::hadd::{compute_hadd, compute_relaxed_operator_layers};
use tessera_planning::{Fact, OpId, Task, VarId, INF};

/// Sorted preconditions, effects and derived postconditions per operator,
/// copied out of the task once per abstraction.
pub struct OperatorInfo {
    num_variables: usize,
    preconditions: RefVec<OpId, Vec<Fact>>,
    effects: RefVec<OpId, Vec<Fact>>,
    postconditions: RefVec<OpId, Vec<Fact>>,
    effect_vars_without_preconditions: RefVec<OpId, Vec<VarId>>,
    costs: RefVec<OpId, i32>,
}

impl OperatorInfo {
    pub fn new(task: &Task) -> Self {
        OperatorInfo {
            num_variables: task.num_variables(),
            preconditions: task.operators.values().map(|op| op.preconditions().to_vec()).collect(),
            effects: task.operators.values().map(|op| op.effects().to_vec()).collect(),
            postconditions: task.operators.values().map(|op| op.postconditions()).collect(),
            effect_vars_without_preconditions: task
                .operators
                .values()
                .map(|op| op.effect_vars_without_preconditions())
                .collect(),
            costs: task.operators.values().map(|op| op.cost).collect(),
        }
    }

    pub fn num_operators(&self) -> usize {
        self.costs.len()
    }

    pub fn operator_ids(&self) -> impl Iterator<Item = OpId> {
        self.costs.keys()
    }

    pub fn preconditions(&self, op: OpId) -> &[Fact] {
        &self.preconditions[op]
    }

    pub fn effects(&self, op: OpId) -> &[Fact] {
        &self.effects[op]
    }

    pub fn postconditions(&self, op: OpId) -> &[Fact] {
        &self.postconditions[op]
    }

    pub fn effect_vars_without_preconditions(&self, op: OpId) -> &[VarId] {
        &self.effect_vars_without_preconditions[op]
    }

    pub fn cost(&self, op: OpId) -> i32 {
        self.costs[op]
    }

    pub fn precondition_value(&self, op: OpId, var: VarId) -> Option<i32> {
        lookup_value(&self.preconditions[op], var)
    }

    pub fn postcondition_value(&self, op: OpId, var: VarId) -> Option<i32> {
        lookup_value(&self.postconditions[op], var)
    }

    /// Matcher for enumerating the source leaves of an operator's pre-image.
    pub fn incoming_matcher(&self, op: OpId) -> Matcher {
        let mut matcher: Matcher = (0..self.num_variables)
            .map(|_| MatcherVariable::Unaffected)
            .collect();
        for &var in self.effect_vars_without_preconditions(op) {
            matcher[var] = MatcherVariable::FullDomain;
        }
        for fact in self.preconditions(op) {
            matcher[fact.var] = MatcherVariable::SingleValue;
        }
        matcher
    }

    /// Matcher for enumerating the target leaves of an operator's post-image.
    pub fn outgoing_matcher(&self, op: OpId) -> Matcher {
        let mut matcher: Matcher = (0..self.num_variables)
            .map(|_| MatcherVariable::Unaffected)
            .collect();
        for fact in self.postconditions(op) {
            matcher[fact.var] = MatcherVariable::SingleValue;
        }
        matcher
    }
}

fn lookup_value(facts: &[Fact], var: VarId) -> Option<i32> {
    debug_assert!(facts.windows(2).all(|w| w[0] < w[1]));
    facts
        .binary_search_by_key(&var, |fact| fact.var)
        .ok()
        .map(|index| facts[index].value)
}

/// Keys for ordering the operators of a transition query.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum OperatorOrdering {
    Random,
    IdUp,
    IdDown,
    CostUp,
    CostDown,
    PostconditionsUp,
    PostconditionsDown,
    LayerUp,
    LayerDown,
    HaddUp,
    HaddDown,
    StepsUp,
    StepsDown,
    Fixed,
}

/// Applies the configured two-level operator ordering. A seeded shuffle runs
/// first so that ties break uniformly; the relaxed-reachability layers and
/// h^add scores are computed once, here, at construction time.
pub struct OperatorOrder {
    primary: OperatorOrdering,
    secondary: OperatorOrdering,
    layers: RefVec<OpId, i32>,
    hadd_costs: RefVec<OpId, i32>,
    step_costs: RefVec<OpId, i32>,
    fixed: RefVec<OpId, i64>,
    rng: RefCell<StdRng>,
}

impl OperatorOrder {
    pub fn new(task: &Task, primary: OperatorOrdering, secondary: OperatorOrdering, seed: u64) -> Self {
        assert!(secondary != OperatorOrdering::Random, "tie-break key cannot be random");
        let mut rng = StdRng::seed_from_u64(seed);
        let hadd = compute_hadd(task, false);
        let steps = compute_hadd(task, true);
        let mut fixed: Vec<i64> = (0..task.num_operators() as i64).collect();
        fixed.shuffle(&mut rng);
        OperatorOrder {
            primary,
            secondary,
            layers: compute_relaxed_operator_layers(task),
            hadd_costs: task.operator_ids().map(|op| hadd.operator_cost(op)).collect(),
            step_costs: task.operator_ids().map(|op| steps.operator_cost(op)).collect(),
            fixed: fixed.into_iter().collect(),
            rng: RefCell::new(rng),
        }
    }

    pub fn order(&self, info: &OperatorInfo, operators: &mut Vec<OpId>) {
        operators.shuffle(&mut *self.rng.borrow_mut());
        if self.primary == OperatorOrdering::Random {
            return;
        }
        operators.sort_by_key(|&op| (self.key(info, self.primary, op), self.key(info, self.secondary, op)));
    }

    fn key(&self, info: &OperatorInfo, ordering: OperatorOrdering, op: OpId) -> i64 {
        use OperatorOrdering::*;
        match ordering {
            Random => unreachable!("random is not a sort key"),
            IdUp => op.to_u32() as i64,
            IdDown => -(op.to_u32() as i64),
            CostUp => info.cost(op) as i64,
            CostDown => -(info.cost(op) as i64),
            PostconditionsUp => info.postconditions(op).len() as i64,
            PostconditionsDown => -(info.postconditions(op).len() as i64),
            LayerUp => self.layers[op] as i64,
            LayerDown => -(self.layers[op] as i64),
            HaddUp => self.hadd_costs[op] as i64,
            HaddDown => -(self.hadd_costs[op] as i64),
            StepsUp => self.step_costs[op] as i64,
            StepsDown => -(self.step_costs[op] as i64),
            Fixed => self.fixed[op],
        }
    }
}

pub fn has_infinite_cost(info: &OperatorInfo, op: OpId) -> bool {
    info.cost(op) == INF
}

#[cfg(test)]
mod test {
    use super::*;
    use tessera_planning::task::{Operator, State, Variable};

    fn variable(domain_size: usize) -> Variable {
        Variable {
            name: "v".to_string(),
            axiom_layer: -1,
            fact_names: (0..domain_size).map(|i| format!("Atom v({i})")).collect(),
        }
    }

    fn small_task() -> Task {
        let v0 = VarId::from(0usize);
        let v1 = VarId::from(1usize);
        Task::new(
            vec![variable(2), variable(2)],
            vec![
                Operator::from_facts("a", &[Fact::new(v0, 0)], &[Fact::new(v0, 1)], 5),
                Operator::from_facts("b", &[], &[Fact::new(v1, 1)], 1),
                Operator::from_facts(
                    "c",
                    &[Fact::new(v0, 1)],
                    &[Fact::new(v0, 0), Fact::new(v1, 0)],
                    2,
                ),
            ],
            State::new(vec![0, 0]),
            vec![Fact::new(v0, 1)],
        )
    }

    #[test]
    fn test_operator_info_derived_data() {
        let task = small_task();
        let info = OperatorInfo::new(&task);
        let v0 = VarId::from(0usize);
        let v1 = VarId::from(1usize);
        let b = OpId::from(1usize);

        assert_eq!(info.precondition_value(b, v1), None);
        assert_eq!(info.postcondition_value(b, v1), Some(1));
        assert_eq!(info.effect_vars_without_preconditions(b), &[v1]);

        let c = OpId::from(2usize);
        assert_eq!(info.postconditions(c), &[Fact::new(v0, 0), Fact::new(v1, 0)]);
        assert_eq!(info.precondition_value(c, v0), Some(1));
        assert_eq!(info.postcondition_value(c, v0), Some(0));
    }

    #[test]
    fn test_matchers() {
        let task = small_task();
        let info = OperatorInfo::new(&task);
        let v0 = VarId::from(0usize);
        let v1 = VarId::from(1usize);
        let b = OpId::from(1usize);

        let incoming = info.incoming_matcher(b);
        assert_eq!(incoming[v0], MatcherVariable::Unaffected);
        assert_eq!(incoming[v1], MatcherVariable::FullDomain);

        let outgoing = info.outgoing_matcher(b);
        assert_eq!(outgoing[v0], MatcherVariable::Unaffected);
        assert_eq!(outgoing[v1], MatcherVariable::SingleValue);
    }

    #[test]
    fn test_cost_ordering() {
        let task = small_task();
        let info = OperatorInfo::new(&task);
        let order = OperatorOrder::new(&task, OperatorOrdering::CostUp, OperatorOrdering::IdUp, 0);
        let mut ops: Vec<OpId> = info.operator_ids().collect();
        order.order(&info, &mut ops);
        let costs: Vec<i32> = ops.iter().map(|&op| info.cost(op)).collect();
        assert_eq!(costs, vec![1, 2, 5]);
    }

    #[test]
    fn test_fixed_ordering_is_stable_across_calls() {
        let task = small_task();
        let info = OperatorInfo::new(&task);
        let order = OperatorOrder::new(&task, OperatorOrdering::Fixed, OperatorOrdering::IdUp, 7);
        let mut first: Vec<OpId> = info.operator_ids().collect();
        order.order(&info, &mut first);
        for _ in 0..3 {
            let mut again: Vec<OpId> = info.operator_ids().collect();
            order.order(&info, &mut again);
            assert_eq!(first, again);
        }
    }
}
