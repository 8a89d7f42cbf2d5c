use std::fmt::{Display, Formatter};
use tessera_collections::create_ref_type;
use tessera_collections::ref_store::RefVec;

create_ref_type!(VarId);
create_ref_type!(OpId);

/// Sentinel for costs and scores of unreachable or forbidden items.
pub const INF: i32 = i32::MAX;

/// Association of a variable with one value of its domain.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct Fact {
    pub var: VarId,
    pub value: i32,
}

impl Fact {
    pub fn new(var: VarId, value: i32) -> Self {
        Fact { var, value }
    }
}

impl Display for Fact {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}={}", self.var, self.value)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Variable {
    pub name: String,
    pub axiom_layer: i32,
    /// One name per domain value, in value order.
    pub fact_names: Vec<String>,
}

impl Variable {
    pub fn domain_size(&self) -> i32 {
        self.fact_names.len() as i32
    }
}

/// An effect of a grounded operator: `var` takes value `post`, guarded by the
/// optional precondition `pre` on the same variable.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PrePost {
    pub var: VarId,
    pub pre: Option<i32>,
    pub post: i32,
}

/// A grounded SAS⁺ operator. `prevail` and `pre_post` keep the file-level
/// structure for round-tripping; `preconditions` and `effects` are the sorted
/// views the engine works with.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Operator {
    pub name: String,
    pub prevail: Vec<Fact>,
    pub pre_post: Vec<PrePost>,
    pub cost: i32,
    preconditions: Vec<Fact>,
    effects: Vec<Fact>,
}

impl Operator {
    pub fn new(name: String, prevail: Vec<Fact>, pre_post: Vec<PrePost>, cost: i32) -> Self {
        let mut preconditions: Vec<Fact> = prevail.clone();
        for pp in &pre_post {
            if let Some(pre) = pp.pre {
                preconditions.push(Fact::new(pp.var, pre));
            }
        }
        preconditions.sort();
        let mut effects: Vec<Fact> = pre_post.iter().map(|pp| Fact::new(pp.var, pp.post)).collect();
        effects.sort();
        Operator {
            name,
            prevail,
            pre_post,
            cost,
            preconditions,
            effects,
        }
    }

    /// Builds an operator from plain precondition and effect lists.
    /// The prevail / pre-post decomposition is derived.
    pub fn from_facts(name: &str, preconditions: &[Fact], effects: &[Fact], cost: i32) -> Self {
        let mut prevail = Vec::new();
        let mut pre_post = Vec::new();
        for &eff in effects {
            let pre = preconditions.iter().find(|p| p.var == eff.var).map(|p| p.value);
            pre_post.push(PrePost {
                var: eff.var,
                pre,
                post: eff.value,
            });
        }
        for &pre in preconditions {
            if !effects.iter().any(|e| e.var == pre.var) {
                prevail.push(pre);
            }
        }
        Operator::new(name.to_string(), prevail, pre_post, cost)
    }

    pub fn preconditions(&self) -> &[Fact] {
        &self.preconditions
    }

    pub fn effects(&self) -> &[Fact] {
        &self.effects
    }

    pub fn is_applicable(&self, state: &State) -> bool {
        state.entails_all(&self.preconditions)
    }

    /// Preconditions overridden by effects: the facts guaranteed to hold
    /// after applying the operator, sorted by variable.
    pub fn postconditions(&self) -> Vec<Fact> {
        let mut post: Vec<Fact> = self
            .preconditions
            .iter()
            .filter(|pre| !self.effects.iter().any(|eff| eff.var == pre.var))
            .chain(self.effects.iter())
            .copied()
            .collect();
        post.sort();
        post
    }

    /// Variables mentioned by effects but not by preconditions, sorted.
    pub fn effect_vars_without_preconditions(&self) -> Vec<VarId> {
        let mut vars: Vec<VarId> = self
            .effects
            .iter()
            .filter(|eff| !self.preconditions.iter().any(|pre| pre.var == eff.var))
            .map(|eff| eff.var)
            .collect();
        vars.sort();
        vars
    }
}

/// A full assignment of values to all task variables.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct State {
    values: Vec<i32>,
}

impl State {
    pub fn new(values: Vec<i32>) -> Self {
        State { values }
    }

    pub fn num_variables(&self) -> usize {
        self.values.len()
    }

    pub fn value(&self, var: VarId) -> i32 {
        self.values[usize::from(var)]
    }

    pub fn entails(&self, fact: Fact) -> bool {
        self.value(fact.var) == fact.value
    }

    pub fn entails_all(&self, facts: &[Fact]) -> bool {
        facts.iter().all(|&f| self.entails(f))
    }

    pub fn facts(&self) -> impl Iterator<Item = Fact> + '_ {
        self.values
            .iter()
            .enumerate()
            .map(|(var, &value)| Fact::new(VarId::from(var), value))
    }

    /// The state obtained by applying the operator's effects.
    /// The operator must be applicable.
    pub fn successor(&self, op: &Operator) -> State {
        debug_assert!(op.is_applicable(self));
        let mut values = self.values.clone();
        for eff in op.effects() {
            values[usize::from(eff.var)] = eff.value;
        }
        State { values }
    }
}

/// A grounded SAS⁺ planning task.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Task {
    pub variables: RefVec<VarId, Variable>,
    pub operators: RefVec<OpId, Operator>,
    pub initial_state: State,
    /// Goal facts, sorted by variable. At most one per variable.
    pub goals: Vec<Fact>,
    pub mutexes: Vec<Vec<Fact>>,
    pub metric: bool,
}

impl Task {
    pub fn new(
        variables: Vec<Variable>,
        operators: Vec<Operator>,
        initial_state: State,
        mut goals: Vec<Fact>,
    ) -> Self {
        goals.sort();
        Task {
            variables: variables.into_iter().collect(),
            operators: operators.into_iter().collect(),
            initial_state,
            goals,
            mutexes: Vec::new(),
            metric: true,
        }
    }

    pub fn num_variables(&self) -> usize {
        self.variables.len()
    }

    pub fn num_operators(&self) -> usize {
        self.operators.len()
    }

    pub fn domain_sizes(&self) -> RefVec<VarId, i32> {
        self.variables.values().map(|v| v.domain_size()).collect()
    }

    pub fn is_goal_state(&self, state: &State) -> bool {
        state.entails_all(&self.goals)
    }

    pub fn operator_ids(&self) -> impl Iterator<Item = OpId> {
        self.operators.keys()
    }

    /// Total index of a fact when all domains are laid out contiguously.
    pub fn fact_offset(&self, var: VarId) -> usize {
        self.variables
            .entries()
            .take_while(|(v, _)| *v != var)
            .map(|(_, info)| info.domain_size() as usize)
            .sum()
    }

    pub fn num_facts(&self) -> usize {
        self.variables.values().map(|v| v.domain_size() as usize).sum()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn var(domain_size: usize) -> Variable {
        Variable {
            name: "v".to_string(),
            axiom_layer: -1,
            fact_names: (0..domain_size).map(|i| format!("Atom v({i})")).collect(),
        }
    }

    #[test]
    fn test_operator_derived_conditions() {
        let v0 = VarId::from(0usize);
        let v1 = VarId::from(1usize);
        let op = Operator::from_facts(
            "move",
            &[Fact::new(v1, 2), Fact::new(v0, 0)],
            &[Fact::new(v0, 1)],
            3,
        );
        assert_eq!(op.preconditions(), &[Fact::new(v0, 0), Fact::new(v1, 2)]);
        assert_eq!(op.effects(), &[Fact::new(v0, 1)]);
        assert_eq!(op.prevail, vec![Fact::new(v1, 2)]);
        assert_eq!(
            op.pre_post,
            vec![PrePost {
                var: v0,
                pre: Some(0),
                post: 1
            }]
        );
    }

    #[test]
    fn test_state_successor() {
        let v0 = VarId::from(0usize);
        let op = Operator::from_facts("op", &[Fact::new(v0, 0)], &[Fact::new(v0, 1)], 1);
        let state = State::new(vec![0, 2]);
        assert!(op.is_applicable(&state));
        let succ = state.successor(&op);
        assert_eq!(succ.value(v0), 1);
        assert_eq!(succ.value(VarId::from(1usize)), 2);
        assert!(!op.is_applicable(&succ));
    }

    #[test]
    fn test_goal_state() {
        let task = Task::new(
            vec![var(2), var(3)],
            vec![],
            State::new(vec![0, 0]),
            vec![Fact::new(VarId::from(1usize), 2)],
        );
        assert!(!task.is_goal_state(&task.initial_state));
        assert!(task.is_goal_state(&State::new(vec![0, 2])));
        assert_eq!(task.fact_offset(VarId::from(1usize)), 2);
        assert_eq!(task.num_facts(), 5);
    }
}
