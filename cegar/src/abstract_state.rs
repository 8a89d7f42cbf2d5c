use crate::cartesian_set::{CartesianSet, VariableInfos};
use crate::types::{NodeId, StateId};
use tessera_planning::{Fact, Operator, State, VarId};

/// One abstract state: a Cartesian set together with its dense ID and its
/// leaf position in the refinement hierarchy.
#[derive(Clone, Debug)]
pub struct AbstractState {
    state_id: StateId,
    node_id: NodeId,
    cartesian_set: CartesianSet,
}

impl AbstractState {
    pub fn new(state_id: StateId, node_id: NodeId, cartesian_set: CartesianSet) -> Self {
        AbstractState {
            state_id,
            node_id,
            cartesian_set,
        }
    }

    /// The single state of the coarsest abstraction: all domains full.
    pub fn trivial(infos: &VariableInfos) -> Self {
        AbstractState::new(
            StateId::from_u32(0),
            NodeId::from_u32(0),
            CartesianSet::full(infos),
        )
    }

    pub fn id(&self) -> StateId {
        self.state_id
    }

    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    pub fn cartesian_set(&self) -> &CartesianSet {
        &self.cartesian_set
    }

    pub fn contains(&self, infos: &VariableInfos, var: VarId, value: i32) -> bool {
        self.cartesian_set.test(infos, var, value)
    }

    pub fn includes_concrete(&self, infos: &VariableInfos, state: &State) -> bool {
        state.facts().all(|fact| self.contains(infos, fact.var, fact.value))
    }

    pub fn includes_facts(&self, infos: &VariableInfos, facts: &[Fact]) -> bool {
        facts.iter().all(|&fact| self.contains(infos, fact.var, fact.value))
    }

    pub fn includes(&self, other: &AbstractState) -> bool {
        self.cartesian_set.is_superset_of(&other.cartesian_set)
    }

    /// The Cartesian pre-image of this state under the operator: effect
    /// variables may take any value, precondition variables are forced.
    pub fn regress(&self, infos: &VariableInfos, op: &Operator) -> CartesianSet {
        let mut regression = self.cartesian_set.clone();
        for eff in op.effects() {
            regression.add_all(infos, eff.var);
        }
        for pre in op.preconditions() {
            regression.set_single_value(infos, pre.var, pre.value);
        }
        regression
    }

    pub fn split_domain(
        &self,
        infos: &VariableInfos,
        var: VarId,
        wanted: &[i32],
    ) -> (CartesianSet, CartesianSet) {
        self.cartesian_set.split_domain(infos, var, wanted)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use tessera_collections::ref_store::RefVec;

    fn infos(domain_sizes: &[i32]) -> VariableInfos {
        let sizes: RefVec<VarId, i32> = domain_sizes.iter().copied().collect();
        VariableInfos::new(&sizes)
    }

    fn var(i: usize) -> VarId {
        VarId::from(i)
    }

    #[test]
    fn test_trivial_state_includes_everything() {
        let infos = infos(&[2, 3]);
        let state = AbstractState::trivial(&infos);
        assert_eq!(state.id(), StateId::from_u32(0));
        assert!(state.includes_concrete(&infos, &State::new(vec![1, 2])));
        assert!(state.includes_facts(&infos, &[Fact::new(var(1), 0)]));
    }

    #[test]
    fn test_regress() {
        let infos = infos(&[2, 3]);
        let trivial = AbstractState::trivial(&infos);
        let (_, wanted) = trivial.split_domain(&infos, var(1), &[2]);
        let state = AbstractState::new(StateId::from_u32(1), NodeId::from_u32(2), wanted);

        // Operator setting var1 from 1 to 2; var0 untouched.
        let op = Operator::from_facts(
            "op",
            &[Fact::new(var(1), 1)],
            &[Fact::new(var(1), 2)],
            1,
        );
        let regression = state.regress(&infos, &op);
        assert_eq!(regression.values(&infos, var(1)).collect::<Vec<_>>(), vec![1]);
        assert!(regression.has_full_domain(&infos, var(0)));
    }
}
