//! The Cartesian abstraction: all current abstract states, the refinement
//! hierarchy, the goal set and the transition oracle, with `refine` as the
//! single mutation entry point.

use crate::abstract_state::AbstractState;
use crate::cartesian_set::{CartesianSet, VariableInfos};
use crate::match_tree::{MatchTree, SuccessorGenerators};
use crate::operators::{OperatorInfo, OperatorOrder, OperatorOrdering};
use crate::refinement_hierarchy::RefinementHierarchy;
use crate::transition_system::TransitionSystem;
use crate::types::{Goals, StateId, Transitions};
use itertools::Itertools;
use std::mem;
use std::sync::Arc;
use tessera_collections::ref_store::{RefMap, RefVec};
use tessera_planning::{Fact, State, Task, VarId};
use tracing::{debug, info};

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum TransitionRepresentation {
    /// Explicit transition lists, rewired on every split.
    TS,
    /// Operator lists on the refinement hierarchy, transitions on demand.
    MT,
    /// No operator index at all; successor generators on demand.
    SG,
    /// Explicit lists during refinement, successor generators afterwards.
    TsThenSg,
}

pub enum TransitionOracle {
    Explicit(TransitionSystem),
    MatchTree(MatchTree),
    Generators(SuccessorGenerators),
}

pub struct Abstraction {
    task: Arc<Task>,
    infos: VariableInfos,
    ops: OperatorInfo,
    states: RefVec<StateId, AbstractState>,
    /// Frozen Cartesian set of every real (non-helper) hierarchy node.
    cartesian_sets: RefMap<crate::types::NodeId, CartesianSet>,
    hierarchy: RefinementHierarchy,
    goals: Goals,
    goal_facts: Vec<Fact>,
    concrete_initial_state: State,
    oracle: TransitionOracle,
    /// Reference transition system cross-checked against a lazy oracle.
    shadow: Option<TransitionSystem>,
    operator_order: OperatorOrdering,
    operator_tiebreak: OperatorOrdering,
    random_seed: u64,
    refinement_frozen: bool,
    debug: bool,
}

impl Abstraction {
    pub fn new(
        task: Arc<Task>,
        representation: TransitionRepresentation,
        operator_order: OperatorOrdering,
        operator_tiebreak: OperatorOrdering,
        random_seed: u64,
        debug: bool,
    ) -> Self {
        let infos = VariableInfos::new(&task.domain_sizes());
        let ops = OperatorInfo::new(&task);

        let initial_state = AbstractState::trivial(&infos);
        let mut cartesian_sets = RefMap::default();
        cartesian_sets.insert(initial_state.node_id(), initial_state.cartesian_set().clone());
        let mut states = RefVec::new();
        let init_id = states.push(initial_state);

        let mut goals = Goals::new();
        goals.insert(init_id);

        let oracle = match representation {
            TransitionRepresentation::TS | TransitionRepresentation::TsThenSg => {
                TransitionOracle::Explicit(TransitionSystem::new(&ops))
            }
            TransitionRepresentation::MT => TransitionOracle::MatchTree(MatchTree::new(
                &ops,
                OperatorOrder::new(&task, operator_order, operator_tiebreak, random_seed),
            )),
            TransitionRepresentation::SG => TransitionOracle::Generators(SuccessorGenerators::new(
                &task,
                OperatorOrder::new(&task, operator_order, operator_tiebreak, random_seed),
            )),
        };
        let shadow = if debug && !matches!(oracle, TransitionOracle::Explicit(_)) {
            Some(TransitionSystem::new(&ops))
        } else {
            None
        };

        Abstraction {
            infos,
            ops,
            states,
            cartesian_sets,
            hierarchy: RefinementHierarchy::new(),
            goals,
            goal_facts: task.goals.clone(),
            concrete_initial_state: task.initial_state.clone(),
            task,
            oracle,
            shadow,
            operator_order,
            operator_tiebreak,
            random_seed,
            refinement_frozen: false,
            debug,
        }
    }

    pub fn init_id(&self) -> StateId {
        StateId::from_u32(0)
    }

    pub fn num_states(&self) -> usize {
        self.states.len()
    }

    pub fn initial_state(&self) -> &AbstractState {
        &self.states[self.init_id()]
    }

    pub fn state(&self, state_id: StateId) -> &AbstractState {
        &self.states[state_id]
    }

    pub fn goals(&self) -> &Goals {
        &self.goals
    }

    pub fn var_infos(&self) -> &VariableInfos {
        &self.infos
    }

    pub fn hierarchy(&self) -> &RefinementHierarchy {
        &self.hierarchy
    }

    pub fn state_id_of_concrete(&self, state: &State) -> StateId {
        self.hierarchy.abstract_state_id(state)
    }

    /// Non-loop transition count; only the explicit representation keeps it.
    pub fn num_non_loop_transitions(&self) -> Option<usize> {
        match &self.oracle {
            TransitionOracle::Explicit(ts) => Some(ts.num_non_loops()),
            _ => None,
        }
    }

    pub fn incoming_transitions(&self, state_id: StateId) -> Transitions {
        match &self.oracle {
            TransitionOracle::Explicit(ts) => ts.incoming_transitions(state_id).to_vec(),
            TransitionOracle::MatchTree(mt) => mt.incoming_transitions(
                &self.hierarchy,
                &self.cartesian_sets,
                &self.infos,
                &self.ops,
                &self.states[state_id],
            ),
            TransitionOracle::Generators(sg) => sg.incoming_transitions(
                &self.hierarchy,
                &self.cartesian_sets,
                &self.infos,
                &self.ops,
                &self.states[state_id],
            ),
        }
    }

    pub fn outgoing_transitions(&self, state_id: StateId) -> Transitions {
        match &self.oracle {
            TransitionOracle::Explicit(ts) => ts.outgoing_transitions(state_id).to_vec(),
            TransitionOracle::MatchTree(mt) => mt.outgoing_transitions(
                &self.hierarchy,
                &self.cartesian_sets,
                &self.infos,
                &self.ops,
                &self.states[state_id],
            ),
            TransitionOracle::Generators(sg) => sg.outgoing_transitions(
                &self.hierarchy,
                &self.cartesian_sets,
                &self.infos,
                &self.ops,
                &self.states[state_id],
            ),
        }
    }

    /// Splits the state on `wanted` values of `var`. The parent's ID goes to
    /// one child to keep IDs dense, arranged so that the initial state keeps
    /// ID 0; the wanted side is always returned second.
    pub fn refine(&mut self, state_id: StateId, var: VarId, wanted: &[i32]) -> (StateId, StateId) {
        assert!(!self.refinement_frozen, "abstraction no longer supports refinement");
        debug!(
            "refine state {state_id} {} for {var}={wanted:?}",
            self.states[state_id].cartesian_set().display(&self.infos)
        );

        let v_id = state_id;
        let mut v1_id = v_id;
        let mut v2_id = self.states.next_key();
        if v_id == self.init_id() && wanted.contains(&self.concrete_initial_state.value(var)) {
            mem::swap(&mut v1_id, &mut v2_id);
        }

        let v_node = self.states[state_id].node_id();
        let (left_node, right_node) = self.hierarchy.split(v_node, var, wanted, v1_id, v2_id);
        let (left_set, right_set) = self.states[state_id].split_domain(&self.infos, var, wanted);
        self.cartesian_sets.insert(left_node, left_set.clone());
        self.cartesian_sets.insert(right_node, right_set.clone());

        let v1 = AbstractState::new(v1_id, left_node, left_set);
        let v2 = AbstractState::new(v2_id, right_node, right_set);
        debug_assert!(self.states[state_id].includes(&v1));
        debug_assert!(self.states[state_id].includes(&v2));

        if self.goals.remove(&v_id) {
            if v1.includes_facts(&self.infos, &self.goal_facts) {
                self.goals.insert(v1_id);
            }
            if v2.includes_facts(&self.infos, &self.goal_facts) {
                self.goals.insert(v2_id);
            }
            debug!("number of goal states: {}", self.goals.len());
        }

        {
            let Abstraction {
                oracle,
                shadow,
                hierarchy,
                cartesian_sets,
                states,
                ops,
                infos,
                ..
            } = self;
            match oracle {
                TransitionOracle::Explicit(ts) => {
                    ts.rewire(ops, infos, states, v_id, &v1, &v2, var);
                }
                TransitionOracle::MatchTree(mt) => {
                    mt.rewire(hierarchy, cartesian_sets, infos, ops, &v1, var);
                }
                TransitionOracle::Generators(_) => {}
            }
            if let Some(ts) = shadow {
                ts.rewire(ops, infos, states, v_id, &v1, &v2, var);
            }
        }

        if v2_id == self.states.next_key() {
            self.states.push(v2);
            self.states[v1_id] = v1;
        } else {
            debug_assert!(v1_id == self.states.next_key());
            self.states.push(v1);
            self.states[v2_id] = v2;
        }

        debug_assert!(self
            .initial_state()
            .includes_concrete(&self.infos, &self.concrete_initial_state));

        if self.debug && self.shadow.is_some() {
            self.assert_oracle_matches_shadow(v1_id);
            self.assert_oracle_matches_shadow(v2_id);
        }

        (v1_id, v2_id)
    }

    /// Compares the lazy oracle against the reference transition system.
    fn assert_oracle_matches_shadow(&self, state_id: StateId) {
        let shadow = self.shadow.as_ref().unwrap();
        let sorted = |mut transitions: Transitions| {
            transitions.sort();
            transitions
        };
        let oracle_out = sorted(self.outgoing_transitions(state_id));
        let shadow_out = sorted(shadow.outgoing_transitions(state_id).to_vec());
        assert!(
            oracle_out == shadow_out,
            "outgoing transitions of state {state_id} diverge: oracle {:?} vs reference {:?}",
            oracle_out.iter().format(", "),
            shadow_out.iter().format(", ")
        );
        let oracle_in = sorted(self.incoming_transitions(state_id));
        let shadow_in = sorted(shadow.incoming_transitions(state_id).to_vec());
        assert!(
            oracle_in == shadow_in,
            "incoming transitions of state {state_id} diverge: oracle {:?} vs reference {:?}",
            oracle_in.iter().format(", "),
            shadow_in.iter().format(", ")
        );
    }

    /// Drops the explicit transition system and serves further queries from
    /// successor generators. Refinement is no longer possible afterwards.
    pub fn switch_from_transition_system_to_successor_generators(&mut self) {
        assert!(matches!(self.oracle, TransitionOracle::Explicit(_)));
        let order = OperatorOrder::new(
            &self.task,
            self.operator_order,
            self.operator_tiebreak,
            self.random_seed,
        );
        self.oracle = TransitionOracle::Generators(SuccessorGenerators::new(&self.task, order));
        self.shadow = None;
        self.refinement_frozen = true;
        info!("switched transition representation from TS to SG");
    }

    pub fn extract_refinement_hierarchy(self) -> RefinementHierarchy {
        self.hierarchy
    }

    pub fn print_statistics(&self) {
        info!("Cartesian states: {}", self.num_states());
        info!("Cartesian goal states: {}", self.goals.len());
        info!("Refinement hierarchy nodes: {}", self.hierarchy.num_nodes());
        info!(
            "Cartesian sets: {} ({} helper nodes)",
            self.cartesian_sets.num_set_entries(),
            self.hierarchy.num_nodes() - self.cartesian_sets.num_set_entries()
        );
        if let TransitionOracle::Explicit(ts) = &self.oracle {
            info!("Non-loop transitions: {}", ts.num_non_loops());
            info!("Self-loops: {}", ts.num_loops());
        }
    }
}
