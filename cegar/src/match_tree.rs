//! Lazy transition oracles: the match tree stores operator lists on the
//! refinement hierarchy and pushes them down along splits; the successor
//! generator variant keeps no per-abstraction index at all. Both enumerate
//! transitions at query time by intersecting hypothetical pre/post-images
//! with the hierarchy's leaves.

use crate::abstract_state::AbstractState;
use crate::cartesian_set::{CartesianSet, VariableInfos};
use crate::operators::{has_infinite_cost, OperatorInfo, OperatorOrder};
use crate::refinement_hierarchy::RefinementHierarchy;
use crate::types::{NodeId, Transition, Transitions};
use std::mem;
use tessera_collections::ref_store::{RefMap, RefVec};
use tessera_planning::successor_generator::SuccessorGenerator;
use tessera_planning::{OpId, Task, VarId};

/// Per-hierarchy-node operator lists: `outgoing` holds operators whose
/// precondition is implied by the node's Cartesian set, `incoming` those
/// whose postconditions are implied.
pub struct MatchTree {
    incoming: RefVec<NodeId, Vec<OpId>>,
    outgoing: RefVec<NodeId, Vec<OpId>>,
    order: OperatorOrder,
}

impl MatchTree {
    pub fn new(info: &OperatorInfo, order: OperatorOrder) -> Self {
        let all_ops: Vec<OpId> = info.operator_ids().collect();
        let mut incoming = RefVec::new();
        let mut outgoing = RefVec::new();
        incoming.push(all_ops.clone());
        outgoing.push(all_ops);
        MatchTree {
            incoming,
            outgoing,
            order,
        }
    }

    /// Pushes operator lists down along the root-to-leaf path of the freshly
    /// split state, so that every list again matches its node's set.
    pub fn rewire(
        &mut self,
        hierarchy: &RefinementHierarchy,
        all_cartesian_sets: &RefMap<NodeId, CartesianSet>,
        infos: &VariableInfos,
        info: &OperatorInfo,
        new_state: &AbstractState,
        var: VarId,
    ) {
        while self.incoming.len() < hierarchy.num_nodes() {
            self.incoming.push(Vec::new());
            self.outgoing.push(Vec::new());
        }
        hierarchy.for_each_visited_family(new_state, infos, |family| {
            let old_outgoing = mem::take(&mut self.outgoing[family.node_id]);
            for op in old_outgoing {
                match info.precondition_value(op, var) {
                    None => self.outgoing[family.node_id].push(op),
                    Some(pre) => {
                        let mut pushed = false;
                        for child in [family.correct_child, family.other_child] {
                            if all_cartesian_sets[child].test(infos, var, pre) {
                                self.outgoing[child].push(op);
                                pushed = true;
                            }
                        }
                        debug_assert!(pushed);
                    }
                }
            }
            let old_incoming = mem::take(&mut self.incoming[family.node_id]);
            for op in old_incoming {
                match info.postcondition_value(op, var) {
                    None => self.incoming[family.node_id].push(op),
                    Some(post) => {
                        let mut pushed = false;
                        for child in [family.correct_child, family.other_child] {
                            if all_cartesian_sets[child].test(infos, var, post) {
                                self.incoming[child].push(op);
                                pushed = true;
                            }
                        }
                        debug_assert!(pushed);
                    }
                }
            }
        });
    }

    fn outgoing_operators(
        &self,
        hierarchy: &RefinementHierarchy,
        infos: &VariableInfos,
        info: &OperatorInfo,
        state: &AbstractState,
    ) -> Vec<OpId> {
        let mut operators = Vec::new();
        hierarchy.for_each_visited_node(state, infos, |node_id| {
            for &op in &self.outgoing[node_id] {
                if !has_infinite_cost(info, op) && !operator_loops(info, infos, state, op) {
                    operators.push(op);
                }
            }
        });
        self.order.order(info, &mut operators);
        operators
    }

    fn incoming_operators(
        &self,
        hierarchy: &RefinementHierarchy,
        infos: &VariableInfos,
        info: &OperatorInfo,
        state: &AbstractState,
    ) -> Vec<OpId> {
        let mut operators = Vec::new();
        hierarchy.for_each_visited_node(state, infos, |node_id| {
            for &op in &self.incoming[node_id] {
                if !has_infinite_cost(info, op) {
                    operators.push(op);
                }
            }
        });
        self.order.order(info, &mut operators);
        operators
    }

    pub fn outgoing_transitions(
        &self,
        hierarchy: &RefinementHierarchy,
        all_cartesian_sets: &RefMap<NodeId, CartesianSet>,
        infos: &VariableInfos,
        info: &OperatorInfo,
        state: &AbstractState,
    ) -> Transitions {
        let operators = self.outgoing_operators(hierarchy, infos, info, state);
        outgoing_transitions_for_operators(&operators, hierarchy, all_cartesian_sets, infos, info, state)
    }

    pub fn incoming_transitions(
        &self,
        hierarchy: &RefinementHierarchy,
        all_cartesian_sets: &RefMap<NodeId, CartesianSet>,
        infos: &VariableInfos,
        info: &OperatorInfo,
        state: &AbstractState,
    ) -> Transitions {
        let operators = self.incoming_operators(hierarchy, infos, info, state);
        incoming_transitions_for_operators(&operators, hierarchy, all_cartesian_sets, infos, info, state)
    }
}

/// Transition oracle without any per-abstraction operator index: candidate
/// operators come from a forward and a backward successor generator over the
/// task, queried with the state's Cartesian set.
pub struct SuccessorGenerators {
    forward: SuccessorGenerator,
    backward: SuccessorGenerator,
    order: OperatorOrder,
}

impl SuccessorGenerators {
    pub fn new(task: &Task, order: OperatorOrder) -> Self {
        SuccessorGenerators {
            forward: SuccessorGenerator::from_preconditions(task),
            backward: SuccessorGenerator::from_postconditions(task),
            order,
        }
    }

    fn outgoing_operators(
        &self,
        infos: &VariableInfos,
        info: &OperatorInfo,
        state: &AbstractState,
    ) -> Vec<OpId> {
        let mut operators = Vec::new();
        let set = state.cartesian_set();
        self.forward
            .generate_matching_ops(&|var, value| set.test(infos, var, value), &mut operators);
        operators.retain(|&op| !has_infinite_cost(info, op) && !operator_loops(info, infos, state, op));
        self.order.order(info, &mut operators);
        operators
    }

    fn incoming_operators(
        &self,
        infos: &VariableInfos,
        info: &OperatorInfo,
        state: &AbstractState,
    ) -> Vec<OpId> {
        let mut operators = Vec::new();
        let set = state.cartesian_set();
        self.backward
            .generate_matching_ops(&|var, value| set.test(infos, var, value), &mut operators);
        operators
            .retain(|&op| !has_infinite_cost(info, op) && !incoming_operator_only_loops(info, infos, state, op));
        self.order.order(info, &mut operators);
        operators
    }

    pub fn outgoing_transitions(
        &self,
        hierarchy: &RefinementHierarchy,
        all_cartesian_sets: &RefMap<NodeId, CartesianSet>,
        infos: &VariableInfos,
        info: &OperatorInfo,
        state: &AbstractState,
    ) -> Transitions {
        let operators = self.outgoing_operators(infos, info, state);
        outgoing_transitions_for_operators(&operators, hierarchy, all_cartesian_sets, infos, info, state)
    }

    pub fn incoming_transitions(
        &self,
        hierarchy: &RefinementHierarchy,
        all_cartesian_sets: &RefMap<NodeId, CartesianSet>,
        infos: &VariableInfos,
        info: &OperatorInfo,
        state: &AbstractState,
    ) -> Transitions {
        let operators = self.incoming_operators(infos, info, state);
        incoming_transitions_for_operators(&operators, hierarchy, all_cartesian_sets, infos, info, state)
    }
}

/// An applicable operator self-loops iff the state contains all its effects:
/// the post-image is then a subset of the state itself.
fn operator_loops(
    info: &OperatorInfo,
    infos: &VariableInfos,
    state: &AbstractState,
    op: OpId,
) -> bool {
    info.effects(op)
        .iter()
        .all(|fact| state.contains(infos, fact.var, fact.value))
}

/// A backward-applicable operator induces only the self-loop iff its
/// preconditions lie inside the state and every effect variable without a
/// precondition covers its full domain there: any other source leaf would
/// have to be disjoint from the state on some unaffected variable.
fn incoming_operator_only_loops(
    info: &OperatorInfo,
    infos: &VariableInfos,
    state: &AbstractState,
    op: OpId,
) -> bool {
    info.preconditions(op)
        .iter()
        .all(|fact| state.contains(infos, fact.var, fact.value))
        && info
            .effect_vars_without_preconditions(op)
            .iter()
            .all(|&var| state.cartesian_set().has_full_domain(infos, var))
}

fn outgoing_transitions_for_operators(
    operators: &[OpId],
    hierarchy: &RefinementHierarchy,
    all_cartesian_sets: &RefMap<NodeId, CartesianSet>,
    infos: &VariableInfos,
    info: &OperatorInfo,
    state: &AbstractState,
) -> Transitions {
    let mut transitions = Vec::new();
    for &op in operators {
        let mut post_image = state.cartesian_set().clone();
        for fact in info.postconditions(op) {
            post_image.set_single_value(infos, fact.var, fact.value);
        }
        let matcher = info.outgoing_matcher(op);
        hierarchy.for_each_leaf(all_cartesian_sets, &post_image, &matcher, infos, |leaf_id| {
            let target_id = hierarchy.state_id_at(leaf_id);
            debug_assert!(target_id != state.id());
            transitions.push(Transition::new(op, target_id));
        });
    }
    transitions
}

fn incoming_transitions_for_operators(
    operators: &[OpId],
    hierarchy: &RefinementHierarchy,
    all_cartesian_sets: &RefMap<NodeId, CartesianSet>,
    infos: &VariableInfos,
    info: &OperatorInfo,
    state: &AbstractState,
) -> Transitions {
    let mut transitions = Vec::new();
    for &op in operators {
        let mut pre_image = state.cartesian_set().clone();
        for fact in info.effects(op) {
            pre_image.add_all(infos, fact.var);
        }
        for fact in info.preconditions(op) {
            pre_image.set_single_value(infos, fact.var, fact.value);
        }
        let matcher = info.incoming_matcher(op);
        hierarchy.for_each_leaf(all_cartesian_sets, &pre_image, &matcher, infos, |leaf_id| {
            let src_id = hierarchy.state_id_at(leaf_id);
            if src_id != state.id() {
                transitions.push(Transition::new(op, src_id));
            }
        });
    }
    transitions
}
