//! Explicit abstract transition system: per-state incoming and outgoing
//! transition lists plus per-state self-loop operators, kept up to date
//! across splits by local rewiring.

use crate::abstract_state::AbstractState;
use crate::cartesian_set::VariableInfos;
use crate::operators::{has_infinite_cost, OperatorInfo};
use crate::types::{StateId, Transition, Transitions};
use std::mem;
use tessera_collections::ref_store::RefVec;
use tessera_planning::{OpId, VarId};

pub struct TransitionSystem {
    incoming: RefVec<StateId, Transitions>,
    outgoing: RefVec<StateId, Transitions>,
    loops: RefVec<StateId, Vec<OpId>>,
    num_non_loops: usize,
    num_loops: usize,
}

impl TransitionSystem {
    /// The transition system of the trivial abstraction: every finite-cost
    /// operator self-loops on the single state.
    pub fn new(info: &OperatorInfo) -> Self {
        let initial_loops: Vec<OpId> = info
            .operator_ids()
            .filter(|&op| !has_infinite_cost(info, op))
            .collect();
        let num_loops = initial_loops.len();
        let mut loops = RefVec::new();
        loops.push(initial_loops);
        TransitionSystem {
            incoming: RefVec::with_values(1, Vec::new()),
            outgoing: RefVec::with_values(1, Vec::new()),
            loops,
            num_non_loops: 0,
            num_loops,
        }
    }

    pub fn num_states(&self) -> usize {
        self.outgoing.len()
    }

    pub fn num_non_loops(&self) -> usize {
        self.num_non_loops
    }

    pub fn num_loops(&self) -> usize {
        self.num_loops
    }

    pub fn incoming_transitions(&self, state_id: StateId) -> &[Transition] {
        &self.incoming[state_id]
    }

    pub fn outgoing_transitions(&self, state_id: StateId) -> &[Transition] {
        &self.outgoing[state_id]
    }

    pub fn loops(&self, state_id: StateId) -> &[OpId] {
        &self.loops[state_id]
    }

    fn add_transition(&mut self, src_id: StateId, op: OpId, target_id: StateId) {
        debug_assert!(src_id != target_id);
        self.outgoing[src_id].push(Transition::new(op, target_id));
        self.incoming[target_id].push(Transition::new(op, src_id));
        self.num_non_loops += 1;
    }

    fn add_loop(&mut self, state_id: StateId, op: OpId) {
        self.loops[state_id].push(op);
        self.num_loops += 1;
    }

    /// Reflects the split of `v` (whose ID is reused by `v1` or `v2`) on the
    /// transition lists. Runs in time proportional to the transitions and
    /// loops touching `v` plus the degree of its neighbours.
    pub fn rewire(
        &mut self,
        info: &OperatorInfo,
        infos: &VariableInfos,
        states: &RefVec<StateId, AbstractState>,
        v_id: StateId,
        v1: &AbstractState,
        v2: &AbstractState,
        var: VarId,
    ) {
        let old_incoming = mem::take(&mut self.incoming[v_id]);
        let old_outgoing = mem::take(&mut self.outgoing[v_id]);
        let old_loops = mem::take(&mut self.loops[v_id]);
        self.num_non_loops -= old_incoming.len() + old_outgoing.len();
        self.num_loops -= old_loops.len();

        // Drop the stale mirror entries in the neighbours' lists before the
        // freed ID becomes valid again for one of the children.
        for t in &old_incoming {
            remove_transition(&mut self.outgoing[t.target], Transition::new(t.op, v_id));
        }
        for t in &old_outgoing {
            remove_transition(&mut self.incoming[t.target], Transition::new(t.op, v_id));
        }

        self.incoming.push(Vec::new());
        self.outgoing.push(Vec::new());
        self.loops.push(Vec::new());

        self.rewire_incoming_transitions(old_incoming, info, infos, states, v1, v2, var);
        self.rewire_outgoing_transitions(old_outgoing, info, infos, states, v1, v2, var);
        self.rewire_loops(old_loops, info, infos, v1, v2, var);
    }

    /// For all transitions u->v, add transitions u->v1, u->v2, or both.
    fn rewire_incoming_transitions(
        &mut self,
        old_incoming: Transitions,
        info: &OperatorInfo,
        infos: &VariableInfos,
        states: &RefVec<StateId, AbstractState>,
        v1: &AbstractState,
        v2: &AbstractState,
        var: VarId,
    ) {
        for t in old_incoming {
            let op = t.op;
            let u_id = t.target;
            match info.postcondition_value(op, var) {
                None => {
                    // The operator neither tests nor writes var.
                    let u = &states[u_id];
                    let u_and_v1_intersect =
                        u.cartesian_set().intersects(infos, v1.cartesian_set(), var);
                    if u_and_v1_intersect {
                        self.add_transition(u_id, op, v1.id());
                    }
                    if !u_and_v1_intersect
                        || u.cartesian_set().intersects(infos, v2.cartesian_set(), var)
                    {
                        self.add_transition(u_id, op, v2.id());
                    }
                }
                Some(post) => {
                    if v1.contains(infos, var, post) {
                        self.add_transition(u_id, op, v1.id());
                    } else {
                        debug_assert!(v2.contains(infos, var, post));
                        self.add_transition(u_id, op, v2.id());
                    }
                }
            }
        }
    }

    /// For all transitions v->w, add transitions v1->w, v2->w, or both.
    fn rewire_outgoing_transitions(
        &mut self,
        old_outgoing: Transitions,
        info: &OperatorInfo,
        infos: &VariableInfos,
        states: &RefVec<StateId, AbstractState>,
        v1: &AbstractState,
        v2: &AbstractState,
        var: VarId,
    ) {
        for t in old_outgoing {
            let op = t.op;
            let w_id = t.target;
            let pre = info.precondition_value(op, var);
            let post = info.postcondition_value(op, var);
            match (pre, post) {
                (None, None) => {
                    let w = &states[w_id];
                    let v1_and_w_intersect =
                        v1.cartesian_set().intersects(infos, w.cartesian_set(), var);
                    if v1_and_w_intersect {
                        self.add_transition(v1.id(), op, w_id);
                    }
                    if !v1_and_w_intersect
                        || v2.cartesian_set().intersects(infos, w.cartesian_set(), var)
                    {
                        self.add_transition(v2.id(), op, w_id);
                    }
                }
                (None, Some(post)) => {
                    // Applicable from both halves; the effect decides var.
                    debug_assert!(states[w_id].contains(infos, var, post));
                    self.add_transition(v1.id(), op, w_id);
                    self.add_transition(v2.id(), op, w_id);
                }
                (Some(pre), _) => {
                    if v1.contains(infos, var, pre) {
                        self.add_transition(v1.id(), op, w_id);
                    } else {
                        debug_assert!(v2.contains(infos, var, pre));
                        self.add_transition(v2.id(), op, w_id);
                    }
                }
            }
        }
    }

    /// For all self-loops of v, add loops on v1 and v2 or transitions
    /// between them.
    fn rewire_loops(
        &mut self,
        old_loops: Vec<OpId>,
        info: &OperatorInfo,
        infos: &VariableInfos,
        v1: &AbstractState,
        v2: &AbstractState,
        var: VarId,
    ) {
        for op in old_loops {
            let pre = info.precondition_value(op, var);
            let post = info.postcondition_value(op, var);
            match (pre, post) {
                (None, None) => {
                    self.add_loop(v1.id(), op);
                    self.add_loop(v2.id(), op);
                }
                (None, Some(post)) => {
                    if v2.contains(infos, var, post) {
                        self.add_transition(v1.id(), op, v2.id());
                        self.add_loop(v2.id(), op);
                    } else {
                        self.add_loop(v1.id(), op);
                        self.add_transition(v2.id(), op, v1.id());
                    }
                }
                (Some(pre), None) => {
                    if v1.contains(infos, var, pre) {
                        self.add_loop(v1.id(), op);
                    } else {
                        self.add_loop(v2.id(), op);
                    }
                }
                (Some(pre), Some(post)) => {
                    let starts_in_v1 = v1.contains(infos, var, pre);
                    let ends_in_v1 = v1.contains(infos, var, post);
                    match (starts_in_v1, ends_in_v1) {
                        (true, true) => self.add_loop(v1.id(), op),
                        (true, false) => self.add_transition(v1.id(), op, v2.id()),
                        (false, false) => self.add_loop(v2.id(), op),
                        (false, true) => self.add_transition(v2.id(), op, v1.id()),
                    }
                }
            }
        }
    }
}

fn remove_transition(transitions: &mut Transitions, transition: Transition) {
    let pos = transitions
        .iter()
        .position(|&t| t == transition)
        .expect("stale transition not found");
    transitions.swap_remove(pos);
}
