//! Abstract goal distances and the shortest-path tree, maintained either by
//! full recomputation (reverse Dijkstra from the goals) or incrementally
//! across a split.
//!
//! All internal math runs on 64-bit costs. If the task has zero-cost
//! operators, original costs are scaled by 2^32 and zero becomes one: the
//! ordering of path costs is preserved and every transition strictly
//! decreases the remaining distance, so an f-preserving step always makes
//! progress towards the goal. Callers read 32-bit values back by shifting.

use crate::abstraction::Abstraction;
use crate::types::{Goals, Solution, StateId, Transition};
use fixedbitset::FixedBitSet;
use std::mem;
use tessera_collections::heap::LazyHeap;
use tessera_collections::ref_store::RefVec;
use tessera_planning::{OpId, INF};
use tracing::debug;

/// Widened operator or path cost. `INF` marks unreachability, `DIRTY` is the
/// transient marker of the incremental update.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct Cost64(u64);

impl Cost64 {
    pub const ZERO: Cost64 = Cost64(0);
    pub const INF: Cost64 = Cost64(u64::MAX);
    const DIRTY: Cost64 = Cost64(u64::MAX - 1);

    pub fn raw(self) -> u64 {
        self.0
    }

    pub fn add_sat(self, other: Cost64) -> Cost64 {
        debug_assert!(self != Cost64::DIRTY && other != Cost64::DIRTY);
        if self == Cost64::INF || other == Cost64::INF {
            Cost64::INF
        } else {
            Cost64(self.0 + other.0)
        }
    }

    pub fn from_32(cost: i32, scale_zero_costs: bool) -> Cost64 {
        debug_assert!(cost >= 0);
        if cost == INF {
            Cost64::INF
        } else if scale_zero_costs {
            if cost == 0 {
                Cost64(1)
            } else {
                Cost64((cost as u64) << 32)
            }
        } else {
            Cost64(cost as u64)
        }
    }

    pub fn to_32(self, scale_zero_costs: bool) -> i32 {
        debug_assert!(self != Cost64::DIRTY);
        if self == Cost64::INF {
            INF
        } else if scale_zero_costs {
            (self.0 >> 32) as i32
        } else {
            self.0 as i32
        }
    }
}

pub struct ShortestPaths {
    task_has_zero_costs: bool,
    operator_costs: RefVec<OpId, Cost64>,
    goal_distances: RefVec<StateId, Cost64>,
    shortest_path: RefVec<StateId, Option<Transition>>,
    // Kept around to avoid reallocating between updates.
    candidate_queue: LazyHeap<Cost64, StateId>,
    open_queue: LazyHeap<Cost64, StateId>,
    dirty_candidate: FixedBitSet,
    dirty_states: Vec<StateId>,
}

impl ShortestPaths {
    pub fn new(costs: impl IntoIterator<Item = i32>) -> Self {
        let costs: Vec<i32> = costs.into_iter().collect();
        let task_has_zero_costs = costs.iter().any(|&c| c == 0);
        ShortestPaths {
            task_has_zero_costs,
            operator_costs: costs
                .iter()
                .map(|&c| Cost64::from_32(c, task_has_zero_costs))
                .collect(),
            goal_distances: RefVec::new(),
            shortest_path: RefVec::new(),
            candidate_queue: LazyHeap::new(),
            open_queue: LazyHeap::new(),
            dirty_candidate: FixedBitSet::new(),
            dirty_states: Vec::new(),
        }
    }

    pub fn goal_distance(&self, state_id: StateId) -> Cost64 {
        self.goal_distances[state_id]
    }

    /// The 32-bit h-value, with the zero-cost scaling undone.
    pub fn h_value(&self, state_id: StateId) -> i32 {
        self.goal_distances[state_id].to_32(self.task_has_zero_costs)
    }

    pub fn shortest_path_transition(&self, state_id: StateId) -> Option<Transition> {
        self.shortest_path[state_id]
    }

    pub fn is_optimal_transition(&self, source: StateId, t: Transition) -> bool {
        self.goal_distances[source] != Cost64::INF
            && self.goal_distances[source]
                == self.operator_costs[t.op].add_sat(self.goal_distances[t.target])
    }

    /// Recomputes all goal distances and the shortest-path tree from scratch
    /// with a reverse Dijkstra seeded on the goal states.
    pub fn recompute(&mut self, abstraction: &Abstraction, goals: &Goals) {
        self.open_queue.clear();
        let num_states = abstraction.num_states();
        self.shortest_path = RefVec::with_values(num_states, None);
        self.goal_distances = RefVec::with_values(num_states, Cost64::INF);
        for &goal in goals {
            self.goal_distances[goal] = Cost64::ZERO;
            self.open_queue.push(Cost64::ZERO, goal);
        }
        while let Some((old_dist, state_id)) = self.open_queue.pop() {
            let dist = self.goal_distances[state_id];
            debug_assert!(dist <= old_dist);
            if dist < old_dist {
                continue;
            }
            for t in abstraction.incoming_transitions(state_id) {
                let source = t.target;
                let source_dist = dist.add_sat(self.operator_costs[t.op]);
                if source_dist < self.goal_distances[source] {
                    self.goal_distances[source] = source_dist;
                    self.shortest_path[source] = Some(Transition::new(t.op, state_id));
                    self.open_queue.push(source_dist, source);
                }
            }
        }
    }

    fn mark_dirty(&mut self, state: StateId) {
        debug!("mark {state} as dirty");
        self.goal_distances[state] = Cost64::DIRTY;
        self.shortest_path[state] = None;
        debug_assert!(!self.dirty_states.contains(&state));
        self.dirty_states.push(state);
    }

    /// Reflects the split of `v` into `v1` and `v2`: the side that kept the
    /// old shortest-path transition of `v` (normally the wanted side `v2`)
    /// stays settled, the other is reconnected or repaired. The result
    /// matches a full recompute except for the choice among equal-cost
    /// shortest-path alternatives.
    pub fn update_incrementally(
        &mut self,
        abstraction: &Abstraction,
        v: StateId,
        v1: StateId,
        v2: StateId,
    ) {
        let num_states = abstraction.num_states();
        self.shortest_path.resize(num_states, None);
        self.goal_distances.resize(num_states, Cost64::ZERO);
        self.dirty_candidate.grow(num_states);
        self.dirty_states.clear();

        // Copy the distance from the split state; the uncertain side is
        // re-examined below.
        let dist_v = self.goal_distances[v];
        self.goal_distances[v1] = dist_v;
        self.goal_distances[v2] = dist_v;

        /* The split selection keeps the old shortest path of v valid from
           the wanted side v2. The flawed transition is not always the
           stored arc though, so detect the side that actually kept it,
           preferring v2. */
        let old_arc = self.shortest_path[v];
        let keeps_old_arc = |state: StateId| {
            old_arc.is_some_and(|arc| abstraction.outgoing_transitions(state).contains(&arc))
        };
        let (settled, uncertain) = if keeps_old_arc(v2) || old_arc.is_none() {
            (v2, v1)
        } else {
            debug_assert!(keeps_old_arc(v1));
            (v1, v2)
        };
        self.shortest_path[settled] = old_arc;
        self.shortest_path[uncertain] = None;

        /* Re-aim shortest-path transitions that previously ended in v. The
           arc to the uncertain side will be re-aimed again if it turns out
           dirty, so testing the settled side last makes reconnections
           prefer it. */
        for state in [uncertain, settled] {
            for incoming in abstraction.incoming_transitions(state) {
                let u = incoming.target;
                let op = incoming.op;
                if let Some(sp) = self.shortest_path[u] {
                    if sp.target == v && self.operator_costs[op] == self.operator_costs[sp.op] {
                        self.shortest_path[u] = Some(Transition::new(op, state));
                    }
                }
            }
        }

        /*
          Instead of recursively invalidating all orphans right away, push
          them on a candidate queue ordered by (old, possibly too low)
          h-values and try to reconnect each to a settled state at no extra
          cost. Only when that fails, mark the candidate dirty and enqueue
          its SPT children, whose h-values are strictly larger because no
          operator has cost zero.
        */
        debug_assert!(self.candidate_queue.is_empty());
        debug_assert!(self.dirty_candidate.is_clear());
        self.dirty_candidate.insert(usize::from(uncertain));
        self.candidate_queue.push(self.goal_distances[uncertain], uncertain);

        while let Some((_, state)) = self.candidate_queue.pop() {
            debug_assert!(self.dirty_candidate.contains(usize::from(state)));
            debug_assert!(self.goal_distances[state] != Cost64::INF);
            debug_assert!(self.goal_distances[state] != Cost64::DIRTY);
            let mut reconnected = false;
            for t in abstraction.outgoing_transitions(state) {
                let succ_dist = self.goal_distances[t.target];
                if succ_dist != Cost64::DIRTY
                    && succ_dist.add_sat(self.operator_costs[t.op]) == self.goal_distances[state]
                {
                    debug!("reconnect {state} to {} via {}", t.target, t.op);
                    self.shortest_path[state] = Some(t);
                    reconnected = true;
                    break;
                }
            }
            if !reconnected {
                self.mark_dirty(state);
                for t in abstraction.incoming_transitions(state) {
                    let prev = t.target;
                    if !self.dirty_candidate.contains(usize::from(prev))
                        && self.goal_distances[prev] != Cost64::DIRTY
                        && self.shortest_path[prev].is_some_and(|sp| sp.target == state)
                    {
                        self.dirty_candidate.insert(usize::from(prev));
                        self.candidate_queue.push(self.goal_distances[prev], prev);
                    }
                }
            }
            self.dirty_candidate.set(usize::from(state), false);
        }

        /*
          Dijkstra-style repair of the dirty region. The virtual source is
          the frontier of settled states: each dirty state is seeded with the
          best connection through a settled successor, then relaxation runs
          only along arcs between dirty states.
        */
        self.open_queue.clear();
        let dirty_states = mem::take(&mut self.dirty_states);
        for &state in &dirty_states {
            debug_assert!(self.goal_distances[state] == Cost64::DIRTY);
            let mut min_dist = Cost64::INF;
            for t in abstraction.outgoing_transitions(state) {
                let succ_dist = self.goal_distances[t.target];
                if succ_dist != Cost64::DIRTY {
                    let new_dist = succ_dist.add_sat(self.operator_costs[t.op]);
                    if new_dist < min_dist {
                        min_dist = new_dist;
                        self.shortest_path[state] = Some(t);
                    }
                }
            }
            self.goal_distances[state] = min_dist;
            if min_dist != Cost64::INF {
                self.open_queue.push(min_dist, state);
            }
        }
        while let Some((g, state)) = self.open_queue.pop() {
            debug_assert!(self.goal_distances[state] != Cost64::DIRTY);
            if g > self.goal_distances[state] {
                continue;
            }
            debug_assert!(g == self.goal_distances[state]);
            debug_assert!(g != Cost64::INF);
            for t in abstraction.incoming_transitions(state) {
                let pred = t.target;
                let pred_g = g.add_sat(self.operator_costs[t.op]);
                let pred_dist = self.goal_distances[pred];
                if pred_dist == Cost64::DIRTY || pred_g < pred_dist {
                    self.goal_distances[pred] = pred_g;
                    self.shortest_path[pred] = Some(Transition::new(t.op, state));
                    self.open_queue.push(pred_g, pred);
                }
            }
        }
    }

    /// Walks the shortest-path tree from the initial state to a goal.
    /// `None` iff the goal is unreachable in the abstraction.
    pub fn extract_solution(&self, init_id: StateId, goals: &Goals) -> Option<Solution> {
        if self.goal_distances[init_id] == Cost64::INF {
            return None;
        }
        let mut solution = Solution::new();
        let mut current = init_id;
        while !goals.contains(&current) {
            let t = self.shortest_path[current].expect("broken shortest-path tree");
            debug_assert!(t.target != current);
            debug_assert!(self.goal_distances[t.target] <= self.goal_distances[current]);
            solution.push_back(t);
            current = t.target;
        }
        Some(solution)
    }

    /// Debug check: distances must match a full recompute and every settled
    /// shortest-path transition must be consistent. Panics on divergence.
    pub fn assert_distances(&self, abstraction: &Abstraction, goals: &Goals) {
        assert!(self.goal_distances.values().all(|&d| d != Cost64::DIRTY));
        let costs_32: Vec<i32> = self
            .operator_costs
            .values()
            .map(|&c| c.to_32(self.task_has_zero_costs))
            .collect();
        let mut fresh = ShortestPaths::new(costs_32);
        fresh.recompute(abstraction, goals);
        for state_id in self.goal_distances.keys() {
            assert_eq!(
                self.goal_distances[state_id], fresh.goal_distances[state_id],
                "distance mismatch for state {state_id}"
            );
            let dist = self.goal_distances[state_id];
            if dist != Cost64::INF && !goals.contains(&state_id) {
                let t = self.shortest_path[state_id]
                    .unwrap_or_else(|| panic!("state {state_id} has no shortest-path transition"));
                assert!(
                    abstraction.outgoing_transitions(state_id).contains(&t),
                    "shortest-path transition of state {state_id} does not exist"
                );
                assert_eq!(
                    dist,
                    self.operator_costs[t.op].add_sat(self.goal_distances[t.target]),
                    "inconsistent shortest-path transition for state {state_id}"
                );
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_cost_widening_without_zero_costs() {
        assert_eq!(Cost64::from_32(3, false).raw(), 3);
        assert_eq!(Cost64::from_32(3, false).to_32(false), 3);
        assert_eq!(Cost64::from_32(INF, false), Cost64::INF);
        assert_eq!(Cost64::INF.to_32(false), INF);
    }

    #[test]
    fn test_cost_widening_with_zero_costs() {
        assert_eq!(Cost64::from_32(0, true).raw(), 1);
        assert_eq!(Cost64::from_32(2, true).raw(), 2u64 << 32);
        assert_eq!(Cost64::from_32(0, true).to_32(true), 0);
        assert_eq!(Cost64::from_32(2, true).to_32(true), 2);
        // Rounding down drops the epsilon share of zero-cost steps.
        let mixed = Cost64::from_32(0, true)
            .add_sat(Cost64::from_32(0, true))
            .add_sat(Cost64::from_32(5, true));
        assert_eq!(mixed.to_32(true), 5);
    }

    #[test]
    fn test_add_sat_saturates_at_infinity() {
        assert_eq!(Cost64::INF.add_sat(Cost64::ZERO), Cost64::INF);
        assert_eq!(Cost64::from_32(1, false).add_sat(Cost64::INF), Cost64::INF);
    }
}
