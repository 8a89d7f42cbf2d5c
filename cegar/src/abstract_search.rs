//! A* search over the abstract transition system, used by the `ASTAR`
//! search strategy. Goal distances double as h-values: they start at zero
//! and only ever grow, via on-trace updates and h propagation on splits.

use crate::abstraction::Abstraction;
use crate::types::{Goals, Solution, StateId, Transition};
use tessera_collections::heap::LazyHeap;
use tessera_collections::ref_store::RefVec;
use tessera_planning::{OpId, INF};

#[derive(Clone)]
struct SearchInfo {
    g: i32,
    incoming: Option<Transition>,
}

impl SearchInfo {
    fn new() -> Self {
        SearchInfo {
            g: INF,
            incoming: None,
        }
    }
}

pub struct AbstractSearch {
    operator_costs: RefVec<OpId, i32>,
    goal_distances: RefVec<StateId, i32>,
    open_queue: LazyHeap<i32, StateId>,
    search_info: RefVec<StateId, SearchInfo>,
}

impl AbstractSearch {
    pub fn new(costs: impl IntoIterator<Item = i32>) -> Self {
        AbstractSearch {
            operator_costs: costs.into_iter().collect(),
            goal_distances: RefVec::new(),
            open_queue: LazyHeap::new(),
            search_info: RefVec::new(),
        }
    }

    /// h estimate of the state; zero for states never searched yet.
    pub fn h_value(&self, state_id: StateId) -> i32 {
        if usize::from(state_id) < self.goal_distances.len() {
            self.goal_distances[state_id]
        } else {
            0
        }
    }

    fn reset(&mut self, num_states: usize) {
        self.open_queue.clear();
        self.search_info.resize(num_states, SearchInfo::new());
        self.goal_distances.resize(num_states, 0);
        for state_id in self.search_info.keys() {
            self.search_info[state_id] = SearchInfo::new();
        }
    }

    pub fn find_solution(
        &mut self,
        abstraction: &Abstraction,
        init_id: StateId,
        goals: &Goals,
    ) -> Option<Solution> {
        self.reset(abstraction.num_states());
        self.search_info[init_id].g = 0;
        self.open_queue.push(self.goal_distances[init_id], init_id);
        let goal_id = self.astar_search(abstraction, goals);
        self.open_queue.clear();
        match goal_id {
            Some(goal_id) => Some(self.extract_solution(init_id, goal_id)),
            None => {
                self.goal_distances[init_id] = INF;
                None
            }
        }
    }

    fn astar_search(&mut self, abstraction: &Abstraction, goals: &Goals) -> Option<StateId> {
        while let Some((old_f, state_id)) = self.open_queue.pop() {
            let g = self.search_info[state_id].g;
            debug_assert!(g < INF);
            let new_f = g + self.goal_distances[state_id];
            debug_assert!(new_f <= old_f);
            if new_f < old_f {
                continue;
            }
            if goals.contains(&state_id) {
                return Some(state_id);
            }
            for t in abstraction.outgoing_transitions(state_id) {
                let op_cost = self.operator_costs[t.op];
                debug_assert!(op_cost >= 0);
                let succ_g = if op_cost == INF { INF } else { g + op_cost };
                if succ_g < self.search_info[t.target].g {
                    self.search_info[t.target].g = succ_g;
                    self.search_info[t.target].incoming = Some(Transition::new(t.op, state_id));
                    let succ_h = self.goal_distances[t.target];
                    if succ_h == INF {
                        continue;
                    }
                    self.open_queue.push(succ_g + succ_h, t.target);
                }
            }
        }
        None
    }

    fn extract_solution(&self, init_id: StateId, goal_id: StateId) -> Solution {
        let mut solution = Solution::new();
        let mut current_id = goal_id;
        while current_id != init_id {
            let prev = self.search_info[current_id]
                .incoming
                .expect("search node has no incoming transition");
            solution.push_front(Transition::new(prev.op, current_id));
            debug_assert!(prev.target != current_id);
            current_id = prev.target;
        }
        solution
    }

    /// Settles the h-values of all states on the found trace: the suffix
    /// cost of the trace is an admissible estimate that never shrinks.
    pub fn update_goal_distances_of_states_on_trace(&mut self, solution: &Solution, init_id: StateId) {
        let mut goal_distance = 0;
        for t in solution.iter().rev() {
            self.set_h_value(t.target, goal_distance);
            goal_distance += self.operator_costs[t.op];
        }
        self.set_h_value(init_id, goal_distance);
    }

    /// Since h-values only grow under refinement, both children inherit the
    /// parent's estimate.
    pub fn copy_h_value_to_children(&mut self, v: StateId, v1: StateId, v2: StateId) {
        let h = self.goal_distances[v];
        self.goal_distances.resize(self.goal_distances.len() + 1, 0);
        self.set_h_value(v1, h);
        self.set_h_value(v2, h);
    }

    fn set_h_value(&mut self, state_id: StateId, h: i32) {
        self.goal_distances[state_id] = h;
    }
}
