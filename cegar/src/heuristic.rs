//! Heuristic lookup for concrete states: the refinement hierarchy maps the
//! state to its abstract state, whose frozen goal distance is the estimate.

use crate::cegar::CegarResult;
use crate::refinement_hierarchy::RefinementHierarchy;
use crate::types::StateId;
use tessera_collections::ref_store::RefVec;
use tessera_planning::State;

pub struct CartesianHeuristic {
    hierarchy: RefinementHierarchy,
    h_values: RefVec<StateId, i32>,
}

impl CartesianHeuristic {
    pub fn new(result: CegarResult) -> Self {
        CartesianHeuristic {
            h_values: result.h_values,
            hierarchy: result.abstraction.extract_refinement_hierarchy(),
        }
    }

    /// Admissible goal-distance estimate; `INF` for dead ends.
    pub fn value(&self, state: &State) -> i32 {
        self.h_values[self.hierarchy.abstract_state_id(state)]
    }
}
