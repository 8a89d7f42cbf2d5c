use std::collections::{BTreeSet, VecDeque};
use tessera_collections::create_ref_type;
use tessera_planning::OpId;

create_ref_type!(StateId);
create_ref_type!(NodeId);

/// IDs of the abstract goal states, iterated in ID order for determinism.
pub type Goals = BTreeSet<StateId>;

/// One abstract transition. In outgoing lists `target` is the state the
/// operator leads to; in incoming lists it holds the source state.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct Transition {
    pub op: OpId,
    pub target: StateId,
}

impl Transition {
    pub fn new(op: OpId, target: StateId) -> Self {
        Transition { op, target }
    }
}

pub type Transitions = Vec<Transition>;

/// An abstract plan: the transitions from the initial abstract state to a
/// goal state, in order.
pub type Solution = VecDeque<Transition>;
