//! Counterexample-guided Cartesian abstraction refinement.
//!
//! The abstraction's states are Cartesian sets: for each variable, a subset
//! of its domain. Refinement repeatedly finds an abstract plan, traces it in
//! the concrete state space and splits the abstract state where the trace
//! breaks, until a concrete plan is found or a budget runs out. The final
//! goal distances give an admissible heuristic for the concrete task.

pub mod abstract_search;
pub mod abstract_state;
pub mod abstraction;
pub mod cartesian_set;
pub mod cegar;
pub mod flaw_search;
pub mod heuristic;
pub mod match_tree;
pub mod operators;
pub mod refinement_hierarchy;
pub mod shortest_paths;
pub mod split_selector;
pub mod transition_system;
pub mod types;

pub use crate::abstraction::{Abstraction, TransitionRepresentation};
pub use crate::cegar::{build_abstraction, CegarOptions, CegarResult, SearchStrategy, StopReason};
pub use crate::cartesian_set::{CartesianSet, VariableInfos};
pub use crate::flaw_search::PickFlaw;
pub use crate::heuristic::CartesianHeuristic;
pub use crate::operators::OperatorOrdering;
pub use crate::shortest_paths::Cost64;
pub use crate::split_selector::{PickSplit, Split};
pub use crate::types::{Goals, NodeId, Solution, StateId, Transition, Transitions};
