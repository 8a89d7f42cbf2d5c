pub mod causal_graph;
pub mod hadd;
pub mod sas;
pub mod successor_generator;
pub mod task;

pub use sas::InputError;
pub use task::{Fact, OpId, Operator, State, Task, VarId, INF};
