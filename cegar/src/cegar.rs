//! The refinement loop: find an abstract plan, trace it concretely, split
//! where it breaks, update distances, and stop when a concrete plan is found
//! or a budget runs out.

use crate::abstract_search::AbstractSearch;
use crate::abstraction::{Abstraction, TransitionRepresentation};
use crate::flaw_search::{FlawSearch, FlawSearchOutcome, PickFlaw};
use crate::operators::OperatorOrdering;
use crate::shortest_paths::ShortestPaths;
use crate::split_selector::PickSplit;
use crate::types::StateId;
use anyhow::{bail, Result};
use std::sync::Arc;
use std::time::Duration;
use tessera_collections::ref_store::RefVec;
use tessera_planning::{OpId, Task, INF};
use tessera_utils::memory::MemoryPadding;
use tessera_utils::timer::{CountdownTimer, Stopwatch};
use tracing::info;

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum SearchStrategy {
    /// A* on the abstract system, h-values updated along traces.
    Astar,
    /// Incrementally maintained shortest paths.
    Incremental,
}

#[derive(Clone, Debug)]
pub struct CegarOptions {
    pub max_states: usize,
    /// Non-loop transition budget; only enforced with explicit transitions.
    pub max_transitions: usize,
    pub max_time: Option<Duration>,
    pub pick_split: PickSplit,
    pub pick_flaw: PickFlaw,
    pub search_strategy: SearchStrategy,
    pub transition_representation: TransitionRepresentation,
    pub operator_order: OperatorOrdering,
    pub operator_tiebreak: OperatorOrdering,
    /// Enables the expensive cross-checks (shadow transition system,
    /// incremental-versus-recompute comparison).
    pub debug: bool,
    pub random_seed: u64,
    pub memory_padding_mb: usize,
}

impl Default for CegarOptions {
    fn default() -> Self {
        CegarOptions {
            max_states: usize::MAX,
            max_transitions: usize::MAX,
            max_time: None,
            pick_split: PickSplit::MaxRefined,
            pick_flaw: PickFlaw::MinHSingle,
            search_strategy: SearchStrategy::Incremental,
            transition_representation: TransitionRepresentation::TS,
            operator_order: OperatorOrdering::IdUp,
            operator_tiebreak: OperatorOrdering::IdUp,
            debug: false,
            random_seed: 2018,
            memory_padding_mb: 75,
        }
    }
}

impl CegarOptions {
    pub fn validate(&self) -> Result<()> {
        if self.max_states < 1 {
            bail!("max_states must be at least 1");
        }
        if self.operator_tiebreak == OperatorOrdering::Random {
            bail!("operator order tie-breaking cannot be random");
        }
        Ok(())
    }
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum StopReason {
    SolutionFound,
    Unsolvable,
    MaxStates,
    MaxTransitions,
    TimeLimit,
    MemoryLimit,
}

pub struct CegarResult {
    pub abstraction: Abstraction,
    pub h_values: RefVec<StateId, i32>,
    pub concrete_solution: Option<Vec<OpId>>,
    pub stop_reason: StopReason,
    pub num_refinements: usize,
}

impl CegarResult {
    pub fn h_of_initial_state(&self) -> i32 {
        self.h_values[StateId::from_u32(0)]
    }
}

/// Runs the refinement loop on the task and returns the final abstraction
/// with its goal distances.
pub fn build_abstraction(task: Arc<Task>, options: &CegarOptions) -> Result<CegarResult> {
    options.validate()?;
    let cegar = Cegar::new(task, options.clone());
    Ok(cegar.run())
}

struct Cegar {
    task: Arc<Task>,
    options: CegarOptions,
    abstraction: Abstraction,
    shortest_paths: Option<ShortestPaths>,
    abstract_search: Option<AbstractSearch>,
    flaw_search: FlawSearch,
    timer: CountdownTimer,
    memory: MemoryPadding,
    num_refinements: usize,
    concrete_solution: Option<Vec<OpId>>,
    best_solution_cost: i32,
}

impl Cegar {
    fn new(task: Arc<Task>, options: CegarOptions) -> Self {
        let abstraction = Abstraction::new(
            Arc::clone(&task),
            options.transition_representation,
            options.operator_order,
            options.operator_tiebreak,
            options.random_seed,
            options.debug,
        );
        let operator_costs: Vec<i32> = task.operators.values().map(|op| op.cost).collect();
        let (shortest_paths, abstract_search) = match options.search_strategy {
            SearchStrategy::Incremental => (Some(ShortestPaths::new(operator_costs)), None),
            SearchStrategy::Astar => (None, Some(AbstractSearch::new(operator_costs))),
        };
        let flaw_search = FlawSearch::new(
            Arc::clone(&task),
            options.pick_flaw,
            options.pick_split,
            options.random_seed,
        );
        let timer = CountdownTimer::new(options.max_time);
        let memory = MemoryPadding::reserve(options.memory_padding_mb);
        Cegar {
            task,
            options,
            abstraction,
            shortest_paths,
            abstract_search,
            flaw_search,
            timer,
            memory,
            num_refinements: 0,
            concrete_solution: None,
            best_solution_cost: -1,
        }
    }

    fn budget_exhausted(&self) -> Option<StopReason> {
        if self.abstraction.num_states() >= self.options.max_states {
            info!("Reached maximum number of states.");
            Some(StopReason::MaxStates)
        } else if self
            .abstraction
            .num_non_loop_transitions()
            .is_some_and(|n| n >= self.options.max_transitions)
        {
            info!("Reached maximum number of transitions.");
            Some(StopReason::MaxTransitions)
        } else if self.timer.is_expired() {
            info!("Reached time limit.");
            Some(StopReason::TimeLimit)
        } else if !self.memory.is_reserved() {
            info!("Reached memory limit.");
            Some(StopReason::MemoryLimit)
        } else {
            None
        }
    }

    /// Splits off the goal facts one by one, so that afterwards exactly one
    /// abstract state is a goal state and it never has to be split again.
    fn separate_goal_facts(&mut self) {
        debug_assert!(self.abstraction.num_states() == 1);
        let mut current_goal = self.abstraction.init_id();
        for goal in self.task.goals.clone() {
            if self.task.variables[goal.var].domain_size() < 2 {
                // A unary goal variable holds its goal value trivially.
                continue;
            }
            let (_, wanted_child) = self.abstraction.refine(current_goal, goal.var, &[goal.value]);
            current_goal = wanted_child;
        }
        debug_assert!(self.abstraction.goals().len() == 1);
    }

    fn current_h_of_initial_state(&self) -> i32 {
        let init = self.abstraction.init_id();
        match self.options.search_strategy {
            SearchStrategy::Incremental => self.shortest_paths.as_ref().unwrap().h_value(init),
            SearchStrategy::Astar => self.abstract_search.as_ref().unwrap().h_value(init),
        }
    }

    fn run(mut self) -> CegarResult {
        info!("Start building abstraction.");
        info!("Maximum number of states: {}", self.options.max_states);
        info!("Maximum number of transitions: {}", self.options.max_transitions);

        self.separate_goal_facts();
        if let Some(shortest_paths) = &mut self.shortest_paths {
            shortest_paths.recompute(&self.abstraction, self.abstraction.goals());
            if self.options.debug {
                shortest_paths.assert_distances(&self.abstraction, self.abstraction.goals());
            }
        }

        let mut find_trace_timer = Stopwatch::new();
        let mut find_flaw_timer = Stopwatch::new();
        let mut refine_timer = Stopwatch::new();
        let mut update_distances_timer = Stopwatch::new();

        let stop_reason = loop {
            if let Some(reason) = self.budget_exhausted() {
                break reason;
            }

            find_trace_timer.resume();
            let init = self.abstraction.init_id();
            let solution = match self.options.search_strategy {
                SearchStrategy::Astar => self.abstract_search.as_mut().unwrap().find_solution(
                    &self.abstraction,
                    init,
                    self.abstraction.goals(),
                ),
                SearchStrategy::Incremental => self
                    .shortest_paths
                    .as_ref()
                    .unwrap()
                    .extract_solution(init, self.abstraction.goals()),
            };
            find_trace_timer.stop();

            let Some(solution) = solution else {
                info!("Abstract task is unsolvable.");
                break StopReason::Unsolvable;
            };

            if self.options.search_strategy == SearchStrategy::Astar {
                update_distances_timer.resume();
                self.abstract_search
                    .as_mut()
                    .unwrap()
                    .update_goal_distances_of_states_on_trace(&solution, init);
                update_distances_timer.stop();
            }
            let new_cost = self.current_h_of_initial_state();
            if new_cost > self.best_solution_cost {
                self.best_solution_cost = new_cost;
                info!("Abstract solution cost: {new_cost}");
            }

            find_flaw_timer.resume();
            let outcome = match self.options.search_strategy {
                SearchStrategy::Incremental => self.flaw_search.search_for_split(
                    &self.abstraction,
                    self.shortest_paths.as_ref().unwrap(),
                    &self.timer,
                    &self.memory,
                ),
                SearchStrategy::Astar => {
                    self.flaw_search
                        .trace_for_split(&self.abstraction, &solution, &self.timer)
                }
            };
            find_flaw_timer.stop();

            let split = match outcome {
                FlawSearchOutcome::Split(split) => split,
                FlawSearchOutcome::ConcreteSolutionFound(plan) => {
                    info!("Found concrete solution.");
                    self.concrete_solution = Some(plan);
                    break StopReason::SolutionFound;
                }
                FlawSearchOutcome::Interrupted => {
                    if self.timer.is_expired() {
                        info!("Reached time limit.");
                        break StopReason::TimeLimit;
                    }
                    info!("Reached memory limit.");
                    break StopReason::MemoryLimit;
                }
            };

            debug_assert!(!self.abstraction.goals().contains(&split.state_id));
            refine_timer.resume();
            let (v1, v2) = self
                .abstraction
                .refine(split.state_id, split.var, &split.values);
            refine_timer.stop();
            self.num_refinements += 1;

            update_distances_timer.resume();
            match self.options.search_strategy {
                SearchStrategy::Astar => {
                    self.abstract_search
                        .as_mut()
                        .unwrap()
                        .copy_h_value_to_children(split.state_id, v1, v2);
                }
                SearchStrategy::Incremental => {
                    let shortest_paths = self.shortest_paths.as_mut().unwrap();
                    shortest_paths.update_incrementally(&self.abstraction, split.state_id, v1, v2);
                    if self.options.debug {
                        shortest_paths.assert_distances(&self.abstraction, self.abstraction.goals());
                    }
                }
            }
            update_distances_timer.stop();

            if self.abstraction.num_states() % 1000 == 0 {
                info!(
                    "{}/{} states, {:?}/{} transitions",
                    self.abstraction.num_states(),
                    self.options.max_states,
                    self.abstraction.num_non_loop_transitions(),
                    self.options.max_transitions
                );
            }
        };

        info!("Done building abstraction.");
        info!("Time for building abstraction: {:.3}s", self.timer.elapsed().as_secs_f64());
        info!("Time for finding abstract traces: {:.3}s", find_trace_timer.elapsed().as_secs_f64());
        info!("Time for finding flaws: {:.3}s", find_flaw_timer.elapsed().as_secs_f64());
        info!("Time for splitting states: {:.3}s", refine_timer.elapsed().as_secs_f64());
        info!(
            "Time for updating goal distances: {:.3}s",
            update_distances_timer.elapsed().as_secs_f64()
        );
        info!("Number of refinements: {}", self.num_refinements);
        self.abstraction.print_statistics();
        self.flaw_search.print_statistics();

        self.finish(stop_reason)
    }

    fn finish(mut self, stop_reason: StopReason) -> CegarResult {
        let h_values: RefVec<StateId, i32> = (0..self.abstraction.num_states())
            .map(|index| {
                let state_id = StateId::from(index);
                match self.options.search_strategy {
                    SearchStrategy::Incremental => {
                        self.shortest_paths.as_ref().unwrap().h_value(state_id)
                    }
                    SearchStrategy::Astar => self.abstract_search.as_ref().unwrap().h_value(state_id),
                }
            })
            .collect();
        debug_assert!(stop_reason != StopReason::Unsolvable || h_values[StateId::from_u32(0)] == INF);

        let mut abstraction = self.abstraction;
        if self.options.transition_representation == TransitionRepresentation::TsThenSg {
            abstraction.switch_from_transition_system_to_successor_generators();
        }
        CegarResult {
            abstraction,
            h_values,
            concrete_solution: self.concrete_solution.take(),
            stop_reason,
            num_refinements: self.num_refinements,
        }
    }
}
