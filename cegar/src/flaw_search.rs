//! Finds out where the current abstract plan breaks in the concrete state
//! space and turns the mismatch into a split request.
//!
//! In incremental mode the search fans out over all concrete states
//! reachable along f-optimal abstract transitions (the wildcard variants of
//! the abstract plan), collecting flawed states per abstract state. In A*
//! mode a single trace of the given plan is checked. Concrete states stay
//! unregistered: all bookkeeping is dropped when the call returns.

use crate::abstraction::Abstraction;
use crate::cartesian_set::CartesianSet;
use crate::shortest_paths::ShortestPaths;
use crate::split_selector::{PickSplit, Split, SplitSelector};
use crate::types::{Solution, StateId};
use rand::prelude::*;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tessera_collections::heap::LazyHeap;
use tessera_planning::{OpId, State, Task};
use tessera_utils::memory::MemoryPadding;
use tessera_utils::timer::CountdownTimer;
use tracing::debug;

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum PickFlaw {
    /// A random flawed abstract state, first flaw.
    RandomHSingle,
    /// The flawed abstract state with the smallest h, first flaw.
    MinHSingle,
    /// The flawed abstract state with the largest h, first flaw.
    MaxHSingle,
    /// All concrete states at the min-h abstract state, first flaw.
    MinHBatch,
    /// All concrete states at the min-h abstract state, split covering most.
    MinHBatchMaxCover,
}

/// A point where the abstract plan fails concretely, together with the
/// Cartesian set we would have liked to reach.
pub struct Flaw {
    pub concrete_state: State,
    pub state_id: StateId,
    pub desired: CartesianSet,
}

impl Flaw {
    /// One candidate split per variable on which the concrete state misses
    /// the desired set: the wanted values are those the abstract state and
    /// the desired set share.
    pub fn possible_splits(&self, abstraction: &Abstraction) -> Vec<Split> {
        let infos = abstraction.var_infos();
        let abstract_state = abstraction.state(self.state_id);
        let mut splits = Vec::new();
        for fact in self.concrete_state.facts() {
            if !self.desired.test(infos, fact.var, fact.value) {
                let wanted: Vec<i32> = (0..infos.domain_size(fact.var))
                    .filter(|&value| {
                        abstract_state.contains(infos, fact.var, value)
                            && self.desired.test(infos, fact.var, value)
                    })
                    .collect();
                debug_assert!(!wanted.is_empty());
                splits.push(Split {
                    state_id: self.state_id,
                    var: fact.var,
                    values: wanted,
                });
            }
        }
        debug_assert!(!splits.is_empty());
        splits
    }
}

pub enum FlawSearchOutcome {
    /// The next refinement to perform.
    Split(Split),
    /// The abstract plan works concretely; here is the operator sequence.
    ConcreteSolutionFound(Vec<OpId>),
    /// A budget expired mid-search.
    Interrupted,
}

struct SearchNode {
    state: State,
    g: i32,
    parent: Option<(OpId, usize)>,
    closed: bool,
}

pub struct FlawSearch {
    task: Arc<Task>,
    pick_flaw: PickFlaw,
    split_selector: SplitSelector,
    rng: StdRng,
    num_searches: usize,
    num_expansions: usize,
}

impl FlawSearch {
    pub fn new(task: Arc<Task>, pick_flaw: PickFlaw, pick_split: PickSplit, seed: u64) -> Self {
        let split_selector = SplitSelector::new(&task, pick_split);
        FlawSearch {
            task,
            pick_flaw,
            split_selector,
            rng: StdRng::seed_from_u64(seed),
            num_searches: 0,
            num_expansions: 0,
        }
    }

    /// Explores the concrete states reachable along f-optimal abstract
    /// transitions and refines one of the flaws found, as configured.
    pub fn search_for_split(
        &mut self,
        abstraction: &Abstraction,
        shortest_paths: &ShortestPaths,
        timer: &CountdownTimer,
        memory: &MemoryPadding,
    ) -> FlawSearchOutcome {
        self.num_searches += 1;
        let task = Arc::clone(&self.task);

        let mut arena: Vec<SearchNode> = Vec::new();
        let mut ids: HashMap<State, usize> = HashMap::new();
        let mut open: LazyHeap<i32, usize> = LazyHeap::new();
        let mut flawed: BTreeMap<StateId, Vec<usize>> = BTreeMap::new();

        let initial = task.initial_state.clone();
        ids.insert(initial.clone(), 0);
        arena.push(SearchNode {
            state: initial,
            g: 0,
            parent: None,
            closed: false,
        });
        open.push(0, 0);

        while let Some((g, index)) = open.pop() {
            if arena[index].closed || g > arena[index].g {
                continue;
            }
            arena[index].closed = true;
            self.num_expansions += 1;
            if timer.is_expired() || !memory.is_reserved() {
                return FlawSearchOutcome::Interrupted;
            }

            let state = arena[index].state.clone();
            if task.is_goal_state(&state) {
                return FlawSearchOutcome::ConcreteSolutionFound(extract_plan(&arena, index));
            }
            let abstract_id = abstraction.state_id_of_concrete(&state);

            let mut has_flaw = false;
            if abstraction.goals().contains(&abstract_id) {
                // An abstract goal state whose concrete state misses the goal.
                has_flaw = true;
            } else {
                for t in abstraction.outgoing_transitions(abstract_id) {
                    if !shortest_paths.is_optimal_transition(abstract_id, t) {
                        continue;
                    }
                    let op = &task.operators[t.op];
                    if !op.is_applicable(&state) {
                        has_flaw = true;
                        continue;
                    }
                    let successor = state.successor(op);
                    if abstraction.state_id_of_concrete(&successor) != t.target {
                        has_flaw = true;
                        continue;
                    }
                    let successor_g = g + op.cost;
                    match ids.get(&successor).copied() {
                        None => {
                            let successor_index = arena.len();
                            ids.insert(successor.clone(), successor_index);
                            arena.push(SearchNode {
                                state: successor,
                                g: successor_g,
                                parent: Some((t.op, index)),
                                closed: false,
                            });
                            open.push(successor_g, successor_index);
                        }
                        Some(successor_index) => {
                            let node = &mut arena[successor_index];
                            if !node.closed && successor_g < node.g {
                                node.g = successor_g;
                                node.parent = Some((t.op, index));
                                open.push(successor_g, successor_index);
                            }
                        }
                    }
                }
            }
            if has_flaw {
                debug!("found flawed concrete state in abstract state {abstract_id}");
                flawed.entry(abstract_id).or_default().push(index);
            }
        }

        if flawed.is_empty() {
            // Only reachable when a budget check raced with the search.
            return FlawSearchOutcome::Interrupted;
        }
        self.pick_split_from_flawed(abstraction, shortest_paths, &arena, &flawed)
    }

    fn pick_split_from_flawed(
        &mut self,
        abstraction: &Abstraction,
        shortest_paths: &ShortestPaths,
        arena: &[SearchNode],
        flawed: &BTreeMap<StateId, Vec<usize>>,
    ) -> FlawSearchOutcome {
        let chosen_abstract = match self.pick_flaw {
            PickFlaw::RandomHSingle => {
                let keys: Vec<StateId> = flawed.keys().copied().collect();
                keys[self.rng.gen_range(0..keys.len())]
            }
            PickFlaw::MinHSingle | PickFlaw::MinHBatch | PickFlaw::MinHBatchMaxCover => flawed
                .keys()
                .copied()
                .min_by_key(|&id| shortest_paths.goal_distance(id))
                .unwrap(),
            PickFlaw::MaxHSingle => flawed
                .keys()
                .copied()
                .max_by_key(|&id| shortest_paths.goal_distance(id))
                .unwrap(),
        };
        let batch = &flawed[&chosen_abstract];

        let split = match self.pick_flaw {
            PickFlaw::MinHBatchMaxCover => {
                let candidate_splits: Vec<Split> = batch
                    .iter()
                    .flat_map(|&index| {
                        self.create_flaw(abstraction, shortest_paths, &arena[index].state, chosen_abstract)
                            .possible_splits(abstraction)
                    })
                    .collect();
                let cover = |split: &Split| {
                    batch
                        .iter()
                        .filter(|&&index| !split.values.contains(&arena[index].state.value(split.var)))
                        .count()
                };
                candidate_splits
                    .into_iter()
                    .max_by_key(cover)
                    .expect("batch without splits")
            }
            _ => {
                let first = batch[0];
                let flaw = self.create_flaw(abstraction, shortest_paths, &arena[first].state, chosen_abstract);
                let splits = flaw.possible_splits(abstraction);
                self.split_selector.pick_split(
                    abstraction.state(chosen_abstract),
                    abstraction.var_infos(),
                    splits,
                    &mut self.rng,
                )
            }
        };
        self.split_selector.note_split(split.var);
        FlawSearchOutcome::Split(split)
    }

    /// Reconstructs the first flaw of a concrete state recorded as flawed.
    fn create_flaw(
        &self,
        abstraction: &Abstraction,
        shortest_paths: &ShortestPaths,
        state: &State,
        abstract_id: StateId,
    ) -> Flaw {
        let infos = abstraction.var_infos();
        if abstraction.goals().contains(&abstract_id) {
            return Flaw {
                concrete_state: state.clone(),
                state_id: abstract_id,
                desired: CartesianSet::from_facts(infos, &self.task.goals),
            };
        }
        for t in abstraction.outgoing_transitions(abstract_id) {
            if !shortest_paths.is_optimal_transition(abstract_id, t) {
                continue;
            }
            let op = &self.task.operators[t.op];
            if !op.is_applicable(state) {
                return Flaw {
                    concrete_state: state.clone(),
                    state_id: abstract_id,
                    desired: CartesianSet::from_facts(infos, op.preconditions()),
                };
            }
            let successor = state.successor(op);
            if abstraction.state_id_of_concrete(&successor) != t.target {
                return Flaw {
                    concrete_state: state.clone(),
                    state_id: abstract_id,
                    desired: abstraction.state(t.target).regress(infos, op),
                };
            }
        }
        panic!("state recorded as flawed has no flaw");
    }

    /// Checks a single trace of the abstract plan and refines its first
    /// flaw. Used by the A* search strategy.
    pub fn trace_for_split(
        &mut self,
        abstraction: &Abstraction,
        solution: &Solution,
        timer: &CountdownTimer,
    ) -> FlawSearchOutcome {
        self.num_searches += 1;
        let task = Arc::clone(&self.task);
        let infos = abstraction.var_infos();

        let mut abstract_id = abstraction.init_id();
        let mut concrete = task.initial_state.clone();
        let mut plan = Vec::new();

        for &t in solution {
            if timer.is_expired() {
                return FlawSearchOutcome::Interrupted;
            }
            let op = &task.operators[t.op];
            if !op.is_applicable(&concrete) {
                debug!("operator {} not applicable", op.name);
                let flaw = Flaw {
                    desired: CartesianSet::from_facts(infos, op.preconditions()),
                    concrete_state: concrete,
                    state_id: abstract_id,
                };
                return self.split_for_flaw(abstraction, &flaw);
            }
            let next_concrete = concrete.successor(op);
            let next_abstract = abstraction.state(t.target);
            if !next_abstract.includes_concrete(infos, &next_concrete) {
                debug!("paths deviate at abstract state {abstract_id}");
                let flaw = Flaw {
                    desired: next_abstract.regress(infos, op),
                    concrete_state: concrete,
                    state_id: abstract_id,
                };
                return self.split_for_flaw(abstraction, &flaw);
            }
            plan.push(t.op);
            abstract_id = t.target;
            concrete = next_concrete;
        }

        if !task.is_goal_state(&concrete) {
            debug!("goal test failed in abstract state {abstract_id}");
            let flaw = Flaw {
                desired: CartesianSet::from_facts(infos, &task.goals),
                concrete_state: concrete,
                state_id: abstract_id,
            };
            return self.split_for_flaw(abstraction, &flaw);
        }
        FlawSearchOutcome::ConcreteSolutionFound(plan)
    }

    fn split_for_flaw(&mut self, abstraction: &Abstraction, flaw: &Flaw) -> FlawSearchOutcome {
        let splits = flaw.possible_splits(abstraction);
        let split = self.split_selector.pick_split(
            abstraction.state(flaw.state_id),
            abstraction.var_infos(),
            splits,
            &mut self.rng,
        );
        self.split_selector.note_split(split.var);
        FlawSearchOutcome::Split(split)
    }

    pub fn print_statistics(&self) {
        tracing::info!("Flaw searches: {}", self.num_searches);
        tracing::info!("Expanded concrete states: {}", self.num_expansions);
    }
}

fn extract_plan(arena: &[SearchNode], goal_index: usize) -> Vec<OpId> {
    let mut plan = Vec::new();
    let mut index = goal_index;
    while let Some((op, parent)) = arena[index].parent {
        plan.push(op);
        index = parent;
    }
    plan.reverse();
    plan
}
