//! End-to-end refinement scenarios.

use std::sync::Arc;
use tessera_cegar::{
    build_abstraction, CartesianHeuristic, CegarOptions, SearchStrategy, StopReason,
};
use tessera_planning::task::{Operator, State, Variable};
use tessera_planning::{Fact, OpId, Task, VarId, INF};

fn variable(name: &str, domain_size: usize) -> Variable {
    Variable {
        name: name.to_string(),
        axiom_layer: -1,
        fact_names: (0..domain_size).map(|i| format!("Atom {name}({i})")).collect(),
    }
}

fn var(i: usize) -> VarId {
    VarId::from(i)
}

fn op(i: usize) -> OpId {
    OpId::from(i)
}

fn debug_options() -> CegarOptions {
    CegarOptions {
        debug: true,
        memory_padding_mb: 8,
        ..CegarOptions::default()
    }
}

/// One variable with domain {0,1}, one operator flipping it.
fn singleton_task() -> Task {
    Task::new(
        vec![variable("v", 2)],
        vec![Operator::from_facts(
            "flip",
            &[Fact::new(var(0), 0)],
            &[Fact::new(var(0), 1)],
            1,
        )],
        State::new(vec![0]),
        vec![Fact::new(var(0), 1)],
    )
}

/// Two variables with domain 10. Advancing the counter requires the second
/// variable to be synchronized first, so early abstract plans keep failing
/// their applicability checks.
fn synchronized_counter_task() -> Task {
    let mut operators = Vec::new();
    for i in 0..9 {
        operators.push(Operator::from_facts(
            &format!("step-{i}"),
            &[Fact::new(var(0), i), Fact::new(var(1), i)],
            &[Fact::new(var(0), i + 1)],
            1,
        ));
        operators.push(Operator::from_facts(
            &format!("sync-{i}"),
            &[Fact::new(var(1), i)],
            &[Fact::new(var(1), i + 1)],
            1,
        ));
    }
    Task::new(
        vec![variable("counter", 10), variable("sync", 10)],
        operators,
        State::new(vec![0, 0]),
        vec![Fact::new(var(0), 9)],
    )
}

#[test]
fn test_singleton_task_solved_in_one_iteration() {
    let result = build_abstraction(Arc::new(singleton_task()), &debug_options()).unwrap();
    assert_eq!(result.stop_reason, StopReason::SolutionFound);
    // The goal-fact split alone separates the two values.
    assert_eq!(result.abstraction.num_states(), 2);
    assert_eq!(result.num_refinements, 0);
    assert_eq!(result.h_of_initial_state(), 1);
    assert_eq!(result.concrete_solution, Some(vec![op(0)]));
}

#[test]
fn test_singleton_task_with_astar_strategy() {
    let options = CegarOptions {
        search_strategy: SearchStrategy::Astar,
        ..debug_options()
    };
    let result = build_abstraction(Arc::new(singleton_task()), &options).unwrap();
    assert_eq!(result.stop_reason, StopReason::SolutionFound);
    assert_eq!(result.concrete_solution, Some(vec![op(0)]));
    assert_eq!(result.h_of_initial_state(), 1);
}

#[test]
fn test_unsolvable_task() {
    let task = Task::new(
        vec![variable("v", 2)],
        vec![],
        State::new(vec![0]),
        vec![Fact::new(var(0), 1)],
    );
    let result = build_abstraction(Arc::new(task), &debug_options()).unwrap();
    assert_eq!(result.stop_reason, StopReason::Unsolvable);
    assert_eq!(result.h_of_initial_state(), INF);
    let heuristic = CartesianHeuristic::new(result);
    assert_eq!(heuristic.value(&State::new(vec![0])), INF);
    assert_eq!(heuristic.value(&State::new(vec![1])), 0);
}

#[test]
fn test_state_budget_halts_refinement() {
    let options = CegarOptions {
        max_states: 5,
        ..debug_options()
    };
    let result = build_abstraction(Arc::new(synchronized_counter_task()), &options).unwrap();
    assert_eq!(result.stop_reason, StopReason::MaxStates);
    assert_eq!(result.abstraction.num_states(), 5);
    let h = result.h_of_initial_state();
    assert!(h > 0 && h < INF);
}

#[test]
fn test_multiple_goal_facts_are_separated_before_the_loop() {
    let task = Task::new(
        vec![variable("a", 2), variable("b", 2), variable("c", 2)],
        vec![],
        State::new(vec![0, 0, 0]),
        vec![
            Fact::new(var(0), 1),
            Fact::new(var(1), 1),
            Fact::new(var(2), 1),
        ],
    );
    let options = CegarOptions {
        max_states: 4,
        ..debug_options()
    };
    let result = build_abstraction(Arc::new(task), &options).unwrap();
    // One state per goal-fact split plus the initial state.
    assert_eq!(result.abstraction.num_states(), 4);
    assert_eq!(result.abstraction.goals().len(), 1);
    assert_eq!(result.stop_reason, StopReason::MaxStates);
}

#[test]
fn test_zero_cost_operator_scaling() {
    let task = Task::new(
        vec![variable("v", 3)],
        vec![
            Operator::from_facts("free", &[Fact::new(var(0), 0)], &[Fact::new(var(0), 1)], 0),
            Operator::from_facts("paid", &[Fact::new(var(0), 1)], &[Fact::new(var(0), 2)], 3),
        ],
        State::new(vec![0]),
        vec![Fact::new(var(0), 2)],
    );
    let result = build_abstraction(Arc::new(task), &debug_options()).unwrap();
    assert_eq!(result.stop_reason, StopReason::SolutionFound);
    // The zero-cost step contributes nothing to the rounded-down h value.
    assert_eq!(result.h_of_initial_state(), 3);
    assert_eq!(result.concrete_solution, Some(vec![op(0), op(1)]));
}

#[test]
fn test_incremental_matches_recompute_over_a_full_run() {
    // With debug enabled, every incremental update is checked against a
    // Dijkstra recomputation from scratch; divergence panics.
    let options = CegarOptions {
        max_states: 40,
        ..debug_options()
    };
    let result = build_abstraction(Arc::new(synchronized_counter_task()), &options).unwrap();
    assert!(matches!(
        result.stop_reason,
        StopReason::SolutionFound | StopReason::MaxStates
    ));
}

#[test]
fn test_solution_is_executable_and_matches_h() {
    let result = build_abstraction(Arc::new(synchronized_counter_task()), &debug_options()).unwrap();
    assert_eq!(result.stop_reason, StopReason::SolutionFound);
    let task = synchronized_counter_task();
    let plan = result.concrete_solution.as_ref().unwrap();
    let mut state = task.initial_state.clone();
    let mut cost = 0;
    for &op_id in plan {
        let op = &task.operators[op_id];
        assert!(op.is_applicable(&state));
        state = state.successor(op);
        cost += op.cost;
    }
    assert!(task.is_goal_state(&state));
    // The traced plan follows f-optimal transitions, so its cost equals the
    // final abstract estimate of the initial state.
    assert_eq!(cost, result.h_of_initial_state());
}

#[test]
fn test_heuristic_is_admissible() {
    let task = synchronized_counter_task();
    let options = CegarOptions {
        max_states: 12,
        ..debug_options()
    };
    let result = build_abstraction(Arc::new(task.clone()), &options).unwrap();
    let heuristic = CartesianHeuristic::new(result);

    // Optimal goal distances for every concrete state, by backward search
    // over the complete (10 x 10) state space.
    let all_states: Vec<State> = (0..10)
        .flat_map(|a| (0..10).map(move |b| State::new(vec![a, b])))
        .collect();
    let index = |s: &State| (s.value(var(0)) * 10 + s.value(var(1))) as usize;
    let mut optimal = vec![i64::MAX; all_states.len()];
    for state in &all_states {
        if task.is_goal_state(state) {
            optimal[index(state)] = 0;
        }
    }
    // Bellman-Ford style relaxation; all costs are 1.
    for _ in 0..all_states.len() {
        for state in &all_states {
            for op in task.operators.values() {
                if op.is_applicable(state) {
                    let succ = state.successor(op);
                    if optimal[index(&succ)] != i64::MAX {
                        let through = optimal[index(&succ)] + op.cost as i64;
                        if through < optimal[index(state)] {
                            optimal[index(state)] = through;
                        }
                    }
                }
            }
        }
    }

    for state in &all_states {
        let h = heuristic.value(state);
        if optimal[index(state)] == i64::MAX {
            continue;
        }
        assert!(h != INF, "finite goal distance but infinite h for {state:?}");
        assert!(
            (h as i64) <= optimal[index(state)],
            "inadmissible h for {state:?}: {h} > {}",
            optimal[index(state)]
        );
    }
}

#[test]
fn test_hierarchy_partitions_concrete_states_and_preserves_goals() {
    let task = synchronized_counter_task();
    let options = CegarOptions {
        max_states: 10,
        ..debug_options()
    };
    let result = build_abstraction(Arc::new(task.clone()), &options).unwrap();
    let abstraction = &result.abstraction;
    let infos = abstraction.var_infos();

    for a in 0..10 {
        for b in 0..10 {
            let state = State::new(vec![a, b]);
            let mapped = abstraction.state_id_of_concrete(&state);
            let mut containing = Vec::new();
            for index in 0..abstraction.num_states() {
                let id = tessera_cegar::StateId::from(index);
                if abstraction.state(id).includes_concrete(infos, &state) {
                    containing.push(id);
                }
            }
            assert_eq!(containing, vec![mapped]);
            assert_eq!(
                task.is_goal_state(&state),
                abstraction.goals().contains(&mapped)
            );
        }
    }
}

#[test]
fn test_time_budget_of_zero_stops_immediately() {
    let options = CegarOptions {
        max_time: Some(std::time::Duration::from_secs(0)),
        ..debug_options()
    };
    let result = build_abstraction(Arc::new(synchronized_counter_task()), &options).unwrap();
    assert_eq!(result.stop_reason, StopReason::TimeLimit);
}
