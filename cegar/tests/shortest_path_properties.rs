//! Distance properties over manual refinement sequences.

use std::sync::Arc;
use tessera_cegar::shortest_paths::ShortestPaths;
use tessera_cegar::{Abstraction, OperatorOrdering, StateId, TransitionRepresentation};
use tessera_planning::task::{Operator, State, Variable};
use tessera_planning::{Fact, Task, VarId, INF};

fn variable(domain_size: usize) -> Variable {
    Variable {
        name: "v".to_string(),
        axiom_layer: -1,
        fact_names: (0..domain_size).map(|i| format!("Atom v({i})")).collect(),
    }
}

fn var(i: usize) -> VarId {
    VarId::from(i)
}

/// A single counter with unit steps: h-values are exact path lengths once
/// the abstraction is fully refined.
fn chain_task(domain_size: usize) -> Task {
    let operators = (0..domain_size - 1)
        .map(|i| {
            Operator::from_facts(
                &format!("step-{i}"),
                &[Fact::new(var(0), i as i32)],
                &[Fact::new(var(0), i as i32 + 1)],
                1,
            )
        })
        .collect();
    Task::new(
        vec![variable(domain_size)],
        operators,
        State::new(vec![0]),
        vec![Fact::new(var(0), domain_size as i32 - 1)],
    )
}

fn h_values(abstraction: &Abstraction, costs: Vec<i32>) -> Vec<i32> {
    let mut shortest_paths = ShortestPaths::new(costs);
    shortest_paths.recompute(abstraction, abstraction.goals());
    (0..abstraction.num_states())
        .map(|index| shortest_paths.h_value(StateId::from(index)))
        .collect()
}

#[test]
fn test_h_grows_monotonically_under_refinement() {
    let task = Arc::new(chain_task(6));
    let costs: Vec<i32> = task.operators.values().map(|op| op.cost).collect();
    let mut abstraction = Abstraction::new(
        Arc::clone(&task),
        TransitionRepresentation::TS,
        OperatorOrdering::IdUp,
        OperatorOrdering::IdUp,
        2018,
        false,
    );
    // Separate the goal fact, then keep splitting single values off.
    abstraction.refine(StateId::from(0usize), var(0), &[5]);
    for value in [0, 1, 2, 3] {
        let before = h_values(&abstraction, costs.clone());
        let infos = abstraction.var_infos();
        let splittable = (0..abstraction.num_states())
            .map(StateId::from)
            .find(|&id| {
                abstraction
                    .state(id)
                    .cartesian_set()
                    .values(infos, var(0))
                    .any(|v| v == value)
                    && abstraction.state(id).cartesian_set().count(infos, var(0)) > 1
            })
            .unwrap();
        let (v1, v2) = abstraction.refine(splittable, var(0), &[value]);
        let after = h_values(&abstraction, costs.clone());
        let parent_h = before[usize::from(splittable.min(v1).min(v2))];
        assert!(after[usize::from(v1)] >= parent_h);
        assert!(after[usize::from(v2)] >= parent_h);
        // Untouched states keep or raise their estimate, never lower it.
        for index in 0..before.len() {
            if StateId::from(index) != v1 && StateId::from(index) != v2 {
                assert!(after[index] >= before[index]);
            }
        }
    }
    // Fully refined: exact distances.
    let exact = h_values(&abstraction, costs);
    let infos = abstraction.var_infos();
    for index in 0..abstraction.num_states() {
        let id = StateId::from(index);
        let values: Vec<i32> = abstraction.state(id).cartesian_set().values(infos, var(0)).collect();
        assert_eq!(values.len(), 1);
        assert_eq!(exact[index], 5 - values[0]);
    }
}

#[test]
fn test_unreachable_region_has_infinite_h() {
    // Steps only go up, so value 0 is unreachable from anywhere else and the
    // goal is unreachable from the region above it after removing the top.
    let operators = vec![Operator::from_facts(
        "up",
        &[Fact::new(var(0), 0)],
        &[Fact::new(var(0), 1)],
        1,
    )];
    let task = Arc::new(Task::new(
        vec![variable(3)],
        operators,
        State::new(vec![0]),
        vec![Fact::new(var(0), 1)],
    ));
    let mut abstraction = Abstraction::new(
        Arc::clone(&task),
        TransitionRepresentation::TS,
        OperatorOrdering::IdUp,
        OperatorOrdering::IdUp,
        2018,
        false,
    );
    abstraction.refine(StateId::from(0usize), var(0), &[1]);
    let costs: Vec<i32> = task.operators.values().map(|op| op.cost).collect();
    let mut shortest_paths = ShortestPaths::new(costs);
    shortest_paths.recompute(&abstraction, abstraction.goals());

    // The non-goal region {0, 2} reaches the goal through "up".
    assert_eq!(shortest_paths.h_value(StateId::from(0usize)), 1);
    // Splitting off value 2 strands it: no operator leaves it.
    let (v1, v2) = abstraction.refine(StateId::from(0usize), var(0), &[2]);
    shortest_paths.recompute(&abstraction, abstraction.goals());
    let stranded = if abstraction
        .state(v1)
        .cartesian_set()
        .values(abstraction.var_infos(), var(0))
        .eq([2])
    {
        v1
    } else {
        v2
    };
    assert_eq!(shortest_paths.h_value(stranded), INF);
    assert!(shortest_paths
        .extract_solution(abstraction.init_id(), abstraction.goals())
        .is_some());
}
