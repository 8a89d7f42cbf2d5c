//! Every flaw strategy, split strategy, search strategy, transition
//! representation and operator ordering must drive the loop to a valid
//! concrete plan; in debug mode the internal cross-checks run throughout.

use std::sync::Arc;
use tessera_cegar::{
    build_abstraction, CegarOptions, OperatorOrdering, PickFlaw, PickSplit, SearchStrategy,
    StopReason, TransitionRepresentation,
};
use tessera_planning::task::{Operator, State, Variable};
use tessera_planning::{Fact, Task, VarId};

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

/// A counter that must be synchronized by a second variable, with a couple
/// of detours so that different strategies take different refinement paths.
fn gated_counter_task() -> Task {
    let mut operators = Vec::new();
    for i in 0..5 {
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
    // A cheap-looking jump that needs the synchronizer at its top value.
    operators.push(Operator::from_facts(
        "jump",
        &[Fact::new(var(1), 5)],
        &[Fact::new(var(0), 5)],
        2,
    ));
    Task::new(
        vec![variable("counter", 6), variable("sync", 6)],
        operators,
        State::new(vec![0, 0]),
        vec![Fact::new(var(0), 5)],
    )
}

fn run_config(options: CegarOptions) {
    let task = Arc::new(gated_counter_task());
    let label = format!(
        "{:?}/{:?}/{:?}/{:?}/{:?}",
        options.search_strategy,
        options.transition_representation,
        options.pick_flaw,
        options.pick_split,
        options.operator_order
    );
    let result = build_abstraction(Arc::clone(&task), &options)
        .unwrap_or_else(|err| panic!("{label}: {err}"));
    assert_eq!(result.stop_reason, StopReason::SolutionFound, "{label}");
    let plan = result.concrete_solution.as_ref().unwrap();
    let mut state = task.initial_state.clone();
    for &op_id in plan {
        let op = &task.operators[op_id];
        assert!(op.is_applicable(&state), "{label}: inapplicable step");
        state = state.successor(op);
    }
    assert!(task.is_goal_state(&state), "{label}: plan misses the goal");
}

fn base_options() -> CegarOptions {
    CegarOptions {
        debug: true,
        memory_padding_mb: 8,
        ..CegarOptions::default()
    }
}

#[test]
fn test_all_flaw_strategies_reach_a_plan() {
    for pick_flaw in [
        PickFlaw::RandomHSingle,
        PickFlaw::MinHSingle,
        PickFlaw::MaxHSingle,
        PickFlaw::MinHBatch,
        PickFlaw::MinHBatchMaxCover,
    ] {
        run_config(CegarOptions {
            pick_flaw,
            ..base_options()
        });
    }
}

#[test]
fn test_all_split_strategies_reach_a_plan() {
    for pick_split in [
        PickSplit::Random,
        PickSplit::MinUnwanted,
        PickSplit::MaxUnwanted,
        PickSplit::MinRefined,
        PickSplit::MaxRefined,
        PickSplit::MinHadd,
        PickSplit::MaxHadd,
        PickSplit::MinCgLevel,
        PickSplit::MaxCgLevel,
    ] {
        run_config(CegarOptions {
            pick_split,
            ..base_options()
        });
    }
}

#[test]
fn test_all_transition_representations_reach_a_plan() {
    for transition_representation in [
        TransitionRepresentation::TS,
        TransitionRepresentation::MT,
        TransitionRepresentation::SG,
        TransitionRepresentation::TsThenSg,
    ] {
        run_config(CegarOptions {
            transition_representation,
            ..base_options()
        });
    }
}

#[test]
fn test_astar_strategy_across_representations() {
    for transition_representation in [
        TransitionRepresentation::TS,
        TransitionRepresentation::MT,
        TransitionRepresentation::SG,
    ] {
        run_config(CegarOptions {
            search_strategy: SearchStrategy::Astar,
            transition_representation,
            ..base_options()
        });
    }
}

#[test]
fn test_operator_orderings_reach_a_plan() {
    for operator_order in [
        OperatorOrdering::Random,
        OperatorOrdering::IdDown,
        OperatorOrdering::CostUp,
        OperatorOrdering::CostDown,
        OperatorOrdering::PostconditionsUp,
        OperatorOrdering::PostconditionsDown,
        OperatorOrdering::LayerUp,
        OperatorOrdering::LayerDown,
        OperatorOrdering::HaddUp,
        OperatorOrdering::HaddDown,
        OperatorOrdering::StepsUp,
        OperatorOrdering::StepsDown,
        OperatorOrdering::Fixed,
    ] {
        // The lazy oracles are the ones that apply the ordering.
        run_config(CegarOptions {
            transition_representation: TransitionRepresentation::MT,
            operator_order,
            ..base_options()
        });
    }
}

#[test]
fn test_same_seed_gives_same_refinement_sequence() {
    let options = CegarOptions {
        pick_flaw: PickFlaw::RandomHSingle,
        pick_split: PickSplit::Random,
        operator_order: OperatorOrdering::Random,
        ..base_options()
    };
    let task = Arc::new(gated_counter_task());
    let first = build_abstraction(Arc::clone(&task), &options).unwrap();
    let second = build_abstraction(Arc::clone(&task), &options).unwrap();
    assert_eq!(first.num_refinements, second.num_refinements);
    assert_eq!(first.concrete_solution, second.concrete_solution);
    assert_eq!(first.h_of_initial_state(), second.h_of_initial_state());
}

#[test]
fn test_random_tiebreak_is_rejected() {
    let options = CegarOptions {
        operator_tiebreak: OperatorOrdering::Random,
        ..base_options()
    };
    assert!(build_abstraction(Arc::new(gated_counter_task()), &options).is_err());
}
