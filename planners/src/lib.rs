//! Command-line front end for the Cartesian CEGAR engine: option parsing,
//! plan output and the exit-code protocol shared with the runner scripts.

use anyhow::{bail, Result};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use structopt::StructOpt;
use tessera_cegar::{
    build_abstraction, CegarOptions, OperatorOrdering, PickFlaw, PickSplit, SearchStrategy,
    StopReason, TransitionRepresentation,
};
use tessera_planning::{sas, OpId, Task, INF};
use tracing::{error, info};

/// Exit codes understood by the surrounding runner. The classical planner
/// convention: 0 for a plan, distinguished codes for unsolvability and each
/// exhausted resource.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum ExitCode {
    Success,
    SearchCriticalError,
    InputError,
    Unsolvable,
    UnsolvedIncomplete,
    OutOfMemory,
    OutOfTime,
}

impl ExitCode {
    pub fn code(self) -> i32 {
        match self {
            ExitCode::Success => 0,
            ExitCode::SearchCriticalError => 1,
            ExitCode::InputError => 2,
            ExitCode::Unsolvable => 11,
            ExitCode::UnsolvedIncomplete => 12,
            ExitCode::OutOfMemory => 22,
            ExitCode::OutOfTime => 23,
        }
    }
}

pub fn parse_search_strategy(value: &str) -> Result<SearchStrategy> {
    Ok(match value {
        "astar" => SearchStrategy::Astar,
        "incremental" => SearchStrategy::Incremental,
        _ => bail!("unknown search strategy `{value}` (expected astar|incremental)"),
    })
}

pub fn parse_transition_representation(value: &str) -> Result<TransitionRepresentation> {
    Ok(match value {
        "ts" => TransitionRepresentation::TS,
        "mt" => TransitionRepresentation::MT,
        "sg" => TransitionRepresentation::SG,
        "ts-then-sg" => TransitionRepresentation::TsThenSg,
        _ => bail!("unknown transition representation `{value}` (expected ts|mt|sg|ts-then-sg)"),
    })
}

pub fn parse_pick_flaw(value: &str) -> Result<PickFlaw> {
    Ok(match value {
        "random-h-single" => PickFlaw::RandomHSingle,
        "min-h-single" => PickFlaw::MinHSingle,
        "max-h-single" => PickFlaw::MaxHSingle,
        "min-h-batch" => PickFlaw::MinHBatch,
        "min-h-batch-max-cover" => PickFlaw::MinHBatchMaxCover,
        _ => bail!("unknown flaw strategy `{value}`"),
    })
}

pub fn parse_pick_split(value: &str) -> Result<PickSplit> {
    Ok(match value {
        "random" => PickSplit::Random,
        "min-unwanted" => PickSplit::MinUnwanted,
        "max-unwanted" => PickSplit::MaxUnwanted,
        "min-refined" => PickSplit::MinRefined,
        "max-refined" => PickSplit::MaxRefined,
        "min-hadd" => PickSplit::MinHadd,
        "max-hadd" => PickSplit::MaxHadd,
        "min-cg-level" => PickSplit::MinCgLevel,
        "max-cg-level" => PickSplit::MaxCgLevel,
        _ => bail!("unknown split strategy `{value}`"),
    })
}

pub fn parse_operator_ordering(value: &str) -> Result<OperatorOrdering> {
    Ok(match value {
        "random" => OperatorOrdering::Random,
        "id-up" => OperatorOrdering::IdUp,
        "id-down" => OperatorOrdering::IdDown,
        "cost-up" => OperatorOrdering::CostUp,
        "cost-down" => OperatorOrdering::CostDown,
        "postconditions-up" => OperatorOrdering::PostconditionsUp,
        "postconditions-down" => OperatorOrdering::PostconditionsDown,
        "layer-up" => OperatorOrdering::LayerUp,
        "layer-down" => OperatorOrdering::LayerDown,
        "hadd-up" => OperatorOrdering::HaddUp,
        "hadd-down" => OperatorOrdering::HaddDown,
        "steps-up" => OperatorOrdering::StepsUp,
        "steps-down" => OperatorOrdering::StepsDown,
        "fixed" => OperatorOrdering::Fixed,
        _ => bail!("unknown operator ordering `{value}`"),
    })
}

/// Builds Cartesian abstractions for SAS⁺ tasks by counterexample-guided
/// refinement and reports the first concrete plan the refinement finds.
#[derive(Debug, StructOpt)]
#[structopt(name = "tessera", rename_all = "kebab-case")]
pub struct Opt {
    /// Path to the preprocessed SAS⁺ task.
    pub task: PathBuf,
    /// If set, the plan is also written to this file.
    #[structopt(long = "plan-file", short = "o")]
    pub plan_file: Option<PathBuf>,
    /// Maximum number of abstract states.
    #[structopt(long, default_value = "18446744073709551615")]
    pub max_states: usize,
    /// Maximum number of non-loop transitions (explicit representation only).
    #[structopt(long, default_value = "18446744073709551615")]
    pub max_transitions: usize,
    /// Wall-clock budget for the refinement loop, in seconds.
    #[structopt(long)]
    pub max_time: Option<f64>,
    #[structopt(long, default_value = "max-refined", parse(try_from_str = parse_pick_split))]
    pub pick_split: PickSplit,
    #[structopt(long, default_value = "min-h-single", parse(try_from_str = parse_pick_flaw))]
    pub pick_flaw: PickFlaw,
    #[structopt(long, default_value = "incremental", parse(try_from_str = parse_search_strategy))]
    pub search_strategy: SearchStrategy,
    #[structopt(long, default_value = "ts", parse(try_from_str = parse_transition_representation))]
    pub transition_repr: TransitionRepresentation,
    #[structopt(long, default_value = "id-up", parse(try_from_str = parse_operator_ordering))]
    pub op_order: OperatorOrdering,
    /// Tie-break ordering; must not be random.
    #[structopt(long, default_value = "id-up", parse(try_from_str = parse_operator_ordering))]
    pub op_tiebreak: OperatorOrdering,
    /// Enable the expensive internal cross-checks.
    #[structopt(long)]
    pub debug: bool,
    #[structopt(long, default_value = "2018")]
    pub random_seed: u64,
    /// Memory padding reserved up front, in MB.
    #[structopt(long, default_value = "75")]
    pub memory_padding: usize,
}

impl Opt {
    pub fn cegar_options(&self) -> CegarOptions {
        CegarOptions {
            max_states: self.max_states,
            max_transitions: self.max_transitions,
            max_time: self.max_time.map(Duration::from_secs_f64),
            pick_split: self.pick_split,
            pick_flaw: self.pick_flaw,
            search_strategy: self.search_strategy,
            transition_representation: self.transition_repr,
            operator_order: self.op_order,
            operator_tiebreak: self.op_tiebreak,
            debug: self.debug,
            random_seed: self.random_seed,
            memory_padding_mb: self.memory_padding,
        }
    }
}

/// Replays the plan on the task and returns its cost, or an error naming
/// the first step that is not applicable or the missing goal.
pub fn validate_plan(task: &Task, plan: &[OpId]) -> Result<i64> {
    let mut state = task.initial_state.clone();
    let mut cost = 0i64;
    for (step, &op_id) in plan.iter().enumerate() {
        let op = &task.operators[op_id];
        if !op.is_applicable(&state) {
            bail!("step {step} ({}) is not applicable", op.name);
        }
        state = state.successor(op);
        cost += op.cost as i64;
    }
    if !task.is_goal_state(&state) {
        bail!("plan does not end in a goal state");
    }
    Ok(cost)
}

pub fn format_plan(task: &Task, plan: &[OpId]) -> String {
    let mut out = String::new();
    let mut cost = 0i64;
    for &op_id in plan {
        let op = &task.operators[op_id];
        writeln!(out, "({})", op.name).unwrap();
        cost += op.cost as i64;
    }
    let metric = if task.metric { "general cost" } else { "unit cost" };
    writeln!(out, "; cost = {cost} ({metric})").unwrap();
    out
}

pub fn run(opt: &Opt) -> ExitCode {
    let task = match sas::load_task(&opt.task) {
        Ok(task) => Arc::new(task),
        Err(err) => {
            error!("failed to read task {}: {err}", opt.task.display());
            return ExitCode::InputError;
        }
    };
    info!(
        "Loaded task: {} variables, {} operators",
        task.num_variables(),
        task.num_operators()
    );

    let result = match build_abstraction(Arc::clone(&task), &opt.cegar_options()) {
        Ok(result) => result,
        Err(err) => {
            error!("{err}");
            return ExitCode::SearchCriticalError;
        }
    };

    let h_init = result.h_of_initial_state();
    if h_init == INF {
        info!("Initial h value: infinity");
    } else {
        info!("Initial h value: {h_init}");
    }

    match result.stop_reason {
        StopReason::SolutionFound => {
            let plan = result.concrete_solution.as_deref().unwrap_or(&[]);
            match validate_plan(&task, plan) {
                Ok(cost) => info!("Plan length: {} step(s), plan cost: {cost}", plan.len()),
                Err(err) => {
                    error!("refinement returned an invalid plan: {err}");
                    return ExitCode::SearchCriticalError;
                }
            }
            let formatted = format_plan(&task, plan);
            print!("{formatted}");
            if let Some(plan_file) = &opt.plan_file {
                if let Err(err) = write_plan_file(plan_file, &formatted) {
                    error!("failed to write plan file: {err}");
                    return ExitCode::SearchCriticalError;
                }
            }
            ExitCode::Success
        }
        StopReason::Unsolvable => {
            info!("Task is unsolvable.");
            ExitCode::Unsolvable
        }
        StopReason::MaxStates | StopReason::MaxTransitions => ExitCode::UnsolvedIncomplete,
        StopReason::TimeLimit => ExitCode::OutOfTime,
        StopReason::MemoryLimit => ExitCode::OutOfMemory,
    }
}

fn write_plan_file(path: &Path, content: &str) -> std::io::Result<()> {
    std::fs::write(path, content)
}
