//! Additive heuristic over the delete relaxation of a SAS⁺ task, together
//! with the relaxed-reachability layers used for operator ordering.

use crate::task::{Fact, OpId, Task, INF};
use fixedbitset::FixedBitSet;
use tessera_collections::ref_store::RefVec;
use tracing::warn;

/// Costs of reaching facts and applying operators in the delete relaxation,
/// measured from the task's initial state.
pub struct HAdd {
    fact_costs: RefVec<crate::task::VarId, Vec<i32>>,
    op_costs: RefVec<OpId, i32>,
}

impl HAdd {
    /// h^add cost of reaching the fact; `INF` if relaxed-unreachable.
    pub fn fact_cost(&self, fact: Fact) -> i32 {
        self.fact_costs[fact.var][fact.value as usize]
    }

    /// Cost of the operator's preconditions plus its own cost.
    pub fn operator_cost(&self, op: OpId) -> i32 {
        self.op_costs[op]
    }
}

fn add_costs(a: i32, b: i32) -> i32 {
    if a == INF || b == INF {
        INF
    } else {
        ((a as i64 + b as i64).min((INF - 1) as i64)) as i32
    }
}

/// Computes h^add fact and operator costs by a fixpoint over the relaxed
/// task. With `unit_costs`, every operator counts 1 instead of its cost.
pub fn compute_hadd(task: &Task, unit_costs: bool) -> HAdd {
    let mut fact_costs: RefVec<crate::task::VarId, Vec<i32>> = task
        .variables
        .values()
        .map(|v| vec![INF; v.domain_size() as usize])
        .collect();
    for fact in task.initial_state.facts() {
        fact_costs[fact.var][fact.value as usize] = 0;
    }
    let mut op_costs: RefVec<OpId, i32> = RefVec::with_values(task.num_operators(), INF);

    let mut changed = true;
    while changed {
        changed = false;
        for (op_id, op) in task.operators.entries() {
            let op_cost = if unit_costs { 1 } else { op.cost };
            if op_cost == INF {
                continue;
            }
            let mut pre_cost = 0;
            for pre in op.preconditions() {
                pre_cost = add_costs(pre_cost, fact_costs[pre.var][pre.value as usize]);
                if pre_cost == INF {
                    break;
                }
            }
            if pre_cost == INF {
                continue;
            }
            let total = add_costs(pre_cost, op_cost);
            if total < op_costs[op_id] {
                op_costs[op_id] = total;
                changed = true;
            }
            for eff in op.effects() {
                if total < fact_costs[eff.var][eff.value as usize] {
                    fact_costs[eff.var][eff.value as usize] = total;
                    changed = true;
                }
            }
        }
    }
    HAdd { fact_costs, op_costs }
}

/// For each operator, the BFS level of the delete-relaxation fixpoint at
/// which it first becomes applicable; `INF` for relaxed-unreachable
/// operators.
pub fn compute_relaxed_operator_layers(task: &Task) -> RefVec<OpId, i32> {
    let num_facts = task.num_facts();
    let fact_index = |fact: Fact| task.fact_offset(fact.var) + fact.value as usize;

    let mut layers: RefVec<OpId, i32> = RefVec::with_values(task.num_operators(), INF);
    let mut reached = FixedBitSet::with_capacity(num_facts);
    for fact in task.initial_state.facts() {
        reached.insert(fact_index(fact));
    }

    let mut layer = 0;
    loop {
        let mut new_facts = Vec::new();
        let mut new_ops_applicable = false;
        for (op_id, op) in task.operators.entries() {
            if layers[op_id] == INF && op.preconditions().iter().all(|&p| reached.contains(fact_index(p))) {
                layers[op_id] = layer;
                new_ops_applicable = true;
                for &eff in op.effects() {
                    new_facts.push(fact_index(eff));
                }
            }
        }
        if !new_ops_applicable {
            break;
        }
        for fact in new_facts {
            reached.insert(fact);
        }
        layer += 1;
    }
    if layers.values().any(|&l| l == INF) {
        warn!("task contains a relaxed-unreachable operator");
    }
    layers
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::task::{Operator, State, VarId, Variable};

    fn variable(domain_size: usize) -> Variable {
        Variable {
            name: "v".to_string(),
            axiom_layer: -1,
            fact_names: (0..domain_size).map(|i| format!("Atom v({i})")).collect(),
        }
    }

    fn chain_task() -> Task {
        // One variable with domain {0,1,2}; two chained operators 0->1->2.
        let v = VarId::from(0usize);
        Task::new(
            vec![variable(3)],
            vec![
                Operator::from_facts("step1", &[Fact::new(v, 0)], &[Fact::new(v, 1)], 2),
                Operator::from_facts("step2", &[Fact::new(v, 1)], &[Fact::new(v, 2)], 3),
            ],
            State::new(vec![0]),
            vec![Fact::new(v, 2)],
        )
    }

    #[test]
    fn test_hadd_chain() {
        let task = chain_task();
        let hadd = compute_hadd(&task, false);
        let v = VarId::from(0usize);
        assert_eq!(hadd.fact_cost(Fact::new(v, 0)), 0);
        assert_eq!(hadd.fact_cost(Fact::new(v, 1)), 2);
        assert_eq!(hadd.fact_cost(Fact::new(v, 2)), 5);
        assert_eq!(hadd.operator_cost(OpId::from(0usize)), 2);
        assert_eq!(hadd.operator_cost(OpId::from(1usize)), 5);
    }

    #[test]
    fn test_hadd_unit_costs() {
        let task = chain_task();
        let hadd = compute_hadd(&task, true);
        let v = VarId::from(0usize);
        assert_eq!(hadd.fact_cost(Fact::new(v, 1)), 1);
        assert_eq!(hadd.fact_cost(Fact::new(v, 2)), 2);
    }

    #[test]
    fn test_hadd_unreachable() {
        let v = VarId::from(0usize);
        let task = Task::new(
            vec![variable(2)],
            vec![],
            State::new(vec![0]),
            vec![Fact::new(v, 1)],
        );
        let hadd = compute_hadd(&task, false);
        assert_eq!(hadd.fact_cost(Fact::new(v, 1)), INF);
    }

    #[test]
    fn test_layers() {
        let task = chain_task();
        let layers = compute_relaxed_operator_layers(&task);
        assert_eq!(layers[OpId::from(0usize)], 0);
        assert_eq!(layers[OpId::from(1usize)], 1);
    }
}
