//! Causal graph of a SAS⁺ task and the topological level of each variable.

use crate::task::{Task, VarId};
use pathfinding::directed::strongly_connected_components::strongly_connected_components;
use std::collections::BTreeSet;
use tessera_collections::ref_store::RefVec;

/// Builds the causal graph (arcs from precondition variables to effect
/// variables and between co-occurring effect variables) and returns for each
/// variable the level of its strongly connected component in a topological
/// order of the condensation. Sources have level 0.
pub fn compute_causal_graph_levels(task: &Task) -> RefVec<VarId, i32> {
    let num_vars = task.num_variables();
    let mut successors: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); num_vars];
    for op in task.operators.values() {
        let eff_vars: Vec<usize> = op.effects().iter().map(|e| usize::from(e.var)).collect();
        for pre in op.preconditions() {
            let pre_var = usize::from(pre.var);
            for &eff_var in &eff_vars {
                if pre_var != eff_var {
                    successors[pre_var].insert(eff_var);
                }
            }
        }
        for &a in &eff_vars {
            for &b in &eff_vars {
                if a != b {
                    successors[a].insert(b);
                }
            }
        }
    }

    let nodes: Vec<usize> = (0..num_vars).collect();
    let components =
        strongly_connected_components(&nodes, |&n| successors[n].iter().copied().collect::<Vec<_>>());

    let mut component_of = vec![0usize; num_vars];
    for (index, component) in components.iter().enumerate() {
        for &var in component {
            component_of[var] = index;
        }
    }

    // Topological levels of the condensation.
    let num_components = components.len();
    let mut comp_successors: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); num_components];
    let mut indegree = vec![0usize; num_components];
    for var in 0..num_vars {
        for &succ in &successors[var] {
            let (a, b) = (component_of[var], component_of[succ]);
            if a != b && comp_successors[a].insert(b) {
                indegree[b] += 1;
            }
        }
    }
    let mut levels = vec![0i32; num_components];
    let mut queue: Vec<usize> = (0..num_components).filter(|&c| indegree[c] == 0).collect();
    while let Some(comp) = queue.pop() {
        for &succ in &comp_successors[comp] {
            levels[succ] = levels[succ].max(levels[comp] + 1);
            indegree[succ] -= 1;
            if indegree[succ] == 0 {
                queue.push(succ);
            }
        }
    }

    (0..num_vars).map(|var| levels[component_of[var]]).collect()
}
