//! Decision-tree successor generators: given a state (or any per-variable
//! value set), enumerate the operators whose conditions it satisfies without
//! scanning the whole operator list.

use crate::task::{Fact, OpId, State, Task, VarId};

enum GeneratorNode {
    Leaf(Vec<OpId>),
    Switch {
        var: VarId,
        /// One child per domain value of `var`.
        value_children: Vec<GeneratorNode>,
        /// Operators without a condition on `var`.
        dont_care: Box<GeneratorNode>,
    },
}

pub struct SuccessorGenerator {
    root: GeneratorNode,
}

impl SuccessorGenerator {
    /// Generator keyed on operator preconditions: matches states from which
    /// the operator is applicable.
    pub fn from_preconditions(task: &Task) -> Self {
        let items: Vec<(OpId, Vec<Fact>)> = task
            .operators
            .entries()
            .map(|(op_id, op)| (op_id, op.preconditions().to_vec()))
            .collect();
        Self::from_conditions(task, items)
    }

    /// Generator keyed on operator postconditions: matches states the
    /// operator can end in.
    pub fn from_postconditions(task: &Task) -> Self {
        let items: Vec<(OpId, Vec<Fact>)> = task
            .operators
            .entries()
            .map(|(op_id, op)| (op_id, op.postconditions()))
            .collect();
        Self::from_conditions(task, items)
    }

    fn from_conditions(task: &Task, items: Vec<(OpId, Vec<Fact>)>) -> Self {
        let domain_sizes = task.domain_sizes();
        let items: Vec<(OpId, &[Fact])> = items.iter().map(|(op, conds)| (*op, conds.as_slice())).collect();
        SuccessorGenerator {
            root: build(&|var: VarId| domain_sizes[var], items),
        }
    }

    /// Operators applicable in a concrete state, in ID order.
    pub fn generate_applicable_ops(&self, state: &State, ops: &mut Vec<OpId>) {
        self.generate_matching_ops(&|var, value| state.value(var) == value, ops);
    }

    /// Operators whose every condition value is contained in the given
    /// per-variable value sets, in ID order.
    pub fn generate_matching_ops(&self, contains: &impl Fn(VarId, i32) -> bool, ops: &mut Vec<OpId>) {
        collect(&self.root, contains, ops);
        ops.sort();
    }
}

fn build(domain_size: &impl Fn(VarId) -> i32, items: Vec<(OpId, &[Fact])>) -> GeneratorNode {
    let Some(var) = items
        .iter()
        .filter_map(|(_, conds)| conds.first().map(|f| f.var))
        .min()
    else {
        return GeneratorNode::Leaf(items.into_iter().map(|(op, _)| op).collect());
    };

    let mut per_value: Vec<Vec<(OpId, &[Fact])>> = vec![Vec::new(); domain_size(var) as usize];
    let mut rest = Vec::new();
    for (op, conds) in items {
        match conds.first() {
            Some(fact) if fact.var == var => per_value[fact.value as usize].push((op, &conds[1..])),
            _ => rest.push((op, conds)),
        }
    }
    GeneratorNode::Switch {
        var,
        value_children: per_value
            .into_iter()
            .map(|bucket| build(domain_size, bucket))
            .collect(),
        dont_care: Box::new(build(domain_size, rest)),
    }
}

fn collect(node: &GeneratorNode, contains: &impl Fn(VarId, i32) -> bool, ops: &mut Vec<OpId>) {
    match node {
        GeneratorNode::Leaf(leaf_ops) => ops.extend_from_slice(leaf_ops),
        GeneratorNode::Switch {
            var,
            value_children,
            dont_care,
        } => {
            for (value, child) in value_children.iter().enumerate() {
                if contains(*var, value as i32) {
                    collect(child, contains, ops);
                }
            }
            collect(dont_care, contains, ops);
        }
    }
}
