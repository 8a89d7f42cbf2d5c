//! Cartesian sets: for each variable a subset of its domain, stored as one
//! contiguous block array with per-variable offsets.

use std::fmt::{Display, Formatter};
use tessera_collections::ref_store::RefVec;
use tessera_planning::{Fact, VarId};

const BITS_PER_BLOCK: usize = u64::BITS as usize;

fn num_blocks_for(domain_size: i32) -> usize {
    (domain_size as usize + BITS_PER_BLOCK - 1) / BITS_PER_BLOCK
}

#[derive(Clone, Debug)]
pub struct VariableInfo {
    pub domain_size: i32,
    pub num_blocks: usize,
    pub block_index: usize,
}

/// Shared layout metadata for all Cartesian sets of one abstraction.
/// Built once and passed as a borrowed context to every set operation.
#[derive(Clone, Debug)]
pub struct VariableInfos {
    infos: RefVec<VarId, VariableInfo>,
    total_num_blocks: usize,
}

impl VariableInfos {
    pub fn new(domain_sizes: &RefVec<VarId, i32>) -> Self {
        let mut infos = RefVec::new();
        let mut total_num_blocks = 0;
        for &domain_size in domain_sizes.values() {
            let num_blocks = num_blocks_for(domain_size);
            infos.push(VariableInfo {
                domain_size,
                num_blocks,
                block_index: total_num_blocks,
            });
            total_num_blocks += num_blocks;
        }
        VariableInfos {
            infos,
            total_num_blocks,
        }
    }

    pub fn num_variables(&self) -> usize {
        self.infos.len()
    }

    pub fn variables(&self) -> impl Iterator<Item = VarId> {
        self.infos.keys()
    }

    pub fn domain_size(&self, var: VarId) -> i32 {
        self.infos[var].domain_size
    }

    fn info(&self, var: VarId) -> &VariableInfo {
        &self.infos[var]
    }
}

/// For each variable a bitset over its domain, concatenated into one block
/// array. No variable may end up with an empty subset, and bits beyond a
/// variable's domain size are always zero.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct CartesianSet {
    blocks: Vec<u64>,
}

impl CartesianSet {
    /// The trivial set: every value of every variable.
    pub fn full(infos: &VariableInfos) -> Self {
        let mut set = CartesianSet {
            blocks: vec![0; infos.total_num_blocks],
        };
        for var in infos.variables() {
            set.add_all(infos, var);
        }
        set
    }

    /// The set forcing each given fact and leaving other variables full.
    pub fn from_facts(infos: &VariableInfos, facts: &[Fact]) -> Self {
        let mut set = Self::full(infos);
        for &fact in facts {
            set.set_single_value(infos, fact.var, fact.value);
        }
        set
    }

    pub fn add(&mut self, infos: &VariableInfos, var: VarId, value: i32) {
        debug_assert!(value >= 0 && value < infos.domain_size(var));
        let info = infos.info(var);
        self.blocks[info.block_index + value as usize / BITS_PER_BLOCK] |=
            1u64 << (value as usize % BITS_PER_BLOCK);
    }

    pub fn remove(&mut self, infos: &VariableInfos, var: VarId, value: i32) {
        debug_assert!(value >= 0 && value < infos.domain_size(var));
        let info = infos.info(var);
        self.blocks[info.block_index + value as usize / BITS_PER_BLOCK] &=
            !(1u64 << (value as usize % BITS_PER_BLOCK));
    }

    pub fn set_single_value(&mut self, infos: &VariableInfos, var: VarId, value: i32) {
        self.remove_all(infos, var);
        self.add(infos, var, value);
    }

    pub fn add_all(&mut self, infos: &VariableInfos, var: VarId) {
        let info = infos.info(var);
        for block in &mut self.blocks[info.block_index..info.block_index + info.num_blocks] {
            *block = u64::MAX;
        }
        // Keep the bits beyond the domain size at zero.
        let used_bits_in_last_block = info.domain_size as usize % BITS_PER_BLOCK;
        if used_bits_in_last_block != 0 {
            self.blocks[info.block_index + info.num_blocks - 1] =
                (1u64 << used_bits_in_last_block) - 1;
        }
    }

    pub fn remove_all(&mut self, infos: &VariableInfos, var: VarId) {
        let info = infos.info(var);
        for block in &mut self.blocks[info.block_index..info.block_index + info.num_blocks] {
            *block = 0;
        }
    }

    pub fn test(&self, infos: &VariableInfos, var: VarId, value: i32) -> bool {
        debug_assert!(value >= 0 && value < infos.domain_size(var));
        let info = infos.info(var);
        let block = self.blocks[info.block_index + value as usize / BITS_PER_BLOCK];
        block & (1u64 << (value as usize % BITS_PER_BLOCK)) != 0
    }

    pub fn count(&self, infos: &VariableInfos, var: VarId) -> i32 {
        let info = infos.info(var);
        self.blocks[info.block_index..info.block_index + info.num_blocks]
            .iter()
            .map(|block| block.count_ones() as i32)
            .sum()
    }

    pub fn values<'a>(&'a self, infos: &'a VariableInfos, var: VarId) -> impl Iterator<Item = i32> + 'a {
        (0..infos.domain_size(var)).filter(move |&value| self.test(infos, var, value))
    }

    pub fn has_full_domain(&self, infos: &VariableInfos, var: VarId) -> bool {
        self.count(infos, var) == infos.domain_size(var)
    }

    pub fn intersects(&self, infos: &VariableInfos, other: &CartesianSet, var: VarId) -> bool {
        let info = infos.info(var);
        (info.block_index..info.block_index + info.num_blocks)
            .any(|i| self.blocks[i] & other.blocks[i] != 0)
    }

    pub fn is_superset_of(&self, other: &CartesianSet) -> bool {
        debug_assert_eq!(self.blocks.len(), other.blocks.len());
        self.blocks
            .iter()
            .zip(&other.blocks)
            .all(|(own, others)| others & !own == 0)
    }

    /// Splits the subset of `var` into the part outside `wanted` and the part
    /// inside it, returned in this order. Both parts must be nonempty.
    pub fn split_domain(
        &self,
        infos: &VariableInfos,
        var: VarId,
        wanted: &[i32],
    ) -> (CartesianSet, CartesianSet) {
        debug_assert!(!wanted.is_empty());
        debug_assert!(wanted.iter().all(|&value| self.test(infos, var, value)));
        debug_assert!((wanted.len() as i32) < self.count(infos, var));

        let mut other_side = self.clone();
        let mut wanted_side = self.clone();
        wanted_side.remove_all(infos, var);
        for &value in wanted {
            other_side.remove(infos, var, value);
            wanted_side.add(infos, var, value);
        }
        (other_side, wanted_side)
    }

    /// Number of concrete states in the set, as a floating-point estimate.
    pub fn size(&self, infos: &VariableInfos) -> f64 {
        infos
            .variables()
            .map(|var| self.count(infos, var) as f64)
            .product()
    }

    pub fn display<'a>(&'a self, infos: &'a VariableInfos) -> impl Display + 'a {
        DisplaySet { set: self, infos }
    }
}

struct DisplaySet<'a> {
    set: &'a CartesianSet,
    infos: &'a VariableInfos,
}

impl Display for DisplaySet<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "<")?;
        let mut var_sep = "";
        for var in self.infos.variables() {
            if self.set.has_full_domain(self.infos, var) {
                continue;
            }
            let values: Vec<i32> = self.set.values(self.infos, var).collect();
            write!(f, "{var_sep}{var}={{")?;
            let mut value_sep = "";
            for value in values {
                write!(f, "{value_sep}{value}")?;
                value_sep = ",";
            }
            write!(f, "}}")?;
            var_sep = ",";
        }
        write!(f, ">")
    }
}
