use std::collections::BTreeMap;

use crate::ir::{Instruction, VirtualRegister};

/// Inclusive range of instruction indices over which a register is live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LiveInterval {
    pub register: VirtualRegister,
    pub start: usize,   // first appearance
    pub end: usize,     // last appearance
}

impl LiveInterval {
    pub fn new(register: VirtualRegister, start: usize, end: usize) -> Self {
        Self { register, start, end }
    }

    pub fn contains(&self, index: usize) -> bool {
        self.start <= index && index <= self.end
    }

    pub fn overlaps(&self, other: &LiveInterval) -> bool {
        self.start <= other.end && other.start <= self.end
    }
}

/// Live intervals ordered by register number.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IntervalTable {
    intervals: BTreeMap<VirtualRegister, LiveInterval>,
}

impl IntervalTable {
    pub fn get(&self, reg: &VirtualRegister) -> Option<&LiveInterval> {
        self.intervals.get(reg)
    }

    pub fn iter(&self) -> impl Iterator<Item = &LiveInterval> {
        self.intervals.values()
    }

    pub fn len(&self) -> usize {
        self.intervals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    /// Highest interval end, i.e. the last instruction that touches a register.
    pub fn last_use(&self) -> Option<usize> {
        self.iter().map(|interval| interval.end).max()
    }

    fn record(&mut self, reg: VirtualRegister, index: usize) {
        self.intervals
            .entry(reg)
            .and_modify(|interval| interval.end = index)
            .or_insert_with(|| LiveInterval::new(reg, index, index));
    }
}

impl FromIterator<LiveInterval> for IntervalTable {
    fn from_iter<I: IntoIterator<Item = LiveInterval>>(iter: I) -> Self {
        let intervals = iter
            .into_iter()
            .map(|interval| (interval.register, interval))
            .collect();
        Self { intervals }
    }
}

pub fn analyse(instructions: &[Instruction]) -> IntervalTable {
    let mut table = IntervalTable::default();

    for (index, instr) in instructions.iter().enumerate() {
        for reg in instr.registers() {
            table.record(reg, index);
        }
    }

    log::debug!(
        "computed {} live interval(s), last use at {:?}",
        table.len(),
        table.last_use()
    );
    table
}
