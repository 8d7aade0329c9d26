//! Linear-scan register allocation over a fixed pool of physical registers.

use std::collections::BTreeMap;

use crate::backend::liveness::{IntervalTable, LiveInterval};
use crate::ir::{PhysicalRegister, VirtualRegister};
use crate::CompileError;

/// Number of allocatable registers (`r1`..`r7`).
pub const DEFAULT_POOL_SIZE: usize = 7;

/// Result of allocation: every virtual register's physical register, kept
/// together with the intervals it was computed from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Allocation {
    pub intervals: IntervalTable,
    pub registers: BTreeMap<VirtualRegister, PhysicalRegister>,
}

impl Allocation {
    pub fn get(&self, reg: &VirtualRegister) -> Option<PhysicalRegister> {
        self.registers.get(reg).copied()
    }

    /// Number of distinct physical registers in use.
    pub fn registers_used(&self) -> usize {
        let mut used: Vec<_> = self.registers.values().collect();
        used.sort();
        used.dedup();
        used.len()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct LinearScan {
    pool_size: usize,
    reuse_at_boundary: bool,
}

impl Default for LinearScan {
    fn default() -> Self {
        Self::new(DEFAULT_POOL_SIZE)
    }
}

impl LinearScan {
    pub fn new(pool_size: usize) -> Self {
        Self {
            pool_size,
            reuse_at_boundary: false,
        }
    }

    /// When set, a register whose last use is the instruction where another
    /// register first appears is released before that register is assigned.
    pub fn reuse_at_boundary(mut self, reuse: bool) -> Self {
        self.reuse_at_boundary = reuse;
        self
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Assigns a physical register to every interval in `intervals`.
    ///
    /// Intervals are visited in register order, which has to match start
    /// order. Lowering numbers registers as it emits them, so its tables
    /// always do; hand-built tables that don't are rejected in debug builds.
    pub fn allocate(&self, intervals: &IntervalTable) -> Result<Allocation, CompileError> {
        // free[i] describes r(i + 1)
        let mut free = vec![true; self.pool_size];
        let mut active: Vec<(LiveInterval, PhysicalRegister)> = Vec::new();
        let mut registers = BTreeMap::new();
        let mut last_start = 0;

        for interval in intervals.iter() {
            debug_assert!(
                interval.start >= last_start,
                "{} starts at {}, before the previous register's start {}",
                interval.register,
                interval.start,
                last_start
            );
            last_start = interval.start;

            self.expire(&mut active, &mut free, interval.start);

            let slot = free
                .iter()
                .position(|is_free| *is_free)
                .ok_or(CompileError::RegisterPressureExceeded {
                    register: interval.register,
                    index: interval.start,
                    available: self.pool_size,
                })?;
            free[slot] = false;

            let phys = PhysicalRegister { id: slot + 1 };
            log::debug!(
                "{} -> {} (live {}..={})",
                interval.register,
                phys,
                interval.start,
                interval.end
            );

            active.push((*interval, phys));
            registers.insert(interval.register, phys);
        }

        Ok(Allocation {
            intervals: intervals.clone(),
            registers,
        })
    }

    fn expire(
        &self,
        active: &mut Vec<(LiveInterval, PhysicalRegister)>,
        free: &mut [bool],
        start: usize,
    ) {
        let reuse_at_boundary = self.reuse_at_boundary;
        active.retain(|(interval, phys)| {
            let ended = if reuse_at_boundary {
                interval.end <= start
            } else {
                interval.end < start
            };
            if ended {
                log::debug!("{} expired, releasing {}", interval.register, phys);
                free[phys.id - 1] = true;
            }
            !ended
        });
    }
}
