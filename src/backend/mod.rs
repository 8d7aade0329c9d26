pub mod generator;
pub mod liveness;
pub mod regalloc;

use crate::ast;
use crate::ir;
use crate::CompileError;

use liveness::IntervalTable;
use regalloc::{Allocation, LinearScan};

/// Everything one compilation produces.
#[derive(Debug, Clone)]
pub struct Compilation {
    pub program: ir::Program,
    pub allocation: Allocation,
}

impl Compilation {
    pub fn intervals(&self) -> &IntervalTable {
        &self.allocation.intervals
    }

    pub fn render(&self) -> Result<Artifacts, std::fmt::Error> {
        Ok(Artifacts {
            ir: generator::generate_ir(&self.program)?,
            allocation: generator::generate_allocation(&self.allocation)?,
        })
    }
}

/// The rendered text artifacts of a compilation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifacts {
    pub ir: String,
    pub allocation: String,
}

pub fn compile(prog: &ast::Program, allocator: &LinearScan) -> Result<Compilation, CompileError> {
    let program = ir::lower::lower(prog)?;
    let intervals = liveness::analyse(&program.instructions);
    let allocation = allocator.allocate(&intervals)?;

    log::debug!(
        "{} instruction(s), {} virtual register(s) on {} of {} physical register(s)",
        program.len(),
        allocation.registers.len(),
        allocation.registers_used(),
        allocator.pool_size()
    );

    Ok(Compilation { program, allocation })
}
