use crate::backend::regalloc::Allocation;
use crate::ir::Program;
use std::fmt::Write;

/// Renders the IR listing, one instruction per line.
pub fn generate_ir(program: &Program) -> Result<String, std::fmt::Error> {
    let mut output = String::new();

    for instr in &program.instructions {
        writeln!(output, "{}", instr)?;
    }

    Ok(output)
}

/*
 * INTERVALS:
 * %0:1,3
 * ALLOCATION:
 * %0:r1
 */
pub fn generate_allocation(allocation: &Allocation) -> Result<String, std::fmt::Error> {
    let mut output = String::new();

    writeln!(output, "INTERVALS:")?;
    for interval in allocation.intervals.iter() {
        writeln!(output, "{}:{},{}", interval.register, interval.start, interval.end)?;
    }

    writeln!(output, "ALLOCATION:")?;
    for (vreg, phys) in &allocation.registers {
        writeln!(output, "{}:{}", vreg, phys)?;
    }

    Ok(output)
}
