use std::collections::HashMap;

use crate::ir::{Instruction, Op, Operand, PhysicalRegister, Program, VirtualRegister};
use crate::{CompileError, NodeKind};

/// A branch address that still has to be patched.
///
/// Returned by the emit step and consumed by [`CodeContext::resolve`], so a
/// placeholder can be patched at most once.
#[derive(Debug)]
#[must_use = "a pending branch target has to be resolved"]
pub struct Fixup {
    index: usize,
}

impl Fixup {
    /// Index of the placeholder instruction.
    pub fn index(&self) -> usize {
        self.index
    }
}

/// Mutable state of one lowering run.
#[derive(Debug, Default)]
pub struct CodeContext {
    instructions: Vec<Instruction>,
    next_register: usize,
    next_slot: usize,
    symbols: HashMap<String, usize>,
    pending: usize,
}

impl CodeContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_register(&mut self) -> VirtualRegister {
        let r = VirtualRegister { id: self.next_register };
        self.next_register += 1;
        r
    }

    pub fn emit(&mut self, instr: Instruction) {
        self.instructions.push(instr);
    }

    /// Address of the next instruction to be emitted.
    pub fn position(&self) -> usize {
        self.instructions.len()
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    /// Reserves `count` consecutive stack slots, each initialized from `r0`,
    /// and returns the first one.
    pub fn reserve_slots(&mut self, count: usize) -> usize {
        let first = self.next_slot;
        for _ in 0..count {
            self.emit(Instruction::new(
                Op::Push,
                vec![Operand::Physical(PhysicalRegister::INIT)],
            ));
            self.next_slot += 1;
        }
        first
    }

    /// Binds `name` to `slot`. A previous binding is replaced and returned.
    pub fn bind(&mut self, name: &str, slot: usize) -> Option<usize> {
        let previous = self.symbols.insert(name.to_string(), slot);
        if let Some(old) = previous {
            log::warn!("'{}' redeclared, rebinding from slot {} to slot {}", name, old, slot);
        }
        previous
    }

    pub fn slot_of(&self, name: &str, node: NodeKind) -> Result<usize, CompileError> {
        self.symbols
            .get(name)
            .copied()
            .ok_or_else(|| CompileError::UnknownSymbol {
                name: name.to_string(),
                node,
            })
    }

    /// Emits `movi reg,??` and returns the fixup for its address operand.
    pub fn emit_placeholder(&mut self, reg: VirtualRegister) -> Fixup {
        let index = self.position();
        self.emit(Instruction::new(Op::Movi, vec![reg.into(), Operand::Pending]));
        self.pending += 1;
        Fixup { index }
    }

    /// Patches the placeholder behind `fixup` to jump to `target`.
    pub fn resolve(&mut self, fixup: Fixup, target: usize) {
        debug_assert!(target <= self.position(), "branch target past end of code");

        let operand = &mut self.instructions[fixup.index].operands[1];
        debug_assert_eq!(*operand, Operand::Pending, "placeholder patched twice");
        *operand = Operand::Address(target);
        self.pending -= 1;

        log::debug!("patched branch at {} -> {}", fixup.index, target);
    }

    /// Ends lowering. Fails if any branch placeholder was left unpatched.
    pub fn finish(self) -> Result<Program, CompileError> {
        if self.pending > 0 {
            let index = self
                .instructions
                .iter()
                .position(|instr| instr.operands.contains(&Operand::Pending))
                .unwrap_or(self.instructions.len());
            return Err(CompileError::UnresolvedBranchTarget { index });
        }

        Ok(Program {
            instructions: self.instructions,
        })
    }
}
