pub mod context;
pub mod lower;

use std::fmt;

#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct VirtualRegister {
    pub id: usize,
}

impl fmt::Display for VirtualRegister {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.id)
    }
}

/// One register of the fixed pool. `r0` is reserved for initializing
/// stack slots and is never handed out by the allocator.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct PhysicalRegister {
    pub id: usize,
}

impl PhysicalRegister {
    pub const INIT: PhysicalRegister = PhysicalRegister { id: 0 };
}

impl fmt::Display for PhysicalRegister {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.id)
    }
}

/// Turtle state written by the motion statements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    X,
    Y,
    Color,
    Rotation,
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Target::X => "tx",
            Target::Y => "ty",
            Target::Color => "tc",
            Target::Rotation => "tr",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    Virtual(VirtualRegister),
    Physical(PhysicalRegister),
    Slot(usize),
    Immediate(i32),
    Target(Target),
    // Instruction index a branch jumps to
    Address(usize),
    // Branch address not known yet; patched during lowering
    Pending,
}

impl Operand {
    pub fn as_virtual(&self) -> Option<VirtualRegister> {
        match self {
            Operand::Virtual(reg) => Some(*reg),
            _ => None,
        }
    }
}

impl From<VirtualRegister> for Operand {
    fn from(reg: VirtualRegister) -> Self {
        Operand::Virtual(reg)
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Virtual(reg) => write!(f, "{}", reg),
            Operand::Physical(reg) => write!(f, "{}", reg),
            Operand::Slot(slot) => write!(f, "{}", slot),
            Operand::Immediate(value) => write!(f, "{}", value),
            Operand::Target(target) => write!(f, "{}", target),
            Operand::Address(index) => write!(f, "{}", index),
            Operand::Pending => f.write_str("??"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Push,
    Movi,
    Loadi,
    Load,
    Storei,
    Store,
    Add,
    Sub,
    Mul,
    Div,
    Inc,
    Dec,
    Cmpeq,
    Cmplt,
    Jnt,
    Jmp,
    Mov,
    PenUp,
    PenDown,
    Fwd,
    Back,
    Exit,
}

impl Op {
    pub fn mnemonic(self) -> &'static str {
        match self {
            Op::Push => "push",
            Op::Movi => "movi",
            Op::Loadi => "loadi",
            Op::Load => "load",
            Op::Storei => "storei",
            Op::Store => "store",
            Op::Add => "add",
            Op::Sub => "sub",
            Op::Mul => "mul",
            Op::Div => "div",
            Op::Inc => "inc",
            Op::Dec => "dec",
            Op::Cmpeq => "cmpeq",
            Op::Cmplt => "cmplt",
            Op::Jnt => "jnt",
            Op::Jmp => "jmp",
            Op::Mov => "mov",
            Op::PenUp => "penup",
            Op::PenDown => "pendown",
            Op::Fwd => "fwd",
            Op::Back => "back",
            Op::Exit => "exit",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    pub operation: Op,
    pub operands: Vec<Operand>,
}

impl Instruction {
    pub fn new(operation: Op, operands: Vec<Operand>) -> Self {
        Self { operation, operands }
    }

    /// Virtual registers referenced by this instruction, in operand order.
    pub fn registers(&self) -> impl Iterator<Item = VirtualRegister> + '_ {
        self.operands.iter().filter_map(Operand::as_virtual)
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.operation.mnemonic())?;
        for (i, operand) in self.operands.iter().enumerate() {
            let sep = if i == 0 { " " } else { "," };
            write!(f, "{}{}", sep, operand)?;
        }
        Ok(())
    }
}

/// A lowered program. The index of an instruction is its address.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Program {
    pub instructions: Vec<Instruction>,
}

impl Program {
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }
}
