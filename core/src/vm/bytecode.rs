use std::fmt;
use std::rc::Rc;

use crate::val::Value;

use super::callable::Native;
use super::lambda::{Lambda, Record};
use super::program::Label;

/// One VM instruction. Each opcode carries exactly the operand it needs.
#[derive(Clone)]
pub enum Instruction {
    Pop,
    IntPush(i64),
    ConstPush(Value),

    VarPush(usize),
    VarSave(usize),
    GlobalPush(usize),
    GlobalSave(usize),
    FieldPush(usize),
    FieldSave(usize),

    MemEq,
    MemNeq,
    FuncEq,
    FuncNeq,

    IPlus,
    IMinus,
    ITimes,
    IDivide,
    INegate,

    LogNot,
    LogEq,
    LogNeq,

    IIncr,
    IDecr,
    IEq,
    INeq,
    IGt,
    IGe,
    ILt,
    ILe,

    FPlus,
    FMinus,
    FTimes,
    FDivide,
    FNegate,
    FEq,
    FNeq,
    FGt,
    FGe,
    FLt,
    FLe,

    Builtin(Native),
    Jmp(Label),
    CJmp(Label),
    NJmp(Label),
    PopCall,

    PushClosure,
    MakeFunc(Rc<Lambda>),
    Ret,

    Alloc(Rc<Record>),
}

/// Operand-free tag of an [`Instruction`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    Pop,
    IntPush,
    ConstPush,
    VarPush,
    VarSave,
    GlobalPush,
    GlobalSave,
    FieldPush,
    FieldSave,
    MemEq,
    MemNeq,
    FuncEq,
    FuncNeq,
    IPlus,
    IMinus,
    ITimes,
    IDivide,
    INegate,
    LogNot,
    LogEq,
    LogNeq,
    IIncr,
    IDecr,
    IEq,
    INeq,
    IGt,
    IGe,
    ILt,
    ILe,
    FPlus,
    FMinus,
    FTimes,
    FDivide,
    FNegate,
    FEq,
    FNeq,
    FGt,
    FGe,
    FLt,
    FLe,
    Builtin,
    Jmp,
    CJmp,
    NJmp,
    PopCall,
    PushClosure,
    MakeFunc,
    Ret,
    Alloc,
}

impl Opcode {
    pub const ALL: [Opcode; 49] = [
        Opcode::Pop,
        Opcode::IntPush,
        Opcode::ConstPush,
        Opcode::VarPush,
        Opcode::VarSave,
        Opcode::GlobalPush,
        Opcode::GlobalSave,
        Opcode::FieldPush,
        Opcode::FieldSave,
        Opcode::MemEq,
        Opcode::MemNeq,
        Opcode::FuncEq,
        Opcode::FuncNeq,
        Opcode::IPlus,
        Opcode::IMinus,
        Opcode::ITimes,
        Opcode::IDivide,
        Opcode::INegate,
        Opcode::LogNot,
        Opcode::LogEq,
        Opcode::LogNeq,
        Opcode::IIncr,
        Opcode::IDecr,
        Opcode::IEq,
        Opcode::INeq,
        Opcode::IGt,
        Opcode::IGe,
        Opcode::ILt,
        Opcode::ILe,
        Opcode::FPlus,
        Opcode::FMinus,
        Opcode::FTimes,
        Opcode::FDivide,
        Opcode::FNegate,
        Opcode::FEq,
        Opcode::FNeq,
        Opcode::FGt,
        Opcode::FGe,
        Opcode::FLt,
        Opcode::FLe,
        Opcode::Builtin,
        Opcode::Jmp,
        Opcode::CJmp,
        Opcode::NJmp,
        Opcode::PopCall,
        Opcode::PushClosure,
        Opcode::MakeFunc,
        Opcode::Ret,
        Opcode::Alloc,
    ];

    pub fn from_name(name: &str) -> Option<Opcode> {
        Opcode::ALL.iter().copied().find(|op| op.name() == name)
    }

    /// Mnemonic used by the disassembler and the image format.
    pub fn name(self) -> &'static str {
        match self {
            Opcode::Pop => "pop",
            Opcode::IntPush => "intpush",
            Opcode::ConstPush => "constpush",
            Opcode::VarPush => "varpush",
            Opcode::VarSave => "varsave",
            Opcode::GlobalPush => "globalpush",
            Opcode::GlobalSave => "globalsave",
            Opcode::FieldPush => "fieldpush",
            Opcode::FieldSave => "fieldsave",
            Opcode::MemEq => "mem_eq",
            Opcode::MemNeq => "mem_neq",
            Opcode::FuncEq => "func_eq",
            Opcode::FuncNeq => "func_neq",
            Opcode::IPlus => "i_plus",
            Opcode::IMinus => "i_minus",
            Opcode::ITimes => "i_times",
            Opcode::IDivide => "i_divide",
            Opcode::INegate => "i_negate",
            Opcode::LogNot => "log_not",
            Opcode::LogEq => "log_eq",
            Opcode::LogNeq => "log_neq",
            Opcode::IIncr => "i_incr",
            Opcode::IDecr => "i_decr",
            Opcode::IEq => "i_eq",
            Opcode::INeq => "i_neq",
            Opcode::IGt => "i_gt",
            Opcode::IGe => "i_ge",
            Opcode::ILt => "i_lt",
            Opcode::ILe => "i_le",
            Opcode::FPlus => "f_plus",
            Opcode::FMinus => "f_minus",
            Opcode::FTimes => "f_times",
            Opcode::FDivide => "f_divide",
            Opcode::FNegate => "f_negate",
            Opcode::FEq => "f_eq",
            Opcode::FNeq => "f_neq",
            Opcode::FGt => "f_gt",
            Opcode::FGe => "f_ge",
            Opcode::FLt => "f_lt",
            Opcode::FLe => "f_le",
            Opcode::Builtin => "builtin",
            Opcode::Jmp => "jmp",
            Opcode::CJmp => "cjmp",
            Opcode::NJmp => "njmp",
            Opcode::PopCall => "popcall",
            Opcode::PushClosure => "pushclosure",
            Opcode::MakeFunc => "makefunc",
            Opcode::Ret => "ret",
            Opcode::Alloc => "alloc",
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Instruction {
    pub fn opcode(&self) -> Opcode {
        match self {
            Instruction::Pop => Opcode::Pop,
            Instruction::IntPush(_) => Opcode::IntPush,
            Instruction::ConstPush(_) => Opcode::ConstPush,
            Instruction::VarPush(_) => Opcode::VarPush,
            Instruction::VarSave(_) => Opcode::VarSave,
            Instruction::GlobalPush(_) => Opcode::GlobalPush,
            Instruction::GlobalSave(_) => Opcode::GlobalSave,
            Instruction::FieldPush(_) => Opcode::FieldPush,
            Instruction::FieldSave(_) => Opcode::FieldSave,
            Instruction::MemEq => Opcode::MemEq,
            Instruction::MemNeq => Opcode::MemNeq,
            Instruction::FuncEq => Opcode::FuncEq,
            Instruction::FuncNeq => Opcode::FuncNeq,
            Instruction::IPlus => Opcode::IPlus,
            Instruction::IMinus => Opcode::IMinus,
            Instruction::ITimes => Opcode::ITimes,
            Instruction::IDivide => Opcode::IDivide,
            Instruction::INegate => Opcode::INegate,
            Instruction::LogNot => Opcode::LogNot,
            Instruction::LogEq => Opcode::LogEq,
            Instruction::LogNeq => Opcode::LogNeq,
            Instruction::IIncr => Opcode::IIncr,
            Instruction::IDecr => Opcode::IDecr,
            Instruction::IEq => Opcode::IEq,
            Instruction::INeq => Opcode::INeq,
            Instruction::IGt => Opcode::IGt,
            Instruction::IGe => Opcode::IGe,
            Instruction::ILt => Opcode::ILt,
            Instruction::ILe => Opcode::ILe,
            Instruction::FPlus => Opcode::FPlus,
            Instruction::FMinus => Opcode::FMinus,
            Instruction::FTimes => Opcode::FTimes,
            Instruction::FDivide => Opcode::FDivide,
            Instruction::FNegate => Opcode::FNegate,
            Instruction::FEq => Opcode::FEq,
            Instruction::FNeq => Opcode::FNeq,
            Instruction::FGt => Opcode::FGt,
            Instruction::FGe => Opcode::FGe,
            Instruction::FLt => Opcode::FLt,
            Instruction::FLe => Opcode::FLe,
            Instruction::Builtin(_) => Opcode::Builtin,
            Instruction::Jmp(_) => Opcode::Jmp,
            Instruction::CJmp(_) => Opcode::CJmp,
            Instruction::NJmp(_) => Opcode::NJmp,
            Instruction::PopCall => Opcode::PopCall,
            Instruction::PushClosure => Opcode::PushClosure,
            Instruction::MakeFunc(_) => Opcode::MakeFunc,
            Instruction::Ret => Opcode::Ret,
            Instruction::Alloc(_) => Opcode::Alloc,
        }
    }

    /// Jump target, for the three jump opcodes.
    pub fn target(&self) -> Option<&Label> {
        match self {
            Instruction::Jmp(label) | Instruction::CJmp(label) | Instruction::NJmp(label) => Some(label),
            _ => None,
        }
    }
}

impl fmt::Debug for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = self.opcode();
        match self {
            Instruction::IntPush(i) => write!(f, "{} {}", op, i),
            Instruction::ConstPush(v) => write!(f, "{} {:?}", op, v),
            Instruction::VarPush(i)
            | Instruction::VarSave(i)
            | Instruction::GlobalPush(i)
            | Instruction::GlobalSave(i)
            | Instruction::FieldPush(i)
            | Instruction::FieldSave(i) => write!(f, "{} {}", op, i),
            Instruction::Builtin(native) => write!(f, "{} {}", op, native.name()),
            Instruction::Jmp(l) | Instruction::CJmp(l) | Instruction::NJmp(l) => write!(f, "{} @{}", op, l.offset()),
            Instruction::MakeFunc(lambda) => write!(f, "{} {}", op, lambda.display_name()),
            Instruction::Alloc(record) => write!(f, "{} {}", op, record.display_name()),
            _ => write!(f, "{}", op),
        }
    }
}
