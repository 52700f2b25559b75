//! JSON bytecode images.
//!
//! An image carries every lambda and record a translator produced, referenced
//! by index. Loading resolves the indices into shared `Rc` graphs, binds
//! `builtin` operands to registered natives and validates the result before
//! anything runs.

use std::{path::Path, rc::Rc, sync::Arc};

use anyhow::{Context, Result, anyhow, bail, ensure};
use serde::{Deserialize, Serialize};

use crate::module::ModuleRegistry;
use crate::val::Value;

use super::bytecode::{Instruction, Opcode};
use super::callable::Callable;
use super::lambda::{Lambda, PosList, Position, Record};
use super::program::Program;
use super::vm::Vm;

pub const IMAGE_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageFile {
    pub version: u32,
    /// Global slots to allocate; never fewer than the module records.
    #[serde(default)]
    pub globals: usize,
    /// Index of the lambda to run.
    pub entry: usize,
    #[serde(default)]
    pub lambdas: Vec<LambdaDef>,
    #[serde(default)]
    pub records: Vec<RecordDef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LambdaDef {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub params: usize,
    #[serde(default)]
    pub vars: usize,
    #[serde(default)]
    pub max_stack: usize,
    pub code: Vec<InstDef>,
    #[serde(default)]
    pub positions: Vec<PosDef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstDef {
    pub op: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arg: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PosDef {
    pub offset: usize,
    pub line: u32,
    #[serde(default)]
    pub column: u32,
    #[serde(default)]
    pub file: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordDef {
    #[serde(default)]
    pub name: Option<String>,
    pub size: usize,
    /// Lambda index of the initializer.
    pub init: usize,
    /// Load into the module table so `bootup` instantiates it.
    #[serde(default)]
    pub module: bool,
}

/// `constpush` operand.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConstDef {
    Nil,
    Bool(bool),
    Int(i64),
    Real(f64),
    Str(String),
    /// Lambda index, pushed as a Lambda value
    Lambda(usize),
    /// Lambda index, pushed as a closure-less function
    Function(usize),
    /// Qualified native name
    Native(String),
    Undefined,
}

/// A loaded image, ready to run.
#[derive(Debug)]
pub struct Image {
    pub entry: Rc<Lambda>,
    pub lambdas: Vec<Rc<Lambda>>,
    pub records: Vec<Rc<Record>>,
    pub globals: usize,
}

impl Image {
    /// Parse, resolve and validate an image. Records flagged as modules are
    /// loaded into `registry`.
    pub fn from_json(src: &str, registry: &mut ModuleRegistry) -> Result<Image> {
        let file: ImageFile = serde_json::from_str(src).context("malformed image JSON")?;
        Self::from_file(&file, registry)
    }

    pub fn load(path: impl AsRef<Path>, registry: &mut ModuleRegistry) -> Result<Image> {
        let path = path.as_ref();
        let src = std::fs::read_to_string(path).with_context(|| format!("failed to read image {}", path.display()))?;
        Self::from_json(&src, registry).with_context(|| format!("failed to load image {}", path.display()))
    }

    pub fn from_file(file: &ImageFile, registry: &mut ModuleRegistry) -> Result<Image> {
        ensure!(
            file.version == IMAGE_VERSION,
            "unsupported image version {} (expected {})",
            file.version,
            IMAGE_VERSION
        );
        ensure!(
            file.entry < file.lambdas.len(),
            "entry lambda {} out of range ({} lambdas)",
            file.entry,
            file.lambdas.len()
        );

        let mut resolver = Resolver::new(file, registry);
        let lambdas = (0..file.lambdas.len())
            .map(|idx| resolver.lambda(idx))
            .collect::<Result<Vec<_>>>()?;
        let records = (0..file.records.len())
            .map(|idx| resolver.record(idx))
            .collect::<Result<Vec<_>>>()?;

        for (idx, lambda) in lambdas.iter().enumerate() {
            lambda
                .validate()
                .with_context(|| format!("lambda {} ({}) is malformed", idx, lambda.display_name()))?;
        }
        for (idx, record) in records.iter().enumerate() {
            record
                .validate()
                .with_context(|| format!("record {} ({}) is malformed", idx, record.display_name()))?;
        }

        for (def, record) in file.records.iter().zip(&records) {
            if def.module {
                let symbol = def
                    .name
                    .as_deref()
                    .ok_or_else(|| anyhow!("module record needs a name"))?;
                registry.load_record(symbol, record.clone());
            }
        }

        Ok(Image {
            entry: lambdas[file.entry].clone(),
            lambdas,
            records,
            globals: file.globals,
        })
    }

    /// Boot the loaded modules, then run the entry lambda.
    pub fn run(&self, vm: &mut Vm, registry: &ModuleRegistry) -> Result<Vec<Value>> {
        registry.bootup_with_globals(vm, self.globals)?;
        let results = vm
            .exec(&self.entry)
            .with_context(|| format!("{} failed", self.entry.display_name()))?;
        Ok(results)
    }
}

#[derive(Clone, Copy, PartialEq)]
enum Slot {
    Lambda(usize),
    Record(usize),
}

struct Resolver<'a> {
    file: &'a ImageFile,
    registry: &'a ModuleRegistry,
    lambdas: Vec<Option<Rc<Lambda>>>,
    records: Vec<Option<Rc<Record>>>,
    resolving: Vec<Slot>,
}

impl<'a> Resolver<'a> {
    fn new(file: &'a ImageFile, registry: &'a ModuleRegistry) -> Self {
        Self {
            file,
            registry,
            lambdas: vec![None; file.lambdas.len()],
            records: vec![None; file.records.len()],
            resolving: Vec::new(),
        }
    }

    fn enter(&mut self, slot: Slot) -> Result<()> {
        if self.resolving.contains(&slot) {
            let what = match slot {
                Slot::Lambda(idx) => format!("lambda {}", idx),
                Slot::Record(idx) => format!("record {}", idx),
            };
            bail!("{} refers back to itself", what);
        }
        self.resolving.push(slot);
        Ok(())
    }

    fn lambda(&mut self, idx: usize) -> Result<Rc<Lambda>> {
        if let Some(done) = self.lambdas.get(idx).ok_or_else(|| anyhow!("lambda index {} out of range", idx))? {
            return Ok(done.clone());
        }
        self.enter(Slot::Lambda(idx))?;
        let file = self.file;
        let def = &file.lambdas[idx];
        let label = def.name.clone().unwrap_or_else(|| format!("#{}", idx));

        let mut code = Program::new();
        for (offset, inst) in def.code.iter().enumerate() {
            let decoded = self
                .instruction(inst, &code)
                .with_context(|| format!("lambda {} instruction {} ({})", label, offset, inst.op))?;
            code.encode(decoded);
        }

        let mut pl = PosList::new();
        for pos in &def.positions {
            let position = match &pos.file {
                Some(file) => Position::in_file(Arc::<str>::from(file.as_str()), pos.line, pos.column),
                None => Position::new(pos.line, pos.column),
            };
            pl.push(pos.offset, position);
        }

        let mut lambda = Lambda::new(code, def.max_stack, def.params, def.vars).with_positions(pl);
        lambda.name = def.name.clone();
        let lambda = Rc::new(lambda);
        self.resolving.pop();
        self.lambdas[idx] = Some(lambda.clone());
        Ok(lambda)
    }

    fn record(&mut self, idx: usize) -> Result<Rc<Record>> {
        if let Some(done) = self.records.get(idx).ok_or_else(|| anyhow!("record index {} out of range", idx))? {
            return Ok(done.clone());
        }
        self.enter(Slot::Record(idx))?;
        let file = self.file;
        let def = &file.records[idx];
        let init = self
            .lambda(def.init)
            .with_context(|| format!("initializer of record {}", idx))?;
        let mut record = Record::new(def.size, init);
        record.name = def.name.clone();
        let record = Rc::new(record);
        self.resolving.pop();
        self.records[idx] = Some(record.clone());
        Ok(record)
    }

    fn instruction(&mut self, def: &InstDef, code: &Program) -> Result<Instruction> {
        let op = Opcode::from_name(&def.op).ok_or_else(|| anyhow!("unknown opcode '{}'", def.op))?;
        let inst = match op {
            Opcode::Pop => Instruction::Pop,
            Opcode::IntPush => Instruction::IntPush(int_arg(def)?),
            Opcode::ConstPush => {
                let arg = def.arg.clone().ok_or_else(|| anyhow!("constpush needs a constant"))?;
                let constant: ConstDef = serde_json::from_value(arg).context("bad constant")?;
                Instruction::ConstPush(self.constant(constant)?)
            }
            Opcode::VarPush => Instruction::VarPush(index_arg(def)?),
            Opcode::VarSave => Instruction::VarSave(index_arg(def)?),
            Opcode::GlobalPush => Instruction::GlobalPush(index_arg(def)?),
            Opcode::GlobalSave => Instruction::GlobalSave(index_arg(def)?),
            Opcode::FieldPush => Instruction::FieldPush(index_arg(def)?),
            Opcode::FieldSave => Instruction::FieldSave(index_arg(def)?),
            Opcode::MemEq => Instruction::MemEq,
            Opcode::MemNeq => Instruction::MemNeq,
            Opcode::FuncEq => Instruction::FuncEq,
            Opcode::FuncNeq => Instruction::FuncNeq,
            Opcode::IPlus => Instruction::IPlus,
            Opcode::IMinus => Instruction::IMinus,
            Opcode::ITimes => Instruction::ITimes,
            Opcode::IDivide => Instruction::IDivide,
            Opcode::INegate => Instruction::INegate,
            Opcode::LogNot => Instruction::LogNot,
            Opcode::LogEq => Instruction::LogEq,
            Opcode::LogNeq => Instruction::LogNeq,
            Opcode::IIncr => Instruction::IIncr,
            Opcode::IDecr => Instruction::IDecr,
            Opcode::IEq => Instruction::IEq,
            Opcode::INeq => Instruction::INeq,
            Opcode::IGt => Instruction::IGt,
            Opcode::IGe => Instruction::IGe,
            Opcode::ILt => Instruction::ILt,
            Opcode::ILe => Instruction::ILe,
            Opcode::FPlus => Instruction::FPlus,
            Opcode::FMinus => Instruction::FMinus,
            Opcode::FTimes => Instruction::FTimes,
            Opcode::FDivide => Instruction::FDivide,
            Opcode::FNegate => Instruction::FNegate,
            Opcode::FEq => Instruction::FEq,
            Opcode::FNeq => Instruction::FNeq,
            Opcode::FGt => Instruction::FGt,
            Opcode::FGe => Instruction::FGe,
            Opcode::FLt => Instruction::FLt,
            Opcode::FLe => Instruction::FLe,
            Opcode::Builtin => {
                let name = str_arg(def)?;
                let native = self
                    .registry
                    .get_native(name)
                    .ok_or_else(|| anyhow!("unknown native '{}'", name))?;
                Instruction::Builtin(native)
            }
            Opcode::Jmp => Instruction::Jmp(code.label(index_arg(def)?)),
            Opcode::CJmp => Instruction::CJmp(code.label(index_arg(def)?)),
            Opcode::NJmp => Instruction::NJmp(code.label(index_arg(def)?)),
            Opcode::PopCall => Instruction::PopCall,
            Opcode::PushClosure => Instruction::PushClosure,
            Opcode::MakeFunc => Instruction::MakeFunc(self.lambda(index_arg(def)?)?),
            Opcode::Ret => Instruction::Ret,
            Opcode::Alloc => Instruction::Alloc(self.record(index_arg(def)?)?),
        };
        Ok(inst)
    }

    fn constant(&mut self, def: ConstDef) -> Result<Value> {
        Ok(match def {
            ConstDef::Nil => Value::Nil,
            ConstDef::Bool(b) => Value::Bool(b),
            ConstDef::Int(i) => Value::Int(i),
            ConstDef::Real(r) => Value::Real(r),
            ConstDef::Str(s) => Value::from(s),
            ConstDef::Lambda(idx) => Value::Lambda(self.lambda(idx)?),
            ConstDef::Function(idx) => Value::Callable(Callable::function(self.lambda(idx)?, None)),
            ConstDef::Native(name) => {
                let native = self
                    .registry
                    .get_native(&name)
                    .ok_or_else(|| anyhow!("unknown native '{}'", name))?;
                Value::Callable(Rc::new(Callable::Native(native)))
            }
            ConstDef::Undefined => Value::Callable(Callable::undefined()),
        })
    }
}

fn int_arg(def: &InstDef) -> Result<i64> {
    def.arg
        .as_ref()
        .and_then(serde_json::Value::as_i64)
        .ok_or_else(|| anyhow!("{} needs an integer operand", def.op))
}

fn index_arg(def: &InstDef) -> Result<usize> {
    let raw = def
        .arg
        .as_ref()
        .and_then(serde_json::Value::as_u64)
        .ok_or_else(|| anyhow!("{} needs a non-negative integer operand", def.op))?;
    usize::try_from(raw).with_context(|| format!("{} operand {} too large", def.op, raw))
}

fn str_arg(def: &InstDef) -> Result<&str> {
    def.arg
        .as_ref()
        .and_then(serde_json::Value::as_str)
        .ok_or_else(|| anyhow!("{} needs a string operand", def.op))
}
