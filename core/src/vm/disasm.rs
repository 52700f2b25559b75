use std::{collections::VecDeque, rc::Rc};

use crate::util::fast_map::{VisitedSet, fast_hash_set_new};
use crate::val::Value;

use super::bytecode::Instruction;
use super::callable::Callable;
use super::error::VmResult;
use super::lambda::Lambda;
use super::program::{Label, Program};

/// Render the instruction at `label` as `offset opname operand` and return
/// the label after it. Jump targets are printed relative to `base`.
pub fn print_inst(out: &mut String, label: &Label, base: &Label) -> VmResult<Label> {
    let inst = label.dereference()?;
    let here = base.distance_to(label)?;
    out.push_str(&format!("{:>5}  {:<12}", here, inst.opcode().name()));
    let operand = match &inst {
        Instruction::IntPush(i) => Some(i.to_string()),
        Instruction::ConstPush(value) => Some(fmt_const(value)),
        Instruction::VarPush(slot)
        | Instruction::VarSave(slot)
        | Instruction::GlobalPush(slot)
        | Instruction::GlobalSave(slot)
        | Instruction::FieldPush(slot)
        | Instruction::FieldSave(slot) => Some(slot.to_string()),
        Instruction::Jmp(target) | Instruction::CJmp(target) | Instruction::NJmp(target) => {
            Some(format!("-> {}", base.distance_to(target)?))
        }
        Instruction::Builtin(native) => Some(native.name().to_string()),
        Instruction::MakeFunc(lambda) => Some(lambda.display_name().to_string()),
        Instruction::Alloc(record) => Some(format!("{} size={}", record.display_name(), record.size)),
        _ => None,
    };
    if let Some(operand) = operand {
        out.push(' ');
        out.push_str(&operand);
    }
    let trimmed = out.trim_end().len();
    out.truncate(trimmed);
    out.push('\n');
    label.advanced(1)
}

/// Print `program` from its start up to and including the first `ret`.
pub fn print(out: &mut String, program: &Program) -> VmResult<()> {
    let base = program.begin();
    let end = program.end();
    let mut cursor = base.clone();
    while cursor != end {
        let is_ret = matches!(cursor.dereference()?, Instruction::Ret);
        cursor = print_inst(out, &cursor, &base)?;
        if is_ret {
            break;
        }
    }
    Ok(())
}

/// Full listing of `lambda` followed by each lambda reachable from it.
pub fn disassemble(lambda: &Rc<Lambda>) -> VmResult<String> {
    disassemble_all([lambda.clone()])
}

/// Like [`disassemble`] over several roots; shared lambdas are listed once.
pub fn disassemble_all(roots: impl IntoIterator<Item = Rc<Lambda>>) -> VmResult<String> {
    let mut out = String::new();
    let mut seen: VisitedSet<Lambda> = fast_hash_set_new();
    let mut queue: VecDeque<Rc<Lambda>> = roots.into_iter().collect();
    while let Some(next) = queue.pop_front() {
        if !seen.insert(Rc::as_ptr(&next)) {
            continue;
        }
        if !out.is_empty() {
            out.push('\n');
        }
        out.push_str(&format!(
            "lambda {} (params={}, vars={}, max_stack={})\n",
            next.display_name(),
            next.params,
            next.vars,
            next.max_stack_size
        ));
        let base = next.code.begin();
        let end = next.code.end();
        let mut cursor = base.clone();
        while cursor != end {
            cursor = print_inst(&mut out, &cursor, &base)?;
        }
        queue.extend(nested_lambdas(&next));
    }
    Ok(out)
}

fn nested_lambdas(lambda: &Lambda) -> Vec<Rc<Lambda>> {
    lambda
        .code
        .iter()
        .filter_map(|inst| match inst {
            Instruction::MakeFunc(inner) => Some(inner),
            Instruction::Alloc(record) => Some(record.init.clone()),
            Instruction::ConstPush(Value::Lambda(inner)) => Some(inner),
            Instruction::ConstPush(Value::Callable(callable)) => match callable.as_ref() {
                Callable::Function { body, .. } => Some(body.clone()),
                _ => None,
            },
            _ => None,
        })
        .collect()
}

fn fmt_const(value: &Value) -> String {
    match value {
        Value::Str(s) => format!("{:?}", s.as_ref()),
        other => other.to_string(),
    }
}
