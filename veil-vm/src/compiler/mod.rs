//! Lowering of contract declarations to the register IR.
//!
//! A contract is described by a [`ContractDecl`]: fields with declared
//! types, and functions whose bodies are closures over a [`FnEmitter`]. The
//! compiler runs each body once against an emitter that records every
//! operation as IR instructions.

mod builder;
mod emitter;
mod lang;

pub use builder::InstructionBuilder;
pub use emitter::{Expr, FnEmitter};
pub use lang::{ContractDecl, ContractRegistry, FieldDecl, FunctionDecl};

use veil_asm::{
    AsmType, AssemblyClass, AssemblyField, AssemblyFunction, ClassRef, InstrKind, Operand,
};

use crate::error::CompileError;

/// Compile one contract declaration into an [`AssemblyClass`].
///
/// Fields and functions are processed in name order; the implicit `owner`
/// field (type `address`) is appended to every class.
pub fn compile_contract(
    decl: &ContractDecl,
    registry: &ContractRegistry,
) -> Result<AssemblyClass, CompileError> {
    let mut class = AssemblyClass::new(&decl.qualified_name, decl.has_address);

    let mut fields: Vec<&FieldDecl> = decl.fields.iter().collect();
    fields.sort_by(|a, b| a.name.cmp(&b.name));
    for field in fields {
        class.add_field(AssemblyField::new(&field.name, field.ty.clone()))?;
    }
    class.add_field(AssemblyField::new("owner", AsmType::Address))?;

    let mut functions: Vec<&FunctionDecl> = decl.functions.iter().collect();
    functions.sort_by(|a, b| a.name.cmp(&b.name));
    for function in functions {
        class.add_function(compile_function(decl, function, registry)?)?;
    }
    Ok(class)
}

fn compile_function(
    contract: &ContractDecl,
    function: &FunctionDecl,
    registry: &ContractRegistry,
) -> Result<AssemblyFunction, CompileError> {
    for (name, _) in &function.params {
        if name == "sender_is_self" {
            return Err(veil_asm::SecurityError::ReservedArgumentName {
                function: function.name.clone(),
                argument: name.clone(),
            }
            .into());
        }
    }

    let context = format!("{}.{}", contract.qualified_name, function.name);
    let mut builder = InstructionBuilder::new(&context);
    let self_ty = AsmType::contract(&contract.qualified_name);

    // `self` is the implicit first argument; declared parameters follow
    let self_reg = builder.registers_mut().alloc_typed("self", self_ty.clone());
    let mut arg_exprs = vec![Expr::reg(self_reg, self_ty.clone())];
    let mut arg_regs = vec![self_reg];
    for (name, ty) in &function.params {
        let reg = builder.registers_mut().alloc_typed(name, ty.clone());
        arg_exprs.push(Expr::reg(reg, ty.clone()));
        arg_regs.push(reg);
    }

    if function.is_constructor {
        builder.push(InstrKind::New {
            dst: self_reg,
            class: ClassRef::named(&contract.qualified_name),
        });
    }

    let mut emitter = FnEmitter::new(builder, registry);
    let returned = (function.body)(&mut emitter, &arg_exprs)?;
    let mut builder = emitter.finish();

    let return_type = if function.is_constructor {
        self_ty
    } else {
        function.return_type.clone().unwrap_or(AsmType::Uint)
    };
    let return_reg = builder
        .registers_mut()
        .alloc_typed("return", return_type);

    let returned = match returned {
        Some(expr) => expr.into_operand(),
        None if function.is_constructor => Operand::Reg(self_reg),
        None => Operand::Const(veil_asm::Constant::uint(0)?),
    };
    builder.push(InstrKind::Mov {
        dst: return_reg,
        src: returned,
    });

    // constructors do not take `self` from the caller
    if function.is_constructor {
        arg_regs.remove(0);
    }

    let me = builder.me();
    let (registers, instructions) = builder.finish();
    let mut compiled =
        AssemblyFunction::new(&function.name, registers, instructions, me, arg_regs, return_reg);
    compiled.set_constructor(function.is_constructor);
    compiled.set_private(function.is_private);
    compiled.set_private_for(function.is_private_for.clone());
    Ok(compiled)
}
