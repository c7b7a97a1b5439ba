use core::fmt;
use std::collections::{BTreeSet, HashMap};

use veil_types::Scalar;

use crate::{
    error::{AssemblyError, SecurityError, TypeError},
    instruction::{InstrKind, Instruction, Span},
    op::BinaryOp,
    storage::{AssemblyStorage, ProgramView},
    ty::{check_assignable, AsmType},
    value::{Constant, Operand, RegId, RegisterFile},
};

/// A function of an [`crate::AssemblyClass`].
///
/// Owns the register arena its instructions refer to. The distinguished `me`
/// register carries the caller address (slot 0 after allocation); argument
/// registers follow in declaration order. Runtime type checks are kept in an
/// auxiliary list prepended to the body on emission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssemblyFunction {
    name: String,
    class_name: Option<String>,
    registers: RegisterFile,
    instructions: Vec<Instruction>,
    runtime_checks: Vec<Instruction>,
    me: RegId,
    args: Vec<RegId>,
    ret: RegId,
    is_constructor: bool,
    is_private: bool,
    is_private_for: Option<String>,
}

impl AssemblyFunction {
    pub fn new(
        name: impl Into<String>,
        registers: RegisterFile,
        instructions: Vec<Instruction>,
        me: RegId,
        args: Vec<RegId>,
        ret: RegId,
    ) -> Self {
        Self {
            name: name.into(),
            class_name: None,
            registers,
            instructions,
            runtime_checks: Vec::new(),
            me,
            args,
            ret,
            is_constructor: false,
            is_private: false,
            is_private_for: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Qualified name of the owning class, set when added to a class.
    pub fn class_name(&self) -> Option<&str> {
        self.class_name.as_deref()
    }

    pub(crate) fn set_class_name(&mut self, class_name: &str) {
        self.class_name = Some(class_name.to_owned());
    }

    pub fn registers(&self) -> &RegisterFile {
        &self.registers
    }

    pub(crate) fn registers_mut(&mut self) -> &mut RegisterFile {
        &mut self.registers
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    pub fn runtime_checks(&self) -> &[Instruction] {
        &self.runtime_checks
    }

    /// Runtime checks followed by the body.
    pub fn all_instructions(&self) -> impl Iterator<Item = &Instruction> {
        self.runtime_checks.iter().chain(self.instructions.iter())
    }

    pub fn me(&self) -> RegId {
        self.me
    }

    pub fn args(&self) -> &[RegId] {
        &self.args
    }

    pub fn ret(&self) -> RegId {
        self.ret
    }

    pub fn is_constructor(&self) -> bool {
        self.is_constructor
    }

    pub fn set_constructor(&mut self, is_constructor: bool) {
        self.is_constructor = is_constructor;
    }

    pub fn is_private(&self) -> bool {
        self.is_private
    }

    pub fn set_private(&mut self, is_private: bool) {
        self.is_private = is_private;
    }

    /// Class allowed to call this function when it is private to another
    /// class.
    pub fn is_private_for(&self) -> Option<&str> {
        self.is_private_for.as_deref()
    }

    pub fn set_private_for(&mut self, class_name: Option<String>) {
        self.is_private_for = class_name;
    }

    fn context(&self) -> String {
        match &self.class_name {
            Some(class) => format!("{class}.{}", self.name),
            None => self.name.clone(),
        }
    }

    // ----- linking -----

    /// Resolve every qualified reference into a direct storage reference.
    pub(crate) fn link(&mut self, view: &ProgramView) -> Result<(), SecurityError> {
        for &arg in &self.args {
            if let Some(AsmType::Contract(name)) = self.registers[arg].ty() {
                if view.class(name).is_none() {
                    return Err(SecurityError::UnknownArgumentType {
                        function: self.name.clone(),
                        argument: self.registers[arg].label().to_owned(),
                        ty: name.clone(),
                    });
                }
            }
        }

        for instruction in &mut self.instructions {
            match &mut instruction.kind {
                InstrKind::Load { field, .. } | InstrKind::Store { field, .. } => {
                    let class = view.class_checked(&field.class_name)?;
                    if !class.has_field(&field.field_name) {
                        return Err(SecurityError::UnknownField {
                            class: field.class_name.clone(),
                            field: field.field_name.clone(),
                        });
                    }
                    field.target = Some(class.id());
                }
                InstrKind::Call { callee, .. } => {
                    let class = view.class_checked(&callee.class_name)?;
                    if class.function(&callee.fn_name).is_none() {
                        return Err(SecurityError::UnknownFunction {
                            class: callee.class_name.clone(),
                            function: callee.fn_name.clone(),
                        });
                    }
                    callee.target = Some(class.id());
                }
                InstrKind::New { class, .. } => {
                    class.target = Some(view.class_checked(&class.class_name)?.id());
                }
                _ => {}
            }
        }
        Ok(())
    }

    // ----- type checking -----

    /// Infer destination types and check every instruction.
    ///
    /// The declared type of the return register is frozen: inference must
    /// reproduce it.
    pub(crate) fn infer_and_check_types(
        &mut self,
        view: &ProgramView,
        allow_type_change: bool,
    ) -> Result<(), TypeError> {
        let declared_return = self.registers[self.ret].ty().cloned();

        for i in 0..self.instructions.len() {
            let instruction = &self.instructions[i];
            check_instruction(&mut self.registers, view, instruction, allow_type_change)?;
        }

        let inferred_return = self.registers[self.ret].ty().cloned();
        if inferred_return != declared_return {
            return Err(TypeError::ReturnTypeChanged {
                function: self.context(),
                declared: declared_return,
                inferred: inferred_return,
            });
        }
        Ok(())
    }

    // ----- security checks -----

    pub(crate) fn check_access_policy(&self, view: &ProgramView) -> Result<(), SecurityError> {
        let this_class = self.class_name.as_deref().unwrap_or("<detached>");

        for instruction in &self.instructions {
            if let Some(dst) = instruction.destination() {
                if dst == self.me {
                    return Err(SecurityError::MeOverwrite {
                        function: self.context(),
                    });
                }
            }

            match &instruction.kind {
                InstrKind::Store { obj, field, .. } => {
                    let target = self.operand_type_name(obj);
                    if target.as_deref() != Some(this_class) {
                        return Err(SecurityError::CrossClassStore {
                            from: this_class.to_owned(),
                            target: target.unwrap_or_else(|| "<untyped>".to_owned()),
                        });
                    }
                    if field.field_name == "owner" && !self.is_constructor {
                        let class = view.class_checked(this_class)?;
                        if class.has_address() {
                            return Err(SecurityError::OwnerImmutable {
                                class: this_class.to_owned(),
                            });
                        }
                    }
                }
                InstrKind::Call { callee, .. } => {
                    let sig = view.function_checked(&callee.class_name, &callee.fn_name)?;
                    if sig.is_private() {
                        let allowed = match sig.is_private_for() {
                            Some(owner) => this_class == owner,
                            None => this_class == callee.class_name,
                        };
                        if !allowed {
                            return Err(SecurityError::PrivateCall {
                                function: callee.fn_name.clone(),
                                target: callee.class_name.clone(),
                                from: this_class.to_owned(),
                                restricted_to: sig.is_private_for().map(str::to_owned),
                            });
                        }
                    }
                }
                InstrKind::New { class, .. } => {
                    if class.class_name != this_class {
                        return Err(SecurityError::CrossClassNew {
                            from: this_class.to_owned(),
                            target: class.class_name.clone(),
                        });
                    }
                }
                InstrKind::Pk { obj, .. } => {
                    let ty = obj.ty(&self.registers);
                    let name = match ty.and_then(AsmType::contract_name) {
                        Some(name) => name,
                        None => {
                            return Err(SecurityError::PkOnNonContract {
                                ty: ty.map(ToString::to_string)
                                    .unwrap_or_else(|| "<untyped>".to_owned()),
                            })
                        }
                    };
                    if !view.class_checked(name)?.has_address() {
                        return Err(SecurityError::PkWithoutAddress {
                            class: name.to_owned(),
                        });
                    }
                }
                InstrKind::Kill { obj } => {
                    let target = self.operand_type_name(obj);
                    if target.as_deref() != Some(this_class) {
                        return Err(SecurityError::CrossClassKill {
                            from: this_class.to_owned(),
                            target: target.unwrap_or_else(|| "<untyped>".to_owned()),
                        });
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Labels must be dot-free and unique within the function.
    pub(crate) fn check_register_labels(&self) -> Result<(), SecurityError> {
        let mut seen: HashMap<&str, RegId> = HashMap::new();
        for (id, register) in self.registers.iter() {
            if register.label().contains('.') {
                return Err(SecurityError::RegisterLabelWithDot {
                    label: register.label().to_owned(),
                });
            }
            if let Some(&other) = seen.get(register.label()) {
                if other != id {
                    return Err(SecurityError::DuplicateRegisterLabel {
                        function: self.context(),
                        label: register.label().to_owned(),
                    });
                }
            }
            seen.insert(register.label(), id);
        }
        Ok(())
    }

    /// `NEW` may only open a function; a function opened by `NEW` must
    /// initialize every declared field of its class.
    pub(crate) fn check_constructor(&self, class_fields: &[String]) -> Result<(), SecurityError> {
        for instruction in self.instructions.iter().skip(1) {
            if matches!(instruction.kind, InstrKind::New { .. }) {
                return Err(SecurityError::NewNotFirst {
                    function: self.context(),
                });
            }
        }

        let self_register = match self.instructions.first() {
            Some(Instruction {
                kind: InstrKind::New { dst, .. },
                ..
            }) => *dst,
            _ => return Ok(()),
        };

        let mut written: BTreeSet<&str> = BTreeSet::new();
        for instruction in &self.instructions {
            if let InstrKind::Store { obj, field, .. } = &instruction.kind {
                if obj.as_reg() == Some(self_register) {
                    written.insert(&field.field_name);
                }
            }
        }
        for field in class_fields {
            if !written.contains(field.as_str()) {
                return Err(SecurityError::ConstructorFieldUninitialized {
                    class: self.class_name.clone().unwrap_or_default(),
                    function: self.name.clone(),
                    field: field.clone(),
                });
            }
        }
        Ok(())
    }

    // ----- runtime type checks -----

    /// Prepend the per-argument runtime type assertions.
    pub(crate) fn insert_runtime_checks(&mut self, view: &ProgramView) -> Result<(), AssemblyError> {
        let mut checks = Vec::new();
        let mut contract_args = 0usize;
        let span = Span::in_function(self.context());

        for &arg in &self.args {
            match self.registers[arg].ty().cloned() {
                Some(AsmType::Uint) => {
                    // "+0" forces the mod-2^120 range check in the processor
                    checks.push(Instruction::new(
                        InstrKind::Bin {
                            op: BinaryOp::Plus,
                            dst: arg,
                            lhs: Operand::Reg(arg),
                            rhs: Operand::Const(Constant::uint(0).map_err(AssemblyError::Type)?),
                        },
                        span.clone(),
                    ));
                }
                Some(AsmType::Contract(name)) => {
                    let class = view.class_checked(&name).map_err(AssemblyError::Security)?;
                    let expected = Constant::new(
                        Scalar::from(class.id().as_usize() as u64),
                        AsmType::Uint,
                    )
                    .map_err(AssemblyError::Type)?;
                    let cid_reg = self
                        .registers
                        .alloc(format!("cid-check-{contract_args}"));
                    checks.push(Instruction::new(
                        InstrKind::Cid {
                            dst: cid_reg,
                            obj: Operand::Reg(arg),
                        },
                        span.clone(),
                    ));
                    checks.push(Instruction::new(
                        InstrKind::Bin {
                            op: BinaryOp::Equals,
                            dst: cid_reg,
                            lhs: Operand::Reg(cid_reg),
                            rhs: Operand::Const(expected),
                        },
                        span.clone(),
                    ));
                    checks.push(Instruction::new(
                        InstrKind::Req {
                            cond: Operand::Reg(cid_reg),
                        },
                        span.clone(),
                    ));
                    contract_args += 1;
                }
                _ => {}
            }
        }
        self.runtime_checks = checks;
        Ok(())
    }

    // ----- inlining -----

    /// The `(class, function)` pairs this function still calls.
    pub(crate) fn called_functions(&self) -> BTreeSet<(String, String)> {
        self.instructions
            .iter()
            .filter_map(|instruction| match &instruction.kind {
                InstrKind::Call { callee, .. } => {
                    Some((callee.class_name.clone(), callee.fn_name.clone()))
                }
                _ => None,
            })
            .collect()
    }

    /// Rewrite every `CALL` into the callee body with freshly labeled
    /// registers.
    ///
    /// The callee's latest body is taken from storage, so already-inlined
    /// children are picked up. A call at position `i` clones the callee
    /// registers with the postfix `inlined#i`.
    pub(crate) fn inline(&self, storage: &AssemblyStorage) -> Result<Self, SecurityError> {
        let mut out = self.clone();
        out.instructions = Vec::with_capacity(self.instructions.len());

        for (i, instruction) in self.instructions.iter().enumerate() {
            let (dst, callee, args, sender_is_self) = match &instruction.kind {
                InstrKind::Call {
                    dst,
                    callee,
                    args,
                    sender_is_self,
                } => (*dst, callee, args, *sender_is_self),
                _ => {
                    out.instructions.push(instruction.clone());
                    continue;
                }
            };

            let called = storage.function_by_ref(callee)?;
            let span = instruction.span.clone();
            let mapping = out
                .registers
                .import(called.registers(), &format!("inlined#{i}"));

            // bind the callee's view of the caller
            if sender_is_self {
                out.instructions.push(Instruction::new(
                    InstrKind::Pk {
                        dst: mapping.map(called.me),
                        obj: Operand::Reg(self.args[0]),
                    },
                    span.clone(),
                ));
            } else {
                out.instructions.push(Instruction::new(
                    InstrKind::Mov {
                        dst: mapping.map(called.me),
                        src: Operand::Reg(self.me),
                    },
                    span.clone(),
                ));
            }

            for (&parameter, argument) in called.args.iter().zip(args) {
                out.instructions.push(Instruction::new(
                    InstrKind::Mov {
                        dst: mapping.map(parameter),
                        src: argument.clone(),
                    },
                    span.clone(),
                ));
            }

            for body_instruction in &called.instructions {
                out.instructions
                    .push(body_instruction.remap_registers(|id| mapping.map(id)));
            }

            out.instructions.push(Instruction::new(
                InstrKind::Mov {
                    dst,
                    src: Operand::Reg(mapping.map(called.ret)),
                },
                span,
            ));
        }
        Ok(out)
    }

    // ----- helpers -----

    fn operand_type_name(&self, operand: &Operand) -> Option<String> {
        operand.ty(&self.registers).map(ToString::to_string)
    }
}

fn check_write(
    regs: &mut RegisterFile,
    dst: RegId,
    written: AsmType,
    allow_type_change: bool,
    span: &Span,
) -> Result<(), TypeError> {
    match regs[dst].ty().cloned() {
        Some(declared) if !allow_type_change => {
            check_assignable(&declared, Some(&written), span)
        }
        _ => {
            regs[dst].set_ty(written);
            Ok(())
        }
    }
}

fn check_instruction(
    regs: &mut RegisterFile,
    view: &ProgramView,
    instruction: &Instruction,
    allow_type_change: bool,
) -> Result<(), TypeError> {
    let span = &instruction.span;
    match &instruction.kind {
        InstrKind::NoOp | InstrKind::Kill { .. } => Ok(()),
        InstrKind::Mov { dst, src } => {
            let written = src.ty(regs).cloned().ok_or(TypeError::UntypedWrite {
                span: span.clone(),
            })?;
            check_write(regs, *dst, written, allow_type_change, span)
        }
        InstrKind::CMov { dst, cond, src } => {
            if regs[*dst].ty() != src.ty(regs) {
                return Err(TypeError::CmovTypeMismatch { span: span.clone() });
            }
            if cond.ty(regs) != Some(&AsmType::Uint) {
                return Err(TypeError::CmovConditionNotUint { span: span.clone() });
            }
            let written = src.ty(regs).cloned().ok_or(TypeError::UntypedWrite {
                span: span.clone(),
            })?;
            check_write(regs, *dst, written, allow_type_change, span)
        }
        InstrKind::Req { cond } => check_assignable(&AsmType::Uint, cond.ty(regs), span),
        InstrKind::Load { dst, field, .. } => {
            check_write(regs, *dst, field.ty.clone(), allow_type_change, span)
        }
        InstrKind::Store { src, field, .. } => {
            check_assignable(&field.ty, regs[*src].ty(), span)
        }
        InstrKind::Pk { dst, .. } => {
            check_write(regs, *dst, AsmType::Address, allow_type_change, span)
        }
        InstrKind::New { dst, class } => check_write(
            regs,
            *dst,
            AsmType::contract(class.class_name.clone()),
            allow_type_change,
            span,
        ),
        InstrKind::Cid { dst, .. } | InstrKind::Fresh { dst } => {
            check_write(regs, *dst, AsmType::Long, allow_type_change, span)
        }
        InstrKind::Now { dst } => {
            check_write(regs, *dst, AsmType::Uint, allow_type_change, span)
        }
        InstrKind::Bin { op, dst, lhs, rhs } => {
            if op.requires_uint() {
                if lhs.ty(regs) != Some(&AsmType::Uint) || rhs.ty(regs) != Some(&AsmType::Uint)
                {
                    return Err(TypeError::BinaryOperandNotUint {
                        op: *op,
                        span: span.clone(),
                    });
                }
            } else if lhs.ty(regs) != rhs.ty(regs) {
                return Err(TypeError::EqualsTypeMismatch { span: span.clone() });
            }
            check_write(regs, *dst, AsmType::Uint, allow_type_change, span)
        }
        InstrKind::Call { dst, callee, args, .. } => {
            let sig = view
                .function(&callee.class_name, &callee.fn_name)
                .ok_or(TypeError::UntypedWrite {
                    span: span.clone(),
                })?;
            if sig.arg_types().len() != args.len() {
                return Err(TypeError::CallArity {
                    expected: sig.arg_types().len(),
                    actual: args.len(),
                    span: span.clone(),
                });
            }
            for (expected, actual) in sig.arg_types().iter().zip(args) {
                let expected = expected.as_ref().ok_or(TypeError::UntypedWrite {
                    span: span.clone(),
                })?;
                check_assignable(expected, actual.ty(regs), span)?;
            }
            let written = sig.return_type().cloned().ok_or(TypeError::UntypedWrite {
                span: span.clone(),
            })?;
            check_write(regs, *dst, written, allow_type_change, span)
        }
    }
}

impl fmt::Display for AssemblyFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let args = self
            .args
            .iter()
            .map(|&arg| self.registers[arg].label_with_type())
            .collect::<Vec<_>>()
            .join(", ");
        writeln!(
            f,
            "def {}({args}) -> {}:",
            self.name,
            self.registers[self.ret].label_with_type()
        )?;
        let mut first = true;
        for instruction in self.all_instructions() {
            if !first {
                writeln!(f)?;
            }
            first = false;
            write!(f, "    {}", instruction.display(&self.registers))?;
        }
        Ok(())
    }
}
