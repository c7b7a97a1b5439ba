use veil_asm::{
    AsmType, BinaryOp, Constant, FieldRef, FuncRef, InstrKind, Operand, RegId,
};
use veil_types::Scalar;

use crate::error::CompileError;

use super::{builder::InstructionBuilder, lang::ContractRegistry};

/// Result of running a function body against the emitter.
pub type EmitResult = Result<Option<Expr>, CompileError>;

/// A typed expression value: a register or constant together with its
/// declared type.
#[derive(Debug, Clone)]
pub struct Expr {
    operand: Operand,
    ty: AsmType,
}

impl Expr {
    pub(crate) fn reg(id: RegId, ty: AsmType) -> Self {
        Self {
            operand: Operand::Reg(id),
            ty,
        }
    }

    fn constant(constant: Constant) -> Self {
        let ty = constant.ty().clone();
        Self {
            operand: Operand::Const(constant),
            ty,
        }
    }

    pub fn ty(&self) -> &AsmType {
        &self.ty
    }

    pub(crate) fn operand(&self) -> Operand {
        self.operand.clone()
    }

    pub(crate) fn into_operand(self) -> Operand {
        self.operand
    }

    fn contract_name(&self) -> Result<&str, CompileError> {
        self.ty
            .contract_name()
            .ok_or_else(|| CompileError::NotAContract {
                ty: self.ty.to_string(),
            })
    }
}

/// Records the operations of one function body as IR instructions.
///
/// Field reads become `LOAD`s into fresh registers; field writes lift
/// constants through a `MOV` (the `STORE` opcode takes a register source);
/// calls stay symbolic until the inliner rewrites them.
pub struct FnEmitter<'a> {
    builder: InstructionBuilder,
    registry: &'a ContractRegistry,
}

impl<'a> FnEmitter<'a> {
    pub(crate) fn new(builder: InstructionBuilder, registry: &'a ContractRegistry) -> Self {
        Self { builder, registry }
    }

    pub(crate) fn finish(self) -> InstructionBuilder {
        self.builder
    }

    // ----- values -----

    /// The caller address.
    pub fn me(&self) -> Expr {
        Expr::reg(self.builder.me(), AsmType::Address)
    }

    /// A `uint` literal; must lie in `[0, 2^120)`.
    pub fn uint(&self, value: u128) -> Result<Expr, CompileError> {
        Ok(Expr::constant(Constant::uint(value)?))
    }

    /// A `long` literal.
    pub fn long(&self, value: Scalar) -> Expr {
        Expr::constant(Constant::long(value))
    }

    /// An address literal.
    pub fn address(&self, value: Scalar) -> Expr {
        Expr::constant(Constant::address(value))
    }

    // ----- object access -----

    /// Read `obj.field` into a fresh register.
    pub fn read_field(&mut self, obj: &Expr, field: &str) -> Result<Expr, CompileError> {
        let class = obj.contract_name()?.to_owned();
        let ty = self.registry.field_type(&class, field)?;
        let prefix = if field == "owner" { "owner" } else { "read" };
        let dst = self.builder.next_register(prefix);
        self.builder.push(InstrKind::Load {
            dst,
            obj: obj.operand(),
            field: FieldRef::named(class, field, ty.clone()),
        });
        Ok(Expr::reg(dst, ty))
    }

    /// Write `value` to `obj.field`.
    pub fn write_field(
        &mut self,
        obj: &Expr,
        field: &str,
        value: &Expr,
    ) -> Result<(), CompileError> {
        let class = obj.contract_name()?.to_owned();
        let ty = self.registry.field_type(&class, field)?;
        let src = match value.operand() {
            Operand::Reg(id) => id,
            Operand::Const(constant) => {
                let lifted = self.builder.next_register("constant");
                self.builder.push(InstrKind::Mov {
                    dst: lifted,
                    src: Operand::Const(constant),
                });
                lifted
            }
        };
        self.builder.push(InstrKind::Store {
            src,
            obj: obj.operand(),
            field: FieldRef::named(class, field, ty),
        });
        Ok(())
    }

    /// Public address of an object (`PK`).
    pub fn address_of(&mut self, obj: &Expr) -> Expr {
        let dst = self.builder.next_register("address");
        self.builder.push(InstrKind::Pk {
            dst,
            obj: obj.operand(),
        });
        Expr::reg(dst, AsmType::Address)
    }

    // ----- calls -----

    /// Call `receiver.function(args)`.
    ///
    /// With `sender_is_self` the callee observes the receiver's own address
    /// as caller; otherwise the caller's `me` is propagated.
    pub fn call(
        &mut self,
        receiver: &Expr,
        function: &str,
        args: &[Expr],
        sender_is_self: bool,
    ) -> Result<Expr, CompileError> {
        let class = receiver.contract_name()?.to_owned();
        let return_type = self.registry.return_type(&class, function)?;
        let dst = self.builder.next_register("return");
        let mut call_args = vec![receiver.operand()];
        call_args.extend(args.iter().map(Expr::operand));
        self.builder.push(InstrKind::Call {
            dst,
            callee: FuncRef::named(class, function),
            args: call_args,
            sender_is_self,
        });
        Ok(Expr::reg(dst, return_type))
    }

    /// Create a new object through a constructor of `class`.
    pub fn new_object(
        &mut self,
        class: &str,
        constructor: &str,
        args: &[Expr],
    ) -> Result<Expr, CompileError> {
        let decl = self.registry.function_decl(class, constructor)?;
        if !decl.is_constructor {
            return Err(CompileError::NotAConstructor {
                class: class.to_owned(),
                function: constructor.to_owned(),
            });
        }
        let dst = self.builder.next_register("return");
        self.builder.push(InstrKind::Call {
            dst,
            callee: FuncRef::named(class, constructor),
            args: args.iter().map(Expr::operand).collect(),
            sender_is_self: false,
        });
        Ok(Expr::reg(dst, AsmType::contract(class)))
    }

    // ----- control -----

    /// Abort the transaction unless `cond` holds.
    pub fn require(&mut self, cond: &Expr) {
        self.builder.push(InstrKind::Req {
            cond: cond.operand(),
        });
    }

    /// Abort the transaction unless `lhs == rhs`.
    pub fn require_equals(&mut self, lhs: &Expr, rhs: &Expr) {
        let eq = self.eq(lhs, rhs);
        self.require(&eq);
    }

    /// `cond ? if_true : if_false`, via a `MOV` of the false value followed
    /// by a conditional move of the true value.
    pub fn if_then_else(&mut self, cond: &Expr, if_true: &Expr, if_false: &Expr) -> Expr {
        let dst = self.builder.next_register("res");
        self.builder.push(InstrKind::Mov {
            dst,
            src: if_false.operand(),
        });
        self.builder.push(InstrKind::CMov {
            dst,
            cond: cond.operand(),
            src: if_true.operand(),
        });
        Expr::reg(dst, if_true.ty.clone())
    }

    /// A freshly derived unique value.
    pub fn fresh(&mut self) -> Expr {
        let dst = self.builder.next_register("fresh");
        self.builder.push(InstrKind::Fresh { dst });
        Expr::reg(dst, AsmType::Long)
    }

    /// The current ledger timestamp.
    pub fn now(&mut self) -> Expr {
        let dst = self.builder.next_register("now");
        self.builder.push(InstrKind::Now { dst });
        Expr::reg(dst, AsmType::Uint)
    }

    /// Retire an object, publishing its serial.
    pub fn kill(&mut self, obj: &Expr) {
        self.builder.push(InstrKind::Kill {
            obj: obj.operand(),
        });
    }

    // ----- arithmetic and comparisons -----

    fn bin(&mut self, op: BinaryOp, lhs: &Expr, rhs: &Expr) -> Expr {
        let dst = self.builder.next_register(op.mnemonic());
        self.builder.push(InstrKind::Bin {
            op,
            dst,
            lhs: lhs.operand(),
            rhs: rhs.operand(),
        });
        Expr::reg(dst, AsmType::Uint)
    }

    pub fn add(&mut self, lhs: &Expr, rhs: &Expr) -> Expr {
        self.bin(BinaryOp::Plus, lhs, rhs)
    }

    pub fn sub(&mut self, lhs: &Expr, rhs: &Expr) -> Expr {
        self.bin(BinaryOp::Minus, lhs, rhs)
    }

    pub fn mul(&mut self, lhs: &Expr, rhs: &Expr) -> Expr {
        self.bin(BinaryOp::Multiply, lhs, rhs)
    }

    pub fn eq(&mut self, lhs: &Expr, rhs: &Expr) -> Expr {
        self.bin(BinaryOp::Equals, lhs, rhs)
    }

    pub fn lt(&mut self, lhs: &Expr, rhs: &Expr) -> Expr {
        self.bin(BinaryOp::Less, lhs, rhs)
    }

    /// `lhs > rhs`, encoded as `rhs < lhs`.
    pub fn gt(&mut self, lhs: &Expr, rhs: &Expr) -> Expr {
        self.lt(rhs, lhs)
    }

    /// Boolean negation, `1 - e`.
    pub fn not(&mut self, e: &Expr) -> Expr {
        let one = Expr::constant(Constant::uint64(1));
        self.sub(&one, e)
    }

    /// Boolean conjunction, `a * b`.
    pub fn and(&mut self, lhs: &Expr, rhs: &Expr) -> Expr {
        self.mul(lhs, rhs)
    }

    /// Boolean disjunction, `(a + b) - a * b`.
    pub fn or(&mut self, lhs: &Expr, rhs: &Expr) -> Expr {
        let sum = self.add(lhs, rhs);
        let product = self.mul(lhs, rhs);
        self.sub(&sum, &product)
    }

    pub fn ne(&mut self, lhs: &Expr, rhs: &Expr) -> Expr {
        let eq = self.eq(lhs, rhs);
        self.not(&eq)
    }

    /// `lhs <= rhs` as `(lhs < rhs) | (lhs == rhs)`.
    pub fn le(&mut self, lhs: &Expr, rhs: &Expr) -> Expr {
        let less = self.lt(lhs, rhs);
        let eq = self.eq(lhs, rhs);
        self.or(&less, &eq)
    }

    /// `lhs >= rhs` as `(lhs > rhs) | (lhs == rhs)`.
    pub fn ge(&mut self, lhs: &Expr, rhs: &Expr) -> Expr {
        let greater = self.gt(lhs, rhs);
        let eq = self.eq(lhs, rhs);
        self.or(&greater, &eq)
    }
}
