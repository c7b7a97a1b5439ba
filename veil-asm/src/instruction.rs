use core::fmt;

use crate::{
    op::{BinaryOp, Opcode},
    value::{ClassRef, Constant, FieldRef, FuncRef, Operand, RegId, RegisterFile},
};

/// IR construction site of an instruction, kept for diagnostics.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Span {
    context: Option<String>,
}

impl Span {
    pub fn none() -> Self {
        Self::default()
    }

    /// Span naming the contract function the instruction was emitted for.
    pub fn in_function(context: impl Into<String>) -> Self {
        Self {
            context: Some(context.into()),
        }
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.context {
            Some(context) => write!(f, " (in {context})"),
            None => Ok(()),
        }
    }
}

/// One three-operand instruction.
///
/// Register operands are ids into the arena of the enclosing function. Write
/// instructions carry their destination first; `STORE` carries the source
/// register and targets `obj.field`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstrKind {
    NoOp,
    Mov {
        dst: RegId,
        src: Operand,
    },
    CMov {
        dst: RegId,
        cond: Operand,
        src: Operand,
    },
    Req {
        cond: Operand,
    },
    Load {
        dst: RegId,
        obj: Operand,
        field: FieldRef,
    },
    Store {
        src: RegId,
        obj: Operand,
        field: FieldRef,
    },
    Kill {
        obj: Operand,
    },
    Pk {
        dst: RegId,
        obj: Operand,
    },
    New {
        dst: RegId,
        class: ClassRef,
    },
    Cid {
        dst: RegId,
        obj: Operand,
    },
    Fresh {
        dst: RegId,
    },
    Now {
        dst: RegId,
    },
    Bin {
        op: BinaryOp,
        dst: RegId,
        lhs: Operand,
        rhs: Operand,
    },
    /// Symbolic call, rewritten away by the inliner; never serialized.
    Call {
        dst: RegId,
        callee: FuncRef,
        args: Vec<Operand>,
        sender_is_self: bool,
    },
}

/// An [`InstrKind`] together with its construction site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    pub kind: InstrKind,
    pub span: Span,
}

impl Instruction {
    pub fn new(kind: InstrKind, span: Span) -> Self {
        Self { kind, span }
    }

    /// The opcode of this instruction; `None` for calls, which have no
    /// processor encoding.
    pub fn opcode(&self) -> Option<Opcode> {
        use InstrKind::*;
        match &self.kind {
            NoOp => Some(Opcode::NOOP),
            Mov { .. } => Some(Opcode::MOV),
            CMov { .. } => Some(Opcode::CMOV),
            Req { .. } => Some(Opcode::REQ),
            Load { .. } => Some(Opcode::LOAD),
            Store { .. } => Some(Opcode::STORE),
            Kill { .. } => Some(Opcode::KILL),
            Pk { .. } => Some(Opcode::PK),
            New { .. } => Some(Opcode::NEW),
            Cid { .. } => Some(Opcode::CID),
            Fresh { .. } => Some(Opcode::FRESH),
            Now { .. } => Some(Opcode::NOW),
            Bin { op, .. } => Some(op.opcode()),
            Call { .. } => None,
        }
    }

    /// Destination register of a write instruction.
    pub fn destination(&self) -> Option<RegId> {
        use InstrKind::*;
        match &self.kind {
            Mov { dst, .. }
            | CMov { dst, .. }
            | Load { dst, .. }
            | Pk { dst, .. }
            | New { dst, .. }
            | Cid { dst, .. }
            | Fresh { dst }
            | Now { dst }
            | Bin { dst, .. }
            | Call { dst, .. } => Some(*dst),
            NoOp | Req { .. } | Store { .. } | Kill { .. } => None,
        }
    }

    /// Every register this instruction mentions, destination first.
    pub fn registers(&self) -> Vec<RegId> {
        use InstrKind::*;
        let mut out = Vec::new();
        let push_op = |out: &mut Vec<RegId>, op: &Operand| {
            if let Operand::Reg(id) = op {
                out.push(*id);
            }
        };
        match &self.kind {
            NoOp => {}
            Mov { dst, src } => {
                out.push(*dst);
                push_op(&mut out, src);
            }
            CMov { dst, cond, src } => {
                out.push(*dst);
                push_op(&mut out, cond);
                push_op(&mut out, src);
            }
            Req { cond } => push_op(&mut out, cond),
            Load { dst, obj, .. } => {
                out.push(*dst);
                push_op(&mut out, obj);
            }
            Store { src, obj, .. } => {
                out.push(*src);
                push_op(&mut out, obj);
            }
            Kill { obj } => push_op(&mut out, obj),
            Pk { dst, obj } | Cid { dst, obj } => {
                out.push(*dst);
                push_op(&mut out, obj);
            }
            New { dst, .. } | Fresh { dst } | Now { dst } => out.push(*dst),
            Bin { dst, lhs, rhs, .. } => {
                out.push(*dst);
                push_op(&mut out, lhs);
                push_op(&mut out, rhs);
            }
            Call { dst, args, .. } => {
                out.push(*dst);
                for arg in args {
                    push_op(&mut out, arg);
                }
            }
        }
        out
    }

    /// Clone with every register id rewritten through `map`.
    pub fn remap_registers(&self, map: impl Fn(RegId) -> RegId) -> Self {
        use InstrKind::*;
        let map_op = |op: &Operand| match op {
            Operand::Reg(id) => Operand::Reg(map(*id)),
            Operand::Const(c) => Operand::Const(c.clone()),
        };
        let kind = match &self.kind {
            NoOp => NoOp,
            Mov { dst, src } => Mov {
                dst: map(*dst),
                src: map_op(src),
            },
            CMov { dst, cond, src } => CMov {
                dst: map(*dst),
                cond: map_op(cond),
                src: map_op(src),
            },
            Req { cond } => Req { cond: map_op(cond) },
            Load { dst, obj, field } => Load {
                dst: map(*dst),
                obj: map_op(obj),
                field: field.clone(),
            },
            Store { src, obj, field } => Store {
                src: map(*src),
                obj: map_op(obj),
                field: field.clone(),
            },
            Kill { obj } => Kill { obj: map_op(obj) },
            Pk { dst, obj } => Pk {
                dst: map(*dst),
                obj: map_op(obj),
            },
            New { dst, class } => New {
                dst: map(*dst),
                class: class.clone(),
            },
            Cid { dst, obj } => Cid {
                dst: map(*dst),
                obj: map_op(obj),
            },
            Fresh { dst } => Fresh { dst: map(*dst) },
            Now { dst } => Now { dst: map(*dst) },
            Bin { op, dst, lhs, rhs } => Bin {
                op: *op,
                dst: map(*dst),
                lhs: map_op(lhs),
                rhs: map_op(rhs),
            },
            Call {
                dst,
                callee,
                args,
                sender_is_self,
            } => Call {
                dst: map(*dst),
                callee: callee.clone(),
                args: args.iter().map(map_op).collect(),
                sender_is_self: *sender_is_self,
            },
        };
        Self {
            kind,
            span: self.span.clone(),
        }
    }

    /// Renders the instruction against the register arena of its function.
    pub fn display<'a>(&'a self, regs: &'a RegisterFile) -> InstructionDisplay<'a> {
        InstructionDisplay {
            instruction: self,
            regs,
        }
    }
}

impl From<InstrKind> for Instruction {
    fn from(kind: InstrKind) -> Self {
        Self::new(kind, Span::none())
    }
}

/// Stable textual rendering of an instruction, `OPCODE dst src1 src2` with
/// `_` for absent operands.
pub struct InstructionDisplay<'a> {
    instruction: &'a Instruction,
    regs: &'a RegisterFile,
}

impl InstructionDisplay<'_> {
    fn operand(&self, op: &Operand) -> String {
        match op {
            Operand::Reg(id) => self.regs[*id].label().to_owned(),
            Operand::Const(c) => c.to_string(),
        }
    }

    fn reg(&self, id: RegId) -> &str {
        self.regs[id].label()
    }
}

impl fmt::Display for InstructionDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use InstrKind::*;
        match &self.instruction.kind {
            NoOp => write!(f, "NOOP _ _ _"),
            Mov { dst, src } => {
                write!(f, "MOV {} {} _", self.reg(*dst), self.operand(src))
            }
            CMov { dst, cond, src } => write!(
                f,
                "CMOV {} {} {}",
                self.reg(*dst),
                self.operand(cond),
                self.operand(src)
            ),
            Req { cond } => write!(f, "REQ _ {} _", self.operand(cond)),
            Load { dst, obj, field } => write!(
                f,
                "LOAD {} {} {}",
                self.reg(*dst),
                self.operand(obj),
                field.field_name
            ),
            Store { src, obj, field } => write!(
                f,
                "STORE {} {} {}",
                self.reg(*src),
                self.operand(obj),
                field.field_name
            ),
            Kill { obj } => write!(f, "KILL _ {} _", self.operand(obj)),
            Pk { dst, obj } => {
                write!(f, "PK {} {} _", self.reg(*dst), self.operand(obj))
            }
            New { dst, class } => {
                write!(f, "NEW {} {} _", self.reg(*dst), class.class_name)
            }
            Cid { dst, obj } => {
                write!(f, "CID {} {} _", self.reg(*dst), self.operand(obj))
            }
            Fresh { dst } => write!(f, "FRESH {} _ _", self.reg(*dst)),
            Now { dst } => write!(f, "NOW {} _ _", self.reg(*dst)),
            Bin { op, dst, lhs, rhs } => write!(
                f,
                "{} {} {} {}",
                op.mnemonic(),
                self.reg(*dst),
                self.operand(lhs),
                self.operand(rhs)
            ),
            Call {
                dst,
                callee,
                args,
                ..
            } => {
                write!(f, "CALL {} {}", callee.qualified(), self.reg(*dst))?;
                for arg in args {
                    write!(f, " {}", self.operand(arg))?;
                }
                Ok(())
            }
        }
    }
}
