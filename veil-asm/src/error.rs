use veil_types::Scalar;

use crate::{instruction::Span, op::BinaryOp, ty::AsmType};

fn fmt_ty(ty: &Option<AsmType>) -> String {
    match ty {
        Some(ty) => ty.to_string(),
        None => "<untyped>".to_owned(),
    }
}

/// Type inference or checking failure.
///
/// Every variant carries the [`Span`] of the IR construction site for
/// diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TypeError {
    /// A `uint` literal outside `[0, 2^120)`.
    #[error("uint literal {value} out of range")]
    UintLiteralOutOfRange {
        value: Scalar,
    },
    #[error("mismatch between expected type ({expected}) and actual type ({}){span}", fmt_ty(.actual))]
    Mismatch {
        expected: AsmType,
        actual: Option<AsmType>,
        span: Span,
    },
    #[error("types should match for =={span}")]
    EqualsTypeMismatch {
        span: Span,
    },
    #[error("binary operation {op} only supported for uint{span}")]
    BinaryOperandNotUint {
        op: BinaryOp,
        span: Span,
    },
    #[error("types must match for CMOV{span}")]
    CmovTypeMismatch {
        span: Span,
    },
    #[error("condition of CMOV must be a boolean value{span}")]
    CmovConditionNotUint {
        span: Span,
    },
    /// A write instruction whose result type cannot be determined.
    #[error("written value has no type{span}")]
    UntypedWrite {
        span: Span,
    },
    #[error("incorrect number of arguments ({actual} instead of {expected}){span}")]
    CallArity {
        expected: usize,
        actual: usize,
        span: Span,
    },
    /// The declared return type of a function was changed by inference.
    #[error(
        "return register of '{function}' has incorrect type annotation {} instead of {}",
        fmt_ty(.declared),
        fmt_ty(.inferred)
    )]
    ReturnTypeChanged {
        function: String,
        declared: Option<AsmType>,
        inferred: Option<AsmType>,
    },
}

/// A proposed action that threatens the integrity of the system.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SecurityError {
    #[error("tried adding class {class} twice")]
    ClassRedeclared {
        class: String,
    },
    #[error("class {class} was already added to a storage")]
    ClassAlreadyAdded {
        class: String,
    },
    #[error("class {class} does not define an \"owner\" field")]
    MissingOwnerField {
        class: String,
    },
    #[error("field \"owner\" of class {class} does not have address type")]
    OwnerFieldNotAddress {
        class: String,
    },
    #[error("field \"owner\" of class {class} is not at location 0")]
    OwnerFieldNotFirst {
        class: String,
    },
    #[error("tried adding field {field} to {class} twice")]
    DuplicateField {
        class: String,
        field: String,
    },
    #[error("tried adding function {function} to {class} twice")]
    DuplicateFunction {
        class: String,
        function: String,
    },
    #[error("tried adding function {function} with incorrect class {owner} to {class}")]
    ForeignFunction {
        class: String,
        function: String,
        owner: String,
    },
    #[error("unknown class {name}")]
    UnknownClass {
        name: String,
    },
    #[error("unknown field {field} of class {class}")]
    UnknownField {
        class: String,
        field: String,
    },
    #[error("unknown function {function} of class {class}")]
    UnknownFunction {
        class: String,
        function: String,
    },
    #[error("unknown type '{ty}' of argument '{argument}' in function '{function}'")]
    UnknownArgumentType {
        function: String,
        argument: String,
        ty: String,
    },
    #[error("function '{function}' declares reserved argument '{argument}'")]
    ReservedArgumentName {
        function: String,
        argument: String,
    },
    #[error("trying to write to field of class {target} from {from}")]
    CrossClassStore {
        from: String,
        target: String,
    },
    #[error("trying to call private function {function} in {target} from {from}")]
    PrivateCall {
        function: String,
        target: String,
        from: String,
        restricted_to: Option<String>,
    },
    #[error("trying to create new {target} object from {from}")]
    CrossClassNew {
        from: String,
        target: String,
    },
    #[error("trying to overwrite \"me\" in function '{function}'")]
    MeOverwrite {
        function: String,
    },
    #[error("trying to change the owner of class {class}, which has an address")]
    OwnerImmutable {
        class: String,
    },
    #[error("trying to access the address of a value of type {ty}")]
    PkOnNonContract {
        ty: String,
    },
    #[error(
        "trying to access the address of class {class}; maybe annotate the class as has_address?"
    )]
    PkWithoutAddress {
        class: String,
    },
    #[error("trying to kill object of class {target} from {from}")]
    CrossClassKill {
        from: String,
        target: String,
    },
    #[error("register label contains a dot: {label}")]
    RegisterLabelWithDot {
        label: String,
    },
    #[error("register label is not unique in '{function}': {label}")]
    DuplicateRegisterLabel {
        function: String,
        label: String,
    },
    #[error("NEW instruction must be first instruction of '{function}'")]
    NewNotFirst {
        function: String,
    },
    #[error("field '{field}' not initialized in constructor '{function}' of class '{class}'")]
    ConstructorFieldUninitialized {
        class: String,
        function: String,
        field: String,
    },
}

/// The intra-storage call graph contains a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("detected cycle in call graph, cannot inline")]
pub struct RecursionError;

/// Register allocation failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AllocationError {
    /// The function needs more register slots than the back-end provides.
    #[error("function '{function}' needs {used} registers, back-end limit is {limit}")]
    RegisterLimit {
        function: String,
        used: usize,
        limit: usize,
    },
}

/// Any failure of the assembly pipeline.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AssemblyError {
    #[error(transparent)]
    Type(#[from] TypeError),
    #[error(transparent)]
    Security(#[from] SecurityError),
    #[error(transparent)]
    Recursion(#[from] RecursionError),
    #[error(transparent)]
    Allocation(#[from] AllocationError),
}
