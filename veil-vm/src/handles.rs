//! Typed façade binding class, function and field names to ledger and
//! runtime calls.

use veil_asm::AsmType;
use veil_types::{Address, Scalar};

use crate::{
    backend::{Account, Backend},
    error::VmError,
    ledger::Ledger,
    runtime::Runtime,
};

/// Misuse of a class or object handle.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HandleError {
    #[error("unknown contract class {class}")]
    UnknownClass {
        class: String,
    },
    #[error("class {class} does not have member {member}")]
    UnknownMember {
        class: String,
        member: String,
    },
    #[error("member {member} is not a constructor function of {class}")]
    NotAConstructor {
        class: String,
        member: String,
    },
    #[error("cannot call constructor function '{member}' on object handle (use class handle instead)")]
    ConstructorOnObject {
        class: String,
        member: String,
    },
    #[error("member {member} of {class} is private")]
    PrivateMember {
        class: String,
        member: String,
    },
    #[error("expected {expected} positional arguments, but got {actual}")]
    WrongArgumentCount {
        expected: usize,
        actual: usize,
    },
    /// A value was expected to be an object reference.
    #[error("return value of {class}.{member} is not an object")]
    NotAnObject {
        class: String,
        member: String,
    },
}

/// An argument of a handle call.
#[derive(Debug, Clone)]
pub enum CallArg {
    Uint(u128),
    Scalar(Scalar),
    Address(Address),
    /// An object reference; marshals to the object id.
    Object(ObjectHandle),
}

impl CallArg {
    fn to_scalar(&self) -> Scalar {
        match self {
            Self::Uint(value) => Scalar::from(*value),
            Self::Scalar(value) => *value,
            Self::Address(address) => Scalar::from(*address),
            Self::Object(handle) => handle.object_id(),
        }
    }
}

impl From<&ObjectHandle> for CallArg {
    fn from(handle: &ObjectHandle) -> Self {
        Self::Object(handle.clone())
    }
}

/// A value returned by a handle call or field read: either a raw scalar or
/// a handle on a referenced object.
#[derive(Debug, Clone)]
pub enum HandleValue {
    Scalar(Scalar),
    Object(ObjectHandle),
}

impl HandleValue {
    pub fn as_scalar(&self) -> Option<Scalar> {
        match self {
            Self::Scalar(value) => Some(*value),
            Self::Object(handle) => Some(handle.object_id()),
        }
    }

    pub fn into_object(self) -> Option<ObjectHandle> {
        match self {
            Self::Object(handle) => Some(handle),
            Self::Scalar(_) => None,
        }
    }
}

fn marshal(args: &[CallArg]) -> Vec<Scalar> {
    args.iter().map(CallArg::to_scalar).collect()
}

/// Handle on a contract class; exposes only its constructors.
#[derive(Debug, Clone)]
pub struct ClassHandle {
    class_name: String,
}

impl ClassHandle {
    pub fn new(class_name: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
        }
    }

    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    /// Call a constructor; returns a handle on the created object.
    ///
    /// All calls carry an explicit `sender` account.
    pub fn construct<B: Backend>(
        &self,
        runtime: &mut Runtime<B>,
        ledger: &mut Ledger,
        constructor: &str,
        sender: &Account,
        args: &[CallArg],
    ) -> Result<ObjectHandle, VmError> {
        let function = lookup(ledger, &self.class_name, constructor)?;
        if !function.is_constructor() {
            return Err(HandleError::NotAConstructor {
                class: self.class_name.clone(),
                member: constructor.to_owned(),
            }
            .into());
        }
        if function.is_private() {
            return Err(HandleError::PrivateMember {
                class: self.class_name.clone(),
                member: constructor.to_owned(),
            }
            .into());
        }
        // constructor arguments exclude the implicit receiver
        if function.args().len() != args.len() {
            return Err(HandleError::WrongArgumentCount {
                expected: function.args().len(),
                actual: args.len(),
            }
            .into());
        }

        let object_id = runtime.call_function(
            ledger,
            &self.class_name,
            constructor,
            sender,
            &marshal(args),
        )?;
        Ok(ObjectHandle {
            class_name: self.class_name.clone(),
            object_id,
        })
    }
}

/// Handle on one ledger object; exposes non-constructor functions and field
/// reads.
#[derive(Debug, Clone)]
pub struct ObjectHandle {
    class_name: String,
    object_id: Scalar,
}

impl ObjectHandle {
    pub fn new(class_name: impl Into<String>, object_id: Scalar) -> Self {
        Self {
            class_name: class_name.into(),
            object_id,
        }
    }

    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    pub fn object_id(&self) -> Scalar {
        self.object_id
    }

    /// Call a non-constructor function on this object.
    ///
    /// A contract-typed return value is wrapped into a new handle.
    pub fn call<B: Backend>(
        &self,
        runtime: &mut Runtime<B>,
        ledger: &mut Ledger,
        function_name: &str,
        sender: &Account,
        args: &[CallArg],
    ) -> Result<HandleValue, VmError> {
        let function = lookup(ledger, &self.class_name, function_name)?;
        if function.is_constructor() {
            return Err(HandleError::ConstructorOnObject {
                class: self.class_name.clone(),
                member: function_name.to_owned(),
            }
            .into());
        }
        if function.is_private() {
            return Err(HandleError::PrivateMember {
                class: self.class_name.clone(),
                member: function_name.to_owned(),
            }
            .into());
        }
        // the receiver occupies the first argument register
        if function.args().len() != args.len() + 1 {
            return Err(HandleError::WrongArgumentCount {
                expected: function.args().len().saturating_sub(1),
                actual: args.len(),
            }
            .into());
        }
        let return_type = function.registers()[function.ret()].ty().cloned();

        let mut call_args = vec![self.object_id];
        call_args.extend(marshal(args));
        let returned = runtime.call_function(
            ledger,
            &self.class_name,
            function_name,
            sender,
            &call_args,
        )?;

        Ok(match return_type {
            Some(AsmType::Contract(class)) => {
                HandleValue::Object(ObjectHandle::new(class, returned))
            }
            _ => HandleValue::Scalar(returned),
        })
    }

    /// Read a field of this object.
    ///
    /// Contract-typed fields come back as a handle on the referenced
    /// object.
    pub fn field<B: Backend>(
        &self,
        runtime: &Runtime<B>,
        ledger: &Ledger,
        field_name: &str,
    ) -> Result<HandleValue, VmError> {
        let class = ledger
            .storage()
            .class_by_name(&self.class_name)
            .ok_or_else(|| HandleError::UnknownClass {
                class: self.class_name.clone(),
            })?;
        let field = class
            .field(field_name)
            .ok_or_else(|| HandleError::UnknownMember {
                class: self.class_name.clone(),
                member: field_name.to_owned(),
            })?;
        let field_type = field.ty().clone();

        let values = runtime.field_values(ledger, &self.object_id)?;
        let value = values
            .get(field_name)
            .copied()
            .ok_or_else(|| HandleError::UnknownMember {
                class: self.class_name.clone(),
                member: field_name.to_owned(),
            })?;

        Ok(match field_type {
            AsmType::Contract(class) => HandleValue::Object(ObjectHandle::new(class, value)),
            _ => HandleValue::Scalar(value),
        })
    }

    /// Public address of this object.
    pub fn address<B: Backend>(&self, runtime: &Runtime<B>) -> Result<Scalar, VmError> {
        let state = runtime.raw_state(&self.object_id)?;
        Ok(Scalar::from_hex(&state.addr_object)?)
    }
}

fn lookup<'a>(
    ledger: &'a Ledger,
    class_name: &str,
    member: &str,
) -> Result<&'a veil_asm::AssemblyFunction, VmError> {
    let class = ledger
        .storage()
        .class_by_name(class_name)
        .ok_or_else(|| HandleError::UnknownClass {
            class: class_name.to_owned(),
        })?;
    Ok(class
        .function(member)
        .ok_or_else(|| HandleError::UnknownMember {
            class: class_name.to_owned(),
            member: member.to_owned(),
        })?)
}
