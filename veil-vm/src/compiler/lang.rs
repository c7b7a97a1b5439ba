use std::collections::BTreeMap;
use std::fmt;

use veil_asm::AsmType;

use crate::error::CompileError;

use super::emitter::{EmitResult, FnEmitter};

/// A field declaration.
#[derive(Debug, Clone)]
pub struct FieldDecl {
    pub name: String,
    pub ty: AsmType,
}

/// Body of a declared function: a closure receiving the emitter and the
/// argument expressions (`self` first), returning the result expression.
pub type FnBody = Box<dyn Fn(&mut FnEmitter<'_>, &[super::Expr]) -> EmitResult>;

/// A function declaration.
///
/// Parameters exclude the implicit `self` receiver. A missing return type
/// defaults to `uint`; constructors return their own class.
pub struct FunctionDecl {
    pub name: String,
    pub params: Vec<(String, AsmType)>,
    pub return_type: Option<AsmType>,
    pub is_constructor: bool,
    pub is_private: bool,
    pub is_private_for: Option<String>,
    pub body: FnBody,
}

impl FunctionDecl {
    pub fn new(
        name: impl Into<String>,
        body: impl Fn(&mut FnEmitter<'_>, &[super::Expr]) -> EmitResult + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
            return_type: None,
            is_constructor: false,
            is_private: false,
            is_private_for: None,
            body: Box::new(body),
        }
    }

    pub fn param(mut self, name: impl Into<String>, ty: AsmType) -> Self {
        self.params.push((name.into(), ty));
        self
    }

    pub fn returns(mut self, ty: AsmType) -> Self {
        self.return_type = Some(ty);
        self
    }

    pub fn constructor(mut self) -> Self {
        self.is_constructor = true;
        self
    }

    pub fn private(mut self) -> Self {
        self.is_private = true;
        self
    }

    /// Private, but callable from `class`.
    pub fn private_for(mut self, class: impl Into<String>) -> Self {
        self.is_private = true;
        self.is_private_for = Some(class.into());
        self
    }
}

impl fmt::Debug for FunctionDecl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionDecl")
            .field("name", &self.name)
            .field("params", &self.params)
            .field("return_type", &self.return_type)
            .field("is_constructor", &self.is_constructor)
            .field("is_private", &self.is_private)
            .field("is_private_for", &self.is_private_for)
            .finish_non_exhaustive()
    }
}

/// A contract class declaration.
///
/// The `owner` field is implicit and must not be declared.
#[derive(Debug)]
pub struct ContractDecl {
    pub qualified_name: String,
    pub has_address: bool,
    pub fields: Vec<FieldDecl>,
    pub functions: Vec<FunctionDecl>,
}

impl ContractDecl {
    pub fn new(qualified_name: impl Into<String>) -> Self {
        Self {
            qualified_name: qualified_name.into(),
            has_address: false,
            fields: Vec::new(),
            functions: Vec::new(),
        }
    }

    /// Make the class address-bearing: `PK` becomes legal on it and its
    /// owner freezes after construction.
    pub fn with_address(mut self) -> Self {
        self.has_address = true;
        self
    }

    pub fn field(mut self, name: impl Into<String>, ty: AsmType) -> Self {
        self.fields.push(FieldDecl {
            name: name.into(),
            ty,
        });
        self
    }

    pub fn function(mut self, function: FunctionDecl) -> Self {
        self.functions.push(function);
        self
    }
}

/// All contract declarations of one compilation, resolvable by name.
#[derive(Debug, Default)]
pub struct ContractRegistry {
    decls: BTreeMap<String, ContractDecl>,
}

impl ContractRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, decl: ContractDecl) {
        self.decls.insert(decl.qualified_name.clone(), decl);
    }

    pub fn decl(&self, qualified_name: &str) -> Option<&ContractDecl> {
        self.decls.get(qualified_name)
    }

    /// Declared type of `class.field`; the implicit `owner` is an address.
    pub fn field_type(&self, class: &str, field: &str) -> Result<AsmType, CompileError> {
        if field == "owner" {
            return Ok(AsmType::Address);
        }
        let decl = self.decl(class).ok_or_else(|| CompileError::UnknownContract {
            name: class.to_owned(),
        })?;
        decl.fields
            .iter()
            .find(|f| f.name == field)
            .map(|f| f.ty.clone())
            .ok_or_else(|| CompileError::UnknownField {
                class: class.to_owned(),
                field: field.to_owned(),
            })
    }

    pub fn function_decl(&self, class: &str, function: &str) -> Result<&FunctionDecl, CompileError> {
        let decl = self.decl(class).ok_or_else(|| CompileError::UnknownContract {
            name: class.to_owned(),
        })?;
        decl.functions
            .iter()
            .find(|f| f.name == function)
            .ok_or_else(|| CompileError::UnknownFunction {
                class: class.to_owned(),
                function: function.to_owned(),
            })
    }

    /// Return type of `class.function` as seen by callers.
    pub fn return_type(&self, class: &str, function: &str) -> Result<AsmType, CompileError> {
        let decl = self.function_decl(class, function)?;
        Ok(if decl.is_constructor {
            AsmType::contract(class)
        } else {
            decl.return_type.clone().unwrap_or(AsmType::Uint)
        })
    }

    /// Compile every registered contract, in name order.
    pub fn compile_all(&self) -> Result<Vec<veil_asm::AssemblyClass>, CompileError> {
        self.decls
            .values()
            .map(|decl| super::compile_contract(decl, self))
            .collect()
    }
}
