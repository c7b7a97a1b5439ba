use core::fmt;

use crate::ty::AsmType;

/// A field declaration of an [`crate::AssemblyClass`].
///
/// The location (field slot) is assigned by the owning class: fields are
/// ordered by name with `owner` forced to the front, locations counting from
/// zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssemblyField {
    name: String,
    ty: AsmType,
    location: Option<usize>,
}

impl AssemblyField {
    pub fn new(name: impl Into<String>, ty: AsmType) -> Self {
        Self {
            name: name.into(),
            ty,
            location: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ty(&self) -> &AsmType {
        &self.ty
    }

    pub fn location(&self) -> Option<usize> {
        self.location
    }

    pub(crate) fn set_location(&mut self, location: usize) {
        self.location = Some(location);
    }
}

impl fmt::Display for AssemblyField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.ty, self.name)
    }
}
