use core::fmt;

use crate::{
    error::SecurityError,
    field::AssemblyField,
    function::AssemblyFunction,
    value::ClassId,
};

/// A compiled contract class: an ordered set of fields and functions.
///
/// The class id is assigned when the class is added to an
/// [`crate::AssemblyStorage`]; after the pipeline has run, the class is
/// immutable.
#[derive(Debug, Clone, PartialEq)]
pub struct AssemblyClass {
    qualified_name: String,
    has_address: bool,
    fields: Vec<AssemblyField>,
    functions: Vec<AssemblyFunction>,
    class_id: Option<ClassId>,
}

impl AssemblyClass {
    pub fn new(qualified_name: impl Into<String>, has_address: bool) -> Self {
        Self {
            qualified_name: qualified_name.into(),
            has_address,
            fields: Vec::new(),
            functions: Vec::new(),
            class_id: None,
        }
    }

    pub fn qualified_name(&self) -> &str {
        &self.qualified_name
    }

    pub fn has_address(&self) -> bool {
        self.has_address
    }

    pub fn class_id(&self) -> Option<ClassId> {
        self.class_id
    }

    pub(crate) fn set_class_id(&mut self, id: ClassId) {
        self.class_id = Some(id);
    }

    // ----- fields -----

    /// Add a field; recomputes every field location.
    pub fn add_field(&mut self, field: AssemblyField) -> Result<(), SecurityError> {
        if self.field(field.name()).is_some() {
            return Err(SecurityError::DuplicateField {
                class: self.qualified_name.clone(),
                field: field.name().to_owned(),
            });
        }
        self.fields.push(field);
        self.set_field_locations();
        Ok(())
    }

    pub fn field(&self, name: &str) -> Option<&AssemblyField> {
        self.fields.iter().find(|f| f.name() == name)
    }

    /// Fields in declaration order.
    pub fn fields(&self) -> impl Iterator<Item = &AssemblyField> {
        self.fields.iter()
    }

    pub(crate) fn field_names(&self) -> Vec<String> {
        self.fields.iter().map(|f| f.name().to_owned()).collect()
    }

    /// Order fields by name, force `owner` to the front, and assign
    /// locations 0, 1, 2, ...
    pub fn set_field_locations(&mut self) {
        let mut ordered: Vec<String> = self.fields.iter().map(|f| f.name().to_owned()).collect();
        ordered.sort();
        if let Some(pos) = ordered.iter().position(|name| name == "owner") {
            let owner = ordered.remove(pos);
            ordered.insert(0, owner);
        }
        for (location, name) in ordered.iter().enumerate() {
            if let Some(field) = self.fields.iter_mut().find(|f| f.name() == name.as_str()) {
                field.set_location(location);
            }
        }
    }

    // ----- functions -----

    pub fn add_function(&mut self, mut function: AssemblyFunction) -> Result<(), SecurityError> {
        if let Some(owner) = function.class_name() {
            if owner != self.qualified_name {
                return Err(SecurityError::ForeignFunction {
                    class: self.qualified_name.clone(),
                    function: function.name().to_owned(),
                    owner: owner.to_owned(),
                });
            }
        }
        if self.function(function.name()).is_some() {
            return Err(SecurityError::DuplicateFunction {
                class: self.qualified_name.clone(),
                function: function.name().to_owned(),
            });
        }
        function.set_class_name(&self.qualified_name);
        self.functions.push(function);
        Ok(())
    }

    pub fn function(&self, name: &str) -> Option<&AssemblyFunction> {
        self.functions.iter().find(|f| f.name() == name)
    }

    /// Functions in declaration order.
    pub fn functions(&self) -> impl Iterator<Item = &AssemblyFunction> {
        self.functions.iter()
    }

    pub(crate) fn functions_mut(&mut self) -> impl Iterator<Item = &mut AssemblyFunction> {
        self.functions.iter_mut()
    }

    /// Replace a function body, keeping its position.
    pub(crate) fn replace_function(&mut self, name: &str, function: AssemblyFunction) {
        if let Some(slot) = self.functions.iter_mut().find(|f| f.name() == name) {
            *slot = function;
        }
    }
}

impl fmt::Display for AssemblyClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "class {}:", self.qualified_name)?;
        for field in &self.fields {
            writeln!(f, "    {field}")?;
        }
        let mut first = true;
        for function in &self.functions {
            writeln!(f)?;
            if !first {
                writeln!(f)?;
            }
            first = false;
            let rendered = function.to_string();
            let mut first_line = true;
            for line in rendered.lines() {
                if !first_line {
                    writeln!(f)?;
                }
                first_line = false;
                write!(f, "    {line}")?;
            }
        }
        Ok(())
    }
}
