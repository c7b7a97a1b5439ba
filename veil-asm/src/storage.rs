use std::collections::{BTreeMap, HashMap};

use crate::{
    class::AssemblyClass,
    error::{AllocationError, AssemblyError, RecursionError, SecurityError},
    function::AssemblyFunction,
    ty::AsmType,
    value::{ClassId, FuncRef},
};

/// Whole-program store of compiled classes.
///
/// Classes are added one at a time and then driven through the pipeline
/// phases: link, type and label checks, access policy, constructor checks,
/// inlining, runtime-check insertion, allocation. Repeated invocation is
/// supported for newly added classes only; finalized classes are never
/// reprocessed.
#[derive(Debug, Default)]
pub struct AssemblyStorage {
    classes: Vec<AssemblyClass>,
    ids_by_name: HashMap<String, ClassId>,
    to_check: Vec<ClassId>,
}

impl AssemblyStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a class, assigning the next monotonic class id.
    ///
    /// Rejects name collisions and classes without a well-formed `owner`
    /// field (type `address`, location 0).
    pub fn add_class(&mut self, mut class: AssemblyClass) -> Result<ClassId, SecurityError> {
        let name = class.qualified_name().to_owned();
        if self.ids_by_name.contains_key(&name) {
            return Err(SecurityError::ClassRedeclared { class: name });
        }
        if class.class_id().is_some() {
            return Err(SecurityError::ClassAlreadyAdded { class: name });
        }
        match class.field("owner") {
            None => return Err(SecurityError::MissingOwnerField { class: name }),
            Some(owner) => {
                if !owner.ty().is_address() {
                    return Err(SecurityError::OwnerFieldNotAddress { class: name });
                }
                if owner.location() != Some(0) {
                    return Err(SecurityError::OwnerFieldNotFirst { class: name });
                }
            }
        }

        let id = ClassId(self.classes.len());
        class.set_class_id(id);
        self.ids_by_name.insert(name, id);
        self.classes.push(class);
        self.to_check.push(id);
        Ok(id)
    }

    pub fn class(&self, id: ClassId) -> &AssemblyClass {
        &self.classes[id.0]
    }

    pub fn class_id(&self, qualified_name: &str) -> Option<ClassId> {
        self.ids_by_name.get(qualified_name).copied()
    }

    pub fn class_by_name(&self, qualified_name: &str) -> Option<&AssemblyClass> {
        self.class_id(qualified_name).map(|id| self.class(id))
    }

    pub fn classes(&self) -> impl Iterator<Item = &AssemblyClass> {
        self.classes.iter()
    }

    /// Resolve a linked function reference to its current body.
    pub fn function_by_ref(&self, func: &FuncRef) -> Result<&AssemblyFunction, SecurityError> {
        let class = self
            .class_by_name(&func.class_name)
            .ok_or_else(|| SecurityError::UnknownClass {
                name: func.class_name.clone(),
            })?;
        class
            .function(&func.fn_name)
            .ok_or_else(|| SecurityError::UnknownFunction {
                class: func.class_name.clone(),
                function: func.fn_name.clone(),
            })
    }

    // ----- pipeline phases -----

    /// Resolve every qualified reference of the newly added classes.
    pub fn link_new_classes(&mut self) -> Result<(), SecurityError> {
        let view = self.view();
        for id in self.to_check.clone() {
            for function in self.classes[id.0].functions_mut() {
                function.link(&view)?;
            }
        }
        Ok(())
    }

    /// Type inference, register label checks, access policy and constructor
    /// checks for the newly added classes.
    pub fn check_new_classes(&mut self) -> Result<(), AssemblyError> {
        let view = self.view();
        for id in self.to_check.clone() {
            let field_names = self.classes[id.0].field_names();
            for function in self.classes[id.0].functions_mut() {
                function.infer_and_check_types(&view, false)?;
            }
            let class = &self.classes[id.0];
            for function in class.functions() {
                function.check_access_policy(&view)?;
                function.check_register_labels()?;
                function.check_constructor(&field_names)?;
            }
        }
        Ok(())
    }

    /// Inline every call of the newly added classes, in reverse topological
    /// order of the call graph.
    pub fn inline_new_classes(&mut self) -> Result<(), AssemblyError> {
        let pending: Vec<&str> = self
            .to_check
            .iter()
            .map(|&id| self.classes[id.0].qualified_name())
            .collect();

        // out-edges restricted to the classes being processed
        let mut remaining: BTreeMap<(ClassId, String), Vec<(String, String)>> = BTreeMap::new();
        for &id in &self.to_check {
            let class = &self.classes[id.0];
            for function in class.functions() {
                let callees = function
                    .called_functions()
                    .into_iter()
                    .filter(|(class_name, _)| pending.contains(&class_name.as_str()))
                    .collect();
                remaining.insert((id, function.name().to_owned()), callees);
            }
        }

        while !remaining.is_empty() {
            let ready = remaining
                .iter()
                .find(|(_, callees)| callees.is_empty())
                .map(|((id, name), _)| (*id, name.clone()));

            let (id, name) = ready.ok_or(RecursionError)?;

            let inlined = match self.classes[id.0].function(&name) {
                Some(function) => function.inline(self)?,
                None => return Err(SecurityError::UnknownFunction {
                    class: self.classes[id.0].qualified_name().to_owned(),
                    function: name.clone(),
                }
                .into()),
            };
            let class_name = self.classes[id.0].qualified_name().to_owned();
            self.classes[id.0].replace_function(&name, inlined);

            remaining.remove(&(id, name.clone()));
            for callees in remaining.values_mut() {
                callees.retain(|(c, f)| !(c == &class_name && f == &name));
            }
        }
        Ok(())
    }

    /// Prepend runtime type checks to every function of the newly added
    /// classes.
    pub fn insert_runtime_checks_for_new_classes(&mut self) -> Result<(), AssemblyError> {
        let view = self.view();
        for id in self.to_check.clone() {
            for function in self.classes[id.0].functions_mut() {
                function.insert_runtime_checks(&view)?;
            }
        }
        Ok(())
    }

    /// Assign field locations and register slots for the newly added
    /// classes.
    pub fn allocate_new_classes(&mut self, register_limit: usize) -> Result<(), AllocationError> {
        for id in self.to_check.clone() {
            self.classes[id.0].set_field_locations();
            for function in self.classes[id.0].functions_mut() {
                crate::alloc::RegisterAllocation::run(function, register_limit)?;
            }
        }
        Ok(())
    }

    /// Finish processing; subsequent phases only touch classes added later.
    pub fn reset_new_classes(&mut self) {
        self.to_check.clear();
    }

    pub(crate) fn view(&self) -> ProgramView {
        let mut classes = HashMap::new();
        for class in &self.classes {
            let functions = class
                .functions()
                .map(|function| {
                    let arg_types = function
                        .args()
                        .iter()
                        .map(|&arg| function.registers()[arg].ty().cloned())
                        .collect();
                    let sig = FunctionSig {
                        arg_types,
                        return_type: function.registers()[function.ret()].ty().cloned(),
                        is_private: function.is_private(),
                        is_private_for: function.is_private_for().map(str::to_owned),
                    };
                    (function.name().to_owned(), sig)
                })
                .collect();
            classes.insert(
                class.qualified_name().to_owned(),
                ClassView {
                    id: class.class_id().unwrap_or(ClassId(usize::MAX)),
                    has_address: class.has_address(),
                    fields: class.field_names(),
                    functions,
                },
            );
        }
        ProgramView { classes }
    }
}

/// Immutable snapshot of the signatures and class metadata of a storage,
/// taken before a pipeline phase so the phase can mutate function bodies
/// while consulting it.
#[derive(Debug, Clone)]
pub(crate) struct ProgramView {
    classes: HashMap<String, ClassView>,
}

#[derive(Debug, Clone)]
pub(crate) struct ClassView {
    id: ClassId,
    has_address: bool,
    fields: Vec<String>,
    functions: HashMap<String, FunctionSig>,
}

#[derive(Debug, Clone)]
pub(crate) struct FunctionSig {
    arg_types: Vec<Option<AsmType>>,
    return_type: Option<AsmType>,
    is_private: bool,
    is_private_for: Option<String>,
}

impl ProgramView {
    pub fn class(&self, name: &str) -> Option<&ClassView> {
        self.classes.get(name)
    }

    pub fn class_checked(&self, name: &str) -> Result<&ClassView, SecurityError> {
        self.class(name).ok_or_else(|| SecurityError::UnknownClass {
            name: name.to_owned(),
        })
    }

    pub fn function(&self, class_name: &str, fn_name: &str) -> Option<&FunctionSig> {
        self.class(class_name)?.function(fn_name)
    }

    pub fn function_checked(
        &self,
        class_name: &str,
        fn_name: &str,
    ) -> Result<&FunctionSig, SecurityError> {
        self.class_checked(class_name)?
            .function(fn_name)
            .ok_or_else(|| SecurityError::UnknownFunction {
                class: class_name.to_owned(),
                function: fn_name.to_owned(),
            })
    }
}

impl ClassView {
    pub fn id(&self) -> ClassId {
        self.id
    }

    pub fn has_address(&self) -> bool {
        self.has_address
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.fields.iter().any(|f| f == name)
    }

    pub fn function(&self, name: &str) -> Option<&FunctionSig> {
        self.functions.get(name)
    }
}

impl FunctionSig {
    pub fn arg_types(&self) -> &[Option<AsmType>] {
        &self.arg_types
    }

    pub fn return_type(&self) -> Option<&AsmType> {
        self.return_type.as_ref()
    }

    pub fn is_private(&self) -> bool {
        self.is_private
    }

    pub fn is_private_for(&self) -> Option<&str> {
        self.is_private_for.as_deref()
    }
}
