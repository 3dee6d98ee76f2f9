//! Lookup Context
//!
//! Scopes form a parent-linked chain. Each scope owns its named types, its
//! named objects (variables and function overload sets) and the casts whose
//! destination it registered. Lookup starts at the current scope and walks
//! outwards; the first match wins, so inner declarations shadow outer ones.
//!
//! The root scope is created by [`crate::builtins::prepare`] and shared by
//! every module context derived from it. It also owns the reverse table from
//! backend [`TypeId`] cookies to named types, which is filled while builtins
//! are registered and sealed afterwards.

use std::cell::RefCell;
use std::rc::Rc;

use anyhow::bail;
use practical_ast::nodes::Location;
use rustc_hash::FxHashMap;

use crate::cast::{CastDescriptor, CastGraph, CastOp, ImplicitCastAllowed, identity_range};
use crate::codegen::ExpressionId;
use crate::errors::ice;
use crate::operators::BuiltinOperator;
use crate::static_type::{FunctionType, StaticType, TypeFlags, TypeId};
use crate::value_range::ValueRange;

pub(crate) type ScopeRef = Rc<RefCell<Scope>>;

#[derive(Clone, Debug)]
pub struct NamedType {
    pub name: String,
    pub ty: StaticType,
}

/// A variable is addressed through its lvalue: `ty` carries the Reference
/// flag (and Mutable when declared so), and `lvalue_id` is the expression id
/// under which the backend allocated its storage.
#[derive(Debug)]
pub struct LocalVariable {
    pub name: String,
    pub ty: StaticType,
    pub lvalue_id: ExpressionId,
    pub range: Option<ValueRange>,
    pub location: Location,
}

#[derive(Clone, Debug)]
pub enum OverloadKind {
    User { mangled_name: String },
    Builtin(BuiltinOperator),
}

#[derive(Debug)]
pub struct FunctionOverload {
    pub name: String,
    pub ty: StaticType,
    pub argument_names: Vec<String>,
    pub kind: OverloadKind,
    pub location: Option<Location>,
}

impl FunctionOverload {
    #[must_use]
    pub fn signature(&self) -> &FunctionType {
        match self.ty.as_function() {
            Some(function) => function,
            None => ice!("overload `{}` has non-function type `{}`", self.name, self.ty),
        }
    }
}

/// Overload set sharing one name within one scope.
#[derive(Clone, Debug, Default)]
pub struct Function {
    pub name: String,
    pub overloads: Vec<Rc<FunctionOverload>>,
}

#[derive(Clone, Debug)]
pub enum NamedObject {
    Variable(Rc<LocalVariable>),
    Function(Function),
}

#[derive(Debug)]
pub(crate) struct Scope {
    id: u32,
    parent: Option<ScopeRef>,
    types: FxHashMap<String, NamedType>,
    objects: FxHashMap<String, NamedObject>,
    casts: FxHashMap<StaticType, Vec<CastDescriptor>>,
}

impl Scope {
    #[must_use = "scope constructor returns a new scope that should be used"]
    fn new(id: u32, parent: Option<ScopeRef>) -> ScopeRef {
        Rc::new(RefCell::new(Self {
            id,
            parent,
            types: FxHashMap::default(),
            objects: FxHashMap::default(),
            casts: FxHashMap::default(),
        }))
    }
}

#[derive(Debug, Default)]
struct TypeRepository {
    by_id: FxHashMap<TypeId, NamedType>,
    sealed: bool,
}

#[derive(Clone, Debug)]
pub struct LookupContext {
    root: ScopeRef,
    current: ScopeRef,
    repository: Rc<RefCell<TypeRepository>>,
    next_scope_id: u32,
}

impl Default for LookupContext {
    fn default() -> Self {
        LookupContext::new()
    }
}

impl LookupContext {
    #[must_use]
    pub fn new() -> Self {
        let root = Scope::new(0, None);
        Self {
            current: Rc::clone(&root),
            root,
            repository: Rc::new(RefCell::new(TypeRepository::default())),
            next_scope_id: 1,
        }
    }

    /// A context whose outermost scope is a fresh child of this context's
    /// root. Used to give every module its own top-level namespace.
    #[must_use]
    pub fn derive_module_context(&self) -> Self {
        let mut derived = Self {
            root: Rc::clone(&self.root),
            current: Rc::clone(&self.root),
            repository: Rc::clone(&self.repository),
            next_scope_id: self.next_scope_id,
        };
        derived.push_scope();
        derived
    }

    pub fn push_scope(&mut self) -> u32 {
        let id = self.next_scope_id;
        self.next_scope_id += 1;
        self.current = Scope::new(id, Some(Rc::clone(&self.current)));
        id
    }

    pub fn pop_scope(&mut self) {
        let parent = self.current.borrow().parent.clone();
        match parent {
            Some(parent) => self.current = parent,
            None => ice!("pop_scope called on the root scope"),
        }
    }

    #[must_use]
    pub fn current_scope_id(&self) -> u32 {
        self.current.borrow().id
    }

    /// Registers a named type in the current scope. Scalars are also entered
    /// in the type-id table.
    ///
    /// # Errors
    ///
    /// Fails if the name is already taken by a type in this scope.
    pub fn register_type(&mut self, name: &str, ty: StaticType) -> anyhow::Result<()> {
        let named = NamedType {
            name: name.to_string(),
            ty,
        };
        {
            let mut scope = self.current.borrow_mut();
            if scope.types.contains_key(name) {
                bail!("Type `{name}` already exists in this scope");
            }
            scope.types.insert(name.to_string(), named.clone());
        }
        if let Some(type_id) = named.ty.type_id() {
            let mut repository = self.repository.borrow_mut();
            if repository.sealed {
                ice!("type `{name}` registered after the type-id table was sealed");
            }
            repository.by_id.insert(type_id, named);
        }
        Ok(())
    }

    /// Freezes the type-id table for the rest of the session.
    pub fn seal_type_ids(&mut self) {
        self.repository.borrow_mut().sealed = true;
    }

    #[must_use = "this is a pure lookup with no side effects"]
    pub fn lookup_type_by_id(&self, type_id: TypeId) -> Option<NamedType> {
        self.repository.borrow().by_id.get(&type_id).cloned()
    }

    #[must_use = "this is a pure lookup with no side effects"]
    pub fn lookup_type(&self, name: &str) -> Option<StaticType> {
        let mut scope = Some(Rc::clone(&self.current));
        while let Some(current) = scope {
            let borrowed = current.borrow();
            if let Some(named) = borrowed.types.get(name) {
                return Some(named.ty.clone());
            }
            scope = borrowed.parent.clone();
        }
        None
    }

    #[must_use = "this is a pure lookup with no side effects"]
    pub fn lookup_identifier(&self, name: &str) -> Option<NamedObject> {
        let mut scope = Some(Rc::clone(&self.current));
        while let Some(current) = scope {
            let borrowed = current.borrow();
            if let Some(object) = borrowed.objects.get(name) {
                return Some(object.clone());
            }
            scope = borrowed.parent.clone();
        }
        None
    }

    /// # Errors
    ///
    /// Fails if the current scope already has an object with this name.
    pub fn register_variable(&mut self, variable: LocalVariable) -> anyhow::Result<Rc<LocalVariable>> {
        let mut scope = self.current.borrow_mut();
        if scope.objects.contains_key(&variable.name) {
            bail!("`{}` already declared in this scope", variable.name);
        }
        let variable = Rc::new(variable);
        scope.objects.insert(
            variable.name.clone(),
            NamedObject::Variable(Rc::clone(&variable)),
        );
        Ok(variable)
    }

    /// First registration phase: reserves the name so that signatures and
    /// bodies may refer to any function of the scope.
    ///
    /// # Errors
    ///
    /// Fails if the name is already used by a variable in this scope.
    pub fn register_function_pass1(&mut self, name: &str) -> anyhow::Result<()> {
        let mut scope = self.current.borrow_mut();
        if let Some(existing) = scope.objects.get(name) {
            if let NamedObject::Variable(_) = existing {
                bail!("`{name}` already declared as a variable in this scope");
            }
            return Ok(());
        }
        scope.objects.insert(
            name.to_string(),
            NamedObject::Function(Function {
                name: name.to_string(),
                overloads: Vec::new(),
            }),
        );
        Ok(())
    }

    /// Second registration phase: attaches one overload to a reserved name.
    ///
    /// # Errors
    ///
    /// Fails if an overload with the same argument types already exists.
    pub fn register_function_pass2(
        &mut self,
        overload: FunctionOverload,
    ) -> anyhow::Result<Rc<FunctionOverload>> {
        let mut scope = self.current.borrow_mut();
        let Some(NamedObject::Function(function)) = scope.objects.get_mut(&overload.name) else {
            ice!("function `{}` reached pass 2 without pass 1", overload.name);
        };
        let arguments = &overload.signature().arguments;
        if function
            .overloads
            .iter()
            .any(|existing| existing.signature().arguments == *arguments)
        {
            bail!(
                "an overload of `{}` with signature `{}` already exists",
                overload.name,
                overload.ty
            );
        }
        let overload = Rc::new(overload);
        function.overloads.push(Rc::clone(&overload));
        Ok(overload)
    }

    /// Registers a conversion in the current scope, indexed by destination.
    pub fn register_cast(&mut self, cast: CastDescriptor) {
        self.current
            .borrow_mut()
            .casts
            .entry(cast.destination.clone())
            .or_default()
            .push(cast);
    }
}

impl CastGraph for LookupContext {
    /// Every registered edge into `destination` visible from the current
    /// scope, plus the implicit decay from qualified variants of an
    /// unqualified destination.
    fn casts_to(&self, destination: &StaticType) -> Vec<CastDescriptor> {
        let mut edges = Vec::new();
        let mut scope = Some(Rc::clone(&self.current));
        while let Some(current) = scope {
            let borrowed = current.borrow();
            if let Some(registered) = borrowed.casts.get(destination) {
                edges.extend(registered.iter().cloned());
            }
            scope = borrowed.parent.clone();
        }
        if destination.flags().is_empty() {
            let decay = |flags: TypeFlags, op: CastOp| {
                CastDescriptor::new(
                    destination.add_flags(flags),
                    destination.clone(),
                    0,
                    ImplicitCastAllowed::Always,
                    op,
                    identity_range,
                )
            };
            edges.push(decay(TypeFlags::REFERENCE, CastOp::Dereference));
            edges.push(decay(
                TypeFlags::REFERENCE | TypeFlags::MUTABLE,
                CastOp::Dereference,
            ));
            edges.push(decay(TypeFlags::MUTABLE, CastOp::NoOp));
        }
        edges
    }
}
