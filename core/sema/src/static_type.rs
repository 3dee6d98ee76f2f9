//! Static Types
//!
//! Canonical representation of every type the analyzer reasons about. A
//! [`StaticType`] is a cheap, shareable handle: the variant payload lives
//! behind an `Arc` and the qualifier [`TypeFlags`] are stored next to it, so
//! flag manipulation never copies the payload.
//!
//! Equality and hashing are structural. Two independently built `S32@`
//! pointers compare equal; identity of the underlying allocation never
//! matters, except as a shortcut for structs.
//!
//! Structs are defined in two phases. [`StaticType::declare_struct`] returns an
//! incomplete placeholder (size 0) that pointer members may already refer to,
//! and [`StaticType::define_struct`] fills in members and layout exactly once.

use std::cell::RefCell;
use std::fmt::{self, Display, Formatter};
use std::hash::{Hash, Hasher};
use std::ops::BitOr;
use std::sync::{Arc, OnceLock};

use crate::cast::Weight;
use crate::errors::TypeError;

/// Target pointer layout.
pub const POINTER_SIZE: usize = 8;

/// Opaque backend cookie handed out by [`crate::builtins::BuiltinContextGen`].
/// Only compared for identity.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct TypeId(pub usize);

/// Qualifier flags, orthogonal to the type variant.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default)]
pub struct TypeFlags(u8);

impl TypeFlags {
    pub const NONE: TypeFlags = TypeFlags(0);
    pub const REFERENCE: TypeFlags = TypeFlags(1);
    pub const MUTABLE: TypeFlags = TypeFlags(2);

    #[must_use]
    pub fn contains(self, other: TypeFlags) -> bool {
        self.0 & other.0 == other.0
    }

    #[must_use]
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    #[must_use]
    pub fn difference(self, other: TypeFlags) -> TypeFlags {
        TypeFlags(self.0 & !other.0)
    }
}

impl BitOr for TypeFlags {
    type Output = TypeFlags;

    fn bitor(self, rhs: TypeFlags) -> TypeFlags {
        TypeFlags(self.0 | rhs.0)
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum ScalarKind {
    Void,
    Bool,
    SignedInt,
    UnsignedInt,
    /// Character types carry an unsigned range but take no part in arithmetic.
    Char,
}

/// A builtin scalar. Equality considers size, alignment and kind only; the
/// name, backend cookie and literal weight are descriptive.
#[derive(Clone, Debug)]
pub struct ScalarType {
    name: String,
    size: usize,
    alignment: usize,
    kind: ScalarKind,
    type_id: TypeId,
    literal_weight: Weight,
}

impl ScalarType {
    #[must_use]
    pub fn new(
        name: &str,
        size: usize,
        alignment: usize,
        kind: ScalarKind,
        type_id: TypeId,
        literal_weight: Weight,
    ) -> Self {
        Self {
            name: name.to_string(),
            size,
            alignment,
            kind,
            type_id,
            literal_weight,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn size(&self) -> usize {
        self.size
    }

    #[must_use]
    pub fn alignment(&self) -> usize {
        self.alignment
    }

    #[must_use]
    pub fn kind(&self) -> ScalarKind {
        self.kind
    }

    #[must_use]
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Cost of typing an untyped literal as this scalar. Lower is preferred.
    #[must_use]
    pub fn literal_weight(&self) -> Weight {
        self.literal_weight
    }

    #[must_use]
    pub fn bit_width(&self) -> u32 {
        u32::try_from(self.size * 8).unwrap_or(u32::MAX)
    }

    #[must_use]
    pub fn is_signed(&self) -> bool {
        self.kind == ScalarKind::SignedInt
    }

    /// Integers and characters: anything that takes part in range propagation
    /// and integer casts.
    #[must_use]
    pub fn is_integral(&self) -> bool {
        matches!(
            self.kind,
            ScalarKind::SignedInt | ScalarKind::UnsignedInt | ScalarKind::Char
        )
    }
}

impl PartialEq for ScalarType {
    fn eq(&self, other: &Self) -> bool {
        self.size == other.size && self.alignment == other.alignment && self.kind == other.kind
    }
}

impl Eq for ScalarType {}

impl Hash for ScalarType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.size.hash(state);
        self.alignment.hash(state);
        self.kind.hash(state);
    }
}

#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct FunctionType {
    pub return_type: StaticType,
    pub arguments: Vec<StaticType>,
}

#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct PointerType {
    pub pointee: StaticType,
}

#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct ArrayType {
    pub element: StaticType,
    pub count: u64,
}

#[derive(Clone, Debug)]
pub struct StructMember {
    pub name: String,
    pub ty: StaticType,
    pub offset: usize,
}

#[derive(Debug)]
pub struct StructLayout {
    pub members: Vec<StructMember>,
    pub size: usize,
    pub alignment: usize,
}

struct StructBody {
    name: Option<String>,
    layout: OnceLock<StructLayout>,
}

/// Handle to a (possibly still incomplete) struct body. All clones share the
/// body, so defining the struct completes every type value that refers to it.
#[derive(Clone)]
pub struct StructType(Arc<StructBody>);

thread_local! {
    // Pairs of struct bodies currently being compared. Revisiting a pair means
    // the comparison went around a cycle and may assume equality.
    static STRUCTS_IN_COMPARISON: RefCell<Vec<(usize, usize)>> = const { RefCell::new(Vec::new()) };
}

impl StructType {
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.0.name.as_deref()
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.0.layout.get().is_some()
    }

    #[must_use]
    pub fn layout(&self) -> Option<&StructLayout> {
        self.0.layout.get()
    }

    /// Looks up a member by name.
    ///
    /// # Errors
    ///
    /// Returns [`TypeError::IncompleteStruct`] when the struct was declared but
    /// never defined and [`TypeError::MemberNotFound`] when it has no such member.
    pub fn member(&self, name: &str) -> Result<&StructMember, TypeError> {
        let layout = self.layout().ok_or_else(|| TypeError::IncompleteStruct {
            name: self.display_name(),
        })?;
        layout
            .members
            .iter()
            .find(|member| member.name == name)
            .ok_or_else(|| TypeError::MemberNotFound {
                struct_name: self.display_name(),
                member: name.to_string(),
            })
    }

    fn display_name(&self) -> String {
        self.name().unwrap_or("<anonymous>").to_string()
    }

    fn key(&self) -> usize {
        Arc::as_ptr(&self.0) as usize
    }
}

impl PartialEq for StructType {
    fn eq(&self, other: &Self) -> bool {
        if Arc::ptr_eq(&self.0, &other.0) {
            return true;
        }
        if self.0.name != other.0.name {
            return false;
        }
        let pair = (self.key(), other.key());
        let revisiting = STRUCTS_IN_COMPARISON.with(|in_progress| {
            let mut in_progress = in_progress.borrow_mut();
            if in_progress.contains(&pair) {
                true
            } else {
                in_progress.push(pair);
                false
            }
        });
        if revisiting {
            return true;
        }
        let equal = match (self.layout(), other.layout()) {
            (None, None) => true,
            (Some(lhs), Some(rhs)) => {
                lhs.members.len() == rhs.members.len()
                    && lhs
                        .members
                        .iter()
                        .zip(&rhs.members)
                        .all(|(l, r)| l.name == r.name && l.ty == r.ty)
            }
            _ => false,
        };
        STRUCTS_IN_COMPARISON.with(|in_progress| {
            in_progress.borrow_mut().retain(|p| *p != pair);
        });
        equal
    }
}

impl Eq for StructType {}

impl Hash for StructType {
    // Members are left out so the hash stays stable across `define_struct`.
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.name.hash(state);
    }
}

impl fmt::Debug for StructType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("StructType")
            .field("name", &self.0.name)
            .field("complete", &self.is_complete())
            .finish()
    }
}

#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum TypeKind {
    Scalar(ScalarType),
    Function(FunctionType),
    Pointer(PointerType),
    Array(ArrayType),
    Struct(StructType),
}

#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct StaticType {
    kind: Arc<TypeKind>,
    flags: TypeFlags,
}

impl StaticType {
    fn from_kind(kind: TypeKind) -> Self {
        Self {
            kind: Arc::new(kind),
            flags: TypeFlags::NONE,
        }
    }

    #[must_use]
    pub fn scalar(scalar: ScalarType) -> Self {
        Self::from_kind(TypeKind::Scalar(scalar))
    }

    #[must_use]
    pub fn function(return_type: StaticType, arguments: Vec<StaticType>) -> Self {
        Self::from_kind(TypeKind::Function(FunctionType {
            return_type,
            arguments,
        }))
    }

    #[must_use]
    pub fn pointer(pointee: StaticType) -> Self {
        Self::from_kind(TypeKind::Pointer(PointerType { pointee }))
    }

    #[must_use]
    pub fn array(element: StaticType, count: u64) -> Self {
        Self::from_kind(TypeKind::Array(ArrayType { element, count }))
    }

    /// Creates an incomplete struct. `name` is `None` for anonymous structs.
    #[must_use]
    pub fn declare_struct(name: Option<&str>) -> Self {
        Self::from_kind(TypeKind::Struct(StructType(Arc::new(StructBody {
            name: name.map(str::to_string),
            layout: OnceLock::new(),
        }))))
    }

    /// Supplies the member list of a declared struct and computes its layout.
    ///
    /// # Errors
    ///
    /// Fails if `self` is not a struct, if it was already defined, if two members
    /// share a name, or if a member is held by value while its type is incomplete.
    pub fn define_struct(&self, members: Vec<(String, StaticType)>) -> Result<(), TypeError> {
        let TypeKind::Struct(st) = self.kind() else {
            return Err(TypeError::NotAStruct {
                ty: self.to_string(),
            });
        };
        if st.is_complete() {
            return Err(TypeError::StructAlreadyDefined {
                name: st.display_name(),
            });
        }
        let mut laid_out: Vec<StructMember> = Vec::with_capacity(members.len());
        let mut offset = 0;
        let mut alignment = 1;
        for (name, ty) in members {
            if laid_out.iter().any(|m| m.name == name) {
                return Err(TypeError::DuplicateMember {
                    struct_name: st.display_name(),
                    member: name,
                });
            }
            if ty.size() == 0 {
                return Err(TypeError::IncompleteMember {
                    struct_name: st.display_name(),
                    member: name,
                    ty: ty.to_string(),
                });
            }
            let member_alignment = ty.alignment().max(1);
            offset = align_up(offset, member_alignment);
            alignment = alignment.max(member_alignment);
            let size = ty.size();
            laid_out.push(StructMember { name, ty, offset });
            offset += size;
        }
        // Size zero is reserved for incomplete structs.
        let size = align_up(offset, alignment).max(1);
        st.0
            .layout
            .set(StructLayout {
                members: laid_out,
                size,
                alignment,
            })
            .map_err(|_| TypeError::StructAlreadyDefined {
                name: st.display_name(),
            })
    }

    /// Declares and immediately defines a struct.
    ///
    /// # Errors
    ///
    /// See [`StaticType::define_struct`].
    pub fn make_struct(
        name: Option<&str>,
        members: Vec<(String, StaticType)>,
    ) -> Result<Self, TypeError> {
        let ty = Self::declare_struct(name);
        ty.define_struct(members)?;
        Ok(ty)
    }

    #[must_use]
    pub fn kind(&self) -> &TypeKind {
        &self.kind
    }

    #[must_use]
    pub fn flags(&self) -> TypeFlags {
        self.flags
    }

    #[must_use]
    pub fn set_flags(&self, flags: TypeFlags) -> Self {
        Self {
            kind: Arc::clone(&self.kind),
            flags,
        }
    }

    #[must_use]
    pub fn add_flags(&self, flags: TypeFlags) -> Self {
        self.set_flags(self.flags | flags)
    }

    #[must_use]
    pub fn remove_flags(&self, flags: TypeFlags) -> Self {
        self.set_flags(self.flags.difference(flags))
    }

    /// The same type with every qualifier removed.
    #[must_use]
    pub fn unqualified(&self) -> Self {
        self.set_flags(TypeFlags::NONE)
    }

    #[must_use]
    pub fn is_reference(&self) -> bool {
        self.flags.contains(TypeFlags::REFERENCE)
    }

    #[must_use]
    pub fn is_mutable(&self) -> bool {
        self.flags.contains(TypeFlags::MUTABLE)
    }

    #[must_use]
    pub fn as_scalar(&self) -> Option<&ScalarType> {
        match self.kind() {
            TypeKind::Scalar(scalar) => Some(scalar),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_function(&self) -> Option<&FunctionType> {
        match self.kind() {
            TypeKind::Function(function) => Some(function),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_struct(&self) -> Option<&StructType> {
        match self.kind() {
            TypeKind::Struct(st) => Some(st),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_void(&self) -> bool {
        self.as_scalar()
            .is_some_and(|scalar| scalar.kind() == ScalarKind::Void)
    }

    #[must_use]
    pub fn is_bool(&self) -> bool {
        self.as_scalar()
            .is_some_and(|scalar| scalar.kind() == ScalarKind::Bool)
    }

    #[must_use]
    pub fn is_integral(&self) -> bool {
        self.as_scalar().is_some_and(ScalarType::is_integral)
    }

    /// Size in bytes. Zero for `Void` and for incomplete structs.
    #[must_use]
    pub fn size(&self) -> usize {
        match self.kind() {
            TypeKind::Scalar(scalar) => scalar.size(),
            TypeKind::Function(_) | TypeKind::Pointer(_) => POINTER_SIZE,
            TypeKind::Array(array) => {
                array
                    .element
                    .size()
                    .saturating_mul(usize::try_from(array.count).unwrap_or(usize::MAX))
            }
            TypeKind::Struct(st) => st.layout().map_or(0, |layout| layout.size),
        }
    }

    #[must_use]
    pub fn alignment(&self) -> usize {
        match self.kind() {
            TypeKind::Scalar(scalar) => scalar.alignment(),
            TypeKind::Function(_) | TypeKind::Pointer(_) => POINTER_SIZE,
            TypeKind::Array(array) => array.element.alignment(),
            TypeKind::Struct(st) => st.layout().map_or(1, |layout| layout.alignment),
        }
    }

    /// Backend cookie. Only named scalars carry one.
    #[must_use]
    pub fn type_id(&self) -> Option<TypeId> {
        self.as_scalar().map(ScalarType::type_id)
    }

    /// Deterministic, flag-aware encoding used for symbol names.
    #[must_use]
    pub fn mangled_name(&self) -> String {
        let mut mangled = String::new();
        self.mangle_into(&mut mangled, &mut Vec::new());
        mangled
    }

    /// `open` holds the anonymous structs being encoded, so a struct that
    /// reaches itself through a pointer ends in a back-reference.
    fn mangle_into(&self, mangled: &mut String, open: &mut Vec<usize>) {
        if self.is_mutable() {
            mangled.push('M');
        }
        if self.is_reference() {
            mangled.push('R');
        }
        match self.kind() {
            TypeKind::Scalar(scalar) => mangled.push_str(scalar.name()),
            TypeKind::Function(function) => {
                mangled.push('F');
                for argument in &function.arguments {
                    argument.mangle_into(mangled, open);
                }
                mangled.push('_');
                function.return_type.mangle_into(mangled, open);
            }
            TypeKind::Pointer(pointer) => {
                mangled.push('P');
                pointer.pointee.mangle_into(mangled, open);
            }
            TypeKind::Array(array) => {
                mangled.push_str(&format!("A{}_", array.count));
                array.element.mangle_into(mangled, open);
            }
            TypeKind::Struct(st) => match (st.name(), st.layout()) {
                (Some(name), _) => mangled.push_str(&format!("S{}{name}", name.len())),
                // Anonymous structs are told apart by their members.
                (None, _) if open.contains(&st.key()) => mangled.push_str("S0R"),
                (None, None) => mangled.push_str("S0I"),
                (None, Some(layout)) => {
                    open.push(st.key());
                    mangled.push_str(&format!("S0{}_", layout.members.len()));
                    for member in &layout.members {
                        mangled.push_str(&format!("{}{}", member.name.len(), member.name));
                        member.ty.mangle_into(mangled, open);
                    }
                    open.pop();
                }
            },
        }
    }
}

impl Display for StaticType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self.kind() {
            TypeKind::Scalar(scalar) => write!(f, "{}", scalar.name())?,
            TypeKind::Function(function) => {
                write!(f, "(")?;
                for (i, argument) in function.arguments.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{argument}")?;
                }
                write!(f, ")->{}", function.return_type)?;
            }
            TypeKind::Pointer(pointer) => write!(f, "{}@", pointer.pointee)?,
            TypeKind::Array(array) => write!(f, "{}[{}]", array.element, array.count)?,
            TypeKind::Struct(st) => {
                write!(f, "Struct {}", st.name().unwrap_or("<anonymous>"))?;
                if !st.is_complete() {
                    write!(f, "(incomplete)")?;
                }
            }
        }
        if self.is_mutable() {
            write!(f, " mut")?;
        }
        if self.is_reference() {
            write!(f, " ref")?;
        }
        Ok(())
    }
}

fn align_up(offset: usize, alignment: usize) -> usize {
    offset.div_ceil(alignment) * alignment
}
