//! Builtin types, conversions and operators.
//!
//! [`prepare`] runs once per session before any module is compiled. The
//! embedding backend supplies the type-id cookie of every builtin scalar; the
//! analyzer then registers the integer cast graph and the operator overloads
//! in the root lookup context and seals the type-id table.
//!
//! Integer cast weights are chosen so that a direct edge is always strictly
//! cheaper than any two-edge chain: every edge costs at least 10 and at most
//! 16 when value-preserving. Narrowing edges (implicit only when the source
//! range fits) cost 30, so widening is preferred whenever both apply.

use tracing::debug;

use crate::cast::{CastDescriptor, CastOp, ImplicitCastAllowed, Weight, integer_range};
use crate::errors::ice;
use crate::lookup_context::{FunctionOverload, LookupContext, OverloadKind};
use crate::operators::{
    ARITHMETIC, BuiltinOp, BuiltinOperator, EQUALITY, ORDERING, OperatorRange, logical_not_range,
};
use crate::static_type::{ScalarKind, ScalarType, StaticType, TypeId};

const CAST_BASE_WEIGHT: Weight = 10;
const SIGN_CHANGE_WEIGHT: Weight = 3;
const NARROWING_WEIGHT: Weight = 30;

/// Backend hook for builtin scalar registration. Returned cookies are opaque.
pub trait BuiltinContextGen {
    fn register_void_type(&mut self) -> TypeId;
    fn register_bool_type(&mut self) -> TypeId;
    fn register_integer_type(&mut self, bit_size: u32, alignment: usize, signed: bool) -> TypeId;
    fn register_char_type(&mut self, bit_size: u32, alignment: usize, signed: bool) -> TypeId;
}

#[derive(Clone, Debug)]
pub struct BuiltinTypes {
    pub void: StaticType,
    pub bool: StaticType,
    pub s8: StaticType,
    pub s16: StaticType,
    pub s32: StaticType,
    pub s64: StaticType,
    pub u8: StaticType,
    pub u16: StaticType,
    pub u32: StaticType,
    pub u64: StaticType,
    pub c8: StaticType,
}

impl BuiltinTypes {
    /// Integer types ordered by literal weight, cheapest first.
    #[must_use]
    pub fn integers(&self) -> [&StaticType; 8] {
        [
            &self.s32, &self.s64, &self.u32, &self.u64, &self.s16, &self.u16, &self.s8, &self.u8,
        ]
    }
}

/// Result of builtin registration: the builtin types and the root context
/// every module is analysed in.
#[derive(Clone, Debug)]
pub struct Builtins {
    types: BuiltinTypes,
    root: LookupContext,
}

impl Builtins {
    #[must_use]
    pub fn types(&self) -> &BuiltinTypes {
        &self.types
    }

    #[must_use]
    pub fn root_context(&self) -> &LookupContext {
        &self.root
    }

    /// A fresh module-level scope on top of the builtin root.
    #[must_use]
    pub fn module_context(&self) -> LookupContext {
        self.root.derive_module_context()
    }
}

/// Registers every builtin with the backend and in a new root context.
pub fn prepare(backend: &mut dyn BuiltinContextGen) -> Builtins {
    let mut int = |name: &str, bits: u32, signed: bool, literal_weight: Weight| {
        let bytes = bits as usize / 8;
        let type_id = backend.register_integer_type(bits, bytes, signed);
        let kind = if signed {
            ScalarKind::SignedInt
        } else {
            ScalarKind::UnsignedInt
        };
        StaticType::scalar(ScalarType::new(name, bytes, bytes, kind, type_id, literal_weight))
    };
    let s8 = int("S8", 8, true, 7);
    let s16 = int("S16", 16, true, 5);
    let s32 = int("S32", 32, true, 1);
    let s64 = int("S64", 64, true, 2);
    let u8 = int("U8", 8, false, 8);
    let u16 = int("U16", 16, false, 6);
    let u32 = int("U32", 32, false, 3);
    let u64 = int("U64", 64, false, 4);
    let types = BuiltinTypes {
        void: StaticType::scalar(ScalarType::new(
            "Void",
            0,
            1,
            ScalarKind::Void,
            backend.register_void_type(),
            Weight::MAX,
        )),
        bool: StaticType::scalar(ScalarType::new(
            "Bool",
            1,
            1,
            ScalarKind::Bool,
            backend.register_bool_type(),
            Weight::MAX,
        )),
        c8: StaticType::scalar(ScalarType::new(
            "C8",
            1,
            1,
            ScalarKind::Char,
            backend.register_char_type(8, 1, false),
            Weight::MAX,
        )),
        s8,
        s16,
        s32,
        s64,
        u8,
        u16,
        u32,
        u64,
    };

    let mut root = LookupContext::new();
    let named = [
        &types.void,
        &types.bool,
        &types.s8,
        &types.s16,
        &types.s32,
        &types.s64,
        &types.u8,
        &types.u16,
        &types.u32,
        &types.u64,
        &types.c8,
    ];
    for ty in named {
        let Some(scalar) = ty.as_scalar() else {
            ice!("builtin `{ty}` is not a scalar");
        };
        if let Err(err) = root.register_type(scalar.name(), ty.clone()) {
            ice!("registering builtin type: {err}");
        }
    }
    root.seal_type_ids();

    register_integer_casts(&mut root, &types);
    register_operators(&mut root, &types);
    debug!(scope = root.current_scope_id(), "builtins prepared");
    Builtins { types, root }
}

fn register_integer_casts(root: &mut LookupContext, types: &BuiltinTypes) {
    for source in types.integers() {
        for destination in types.integers() {
            if source == destination {
                continue;
            }
            root.register_cast(integer_cast(source, destination));
        }
    }
    for (source, destination) in [(&types.c8, &types.u8), (&types.u8, &types.c8)] {
        root.register_cast(CastDescriptor::new(
            source.clone(),
            destination.clone(),
            CAST_BASE_WEIGHT,
            ImplicitCastAllowed::Never,
            CastOp::NoOp,
            integer_range,
        ));
    }
}

fn integer_cast(source: &StaticType, destination: &StaticType) -> CastDescriptor {
    let (Some(from), Some(to)) = (source.as_scalar(), destination.as_scalar()) else {
        ice!("integer cast between `{source}` and `{destination}`");
    };
    let sign_change = from.is_signed() != to.is_signed();
    let value_preserving = if sign_change {
        !from.is_signed() && to.size() > from.size()
    } else {
        to.size() > from.size()
    };
    let (weight, implicit, op) = if value_preserving {
        let ratio = (to.size() / from.size()).ilog2();
        let weight = CAST_BASE_WEIGHT + ratio + if sign_change { SIGN_CHANGE_WEIGHT } else { 0 };
        let op = if from.is_signed() {
            CastOp::ExpandSigned
        } else {
            CastOp::ExpandUnsigned
        };
        (weight, ImplicitCastAllowed::Always, op)
    } else {
        let op = match to.size().cmp(&from.size()) {
            std::cmp::Ordering::Less => CastOp::Truncate,
            std::cmp::Ordering::Equal => CastOp::ChangeSign,
            std::cmp::Ordering::Greater if from.is_signed() => CastOp::ExpandSigned,
            std::cmp::Ordering::Greater => CastOp::ExpandUnsigned,
        };
        (NARROWING_WEIGHT, ImplicitCastAllowed::WhenRangeFits, op)
    };
    CastDescriptor::new(
        source.clone(),
        destination.clone(),
        weight,
        implicit,
        op,
        integer_range,
    )
}

fn register_operator(
    root: &mut LookupContext,
    name: &str,
    arguments: Vec<StaticType>,
    return_type: StaticType,
    op: BuiltinOp,
    range: OperatorRange,
) {
    if let Err(err) = root.register_function_pass1(name) {
        ice!("registering builtin operator: {err}");
    }
    let argument_names = (0..arguments.len()).map(|i| format!("arg{i}")).collect();
    let overload = FunctionOverload {
        name: name.to_string(),
        ty: StaticType::function(return_type, arguments),
        argument_names,
        kind: OverloadKind::Builtin(BuiltinOperator { op, range }),
        location: None,
    };
    if let Err(err) = root.register_function_pass2(overload) {
        ice!("registering builtin operator: {err}");
    }
}

fn register_operators(root: &mut LookupContext, types: &BuiltinTypes) {
    for ty in types.integers() {
        let signed = ty.as_scalar().is_some_and(ScalarType::is_signed);
        let pair = || vec![ty.clone(), ty.clone()];
        for (name, signed_op, unsigned_op, range) in ARITHMETIC {
            let operation = if signed { signed_op } else { Some(unsigned_op) };
            if let Some(operation) = operation {
                register_operator(root, name, pair(), ty.clone(), BuiltinOp::Binary(operation), range);
            }
        }
        for (name, signed_op, unsigned_op, range) in ORDERING {
            let operation = if signed { signed_op } else { unsigned_op };
            register_operator(
                root,
                name,
                pair(),
                types.bool.clone(),
                BuiltinOp::Binary(operation),
                range,
            );
        }
    }
    for ty in types.integers().into_iter().chain([&types.bool]) {
        for (name, operation, range) in EQUALITY {
            register_operator(
                root,
                name,
                vec![ty.clone(), ty.clone()],
                types.bool.clone(),
                BuiltinOp::Binary(operation),
                range,
            );
        }
    }
    register_operator(
        root,
        "!",
        vec![types.bool.clone()],
        types.bool.clone(),
        BuiltinOp::LogicalNot,
        logical_not_range,
    );
}
