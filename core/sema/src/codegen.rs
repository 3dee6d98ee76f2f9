//! Code generation callback interface.
//!
//! The analyzer never builds instructions itself. After a module is fully
//! typed, it replays it depth-first into a [`ModuleGen`] and, per function,
//! the [`FunctionGen`] it hands out. Every value-producing callback receives
//! the [`ExpressionId`] that later callbacks use to refer to the value;
//! [`ExpressionId::NONE`] marks a value nobody reads.

use std::fmt::{self, Display, Formatter};
use std::sync::atomic::{AtomicU64, Ordering};

use practical_ast::nodes::Location;

use crate::static_type::StaticType;

macro_rules! ids {
    ($($(#[$outer:meta])* $name:ident),+ $(,)?) => {
        $(
            $(#[$outer])*
            #[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
            pub struct $name(u64);

            impl $name {
                pub const NONE: $name = $name(0);

                /// Hands out a fresh, process-wide unique id.
                #[must_use]
                pub fn allocate() -> Self {
                    static NEXT: AtomicU64 = AtomicU64::new(1);
                    $name(NEXT.fetch_add(1, Ordering::Relaxed))
                }

                #[must_use]
                pub fn is_none(self) -> bool {
                    self == $name::NONE
                }

                #[must_use]
                pub fn get(self) -> u64 {
                    self.0
                }
            }

            impl Display for $name {
                fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
                    if self.is_none() {
                        write!(f, "none")
                    } else {
                        write!(f, "{}", self.0)
                    }
                }
            }
        )+
    };
}

ids! {
    /// Identifies one value in the callback stream.
    ExpressionId,
    /// Identifies a branch target within a function.
    JumpPointId,
    ModuleId,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub struct SourceLocation {
    pub line: u32,
    pub column: u32,
}

impl From<&Location> for SourceLocation {
    fn from(location: &Location) -> Self {
        Self {
            line: location.start_line,
            column: location.start_column,
        }
    }
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct ArgumentDeclaration {
    pub ty: StaticType,
    pub name: String,
    pub lvalue_id: ExpressionId,
}

/// Binary operations, split by signedness wherever the instruction differs.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum BinaryOperation {
    PlusSigned,
    PlusUnsigned,
    MinusSigned,
    MinusUnsigned,
    MultiplySigned,
    MultiplyUnsigned,
    DivideUnsigned,
    Equals,
    NotEquals,
    LessThanSigned,
    LessThanUnsigned,
    LessThanOrEqualSigned,
    LessThanOrEqualUnsigned,
    GreaterThanSigned,
    GreaterThanUnsigned,
    GreaterThanOrEqualSigned,
    GreaterThanOrEqualUnsigned,
}

pub trait FunctionGen {
    fn function_enter(
        &mut self,
        name: &str,
        return_type: &StaticType,
        arguments: &[ArgumentDeclaration],
        file: &str,
        location: SourceLocation,
    );
    fn function_leave(&mut self);

    fn return_value(&mut self, id: ExpressionId);
    fn return_void(&mut self);

    /// Branches on `condition`. The then-clause follows immediately; the
    /// else-clause starts at `else_point` (equal to `continuation_point` when
    /// there is none).
    fn conditional_branch(
        &mut self,
        id: ExpressionId,
        ty: &StaticType,
        condition: ExpressionId,
        else_point: JumpPointId,
        continuation_point: JumpPointId,
    );
    /// The value the clause just emitted contributes to the conditional.
    fn set_condition_clause_result(&mut self, id: ExpressionId);
    fn set_jump_point(&mut self, id: JumpPointId, name: &str);
    fn jump(&mut self, destination: JumpPointId);

    fn set_literal_int(&mut self, id: ExpressionId, value: u64, ty: &StaticType);
    fn set_literal_bool(&mut self, id: ExpressionId, value: bool);
    fn set_literal_null(&mut self, id: ExpressionId, ty: &StaticType);

    fn allocate_stack_var(&mut self, id: ExpressionId, ty: &StaticType, name: &str);
    fn assign(&mut self, lvalue: ExpressionId, rvalue: ExpressionId);
    fn dereference_pointer(&mut self, id: ExpressionId, ty: &StaticType, address: ExpressionId);

    fn truncate_integer(
        &mut self,
        id: ExpressionId,
        source: ExpressionId,
        source_type: &StaticType,
        destination_type: &StaticType,
    );
    fn change_integer_sign(
        &mut self,
        id: ExpressionId,
        source: ExpressionId,
        source_type: &StaticType,
        destination_type: &StaticType,
    );
    fn expand_integer_signed(
        &mut self,
        id: ExpressionId,
        source: ExpressionId,
        source_type: &StaticType,
        destination_type: &StaticType,
    );
    fn expand_integer_unsigned(
        &mut self,
        id: ExpressionId,
        source: ExpressionId,
        source_type: &StaticType,
        destination_type: &StaticType,
    );

    fn call_function_direct(
        &mut self,
        id: ExpressionId,
        name: &str,
        arguments: &[ExpressionId],
        return_type: &StaticType,
    );

    fn binary_operator(
        &mut self,
        id: ExpressionId,
        operation: BinaryOperation,
        left: ExpressionId,
        right: ExpressionId,
        result_type: &StaticType,
    );
    fn operator_logical_not(&mut self, id: ExpressionId, argument: ExpressionId);
}

pub trait ModuleGen {
    fn module_enter(
        &mut self,
        id: ModuleId,
        name: &str,
        file: &str,
        location: SourceLocation,
    );
    fn module_leave(&mut self, id: ModuleId);

    fn declare_identifier(&mut self, name: &str, mangled_name: &str, ty: &StaticType);
    fn declare_struct(&mut self, ty: &StaticType);
    fn define_struct(&mut self, ty: &StaticType);

    /// Generator for the next function body.
    fn handle_function(&mut self) -> &mut dyn FunctionGen;
}
