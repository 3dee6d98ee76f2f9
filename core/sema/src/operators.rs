//! Builtin operators. Every operator is an ordinary overload set in the root
//! scope, named after its source token, so operator expressions go through
//! the same overload resolution as calls.

use std::fmt;

use crate::codegen::BinaryOperation;
use crate::errors::ice;
use crate::value_range::{self, Comparison, ValueRange, VrpResult};
use crate::static_type::ScalarType;

/// Computes the result range of an operator from its argument ranges,
/// expressed in the result type.
pub type OperatorRange = fn(&ScalarType, &[ValueRange]) -> VrpResult;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum BuiltinOp {
    Binary(BinaryOperation),
    LogicalNot,
}

#[derive(Clone, Copy)]
pub struct BuiltinOperator {
    pub op: BuiltinOp,
    pub range: OperatorRange,
}

impl fmt::Debug for BuiltinOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuiltinOperator").field("op", &self.op).finish()
    }
}

fn operands(args: &[ValueRange]) -> (&ValueRange, &ValueRange) {
    match args {
        [lhs, rhs] => (lhs, rhs),
        _ => ice!("binary operator range applied to {} arguments", args.len()),
    }
}

pub(crate) fn plus_range(dest: &ScalarType, args: &[ValueRange]) -> VrpResult {
    let (lhs, rhs) = operands(args);
    value_range::plus(dest, lhs, rhs)
}

pub(crate) fn minus_range(dest: &ScalarType, args: &[ValueRange]) -> VrpResult {
    let (lhs, rhs) = operands(args);
    value_range::minus(dest, lhs, rhs)
}

pub(crate) fn multiply_range(dest: &ScalarType, args: &[ValueRange]) -> VrpResult {
    let (lhs, rhs) = operands(args);
    value_range::multiply(dest, lhs, rhs)
}

pub(crate) fn divide_range(dest: &ScalarType, args: &[ValueRange]) -> VrpResult {
    let (lhs, rhs) = operands(args);
    value_range::divide(dest, lhs, rhs)
}

macro_rules! comparison_ranges {
    ($($name:ident => $comparison:expr),+ $(,)?) => {
        $(
            pub(crate) fn $name(_dest: &ScalarType, args: &[ValueRange]) -> VrpResult {
                let (lhs, rhs) = operands(args);
                Ok(value_range::compare($comparison, lhs, rhs))
            }
        )+
    };
}

comparison_ranges! {
    equals_range => Comparison::Equals,
    not_equals_range => Comparison::NotEquals,
    less_than_range => Comparison::LessThan,
    less_than_or_equal_range => Comparison::LessThanOrEqual,
    greater_than_range => Comparison::GreaterThan,
    greater_than_or_equal_range => Comparison::GreaterThanOrEqual,
}

pub(crate) fn logical_not_range(_dest: &ScalarType, args: &[ValueRange]) -> VrpResult {
    match args {
        [operand] => Ok(value_range::logical_not(operand)),
        _ => ice!("logical not range applied to {} arguments", args.len()),
    }
}

/// Arithmetic operators: `(token, signed operation, unsigned operation, range)`.
/// Division has no signed form.
pub(crate) const ARITHMETIC: [(&str, Option<BinaryOperation>, BinaryOperation, OperatorRange); 4] = [
    (
        "+",
        Some(BinaryOperation::PlusSigned),
        BinaryOperation::PlusUnsigned,
        plus_range,
    ),
    (
        "-",
        Some(BinaryOperation::MinusSigned),
        BinaryOperation::MinusUnsigned,
        minus_range,
    ),
    (
        "*",
        Some(BinaryOperation::MultiplySigned),
        BinaryOperation::MultiplyUnsigned,
        multiply_range,
    ),
    ("/", None, BinaryOperation::DivideUnsigned, divide_range),
];

/// Ordering comparisons, split by signedness like arithmetic.
pub(crate) const ORDERING: [(&str, BinaryOperation, BinaryOperation, OperatorRange); 4] = [
    (
        "<",
        BinaryOperation::LessThanSigned,
        BinaryOperation::LessThanUnsigned,
        less_than_range,
    ),
    (
        "<=",
        BinaryOperation::LessThanOrEqualSigned,
        BinaryOperation::LessThanOrEqualUnsigned,
        less_than_or_equal_range,
    ),
    (
        ">",
        BinaryOperation::GreaterThanSigned,
        BinaryOperation::GreaterThanUnsigned,
        greater_than_range,
    ),
    (
        ">=",
        BinaryOperation::GreaterThanOrEqualSigned,
        BinaryOperation::GreaterThanOrEqualUnsigned,
        greater_than_or_equal_range,
    ),
];

/// Equality comparisons, identical for both signednesses and for `Bool`.
pub(crate) const EQUALITY: [(&str, BinaryOperation, OperatorRange); 2] = [
    ("==", BinaryOperation::Equals, equals_range),
    ("!=", BinaryOperation::NotEquals, not_equals_range),
];
