use std::fmt::{self, Display, Formatter};

use practical_ast::nodes::Location;
use thiserror::Error;

use crate::cast::Weight;
use crate::static_type::StaticType;
use crate::value_range::ValueRange;

/// Internal compiler error. Structural invariant violations are not
/// diagnostics: they abort the run.
macro_rules! ice {
    ($($arg:tt)*) => {
        std::panic!("ICE: {}", format_args!($($arg)*))
    };
}

pub(crate) use ice;

/// Kind of symbol registration for registration error context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationKind {
    Type,
    Struct,
    Function,
    Variable,
}

impl Display for RegistrationKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            RegistrationKind::Type => write!(f, "type"),
            RegistrationKind::Struct => write!(f, "struct"),
            RegistrationKind::Function => write!(f, "function"),
            RegistrationKind::Variable => write!(f, "variable"),
        }
    }
}

/// Failures of the type model itself, independent of any source position.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TypeError {
    #[error("`{ty}` is not a struct")]
    NotAStruct { ty: String },

    #[error("struct `{name}` is already defined")]
    StructAlreadyDefined { name: String },

    #[error("struct `{struct_name}` has more than one member named `{member}`")]
    DuplicateMember { struct_name: String, member: String },

    #[error("member `{member}` of struct `{struct_name}` has incomplete type `{ty}`")]
    IncompleteMember {
        struct_name: String,
        member: String,
        ty: String,
    },

    #[error("struct `{name}` is declared but not defined")]
    IncompleteStruct { name: String },

    #[error("struct `{struct_name}` has no member `{member}`")]
    MemberNotFound { struct_name: String, member: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UndefinedBehaviorKind {
    Overflow,
    Underflow,
    DivisionByZero,
}

impl Display for UndefinedBehaviorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            UndefinedBehaviorKind::Overflow => write!(f, "overflows"),
            UndefinedBehaviorKind::Underflow => write!(f, "underflows"),
            UndefinedBehaviorKind::DivisionByZero => write!(f, "divides by zero"),
        }
    }
}

/// A range computation proved that every execution of the operation is
/// undefined. `collapsed` is the single-point range the result degenerates to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("operation always {kind} (range collapses to {collapsed})")]
pub struct UndefinedBehavior {
    pub kind: UndefinedBehaviorKind,
    pub collapsed: ValueRange,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CastError {
    #[error("no conversion from `{from}` to `{to}`")]
    NoPath { from: StaticType, to: StaticType },

    #[error("ambiguous conversion from `{from}` to `{to}`: {paths} paths of equal weight")]
    Ambiguous {
        from: StaticType,
        to: StaticType,
        paths: u32,
    },

    #[error("expression too expensive: conversion costs {weight}, {limit} left in budget")]
    TooExpensive { weight: Weight, limit: Weight },

    #[error("conversion from `{from}` to `{to}` is unsafe for range {}", range.map_or("<unknown>".to_string(), |r| r.to_string()))]
    RangeUnsafe {
        from: StaticType,
        to: StaticType,
        range: Option<ValueRange>,
    },
}

/// Represents a semantic error with source location.
/// All errors are tied to AST nodes and must have a location.
#[derive(Debug, Clone, Error)]
pub enum SemaError {
    #[error("{location}: unknown type `{name}`")]
    UnknownType { name: String, location: Location },

    #[error("{location}: use of undeclared identifier `{name}`")]
    UnknownIdentifier { name: String, location: Location },

    #[error("{location}: `{name}` is not a function")]
    NotAFunction { name: String, location: Location },

    #[error("{location}: function `{name}` cannot be used as a value")]
    FunctionAsValue { name: String, location: Location },

    #[error("{location}: error registering {kind} `{name}`{}", reason.as_ref().map_or(String::new(), |r| format!(": {r}")))]
    RegistrationFailed {
        kind: RegistrationKind,
        name: String,
        reason: Option<String>,
        location: Location,
    },

    #[error("{location}: {source}")]
    Type { source: TypeError, location: Location },

    #[error("{location}: {source}")]
    Cast { source: CastError, location: Location },

    #[error("{location}: {source}")]
    UndefinedBehavior {
        source: UndefinedBehavior,
        location: Location,
    },

    #[error("{location}: no overload of `{name}` matches arguments ({arguments})")]
    NoMatchingOverload {
        name: String,
        arguments: String,
        location: Location,
    },

    #[error("{location}: call to `{name}` is ambiguous between {candidates} overloads")]
    AmbiguousOverload {
        name: String,
        candidates: usize,
        location: Location,
    },

    #[error("{location}: cannot assign to `{ty}`, expected a mutable variable")]
    AssignToImmutable { ty: StaticType, location: Location },

    #[error("{location}: cannot dereference non-pointer type `{ty}`")]
    DereferenceNonPointer { ty: StaticType, location: Location },

    #[error("{location}: invalid integer literal `{value}`")]
    InvalidLiteral { value: String, location: Location },

    #[error("{location}: cannot infer the pointer type of `null`")]
    UntypedNull { location: Location },

    #[error("{location}: variable `{name}` cannot have type `{ty}`")]
    InvalidVariableType {
        name: String,
        ty: StaticType,
        location: Location,
    },

    #[error("{location}: function `{function}` must return a value of type `{expected}`")]
    MissingReturn {
        function: String,
        expected: StaticType,
        location: Location,
    },
}

impl SemaError {
    #[must_use = "returns the location without side effects"]
    pub fn location(&self) -> &Location {
        match self {
            SemaError::UnknownType { location, .. }
            | SemaError::UnknownIdentifier { location, .. }
            | SemaError::NotAFunction { location, .. }
            | SemaError::FunctionAsValue { location, .. }
            | SemaError::RegistrationFailed { location, .. }
            | SemaError::Type { location, .. }
            | SemaError::Cast { location, .. }
            | SemaError::UndefinedBehavior { location, .. }
            | SemaError::NoMatchingOverload { location, .. }
            | SemaError::AmbiguousOverload { location, .. }
            | SemaError::AssignToImmutable { location, .. }
            | SemaError::DereferenceNonPointer { location, .. }
            | SemaError::InvalidLiteral { location, .. }
            | SemaError::UntypedNull { location }
            | SemaError::InvalidVariableType { location, .. }
            | SemaError::MissingReturn { location, .. } => location,
        }
    }
}

/// Every error collected while analysing one module.
#[derive(Debug, Error)]
#[error("semantic analysis failed: {}", errors.iter().map(ToString::to_string).collect::<Vec<_>>().join("; "))]
pub struct AnalysisFailed {
    pub errors: Vec<SemaError>,
}
