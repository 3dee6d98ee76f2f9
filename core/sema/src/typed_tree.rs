//! Typed Tree
//!
//! Output of analysis: every expression carries its [`ExpressionId`], its
//! [`StaticType`] and, when integral, its [`ValueRange`]. Implicit
//! conversions are explicit [`TypedExpressionKind::Cast`] nodes, one per cast
//! step, so code generation is a plain depth-first replay.
//!
//! Ids follow a few conventions the replay relies on:
//! - a variable reference reuses the variable's lvalue id and emits nothing;
//! - a `NoOp` cast and a pointer dereference reuse their operand's id;
//! - a compound expression has the id of its result expression;
//! - [`ExpressionId::NONE`] marks a value that is never read.

use std::rc::Rc;

use tracing::debug;

use crate::cast::CastOp;
use crate::codegen::{
    ArgumentDeclaration, BinaryOperation, ExpressionId, FunctionGen, JumpPointId, ModuleGen,
    ModuleId, SourceLocation,
};
use crate::errors::ice;
use crate::lookup_context::LocalVariable;
use crate::static_type::StaticType;
use crate::value_range::ValueRange;

#[derive(Clone, Debug)]
pub struct TypedExpression {
    pub id: ExpressionId,
    pub ty: StaticType,
    range: Option<ValueRange>,
    pub kind: TypedExpressionKind,
}

#[derive(Clone, Debug)]
pub enum TypedExpressionKind {
    IntLiteral(u64),
    BoolLiteral(bool),
    NullLiteral,
    VariableRef(Rc<LocalVariable>),
    Cast {
        op: CastOp,
        source: Box<TypedExpression>,
    },
    Call {
        name: String,
        arguments: Vec<TypedExpression>,
    },
    Binary {
        operation: BinaryOperation,
        left: Box<TypedExpression>,
        right: Box<TypedExpression>,
    },
    LogicalNot(Box<TypedExpression>),
    Compound {
        statements: Vec<TypedStatement>,
        result: Option<Box<TypedExpression>>,
    },
    Condition {
        condition: Box<TypedExpression>,
        if_arm: Box<TypedExpression>,
        else_arm: Option<Box<TypedExpression>>,
        else_point: JumpPointId,
        continuation_point: JumpPointId,
    },
    PointerDereference(Box<TypedExpression>),
}

impl TypedExpression {
    #[must_use]
    pub fn new(id: ExpressionId, ty: StaticType, kind: TypedExpressionKind) -> Self {
        Self {
            id,
            ty,
            range: None,
            kind,
        }
    }

    #[must_use]
    pub fn with_range(mut self, range: Option<ValueRange>) -> Self {
        if let Some(range) = range {
            self.set_range(range);
        }
        self
    }

    #[must_use]
    pub fn range(&self) -> Option<ValueRange> {
        self.range
    }

    /// Attaches the computed range. A range is computed exactly once.
    pub fn set_range(&mut self, range: ValueRange) {
        if let Some(existing) = self.range {
            ice!(
                "range of expression {} set twice ({existing}, then {range})",
                self.id
            );
        }
        self.range = Some(range);
    }

    /// Marks the value as unread so the backend may skip computing it.
    pub fn discard_result(&mut self) {
        match &mut self.kind {
            TypedExpressionKind::VariableRef(_) | TypedExpressionKind::PointerDereference(_) => {}
            TypedExpressionKind::Cast {
                op: CastOp::NoOp,
                source,
            } => {
                source.discard_result();
                self.id = source.id;
            }
            TypedExpressionKind::Compound {
                result: Some(result),
                ..
            } => {
                result.discard_result();
                self.id = result.id;
            }
            _ => self.id = ExpressionId::NONE,
        }
    }
}

#[derive(Clone, Debug)]
pub enum TypedStatement {
    Expression(TypedExpression),
    VariableDefinition {
        variable: Rc<LocalVariable>,
        value: TypedExpression,
    },
    Assign {
        target: TypedExpression,
        value: TypedExpression,
    },
    Return(Option<TypedExpression>),
}

#[derive(Clone, Debug)]
pub struct TypedFunction {
    pub name: String,
    pub mangled_name: String,
    pub ty: StaticType,
    pub return_type: StaticType,
    pub arguments: Vec<ArgumentDeclaration>,
    pub location: SourceLocation,
    pub body: TypedExpression,
}

#[derive(Clone, Debug)]
pub struct TypedStruct {
    pub name: String,
    pub ty: StaticType,
}

#[derive(Clone, Debug)]
pub struct TypedModule {
    pub id: ModuleId,
    pub name: String,
    pub file: String,
    pub location: SourceLocation,
    pub structs: Vec<TypedStruct>,
    pub functions: Vec<TypedFunction>,
}

impl TypedModule {
    #[must_use]
    pub fn function(&self, name: &str) -> Option<&TypedFunction> {
        self.functions.iter().find(|function| function.name == name)
    }

    /// Replays the module into the backend.
    pub fn code_gen(&self, backend: &mut dyn ModuleGen) {
        debug!(module = %self.name, "code generation");
        backend.module_enter(self.id, &self.name, &self.file, self.location);
        for st in &self.structs {
            backend.declare_struct(&st.ty);
        }
        for st in &self.structs {
            if st.ty.as_struct().is_some_and(|s| s.is_complete()) {
                backend.define_struct(&st.ty);
            }
        }
        for function in &self.functions {
            backend.declare_identifier(&function.name, &function.mangled_name, &function.ty);
        }
        for function in &self.functions {
            let function_backend = backend.handle_function();
            function.code_gen(&self.file, function_backend);
        }
        backend.module_leave(self.id);
    }
}

impl TypedFunction {
    fn code_gen(&self, file: &str, backend: &mut dyn FunctionGen) {
        backend.function_enter(
            &self.mangled_name,
            &self.return_type,
            &self.arguments,
            file,
            self.location,
        );
        let result = emit_expression(&self.body, backend);
        if !ends_with_return(&self.body) {
            if self.return_type.is_void() {
                backend.return_void();
            } else {
                backend.return_value(result);
            }
        }
        backend.function_leave();
    }
}

fn ends_with_return(body: &TypedExpression) -> bool {
    matches!(
        &body.kind,
        TypedExpressionKind::Compound { statements, result: None }
            if matches!(statements.last(), Some(TypedStatement::Return(_)))
    )
}

fn emit_statement(statement: &TypedStatement, backend: &mut dyn FunctionGen) {
    match statement {
        TypedStatement::Expression(expression) => {
            emit_expression(expression, backend);
        }
        TypedStatement::VariableDefinition { variable, value } => {
            let value_id = emit_expression(value, backend);
            backend.allocate_stack_var(variable.lvalue_id, &variable.ty.unqualified(), &variable.name);
            backend.assign(variable.lvalue_id, value_id);
        }
        TypedStatement::Assign { target, value } => {
            let value_id = emit_expression(value, backend);
            let target_id = emit_expression(target, backend);
            backend.assign(target_id, value_id);
        }
        TypedStatement::Return(Some(expression)) => {
            let id = emit_expression(expression, backend);
            if expression.ty.is_void() {
                backend.return_void();
            } else {
                backend.return_value(id);
            }
        }
        TypedStatement::Return(None) => backend.return_void(),
    }
}

/// Emits `expression` depth-first and returns the id holding its value.
fn emit_expression(expression: &TypedExpression, backend: &mut dyn FunctionGen) -> ExpressionId {
    let id = expression.id;
    let ty = &expression.ty;
    match &expression.kind {
        TypedExpressionKind::IntLiteral(value) => backend.set_literal_int(id, *value, ty),
        TypedExpressionKind::BoolLiteral(value) => backend.set_literal_bool(id, *value),
        TypedExpressionKind::NullLiteral => backend.set_literal_null(id, ty),
        TypedExpressionKind::VariableRef(_) => {}
        TypedExpressionKind::Cast { op, source } => {
            let source_id = emit_expression(source, backend);
            let source_type = &source.ty;
            match op {
                CastOp::NoOp => {}
                CastOp::Dereference => backend.dereference_pointer(id, ty, source_id),
                CastOp::Truncate => backend.truncate_integer(id, source_id, source_type, ty),
                CastOp::ChangeSign => backend.change_integer_sign(id, source_id, source_type, ty),
                CastOp::ExpandSigned => backend.expand_integer_signed(id, source_id, source_type, ty),
                CastOp::ExpandUnsigned => {
                    backend.expand_integer_unsigned(id, source_id, source_type, ty);
                }
            }
        }
        TypedExpressionKind::Call { name, arguments } => {
            let argument_ids: Vec<ExpressionId> = arguments
                .iter()
                .map(|argument| emit_expression(argument, backend))
                .collect();
            backend.call_function_direct(id, name, &argument_ids, ty);
        }
        TypedExpressionKind::Binary {
            operation,
            left,
            right,
        } => {
            let left_id = emit_expression(left, backend);
            let right_id = emit_expression(right, backend);
            backend.binary_operator(id, *operation, left_id, right_id, ty);
        }
        TypedExpressionKind::LogicalNot(argument) => {
            let argument_id = emit_expression(argument, backend);
            backend.operator_logical_not(id, argument_id);
        }
        TypedExpressionKind::Compound { statements, result } => {
            for statement in statements {
                emit_statement(statement, backend);
            }
            if let Some(result) = result {
                return emit_expression(result, backend);
            }
        }
        TypedExpressionKind::Condition {
            condition,
            if_arm,
            else_arm,
            else_point,
            continuation_point,
        } => {
            let condition_id = emit_expression(condition, backend);
            backend.conditional_branch(id, ty, condition_id, *else_point, *continuation_point);
            let if_id = emit_expression(if_arm, backend);
            backend.set_condition_clause_result(clause_result(id, if_id));
            backend.jump(*continuation_point);
            if let Some(else_arm) = else_arm {
                backend.set_jump_point(*else_point, "else");
                let else_id = emit_expression(else_arm, backend);
                backend.set_condition_clause_result(clause_result(id, else_id));
                backend.jump(*continuation_point);
            }
            backend.set_jump_point(*continuation_point, "continuation");
        }
        TypedExpressionKind::PointerDereference(pointer) => {
            return emit_expression(pointer, backend);
        }
    }
    id
}

/// A clause contributes a value only when the conditional's own value is read.
fn clause_result(condition_id: ExpressionId, clause_id: ExpressionId) -> ExpressionId {
    if condition_id.is_none() {
        ExpressionId::NONE
    } else {
        clause_id
    }
}
