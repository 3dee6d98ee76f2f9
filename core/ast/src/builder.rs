//! Programmatic AST construction.
//!
//! The `Builder` is the boundary the parser writes to: it hands out unique node
//! ids and stamps every node with the current source position. Tests and
//! embedders use it directly to assemble trees without going through text.
//!
//! # Example
//!
//! ```
//! use practical_ast::builder::Builder;
//! use practical_ast::nodes::{Definition, OperatorKind};
//!
//! let mut b = Builder::new("add.pr");
//! let sum = {
//!     let a = b.identifier_expression("a");
//!     let c = b.number(1);
//!     b.binary(a, OperatorKind::Add, c)
//! };
//! let body = b.compound(vec![], Some(sum));
//! let arg_ty = b.simple_type("U8");
//! let arg = b.argument("a", arg_ty);
//! let ret = b.simple_type("U16");
//! let func = b.function("inc", vec![arg], Some(ret), body);
//! let module = b.module("add", vec![Definition::Function(func)]);
//! assert_eq!(module.definitions.len(), 1);
//! ```
//!
//! # Node ID Assignment
//!
//! Node IDs are assigned sequentially starting from 1 from a process-wide
//! atomic counter, so ids stay unique across builders. Zero is never handed
//! out.

use std::{
    rc::Rc,
    sync::atomic::{AtomicU32, Ordering},
};

use crate::nodes::{
    Argument, AssignStatement, BinaryExpression, BoolLiteral, CastExpression, CompoundExpression,
    ConditionExpression, Definition, DereferenceExpression, Expression, FunctionCallExpression,
    FunctionDefinition, Identifier, Literal, Location, Module, NullLiteral, NumberLiteral,
    OperatorKind, PrefixUnaryExpression, ReturnStatement, SimpleType, Statement,
    StructDefinition, StructMember, Type, TypeArray, TypePointer, UnaryOperatorKind,
    VariableDefinitionStatement,
};

pub struct Builder {
    file: String,
    line: u32,
    column: u32,
}

impl Builder {
    #[must_use]
    pub fn new(file: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            line: 1,
            column: 1,
        }
    }

    /// Moves the cursor; every node built afterwards is located here.
    pub fn at(&mut self, line: u32, column: u32) -> &mut Self {
        self.line = line;
        self.column = column;
        self
    }

    fn get_node_id() -> u32 {
        static COUNTER: AtomicU32 = AtomicU32::new(1);
        COUNTER.fetch_add(1, Ordering::Relaxed)
    }

    fn get_location(&self) -> Location {
        Location::new(
            self.line,
            self.column,
            self.line,
            self.column,
            self.file.clone(),
        )
    }

    fn node(&self) -> (u32, Location) {
        (Self::get_node_id(), self.get_location())
    }

    #[must_use]
    pub fn module(&mut self, name: &str, definitions: Vec<Definition>) -> Rc<Module> {
        let (id, location) = self.node();
        Rc::new(Module {
            id,
            location,
            name: name.to_string(),
            definitions,
        })
    }

    #[must_use]
    pub fn identifier(&mut self, name: &str) -> Rc<Identifier> {
        let (id, location) = self.node();
        Rc::new(Identifier {
            id,
            location,
            name: name.to_string(),
        })
    }

    #[must_use]
    pub fn function(
        &mut self,
        name: &str,
        arguments: Vec<Rc<Argument>>,
        returns: Option<Type>,
        body: Rc<CompoundExpression>,
    ) -> Rc<FunctionDefinition> {
        let name = self.identifier(name);
        let (id, location) = self.node();
        Rc::new(FunctionDefinition {
            id,
            location,
            name,
            arguments,
            returns,
            body,
        })
    }

    #[must_use]
    pub fn argument(&mut self, name: &str, ty: Type) -> Rc<Argument> {
        let name = self.identifier(name);
        let (id, location) = self.node();
        Rc::new(Argument {
            id,
            location,
            name,
            ty,
        })
    }

    #[must_use]
    pub fn struct_definition(
        &mut self,
        name: &str,
        members: Vec<(&str, Type)>,
    ) -> Rc<StructDefinition> {
        let name = self.identifier(name);
        let members = members
            .into_iter()
            .map(|(member, ty)| {
                let name = self.identifier(member);
                let (id, location) = self.node();
                Rc::new(StructMember {
                    id,
                    location,
                    name,
                    ty,
                })
            })
            .collect();
        let (id, location) = self.node();
        Rc::new(StructDefinition {
            id,
            location,
            name,
            members,
        })
    }

    #[must_use]
    pub fn variable_definition(
        &mut self,
        name: &str,
        is_mut: bool,
        ty: Option<Type>,
        value: Expression,
    ) -> Statement {
        let name = self.identifier(name);
        let (id, location) = self.node();
        Statement::VariableDefinition(Rc::new(VariableDefinitionStatement {
            id,
            location,
            name,
            is_mut,
            ty,
            value,
        }))
    }

    #[must_use]
    pub fn assign(&mut self, left: Expression, right: Expression) -> Statement {
        let (id, location) = self.node();
        Statement::Assign(Rc::new(AssignStatement {
            id,
            location,
            left,
            right,
        }))
    }

    #[must_use]
    pub fn return_statement(&mut self, expression: Option<Expression>) -> Statement {
        let (id, location) = self.node();
        Statement::Return(Rc::new(ReturnStatement {
            id,
            location,
            expression,
        }))
    }

    #[must_use]
    pub fn number(&mut self, value: impl ToString) -> Expression {
        let (id, location) = self.node();
        Expression::Literal(Literal::Number(Rc::new(NumberLiteral {
            id,
            location,
            value: value.to_string(),
        })))
    }

    #[must_use]
    pub fn bool_literal(&mut self, value: bool) -> Expression {
        let (id, location) = self.node();
        Expression::Literal(Literal::Bool(Rc::new(BoolLiteral {
            id,
            location,
            value,
        })))
    }

    #[must_use]
    pub fn null(&mut self) -> Expression {
        let (id, location) = self.node();
        Expression::Literal(Literal::Null(Rc::new(NullLiteral { id, location })))
    }

    #[must_use]
    pub fn identifier_expression(&mut self, name: &str) -> Expression {
        Expression::Identifier(self.identifier(name))
    }

    #[must_use]
    pub fn binary(
        &mut self,
        left: Expression,
        operator: OperatorKind,
        right: Expression,
    ) -> Expression {
        let (id, location) = self.node();
        Expression::Binary(Rc::new(BinaryExpression {
            id,
            location,
            left,
            operator,
            right,
        }))
    }

    #[must_use]
    pub fn not(&mut self, expression: Expression) -> Expression {
        let (id, location) = self.node();
        Expression::PrefixUnary(Rc::new(PrefixUnaryExpression {
            id,
            location,
            expression,
            operator: UnaryOperatorKind::Not,
        }))
    }

    #[must_use]
    pub fn call(&mut self, function: &str, arguments: Vec<Expression>) -> Expression {
        let function = self.identifier(function);
        let (id, location) = self.node();
        Expression::FunctionCall(Rc::new(FunctionCallExpression {
            id,
            location,
            function,
            arguments,
        }))
    }

    #[must_use]
    pub fn cast(&mut self, ty: Type, expression: Expression) -> Expression {
        let (id, location) = self.node();
        Expression::Cast(Rc::new(CastExpression {
            id,
            location,
            ty,
            expression,
        }))
    }

    #[must_use]
    pub fn compound(
        &mut self,
        statements: Vec<Statement>,
        result: Option<Expression>,
    ) -> Rc<CompoundExpression> {
        let (id, location) = self.node();
        Rc::new(CompoundExpression {
            id,
            location,
            statements,
            result,
        })
    }

    #[must_use]
    pub fn condition(
        &mut self,
        condition: Expression,
        if_arm: Rc<CompoundExpression>,
        else_arm: Option<Rc<CompoundExpression>>,
    ) -> Expression {
        let (id, location) = self.node();
        Expression::Condition(Rc::new(ConditionExpression {
            id,
            location,
            condition,
            if_arm,
            else_arm,
        }))
    }

    #[must_use]
    pub fn dereference(&mut self, expression: Expression) -> Expression {
        let (id, location) = self.node();
        Expression::Dereference(Rc::new(DereferenceExpression {
            id,
            location,
            expression,
        }))
    }

    #[must_use]
    pub fn simple_type(&mut self, name: &str) -> Type {
        let (id, location) = self.node();
        Type::Simple(Rc::new(SimpleType {
            id,
            location,
            name: name.to_string(),
        }))
    }

    #[must_use]
    pub fn pointer_type(&mut self, pointee: Type) -> Type {
        let (id, location) = self.node();
        Type::Pointer(Rc::new(TypePointer {
            id,
            location,
            pointee,
        }))
    }

    #[must_use]
    pub fn array_type(&mut self, element_type: Type, size: u64) -> Type {
        let (id, location) = self.node();
        Type::Array(Rc::new(TypeArray {
            id,
            location,
            element_type,
            size,
        }))
    }
}
