use core::fmt;
use std::{
    fmt::{Display, Formatter},
    rc::Rc,
};

/// Source span of a node. Lines and columns are 1-based.
#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct Location {
    pub start_line: u32,
    pub start_column: u32,
    pub end_line: u32,
    pub end_column: u32,
    pub file: String,
}

impl Location {
    #[must_use]
    pub fn new(
        start_line: u32,
        start_column: u32,
        end_line: u32,
        end_column: u32,
        file: String,
    ) -> Self {
        Self {
            start_line,
            start_column,
            end_line,
            end_column,
            file,
        }
    }
}

impl Display for Location {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{}:{}", self.start_line, self.start_column)
    }
}

#[macro_export]
macro_rules! ast_node {
    (
        $(#[$outer:meta])*
        $struct_vis:vis struct $name:ident {
            $(
                $(#[$field_attr:meta])*
                $field_vis:vis $field_name:ident : $field_ty:ty
            ),* $(,)?
        }
    ) => {
        $(#[$outer])*
        #[derive(Clone, PartialEq, Eq, Debug)]
        $struct_vis struct $name {
            pub id: u32,
            pub location: $crate::nodes::Location,
            $(
                $(#[$field_attr])*
                $field_vis $field_name : $field_ty,
            )*
        }
    };
}

macro_rules! ast_nodes {
    (
        $(
            $(#[$outer:meta])*
            $struct_vis:vis struct $name:ident { $($fields:tt)* }
        )+
    ) => {
        $(
            ast_node! {
                $(#[$outer])*
                $struct_vis struct $name { $($fields)* }
            }
        )+
    };
}

macro_rules! ast_enum {
    (
        $(#[$outer:meta])*
        $enum_vis:vis enum $name:ident {
            $(
                $(#[$arm_attr:meta])*
                $(@$conv:ident)? $arm:ident ( $($tuple:tt)* ) ,
            )*
        }
    ) => {
        $(#[$outer])*
        #[derive(Clone, PartialEq, Eq, Debug)]
        $enum_vis enum $name {
            $(
                $(#[$arm_attr])*
                $arm ( $($tuple)* ) ,
            )*
        }

        impl $name {
            #[must_use]
            pub fn id(&self) -> u32 {
                match self {
                    $(
                        $name::$arm(n) => { ast_enum!(@id_arm n, $($conv)?) }
                    )*
                }
            }

            #[must_use]
            pub fn location(&self) -> Location {
                match self {
                    $(
                        $name::$arm(n) => { ast_enum!(@location_arm n, $($conv)?) }
                    )*
                }
            }
        }
    };

    (@id_arm $inner:ident, inner_enum) => {
        $inner.id()
    };

    (@id_arm $inner:ident, ) => {
        $inner.id
    };

    (@location_arm $inner:ident, inner_enum) => {
        $inner.location()
    };

    (@location_arm $inner:ident, ) => {
        $inner.location.clone()
    };
}

macro_rules! ast_enums {
    (
        $(
            $(#[$outer:meta])*
            $enum_vis:vis enum $name:ident { $($arms:tt)* }
        )+
    ) => {
        $(
            ast_enum! {
                $(#[$outer])*
                $enum_vis enum $name { $($arms)* }
            }
        )+
    };
}

ast_enums! {

    pub enum Definition {
        Function(Rc<FunctionDefinition>),
        Struct(Rc<StructDefinition>),
    }

    pub enum Statement {
        @inner_enum Expression(Expression),
        VariableDefinition(Rc<VariableDefinitionStatement>),
        Assign(Rc<AssignStatement>),
        Return(Rc<ReturnStatement>),
    }

    pub enum Expression {
        @inner_enum Literal(Literal),
        Identifier(Rc<Identifier>),
        Binary(Rc<BinaryExpression>),
        PrefixUnary(Rc<PrefixUnaryExpression>),
        FunctionCall(Rc<FunctionCallExpression>),
        Cast(Rc<CastExpression>),
        Compound(Rc<CompoundExpression>),
        Condition(Rc<ConditionExpression>),
        Dereference(Rc<DereferenceExpression>),
    }

    pub enum Literal {
        Number(Rc<NumberLiteral>),
        Bool(Rc<BoolLiteral>),
        Null(Rc<NullLiteral>),
    }

    pub enum Type {
        Simple(Rc<SimpleType>),
        Pointer(Rc<TypePointer>),
        Array(Rc<TypeArray>),
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum UnaryOperatorKind {
    Not,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum OperatorKind {
    Add,
    Sub,
    Mul,
    Div,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl OperatorKind {
    /// The source token, which is also the name its builtin overloads are registered under.
    #[must_use]
    pub fn symbol(self) -> &'static str {
        match self {
            OperatorKind::Add => "+",
            OperatorKind::Sub => "-",
            OperatorKind::Mul => "*",
            OperatorKind::Div => "/",
            OperatorKind::Eq => "==",
            OperatorKind::Ne => "!=",
            OperatorKind::Lt => "<",
            OperatorKind::Le => "<=",
            OperatorKind::Gt => ">",
            OperatorKind::Ge => ">=",
        }
    }
}

impl UnaryOperatorKind {
    #[must_use]
    pub fn symbol(self) -> &'static str {
        match self {
            UnaryOperatorKind::Not => "!",
        }
    }
}

ast_nodes! {

    /// One compilation unit. The file name is carried by `location.file`.
    pub struct Module {
        pub name: String,
        pub definitions: Vec<Definition>,
    }

    pub struct StructDefinition {
        pub name: Rc<Identifier>,
        pub members: Vec<Rc<StructMember>>,
    }

    pub struct StructMember {
        pub name: Rc<Identifier>,
        pub ty: Type,
    }

    pub struct Identifier {
        pub name: String,
    }

    pub struct FunctionDefinition {
        pub name: Rc<Identifier>,
        pub arguments: Vec<Rc<Argument>>,
        pub returns: Option<Type>,
        pub body: Rc<CompoundExpression>,
    }

    pub struct Argument {
        pub name: Rc<Identifier>,
        pub ty: Type,
    }

    /// `def name [: ty] = value;` When `ty` is absent the variable takes the
    /// natural type of its initializer.
    pub struct VariableDefinitionStatement {
        pub name: Rc<Identifier>,
        pub is_mut: bool,
        pub ty: Option<Type>,
        pub value: Expression,
    }

    pub struct AssignStatement {
        pub left: Expression,
        pub right: Expression,
    }

    pub struct ReturnStatement {
        pub expression: Option<Expression>,
    }

    pub struct BinaryExpression {
        pub left: Expression,
        pub operator: OperatorKind,
        pub right: Expression,
    }

    pub struct PrefixUnaryExpression {
        pub expression: Expression,
        pub operator: UnaryOperatorKind,
    }

    pub struct FunctionCallExpression {
        pub function: Rc<Identifier>,
        pub arguments: Vec<Expression>,
    }

    pub struct CastExpression {
        pub ty: Type,
        pub expression: Expression,
    }

    /// `{ statements; result }` opens a lexical scope. Without a result
    /// expression its value is `Void`.
    pub struct CompoundExpression {
        pub statements: Vec<Statement>,
        pub result: Option<Expression>,
    }

    pub struct ConditionExpression {
        pub condition: Expression,
        pub if_arm: Rc<CompoundExpression>,
        pub else_arm: Option<Rc<CompoundExpression>>,
    }

    pub struct DereferenceExpression {
        pub expression: Expression,
    }

    pub struct NumberLiteral {
        pub value: String,
    }

    pub struct BoolLiteral {
        pub value: bool
    }

    pub struct NullLiteral {
    }

    pub struct SimpleType {
        pub name: String,
    }

    pub struct TypePointer {
        pub pointee: Type,
    }

    pub struct TypeArray {
        pub element_type: Type,
        pub size: u64,
    }

}
