//! Analysis Pass
//!
//! Walks a parsed [`Module`] top-down and produces a [`TypedModule`]. The
//! phases run in this order:
//!
//! 1. **declare structs** - every struct name becomes an incomplete type;
//! 2. **define structs** - member lists are resolved and laid out, retrying
//!    structs whose by-value members are defined later in the module;
//! 3. **register functions** - names first, then signatures, so bodies may
//!    call any function of the module;
//! 4. **analyse bodies** - every expression is typed, converted and given a
//!    value range.
//!
//! An error aborts the declaration it occurs in. Analysis continues with the
//! sibling declarations so that one run reports as many errors as possible.
//!
//! Integer and null literals are not typed where they appear. They stay
//! [`Operand::Number`] / [`Operand::Null`] until the type they must convert
//! to is known, and an integer literal that fits that type is typed as it
//! directly, at the type's literal weight.

use std::rc::Rc;

use practical_ast::nodes::{
    AssignStatement, CompoundExpression, ConditionExpression, Definition, Expression,
    FunctionDefinition, Identifier, Literal, Location, Module, ReturnStatement, Statement,
    StructDefinition, Type, VariableDefinitionStatement,
};
use tracing::debug;

use crate::builtins::Builtins;
use crate::cast::{CastOp, CastQuery, NO_WEIGHT_LIMIT, Weight, resolve_cast};
use crate::codegen::{ArgumentDeclaration, ExpressionId, JumpPointId, ModuleId, SourceLocation};
use crate::errors::{
    CastError, RegistrationKind, SemaError, TypeError, UndefinedBehavior, ice,
};
use crate::lookup_context::{
    FunctionOverload, LocalVariable, LookupContext, NamedObject, OverloadKind,
};
use crate::operators::BuiltinOp;
use crate::options::AnalyzerOptions;
use crate::static_type::{ScalarKind, ScalarType, StaticType, TypeFlags, TypeKind};
use crate::typed_tree::{
    TypedExpression, TypedExpressionKind, TypedFunction, TypedModule, TypedStatement, TypedStruct,
};
use crate::value_range::ValueRange;

type SemaResult<T> = Result<T, SemaError>;

/// Conversion budget of one expression.
#[derive(Clone, Copy, Debug)]
struct Budget {
    limit: Weight,
    spent: Weight,
}

impl Budget {
    fn new(limit: Weight) -> Self {
        Self { limit, spent: 0 }
    }

    fn remaining(self) -> Weight {
        self.limit.saturating_sub(self.spent)
    }

    fn charge(&mut self, weight: Weight) -> Result<(), CastError> {
        let total = self.spent.saturating_add(weight);
        if total > self.limit {
            return Err(CastError::TooExpensive {
                weight: total,
                limit: self.limit,
            });
        }
        self.spent = total;
        Ok(())
    }
}

/// An analysed expression whose type may still depend on its destination.
#[derive(Clone, Debug)]
enum Operand {
    Typed(TypedExpression),
    Number(u64),
    Null,
}

impl Operand {
    fn describe(&self) -> String {
        match self {
            Operand::Typed(expression) => expression.ty.to_string(),
            Operand::Number(value) => format!("integer literal {value}"),
            Operand::Null => "null".to_string(),
        }
    }
}

struct Candidate {
    mangled_name: String,
    expression: TypedExpression,
    weight: Weight,
    undefined: Option<UndefinedBehavior>,
}

/// Function whose signature made it through registration.
struct Signature {
    definition: Rc<FunctionDefinition>,
    overload: Rc<FunctionOverload>,
    mangled_name: String,
}

pub(crate) struct Analyzer<'a> {
    builtins: &'a Builtins,
    options: &'a AnalyzerOptions,
    context: LookupContext,
    errors: Vec<SemaError>,
    function: String,
    return_type: StaticType,
}

/// Analyses `module` in a fresh module scope on top of the builtins.
///
/// # Errors
///
/// Returns every error collected over all declarations.
pub(crate) fn analyze_module(
    builtins: &Builtins,
    module: &Module,
    options: &AnalyzerOptions,
) -> Result<TypedModule, Vec<SemaError>> {
    let mut analyzer = Analyzer {
        builtins,
        options,
        context: builtins.module_context(),
        errors: Vec::new(),
        function: String::new(),
        return_type: builtins.types().void.clone(),
    };
    debug!(module = %module.name, "analysing module");
    let structs = analyzer.register_structs(module);
    let signatures = analyzer.register_functions(module);
    let mut functions = Vec::with_capacity(signatures.len());
    for signature in &signatures {
        match analyzer.function(signature) {
            Ok(function) => functions.push(function),
            Err(err) => analyzer.errors.push(err),
        }
    }
    if !analyzer.errors.is_empty() {
        return Err(analyzer.errors);
    }
    Ok(TypedModule {
        id: ModuleId::allocate(),
        name: module.name.clone(),
        file: module.location.file.clone(),
        location: SourceLocation::from(&module.location),
        structs,
        functions,
    })
}

fn registration_failed(
    kind: RegistrationKind,
    name: &str,
    err: &anyhow::Error,
    location: &Location,
) -> SemaError {
    SemaError::RegistrationFailed {
        kind,
        name: name.to_string(),
        reason: Some(err.to_string()),
        location: location.clone(),
    }
}

fn cast_error(source: CastError, location: &Location) -> SemaError {
    SemaError::Cast {
        source,
        location: location.clone(),
    }
}

fn charge(budget: &mut Budget, weight: Weight, location: &Location) -> SemaResult<()> {
    budget
        .charge(weight)
        .map_err(|source| cast_error(source, location))
}

fn is_integer(scalar: &ScalarType) -> bool {
    matches!(
        scalar.kind(),
        ScalarKind::SignedInt | ScalarKind::UnsignedInt
    )
}

fn int_literal(value: u64, ty: &StaticType, scalar: &ScalarType) -> TypedExpression {
    TypedExpression::new(
        ExpressionId::allocate(),
        ty.clone(),
        TypedExpressionKind::IntLiteral(value),
    )
    .with_range(Some(ValueRange::literal(scalar, i128::from(value))))
}

impl Analyzer<'_> {
    fn with_scope<T>(&mut self, body: impl FnOnce(&mut Self) -> SemaResult<T>) -> SemaResult<T> {
        self.context.push_scope();
        let result = body(self);
        self.context.pop_scope();
        result
    }

    fn expression_budget(&self) -> Budget {
        Budget::new(self.options.max_expression_weight)
    }

    fn resolve_type(&self, ty: &Type) -> SemaResult<StaticType> {
        match ty {
            Type::Simple(simple) => {
                self.context
                    .lookup_type(&simple.name)
                    .ok_or_else(|| SemaError::UnknownType {
                        name: simple.name.clone(),
                        location: simple.location.clone(),
                    })
            }
            Type::Pointer(pointer) => Ok(StaticType::pointer(self.resolve_type(&pointer.pointee)?)),
            Type::Array(array) => Ok(StaticType::array(
                self.resolve_type(&array.element_type)?,
                array.size,
            )),
        }
    }

    fn register_structs(&mut self, module: &Module) -> Vec<TypedStruct> {
        let mut declared: Vec<(Rc<StructDefinition>, StaticType)> = Vec::new();
        for definition in &module.definitions {
            let Definition::Struct(definition) = definition else {
                continue;
            };
            let name = &definition.name.name;
            let ty = StaticType::declare_struct(Some(name));
            if let Err(err) = self.context.register_type(name, ty.clone()) {
                self.errors.push(registration_failed(
                    RegistrationKind::Struct,
                    name,
                    &err,
                    &definition.location,
                ));
                continue;
            }
            declared.push((Rc::clone(definition), ty));
        }

        let mut pending: Vec<&(Rc<StructDefinition>, StaticType)> = declared.iter().collect();
        while !pending.is_empty() {
            let mut deferred = Vec::new();
            for entry in &pending {
                match self.define_struct(&entry.0, &entry.1) {
                    Ok(()) => {}
                    Err(
                        err @ SemaError::Type {
                            source: TypeError::IncompleteMember { .. },
                            ..
                        },
                    ) => deferred.push((*entry, err)),
                    Err(err) => self.errors.push(err),
                }
            }
            if deferred.len() == pending.len() {
                self.errors.extend(deferred.into_iter().map(|(_, err)| err));
                break;
            }
            pending = deferred.into_iter().map(|(entry, _)| entry).collect();
        }

        declared
            .into_iter()
            .map(|(definition, ty)| TypedStruct {
                name: definition.name.name.clone(),
                ty,
            })
            .collect()
    }

    fn define_struct(&self, definition: &StructDefinition, ty: &StaticType) -> SemaResult<()> {
        let members = definition
            .members
            .iter()
            .map(|member| Ok((member.name.name.clone(), self.resolve_type(&member.ty)?)))
            .collect::<SemaResult<Vec<_>>>()?;
        ty.define_struct(members).map_err(|source| SemaError::Type {
            source,
            location: definition.location.clone(),
        })
    }

    fn register_functions(&mut self, module: &Module) -> Vec<Signature> {
        let definitions: Vec<&Rc<FunctionDefinition>> = module
            .definitions
            .iter()
            .filter_map(|definition| match definition {
                Definition::Function(function) => Some(function),
                Definition::Struct(_) => None,
            })
            .collect();
        let mut reserved = Vec::with_capacity(definitions.len());
        for definition in definitions {
            match self.context.register_function_pass1(&definition.name.name) {
                Ok(()) => reserved.push(definition),
                Err(err) => self.errors.push(registration_failed(
                    RegistrationKind::Function,
                    &definition.name.name,
                    &err,
                    &definition.location,
                )),
            }
        }
        let mut signatures = Vec::with_capacity(reserved.len());
        for definition in reserved {
            match self.register_signature(definition) {
                Ok(signature) => signatures.push(signature),
                Err(err) => self.errors.push(err),
            }
        }
        signatures
    }

    fn register_signature(&mut self, definition: &Rc<FunctionDefinition>) -> SemaResult<Signature> {
        let name = &definition.name.name;
        let arguments = definition
            .arguments
            .iter()
            .map(|argument| self.resolve_type(&argument.ty))
            .collect::<SemaResult<Vec<_>>>()?;
        let return_type = match &definition.returns {
            Some(ty) => self.resolve_type(ty)?,
            None => self.builtins.types().void.clone(),
        };
        let ty = StaticType::function(return_type, arguments);
        let mangled_name = format!("_P{}{name}{}", name.len(), ty.mangled_name());
        let overload = FunctionOverload {
            name: name.clone(),
            ty,
            argument_names: definition
                .arguments
                .iter()
                .map(|argument| argument.name.name.clone())
                .collect(),
            kind: OverloadKind::User {
                mangled_name: mangled_name.clone(),
            },
            location: Some(definition.location.clone()),
        };
        let overload = self
            .context
            .register_function_pass2(overload)
            .map_err(|err| {
                registration_failed(RegistrationKind::Function, name, &err, &definition.location)
            })?;
        Ok(Signature {
            definition: Rc::clone(definition),
            overload,
            mangled_name,
        })
    }

    fn function(&mut self, signature: &Signature) -> SemaResult<TypedFunction> {
        let definition = &signature.definition;
        let function_type = signature.overload.signature();
        let return_type = function_type.return_type.clone();
        debug!(function = %definition.name.name, ty = %signature.overload.ty, "analysing function");
        self.function.clone_from(&definition.name.name);
        self.return_type = return_type.clone();

        self.with_scope(|this| {
            let mut arguments = Vec::with_capacity(definition.arguments.len());
            for (argument, ty) in definition.arguments.iter().zip(&function_type.arguments) {
                let variable = this.declare_variable(
                    &argument.name,
                    ty,
                    false,
                    ValueRange::full(ty),
                    &argument.location,
                )?;
                arguments.push(ArgumentDeclaration {
                    ty: ty.clone(),
                    name: variable.name.clone(),
                    lvalue_id: variable.lvalue_id,
                });
            }

            let expected = (!return_type.is_void()).then_some(&return_type);
            let mut budget = this.expression_budget();
            let mut body = this.compound(&definition.body, expected, &mut budget)?;
            let returns = matches!(definition.body.statements.last(), Some(Statement::Return(_)));
            if expected.is_some() && definition.body.result.is_none() && !returns {
                return Err(SemaError::MissingReturn {
                    function: definition.name.name.clone(),
                    expected: return_type.clone(),
                    location: definition.location.clone(),
                });
            }
            if return_type.is_void() {
                body.discard_result();
            }
            Ok(TypedFunction {
                name: definition.name.name.clone(),
                mangled_name: signature.mangled_name.clone(),
                ty: signature.overload.ty.clone(),
                return_type: return_type.clone(),
                arguments,
                location: SourceLocation::from(&definition.location),
                body,
            })
        })
    }

    fn declare_variable(
        &mut self,
        name: &Identifier,
        ty: &StaticType,
        is_mut: bool,
        range: Option<ValueRange>,
        location: &Location,
    ) -> SemaResult<Rc<LocalVariable>> {
        if ty.is_void() || matches!(ty.kind(), TypeKind::Function(_)) {
            return Err(SemaError::InvalidVariableType {
                name: name.name.clone(),
                ty: ty.clone(),
                location: location.clone(),
            });
        }
        let flags = if is_mut {
            TypeFlags::REFERENCE | TypeFlags::MUTABLE
        } else {
            TypeFlags::REFERENCE
        };
        let variable = LocalVariable {
            name: name.name.clone(),
            ty: ty.unqualified().add_flags(flags),
            lvalue_id: ExpressionId::allocate(),
            range,
            location: location.clone(),
        };
        self.context
            .register_variable(variable)
            .map_err(|err| registration_failed(RegistrationKind::Variable, &name.name, &err, location))
    }

    fn statement(&mut self, statement: &Statement) -> SemaResult<TypedStatement> {
        match statement {
            Statement::Expression(expression) => {
                let mut budget = self.expression_budget();
                let mut typed = self.expression(expression, None, &mut budget)?;
                typed.discard_result();
                Ok(TypedStatement::Expression(typed))
            }
            Statement::VariableDefinition(definition) => self.variable_definition(definition),
            Statement::Assign(assign) => self.assign(assign),
            Statement::Return(ret) => self.return_statement(ret),
        }
    }

    fn variable_definition(
        &mut self,
        definition: &VariableDefinitionStatement,
    ) -> SemaResult<TypedStatement> {
        let mut budget = Budget::new(
            self.options
                .initializer_weight_limit
                .unwrap_or(NO_WEIGHT_LIMIT),
        );
        let value = match &definition.ty {
            Some(ty) => {
                let ty = self.resolve_type(ty)?;
                if ty.is_void() {
                    return Err(SemaError::InvalidVariableType {
                        name: definition.name.name.clone(),
                        ty,
                        location: definition.location.clone(),
                    });
                }
                self.expression(&definition.value, Some(&ty), &mut budget)?
            }
            None => self.value(&definition.value, &mut budget)?,
        };
        let range = if definition.is_mut {
            ValueRange::full(&value.ty)
        } else {
            value.range()
        };
        let variable = self.declare_variable(
            &definition.name,
            &value.ty,
            definition.is_mut,
            range,
            &definition.location,
        )?;
        Ok(TypedStatement::VariableDefinition { variable, value })
    }

    fn assign(&mut self, assign: &AssignStatement) -> SemaResult<TypedStatement> {
        let mut budget = self.expression_budget();
        let target = self.expression(&assign.left, None, &mut budget)?;
        if !(target.ty.is_reference() && target.ty.is_mutable()) {
            return Err(SemaError::AssignToImmutable {
                ty: target.ty.clone(),
                location: assign.left.location(),
            });
        }
        let value_type = target.ty.unqualified();
        let value = self.expression(&assign.right, Some(&value_type), &mut budget)?;
        Ok(TypedStatement::Assign { target, value })
    }

    fn return_statement(&mut self, ret: &ReturnStatement) -> SemaResult<TypedStatement> {
        let return_type = self.return_type.clone();
        match &ret.expression {
            Some(expression) => {
                let mut budget = self.expression_budget();
                let value = self.expression(expression, Some(&return_type), &mut budget)?;
                Ok(TypedStatement::Return(Some(value)))
            }
            None if return_type.is_void() => Ok(TypedStatement::Return(None)),
            None => Err(SemaError::MissingReturn {
                function: self.function.clone(),
                expected: return_type,
                location: ret.location.clone(),
            }),
        }
    }

    /// Analyses `expression` and converts it to `expected`, or to its natural
    /// type when nothing is expected.
    fn expression(
        &mut self,
        expression: &Expression,
        expected: Option<&StaticType>,
        budget: &mut Budget,
    ) -> SemaResult<TypedExpression> {
        let location = expression.location();
        let operand = self.operand(expression, expected, budget)?;
        match expected {
            Some(destination) => self.coerce(operand, destination, true, budget, &location),
            None => self.natural(operand, budget, &location),
        }
    }

    /// Like [`Analyzer::expression`] without an expected type, with the
    /// qualifiers of the result stripped: reads a variable instead of naming it.
    fn value(&mut self, expression: &Expression, budget: &mut Budget) -> SemaResult<TypedExpression> {
        let location = expression.location();
        let typed = self.expression(expression, None, budget)?;
        let ty = typed.ty.unqualified();
        self.convert(typed, &ty, true, budget, &location)
    }

    /// `hint` is the type the caller will convert the operand to, if known.
    fn operand(
        &mut self,
        expression: &Expression,
        hint: Option<&StaticType>,
        budget: &mut Budget,
    ) -> SemaResult<Operand> {
        let location = expression.location();
        match expression {
            Expression::Literal(Literal::Number(number)) => number
                .value
                .parse::<u64>()
                .map(Operand::Number)
                .map_err(|_| SemaError::InvalidLiteral {
                    value: number.value.clone(),
                    location,
                }),
            Expression::Literal(Literal::Bool(literal)) => {
                let ty = self.builtins.types().bool.clone();
                Ok(Operand::Typed(
                    TypedExpression::new(
                        ExpressionId::allocate(),
                        ty,
                        TypedExpressionKind::BoolLiteral(literal.value),
                    )
                    .with_range(Some(ValueRange::unsigned(
                        u64::from(literal.value),
                        u64::from(literal.value),
                    ))),
                ))
            }
            Expression::Literal(Literal::Null(_)) => Ok(Operand::Null),
            Expression::Identifier(identifier) => self.identifier(identifier).map(Operand::Typed),
            Expression::Binary(binary) => self
                .overloaded(
                    binary.operator.symbol(),
                    &[&binary.left, &binary.right],
                    hint,
                    budget,
                    &location,
                )
                .map(Operand::Typed),
            Expression::PrefixUnary(unary) => self
                .overloaded(
                    unary.operator.symbol(),
                    &[&unary.expression],
                    hint,
                    budget,
                    &location,
                )
                .map(Operand::Typed),
            Expression::FunctionCall(call) => {
                let arguments: Vec<&Expression> = call.arguments.iter().collect();
                self.overloaded(&call.function.name, &arguments, hint, budget, &location)
                    .map(Operand::Typed)
            }
            Expression::Cast(cast) => {
                let destination = self.resolve_type(&cast.ty)?;
                let operand = self.operand(&cast.expression, None, budget)?;
                self.coerce(operand, &destination, false, budget, &location)
                    .map(Operand::Typed)
            }
            Expression::Compound(compound) => {
                self.compound(compound, hint, budget).map(Operand::Typed)
            }
            Expression::Condition(condition) => {
                self.condition(condition, hint, budget).map(Operand::Typed)
            }
            Expression::Dereference(dereference) => {
                let pointer = self.value(&dereference.expression, budget)?;
                let TypeKind::Pointer(pointer_type) = pointer.ty.kind() else {
                    return Err(SemaError::DereferenceNonPointer {
                        ty: pointer.ty.clone(),
                        location,
                    });
                };
                let range = ValueRange::full(&pointer_type.pointee);
                let ty = pointer_type.pointee.add_flags(TypeFlags::REFERENCE);
                Ok(Operand::Typed(
                    TypedExpression::new(
                        pointer.id,
                        ty,
                        TypedExpressionKind::PointerDereference(Box::new(pointer)),
                    )
                    .with_range(range),
                ))
            }
        }
    }

    fn identifier(&self, identifier: &Identifier) -> SemaResult<TypedExpression> {
        match self.context.lookup_identifier(&identifier.name) {
            Some(NamedObject::Variable(variable)) => Ok(TypedExpression::new(
                variable.lvalue_id,
                variable.ty.clone(),
                TypedExpressionKind::VariableRef(Rc::clone(&variable)),
            )
            .with_range(variable.range)),
            Some(NamedObject::Function(_)) => Err(SemaError::FunctionAsValue {
                name: identifier.name.clone(),
                location: identifier.location.clone(),
            }),
            None => Err(SemaError::UnknownIdentifier {
                name: identifier.name.clone(),
                location: identifier.location.clone(),
            }),
        }
    }

    fn natural_number(
        &mut self,
        value: u64,
        budget: &mut Budget,
        location: &Location,
    ) -> SemaResult<TypedExpression> {
        let types = self.builtins.types();
        for ty in types.integers() {
            let Some(scalar) = ty.as_scalar() else {
                continue;
            };
            if ValueRange::full_scalar(scalar).is_some_and(|full| full.contains_value(i128::from(value))) {
                charge(budget, scalar.literal_weight(), location)?;
                return Ok(int_literal(value, ty, scalar));
            }
        }
        Err(SemaError::InvalidLiteral {
            value: value.to_string(),
            location: location.clone(),
        })
    }

    fn natural(
        &mut self,
        operand: Operand,
        budget: &mut Budget,
        location: &Location,
    ) -> SemaResult<TypedExpression> {
        match operand {
            Operand::Typed(expression) => Ok(expression),
            Operand::Number(value) => self.natural_number(value, budget, location),
            Operand::Null => Err(SemaError::UntypedNull {
                location: location.clone(),
            }),
        }
    }

    fn coerce(
        &mut self,
        operand: Operand,
        destination: &StaticType,
        implicit: bool,
        budget: &mut Budget,
        location: &Location,
    ) -> SemaResult<TypedExpression> {
        let source = match operand {
            Operand::Typed(expression) => expression,
            Operand::Number(value) => {
                if let Some(scalar) = destination.as_scalar().filter(|s| is_integer(s)) {
                    let fits = ValueRange::full_scalar(scalar)
                        .is_some_and(|full| full.contains_value(i128::from(value)));
                    if fits {
                        charge(budget, scalar.literal_weight(), location)?;
                        return Ok(int_literal(value, destination, scalar));
                    }
                }
                self.natural_number(value, budget, location)?
            }
            Operand::Null => {
                if !matches!(destination.kind(), TypeKind::Pointer(_)) {
                    return Err(SemaError::UntypedNull {
                        location: location.clone(),
                    });
                }
                return Ok(TypedExpression::new(
                    ExpressionId::allocate(),
                    destination.clone(),
                    TypedExpressionKind::NullLiteral,
                ));
            }
        };
        self.convert(source, destination, implicit, budget, location)
    }

    /// Splices the cheapest conversion chain from `source` to `destination`
    /// in as one cast node per edge.
    fn convert(
        &mut self,
        source: TypedExpression,
        destination: &StaticType,
        implicit: bool,
        budget: &mut Budget,
        location: &Location,
    ) -> SemaResult<TypedExpression> {
        let query = CastQuery {
            source: &source.ty,
            source_range: source.range(),
            destination,
            implicit,
            weight_limit: budget.remaining(),
        };
        let chain = resolve_cast(&self.context, &query).map_err(|err| cast_error(err, location))?;
        charge(budget, chain.weight, location)?;
        Ok(chain.steps.into_iter().fold(source, |expression, step| {
            let op = step.descriptor.op;
            let id = if op == CastOp::NoOp {
                expression.id
            } else {
                ExpressionId::allocate()
            };
            TypedExpression::new(
                id,
                step.descriptor.destination,
                TypedExpressionKind::Cast {
                    op,
                    source: Box::new(expression),
                },
            )
            .with_range(step.range)
        }))
    }

    /// Resolves a call or operator against the overload set `name`.
    ///
    /// Arguments are analysed once. Every overload of matching arity is then
    /// costed on its own budget: literal weights and cast chains of the
    /// arguments, plus the conversion of the result to `hint`.
    fn overloaded(
        &mut self,
        name: &str,
        arguments: &[&Expression],
        hint: Option<&StaticType>,
        budget: &mut Budget,
        location: &Location,
    ) -> SemaResult<TypedExpression> {
        let function = match self.context.lookup_identifier(name) {
            Some(NamedObject::Function(function)) => function,
            Some(NamedObject::Variable(_)) => {
                return Err(SemaError::NotAFunction {
                    name: name.to_string(),
                    location: location.clone(),
                });
            }
            None => {
                return Err(SemaError::UnknownIdentifier {
                    name: name.to_string(),
                    location: location.clone(),
                });
            }
        };
        let operands = arguments
            .iter()
            .map(|argument| self.operand(argument, None, budget))
            .collect::<SemaResult<Vec<_>>>()?;

        let mut viable: Vec<Candidate> = Vec::new();
        let mut failures = Vec::new();
        for overload in &function.overloads {
            if overload.signature().arguments.len() != operands.len() {
                continue;
            }
            let mut trial = Budget::new(budget.remaining());
            match self.candidate(overload, &operands, hint, &mut trial, location) {
                Ok((expression, undefined)) => viable.push(Candidate {
                    mangled_name: overload.ty.mangled_name(),
                    expression,
                    weight: trial.spent,
                    undefined,
                }),
                Err(
                    err @ SemaError::Cast {
                        source: CastError::Ambiguous { .. },
                        ..
                    },
                ) => return Err(err),
                Err(err) => failures.push(err),
            }
        }

        let Some(best) = viable.iter().map(|candidate| candidate.weight).min() else {
            if failures.len() == 1
                && let Some(failure) = failures.pop()
            {
                return Err(failure);
            }
            return Err(SemaError::NoMatchingOverload {
                name: name.to_string(),
                arguments: operands
                    .iter()
                    .map(Operand::describe)
                    .collect::<Vec<_>>()
                    .join(", "),
                location: location.clone(),
            });
        };
        viable.retain(|candidate| candidate.weight == best);
        if viable.len() > 1 {
            return Err(SemaError::AmbiguousOverload {
                name: name.to_string(),
                candidates: viable.len(),
                location: location.clone(),
            });
        }
        let Some(winner) = viable.pop() else {
            ice!("overload set `{name}` lost its minimum-weight candidate");
        };
        debug!(
            name,
            overload = %winner.mangled_name,
            weight = winner.weight,
            "overload selected"
        );
        charge(budget, winner.weight, location)?;
        if let Some(undefined) = winner.undefined {
            return Err(SemaError::UndefinedBehavior {
                source: undefined,
                location: location.clone(),
            });
        }
        Ok(winner.expression)
    }

    fn candidate(
        &mut self,
        overload: &FunctionOverload,
        operands: &[Operand],
        hint: Option<&StaticType>,
        trial: &mut Budget,
        location: &Location,
    ) -> SemaResult<(TypedExpression, Option<UndefinedBehavior>)> {
        let signature = overload.signature();
        let mut arguments = Vec::with_capacity(operands.len());
        for (operand, parameter) in operands.iter().zip(&signature.arguments) {
            arguments.push(self.coerce(operand.clone(), parameter, true, trial, location)?);
        }
        let return_type = signature.return_type.clone();
        let mut undefined = None;
        let (kind, range) = match &overload.kind {
            OverloadKind::User { mangled_name } => (
                TypedExpressionKind::Call {
                    name: mangled_name.clone(),
                    arguments,
                },
                ValueRange::full(&return_type),
            ),
            OverloadKind::Builtin(builtin) => {
                let Some(scalar) = return_type.as_scalar() else {
                    ice!("builtin operator `{}` returns `{return_type}`", overload.name);
                };
                let mut ranges = Vec::with_capacity(arguments.len());
                for (argument, parameter) in arguments.iter().zip(&signature.arguments) {
                    match argument.range().or_else(|| ValueRange::full(parameter)) {
                        Some(range) => ranges.push(range),
                        None => ice!("builtin operator `{}` applied to `{parameter}`", overload.name),
                    }
                }
                let range = match (builtin.range)(scalar, &ranges) {
                    Ok(range) => range,
                    Err(ub) => {
                        undefined = Some(ub);
                        ub.collapsed
                    }
                };
                let kind = match builtin.op {
                    BuiltinOp::Binary(operation) => {
                        let Ok([left, right]) = <[TypedExpression; 2]>::try_from(arguments) else {
                            ice!("binary operator `{}` without two operands", overload.name);
                        };
                        TypedExpressionKind::Binary {
                            operation,
                            left: Box::new(left),
                            right: Box::new(right),
                        }
                    }
                    BuiltinOp::LogicalNot => {
                        let Ok([argument]) = <[TypedExpression; 1]>::try_from(arguments) else {
                            ice!("unary operator `{}` without one operand", overload.name);
                        };
                        TypedExpressionKind::LogicalNot(Box::new(argument))
                    }
                };
                (kind, Some(range))
            }
        };
        let id = if return_type.is_void() {
            ExpressionId::NONE
        } else {
            ExpressionId::allocate()
        };
        let result = TypedExpression::new(id, return_type, kind).with_range(range);
        let result = match hint {
            Some(expected) => self.convert(result, expected, true, trial, location)?,
            None => result,
        };
        Ok((result, undefined))
    }

    fn compound(
        &mut self,
        compound: &CompoundExpression,
        hint: Option<&StaticType>,
        budget: &mut Budget,
    ) -> SemaResult<TypedExpression> {
        self.with_scope(|this| {
            let statements = compound
                .statements
                .iter()
                .map(|statement| this.statement(statement))
                .collect::<SemaResult<Vec<_>>>()?;
            let Some(result) = &compound.result else {
                return Ok(TypedExpression::new(
                    ExpressionId::NONE,
                    this.builtins.types().void.clone(),
                    TypedExpressionKind::Compound {
                        statements,
                        result: None,
                    },
                ));
            };
            let result = this.expression(result, hint, budget)?;
            let range = result.range();
            Ok(TypedExpression::new(
                result.id,
                result.ty.clone(),
                TypedExpressionKind::Compound {
                    statements,
                    result: Some(Box::new(result)),
                },
            )
            .with_range(range))
        })
    }

    fn condition(
        &mut self,
        condition: &ConditionExpression,
        hint: Option<&StaticType>,
        budget: &mut Budget,
    ) -> SemaResult<TypedExpression> {
        let types = self.builtins.types();
        let bool_type = types.bool.clone();
        let void_type = types.void.clone();
        let mut condition_budget = self.expression_budget();
        let test = self.expression(&condition.condition, Some(&bool_type), &mut condition_budget)?;
        let else_point = JumpPointId::allocate();

        let Some(else_arm) = &condition.else_arm else {
            let mut if_arm = self.compound(&condition.if_arm, None, budget)?;
            if_arm.discard_result();
            return Ok(TypedExpression::new(
                ExpressionId::NONE,
                void_type,
                TypedExpressionKind::Condition {
                    condition: Box::new(test),
                    if_arm: Box::new(if_arm),
                    else_arm: None,
                    else_point,
                    continuation_point: else_point,
                },
            ));
        };

        let if_arm = self.compound(&condition.if_arm, hint, budget)?;
        let ty = hint.map_or_else(|| if_arm.ty.unqualified(), StaticType::clone);
        let if_arm = self.convert(if_arm, &ty, true, budget, &condition.if_arm.location)?;
        let else_typed = self.compound(else_arm, Some(&ty), budget)?;
        let else_typed = self.convert(else_typed, &ty, true, budget, &else_arm.location)?;
        let range = match (if_arm.range(), else_typed.range()) {
            (Some(a), Some(b)) => Some(a.hull(&b)),
            _ => None,
        };
        let id = if ty.is_void() {
            ExpressionId::NONE
        } else {
            ExpressionId::allocate()
        };
        Ok(TypedExpression::new(
            id,
            ty,
            TypedExpressionKind::Condition {
                condition: Box::new(test),
                if_arm: Box::new(if_arm),
                else_arm: Some(Box::new(else_typed)),
                else_point,
                continuation_point: JumpPointId::allocate(),
            },
        )
        .with_range(range))
    }
}
