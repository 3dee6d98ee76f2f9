use std::rc::Rc;

use practical_ast::builder::Builder;
use practical_ast::nodes::{Definition, Expression, Module, Statement};
use practical_sema::AnalyzerBuilder;
use practical_sema::builtins::{BuiltinContextGen, Builtins, prepare};
use practical_sema::codegen::{
    ArgumentDeclaration, BinaryOperation, ExpressionId, FunctionGen, JumpPointId, ModuleGen,
    ModuleId, SourceLocation,
};
use practical_sema::errors::{AnalysisFailed, SemaError};
use practical_sema::lookup_context::LocalVariable;
use practical_sema::options::AnalyzerOptions;
use practical_sema::static_type::{StaticType, TypeId};
use practical_sema::typed_tree::{TypedExpression, TypedExpressionKind, TypedModule, TypedStatement};
use rustc_hash::FxHashSet;

/// Backend stand-in for builtin registration. Cookies start at 100 so they
/// never coincide with anything a test builds by hand.
#[derive(Default)]
pub(crate) struct TestBackend {
    pub(crate) registered: Vec<String>,
}

impl TestBackend {
    fn cookie(&mut self, what: String) -> TypeId {
        self.registered.push(what);
        TypeId(99 + self.registered.len())
    }
}

impl BuiltinContextGen for TestBackend {
    fn register_void_type(&mut self) -> TypeId {
        self.cookie("void".to_string())
    }

    fn register_bool_type(&mut self) -> TypeId {
        self.cookie("bool".to_string())
    }

    fn register_integer_type(&mut self, bit_size: u32, alignment: usize, signed: bool) -> TypeId {
        self.cookie(format!("int{bit_size}/{alignment}/{signed}"))
    }

    fn register_char_type(&mut self, bit_size: u32, alignment: usize, signed: bool) -> TypeId {
        self.cookie(format!("char{bit_size}/{alignment}/{signed}"))
    }
}

pub(crate) fn builtins() -> Builtins {
    prepare(&mut TestBackend::default())
}

pub(crate) fn analyze(module: &Module) -> anyhow::Result<TypedModule> {
    analyze_with(module, &AnalyzerOptions::default())
}

pub(crate) fn analyze_with(
    module: &Module,
    options: &AnalyzerOptions,
) -> anyhow::Result<TypedModule> {
    let builtins = builtins();
    Ok(AnalyzerBuilder::build_typed_module(&builtins, module, options)?.typed_module())
}

/// The errors of a run that is expected to fail.
pub(crate) fn analysis_errors(module: &Module) -> Vec<SemaError> {
    analysis_errors_with(module, &AnalyzerOptions::default())
}

pub(crate) fn analysis_errors_with(module: &Module, options: &AnalyzerOptions) -> Vec<SemaError> {
    let error = match analyze_with(module, options) {
        Ok(_) => panic!("Expected analysis of `{}` to fail", module.name),
        Err(error) => error,
    };
    error
        .downcast_ref::<AnalysisFailed>()
        .expect("Expected AnalysisFailed")
        .errors
        .clone()
}

/// `fn name(arguments) -> returns { statements; result }`
pub(crate) fn function(
    b: &mut Builder,
    name: &str,
    arguments: &[(&str, &str)],
    returns: Option<&str>,
    statements: Vec<Statement>,
    result: Option<Expression>,
) -> Definition {
    let arguments = arguments
        .iter()
        .map(|(name, ty)| {
            let ty = b.simple_type(ty);
            b.argument(name, ty)
        })
        .collect();
    let returns = returns.map(|ty| b.simple_type(ty));
    let body = b.compound(statements, result);
    Definition::Function(b.function(name, arguments, returns, body))
}

/// `def name[: ty] = value;`
pub(crate) fn define(
    b: &mut Builder,
    name: &str,
    is_mut: bool,
    ty: Option<&str>,
    value: Expression,
) -> Statement {
    let ty = ty.map(|ty| b.simple_type(ty));
    b.variable_definition(name, is_mut, ty, value)
}

/// Top-level statements of `function`'s body.
pub(crate) fn statements<'a>(module: &'a TypedModule, function: &str) -> &'a [TypedStatement] {
    let function = module.function(function).expect("Expected function");
    match &function.body.kind {
        TypedExpressionKind::Compound { statements, .. } => statements,
        other => panic!("Expected compound body, found {other:?}"),
    }
}

/// Result expression of `function`'s body.
pub(crate) fn body_result<'a>(module: &'a TypedModule, function: &str) -> &'a TypedExpression {
    let function = module.function(function).expect("Expected function");
    match &function.body.kind {
        TypedExpressionKind::Compound {
            result: Some(result),
            ..
        } => result,
        other => panic!("Expected body with a result, found {other:?}"),
    }
}

/// A variable defined at the top level of `function`'s body, with its
/// initializer.
pub(crate) fn variable<'a>(
    module: &'a TypedModule,
    function: &str,
    name: &str,
) -> (Rc<LocalVariable>, &'a TypedExpression) {
    statements(module, function)
        .iter()
        .find_map(|statement| match statement {
            TypedStatement::VariableDefinition { variable, value } if variable.name == name => {
                Some((Rc::clone(variable), value))
            }
            _ => None,
        })
        .expect("Expected variable definition")
}

/// Every callback, flattened into one stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Event {
    ModuleEnter(String),
    ModuleLeave,
    DeclareIdentifier {
        name: String,
        mangled_name: String,
    },
    DeclareStruct(String),
    DefineStruct(String),
    FunctionEnter {
        name: String,
        return_type: String,
        arguments: Vec<(String, ExpressionId)>,
    },
    FunctionLeave,
    ReturnValue(ExpressionId),
    ReturnVoid,
    ConditionalBranch {
        id: ExpressionId,
        condition: ExpressionId,
        else_point: JumpPointId,
        continuation_point: JumpPointId,
    },
    ClauseResult(ExpressionId),
    JumpPoint(JumpPointId),
    Jump(JumpPointId),
    LiteralInt {
        id: ExpressionId,
        value: u64,
        ty: String,
    },
    LiteralBool {
        id: ExpressionId,
        value: bool,
    },
    LiteralNull {
        id: ExpressionId,
        ty: String,
    },
    AllocateStackVar {
        id: ExpressionId,
        ty: String,
        name: String,
    },
    Assign {
        lvalue: ExpressionId,
        rvalue: ExpressionId,
    },
    Dereference {
        id: ExpressionId,
        ty: String,
        address: ExpressionId,
    },
    IntegerCast {
        kind: &'static str,
        id: ExpressionId,
        source: ExpressionId,
        from: String,
        to: String,
    },
    Call {
        id: ExpressionId,
        name: String,
        arguments: Vec<ExpressionId>,
        return_type: String,
    },
    Binary {
        id: ExpressionId,
        operation: BinaryOperation,
        left: ExpressionId,
        right: ExpressionId,
        ty: String,
    },
    LogicalNot {
        id: ExpressionId,
        argument: ExpressionId,
    },
}

#[derive(Default)]
pub(crate) struct RecordingGen {
    pub(crate) events: Vec<Event>,
}

impl RecordingGen {
    /// Events of the first function whose mangled name contains `name`.
    pub(crate) fn function_events(&self, name: &str) -> Vec<Event> {
        let start = self
            .events
            .iter()
            .position(|event| {
                matches!(event, Event::FunctionEnter { name: entered, .. } if entered.contains(name))
            })
            .expect("Expected function in the stream");
        let length = self.events[start..]
            .iter()
            .position(|event| *event == Event::FunctionLeave)
            .expect("Expected function_leave");
        self.events[start..=start + length].to_vec()
    }

    fn cast(
        &mut self,
        kind: &'static str,
        id: ExpressionId,
        source: ExpressionId,
        from: &StaticType,
        to: &StaticType,
    ) {
        self.events.push(Event::IntegerCast {
            kind,
            id,
            source,
            from: from.to_string(),
            to: to.to_string(),
        });
    }
}

impl ModuleGen for RecordingGen {
    fn module_enter(&mut self, _id: ModuleId, name: &str, _file: &str, _location: SourceLocation) {
        self.events.push(Event::ModuleEnter(name.to_string()));
    }

    fn module_leave(&mut self, _id: ModuleId) {
        self.events.push(Event::ModuleLeave);
    }

    fn declare_identifier(&mut self, name: &str, mangled_name: &str, _ty: &StaticType) {
        self.events.push(Event::DeclareIdentifier {
            name: name.to_string(),
            mangled_name: mangled_name.to_string(),
        });
    }

    fn declare_struct(&mut self, ty: &StaticType) {
        self.events.push(Event::DeclareStruct(ty.to_string()));
    }

    fn define_struct(&mut self, ty: &StaticType) {
        self.events.push(Event::DefineStruct(ty.to_string()));
    }

    fn handle_function(&mut self) -> &mut dyn FunctionGen {
        self
    }
}

impl FunctionGen for RecordingGen {
    fn function_enter(
        &mut self,
        name: &str,
        return_type: &StaticType,
        arguments: &[ArgumentDeclaration],
        _file: &str,
        _location: SourceLocation,
    ) {
        self.events.push(Event::FunctionEnter {
            name: name.to_string(),
            return_type: return_type.to_string(),
            arguments: arguments
                .iter()
                .map(|argument| (argument.name.clone(), argument.lvalue_id))
                .collect(),
        });
    }

    fn function_leave(&mut self) {
        self.events.push(Event::FunctionLeave);
    }

    fn return_value(&mut self, id: ExpressionId) {
        self.events.push(Event::ReturnValue(id));
    }

    fn return_void(&mut self) {
        self.events.push(Event::ReturnVoid);
    }

    fn conditional_branch(
        &mut self,
        id: ExpressionId,
        _ty: &StaticType,
        condition: ExpressionId,
        else_point: JumpPointId,
        continuation_point: JumpPointId,
    ) {
        self.events.push(Event::ConditionalBranch {
            id,
            condition,
            else_point,
            continuation_point,
        });
    }

    fn set_condition_clause_result(&mut self, id: ExpressionId) {
        self.events.push(Event::ClauseResult(id));
    }

    fn set_jump_point(&mut self, id: JumpPointId, _name: &str) {
        self.events.push(Event::JumpPoint(id));
    }

    fn jump(&mut self, destination: JumpPointId) {
        self.events.push(Event::Jump(destination));
    }

    fn set_literal_int(&mut self, id: ExpressionId, value: u64, ty: &StaticType) {
        self.events.push(Event::LiteralInt {
            id,
            value,
            ty: ty.to_string(),
        });
    }

    fn set_literal_bool(&mut self, id: ExpressionId, value: bool) {
        self.events.push(Event::LiteralBool { id, value });
    }

    fn set_literal_null(&mut self, id: ExpressionId, ty: &StaticType) {
        self.events.push(Event::LiteralNull {
            id,
            ty: ty.to_string(),
        });
    }

    fn allocate_stack_var(&mut self, id: ExpressionId, ty: &StaticType, name: &str) {
        self.events.push(Event::AllocateStackVar {
            id,
            ty: ty.to_string(),
            name: name.to_string(),
        });
    }

    fn assign(&mut self, lvalue: ExpressionId, rvalue: ExpressionId) {
        self.events.push(Event::Assign { lvalue, rvalue });
    }

    fn dereference_pointer(&mut self, id: ExpressionId, ty: &StaticType, address: ExpressionId) {
        self.events.push(Event::Dereference {
            id,
            ty: ty.to_string(),
            address,
        });
    }

    fn truncate_integer(
        &mut self,
        id: ExpressionId,
        source: ExpressionId,
        source_type: &StaticType,
        destination_type: &StaticType,
    ) {
        self.cast("truncate", id, source, source_type, destination_type);
    }

    fn change_integer_sign(
        &mut self,
        id: ExpressionId,
        source: ExpressionId,
        source_type: &StaticType,
        destination_type: &StaticType,
    ) {
        self.cast("change_sign", id, source, source_type, destination_type);
    }

    fn expand_integer_signed(
        &mut self,
        id: ExpressionId,
        source: ExpressionId,
        source_type: &StaticType,
        destination_type: &StaticType,
    ) {
        self.cast("expand_signed", id, source, source_type, destination_type);
    }

    fn expand_integer_unsigned(
        &mut self,
        id: ExpressionId,
        source: ExpressionId,
        source_type: &StaticType,
        destination_type: &StaticType,
    ) {
        self.cast("expand_unsigned", id, source, source_type, destination_type);
    }

    fn call_function_direct(
        &mut self,
        id: ExpressionId,
        name: &str,
        arguments: &[ExpressionId],
        return_type: &StaticType,
    ) {
        self.events.push(Event::Call {
            id,
            name: name.to_string(),
            arguments: arguments.to_vec(),
            return_type: return_type.to_string(),
        });
    }

    fn binary_operator(
        &mut self,
        id: ExpressionId,
        operation: BinaryOperation,
        left: ExpressionId,
        right: ExpressionId,
        result_type: &StaticType,
    ) {
        self.events.push(Event::Binary {
            id,
            operation,
            left,
            right,
            ty: result_type.to_string(),
        });
    }

    fn operator_logical_not(&mut self, id: ExpressionId, argument: ExpressionId) {
        self.events.push(Event::LogicalNot { id, argument });
    }
}

/// Checks the stream guarantees: every id read was produced earlier in the
/// same function, and every jump point is placed exactly once per function.
pub(crate) fn assert_well_formed(events: &[Event]) {
    let mut produced: FxHashSet<ExpressionId> = FxHashSet::default();
    let mut referenced: FxHashSet<JumpPointId> = FxHashSet::default();
    let mut placed: Vec<JumpPointId> = Vec::new();
    let read = |id: &ExpressionId, produced: &FxHashSet<ExpressionId>, event: &Event| {
        assert!(
            id.is_none() || produced.contains(id),
            "id {id} read before it was produced in {event:?}"
        );
    };
    for event in events {
        match event {
            Event::FunctionEnter { arguments, .. } => {
                produced.clear();
                referenced.clear();
                placed.clear();
                produced.extend(arguments.iter().map(|(_, id)| *id));
            }
            Event::FunctionLeave => {
                for point in &referenced {
                    assert_eq!(
                        placed.iter().filter(|p| *p == point).count(),
                        1,
                        "jump point {point} must be placed exactly once"
                    );
                }
            }
            Event::ReturnValue(id) | Event::ClauseResult(id) => read(id, &produced, event),
            Event::ConditionalBranch {
                id,
                condition,
                else_point,
                continuation_point,
            } => {
                read(condition, &produced, event);
                referenced.insert(*else_point);
                referenced.insert(*continuation_point);
                produced.insert(*id);
            }
            Event::JumpPoint(point) => placed.push(*point),
            Event::Jump(point) => {
                referenced.insert(*point);
            }
            Event::LiteralInt { id, .. }
            | Event::LiteralBool { id, .. }
            | Event::LiteralNull { id, .. }
            | Event::AllocateStackVar { id, .. } => {
                produced.insert(*id);
            }
            Event::Assign { lvalue, rvalue } => {
                read(lvalue, &produced, event);
                read(rvalue, &produced, event);
            }
            Event::Dereference { id, address, .. } => {
                read(address, &produced, event);
                produced.insert(*id);
            }
            Event::IntegerCast { id, source, .. } => {
                read(source, &produced, event);
                produced.insert(*id);
            }
            Event::Call { id, arguments, .. } => {
                for argument in arguments {
                    read(argument, &produced, event);
                }
                produced.insert(*id);
            }
            Event::Binary {
                id, left, right, ..
            } => {
                read(left, &produced, event);
                read(right, &produced, event);
                produced.insert(*id);
            }
            Event::LogicalNot { id, argument } => {
                read(argument, &produced, event);
                produced.insert(*id);
            }
            Event::ModuleEnter(_)
            | Event::ModuleLeave
            | Event::DeclareIdentifier { .. }
            | Event::DeclareStruct(_)
            | Event::DefineStruct(_)
            | Event::ReturnVoid => {}
        }
    }
}
