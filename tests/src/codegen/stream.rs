/// Callback streams produced by replaying typed modules into a backend.
#[cfg(test)]
mod stream_tests {
    use practical_ast::builder::Builder;
    use practical_ast::nodes::{Definition, Module, OperatorKind, Statement};
    use practical_sema::codegen::{BinaryOperation, ExpressionId};
    use practical_sema::compile;
    use practical_sema::options::AnalyzerOptions;

    use crate::utils::{Event, RecordingGen, assert_well_formed, builtins, define, function};

    fn record(module: &Module) -> RecordingGen {
        let mut backend = RecordingGen::default();
        compile(&builtins(), module, &AnalyzerOptions::default(), &mut backend).unwrap();
        backend
    }

    #[test]
    fn test_add_function_stream() {
        let mut b = Builder::new("stream.pr");
        let a = b.identifier_expression("a");
        let c = b.identifier_expression("b");
        let sum = b.binary(a, OperatorKind::Add, c);
        let add = function(&mut b, "add", &[("a", "U8"), ("b", "U8")], Some("U8"), vec![], Some(sum));
        let module = b.module("arith", vec![add]);

        let backend = record(&module);
        let events = &backend.events;
        assert_eq!(events[0], Event::ModuleEnter("arith".to_string()));
        assert_eq!(
            events[1],
            Event::DeclareIdentifier {
                name: "add".to_string(),
                mangled_name: "_P3addFU8U8_U8".to_string(),
            }
        );
        assert_eq!(events.last(), Some(&Event::ModuleLeave));

        let body = backend.function_events("add");
        let Event::FunctionEnter {
            name,
            return_type,
            arguments,
        } = &body[0]
        else {
            panic!("Expected function_enter, got {:?}", body[0]);
        };
        assert_eq!(name, "_P3addFU8U8_U8");
        assert_eq!(return_type, "U8");
        assert_eq!(arguments.len(), 2);
        let (a_id, b_id) = (arguments[0].1, arguments[1].1);

        let [
            Event::Dereference {
                id: left,
                ty: left_ty,
                address: left_address,
            },
            Event::Dereference {
                id: right,
                address: right_address,
                ..
            },
            Event::Binary {
                id: sum,
                operation: BinaryOperation::PlusUnsigned,
                left: sum_left,
                right: sum_right,
                ty: sum_ty,
            },
            Event::ReturnValue(returned),
            Event::FunctionLeave,
        ] = &body[1..]
        else {
            panic!("Unexpected stream {body:?}");
        };
        assert_eq!(left_ty, "U8");
        assert_eq!((*left_address, *right_address), (a_id, b_id));
        assert_eq!((sum_left, sum_right), (left, right));
        assert_eq!(sum_ty, "U8");
        assert_eq!(returned, sum);
        assert_well_formed(events);
    }

    #[test]
    fn test_condition_places_each_jump_point_once() {
        let mut b = Builder::new("stream.pr");
        let flag = b.identifier_expression("flag");
        let one = b.number(1);
        let then_arm = b.compound(vec![], Some(one));
        let two = b.number(2);
        let else_arm = b.compound(vec![], Some(two));
        let choice = b.condition(flag, then_arm, Some(else_arm));
        let pick = function(&mut b, "pick", &[("flag", "Bool")], Some("U8"), vec![], Some(choice));
        let module = b.module("branches", vec![pick]);

        let backend = record(&module);
        let body = backend.function_events("pick");
        let Some(Event::ConditionalBranch {
            id,
            else_point,
            continuation_point,
            ..
        }) = body
            .iter()
            .find(|event| matches!(event, Event::ConditionalBranch { .. }))
        else {
            panic!("Expected conditional_branch in {body:?}");
        };
        assert_ne!(else_point, continuation_point);
        let placed: Vec<_> = body
            .iter()
            .filter_map(|event| match event {
                Event::JumpPoint(point) => Some(*point),
                _ => None,
            })
            .collect();
        assert_eq!(placed, vec![*else_point, *continuation_point]);
        let clauses = body
            .iter()
            .filter(|event| matches!(event, Event::ClauseResult(result) if !result.is_none()))
            .count();
        assert_eq!(clauses, 2);
        assert_eq!(body[body.len() - 2], Event::ReturnValue(*id));
        assert_well_formed(&backend.events);
    }

    #[test]
    fn test_condition_without_else_shares_its_jump_point() {
        let mut b = Builder::new("stream.pr");
        let flag = b.identifier_expression("flag");
        let then_arm = b.compound(vec![], None);
        let branch = b.condition(flag, then_arm, None);
        let f = function(
            &mut b,
            "f",
            &[("flag", "Bool")],
            None,
            vec![Statement::Expression(branch)],
            None,
        );
        let module = b.module("branches", vec![f]);

        let backend = record(&module);
        let body = backend.function_events("f");
        let placed = body
            .iter()
            .filter(|event| matches!(event, Event::JumpPoint(_)))
            .count();
        assert_eq!(placed, 1);
        assert!(body.contains(&Event::ClauseResult(ExpressionId::NONE)));
        assert_eq!(body[body.len() - 2], Event::ReturnVoid);
        assert_well_formed(&backend.events);
    }

    #[test]
    fn test_discarded_call_has_no_result_id() {
        let mut b = Builder::new("stream.pr");
        let seven = b.number(7);
        let later = function(&mut b, "later", &[], Some("U8"), vec![], Some(seven));
        let call = b.call("later", vec![]);
        let caller = function(&mut b, "caller", &[], None, vec![Statement::Expression(call)], None);
        let module = b.module("calls", vec![later, caller]);

        let backend = record(&module);
        let body = backend.function_events("caller");
        assert_eq!(
            body[1],
            Event::Call {
                id: ExpressionId::NONE,
                name: "_P5laterF_U8".to_string(),
                arguments: vec![],
                return_type: "U8".to_string(),
            }
        );
        assert_eq!(body[2], Event::ReturnVoid);
    }

    #[test]
    fn test_structs_are_declared_before_they_are_defined() {
        let mut b = Builder::new("stream.pr");
        let value = b.simple_type("U32");
        let pointee = b.simple_type("Node");
        let next = b.pointer_type(pointee);
        let node = b.struct_definition("Node", vec![("value", value), ("next", next)]);
        let flag = b.simple_type("Bool");
        let pair = b.struct_definition("Flagged", vec![("flag", flag)]);
        let f = function(&mut b, "f", &[], None, vec![], None);
        let module = b.module(
            "structs",
            vec![Definition::Struct(node), Definition::Struct(pair), f],
        );

        let backend = record(&module);
        assert_eq!(
            backend.events[1..5],
            [
                Event::DeclareStruct("Struct Node".to_string()),
                Event::DeclareStruct("Struct Flagged".to_string()),
                Event::DefineStruct("Struct Node".to_string()),
                Event::DefineStruct("Struct Flagged".to_string()),
            ]
        );
        assert!(matches!(backend.events[5], Event::DeclareIdentifier { .. }));
    }

    #[test]
    fn test_variable_definition_allocates_then_assigns() {
        let mut b = Builder::new("stream.pr");
        let seven = b.number(7);
        let def = define(&mut b, "a", false, Some("U16"), seven);
        let f = function(&mut b, "f", &[], None, vec![def], None);
        let module = b.module("variables", vec![f]);

        let backend = record(&module);
        let body = backend.function_events("f");
        let [
            Event::FunctionEnter { .. },
            Event::LiteralInt { id: literal, value: 7, ty },
            Event::AllocateStackVar {
                id: slot,
                ty: slot_ty,
                name,
            },
            Event::Assign { lvalue, rvalue },
            Event::ReturnVoid,
            Event::FunctionLeave,
        ] = body.as_slice()
        else {
            panic!("Unexpected stream {body:?}");
        };
        assert_eq!(ty, "U16");
        assert_eq!(slot_ty, "U16");
        assert_eq!(name, "a");
        assert_eq!((lvalue, rvalue), (slot, literal));
    }

    #[test]
    fn test_larger_program_stream_is_well_formed() {
        let mut b = Builder::new("stream.pr");

        // fn clamp(x: U16, limit: U8) -> U16 { if x < limit { x } else { limit } }
        let x = b.identifier_expression("x");
        let limit = b.identifier_expression("limit");
        let test = b.binary(x, OperatorKind::Lt, limit);
        let x = b.identifier_expression("x");
        let then_arm = b.compound(vec![], Some(x));
        let limit = b.identifier_expression("limit");
        let else_arm = b.compound(vec![], Some(limit));
        let choice = b.condition(test, then_arm, Some(else_arm));
        let clamp = function(
            &mut b,
            "clamp",
            &[("x", "U16"), ("limit", "U8")],
            Some("U16"),
            vec![],
            Some(choice),
        );

        // fn main() { def mut total: U32 = 0; total = clamp(300, 200); if !(total == 0) { return; } }
        let zero = b.number(0);
        let total = define(&mut b, "total", true, Some("U32"), zero);
        let big = b.number(300);
        let small = b.number(200);
        let call = b.call("clamp", vec![big, small]);
        let target = b.identifier_expression("total");
        let store = b.assign(target, call);
        let read = b.identifier_expression("total");
        let zero = b.number(0);
        let is_zero = b.binary(read, OperatorKind::Eq, zero);
        let nonzero = b.not(is_zero);
        let early = b.return_statement(None);
        let then_arm = b.compound(vec![early], None);
        let branch = b.condition(nonzero, then_arm, None);
        let main = function(
            &mut b,
            "main",
            &[],
            None,
            vec![total, store, Statement::Expression(branch)],
            None,
        );
        let module = b.module("program", vec![clamp, main]);

        let backend = record(&module);
        assert_well_formed(&backend.events);
        let main = backend.function_events("main");
        assert!(main.iter().any(|event| matches!(
            event,
            Event::IntegerCast {
                kind: "expand_unsigned",
                ..
            }
        )));
        assert!(main.iter().any(|event| matches!(event, Event::LogicalNot { .. })));
        assert!(main.iter().any(|event| matches!(event, Event::Call { name, .. } if name == "_P5clampFU16U8_U16")));
    }
}
