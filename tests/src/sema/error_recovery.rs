/// Tests for error recovery
///
/// An error aborts the declaration it occurs in; the remaining declarations
/// are still analysed and every error is reported together.
#[cfg(test)]
mod error_recovery_tests {
    use practical_ast::builder::Builder;
    use practical_ast::nodes::Definition;
    use practical_sema::compile;
    use practical_sema::errors::{AnalysisFailed, SemaError};
    use practical_sema::options::AnalyzerOptions;

    use crate::utils::{RecordingGen, analysis_errors, analyze, builtins, define, function};

    #[test]
    fn test_errors_from_several_functions_are_collected() {
        let mut b = Builder::new("recovery.pr");
        b.at(2, 5);
        let missing = b.identifier_expression("missing");
        let first = define(&mut b, "a", false, None, missing);
        let f = function(&mut b, "f", &[], None, vec![first], None);

        b.at(6, 9);
        let ty = b.simple_type("Missing");
        let argument = b.argument("x", ty);
        let body = b.compound(vec![], None);
        let g = Definition::Function(b.function("g", vec![argument], None, body));

        b.at(9, 1);
        let fine = function(&mut b, "fine", &[], None, vec![], None);
        let module = b.module("recovery", vec![f, g, fine]);

        let errors = analysis_errors(&module);
        assert_eq!(errors.len(), 2, "got {errors:?}");
        // Signatures are checked before any body.
        assert_eq!(errors[0].location().start_line, 6);
        assert!(matches!(errors[0], SemaError::UnknownType { .. }));
        assert_eq!(errors[1].location().start_line, 2);
        assert!(matches!(errors[1], SemaError::UnknownIdentifier { .. }));
    }

    #[test]
    fn test_first_error_in_a_function_stops_that_function() {
        let mut b = Builder::new("recovery.pr");
        let first = b.identifier_expression("unknown_var1");
        let first = define(&mut b, "x", false, None, first);
        let second = b.identifier_expression("unknown_var2");
        let second = define(&mut b, "y", false, None, second);
        let f = function(&mut b, "f", &[], None, vec![first, second], None);
        let module = b.module("recovery", vec![f]);

        let errors = analysis_errors(&module);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].to_string().contains("unknown_var1"));
    }

    #[test]
    fn test_failure_message_names_every_error() {
        let mut b = Builder::new("recovery.pr");
        let null = b.null();
        let untyped = define(&mut b, "p", false, None, null);
        let f = function(&mut b, "f", &[], None, vec![untyped], None);
        let unknown = b.identifier_expression("ghost");
        let unknown = define(&mut b, "q", false, None, unknown);
        let g = function(&mut b, "g", &[], None, vec![unknown], None);
        let module = b.module("recovery", vec![f, g]);

        let error = analyze(&module).unwrap_err();
        let message = error.to_string();
        assert!(message.starts_with("semantic analysis failed: "), "{message}");
        assert!(message.contains("cannot infer the pointer type of `null`"));
        assert!(message.contains("`ghost`"));
        assert!(error.downcast_ref::<AnalysisFailed>().is_some());
    }

    #[test]
    fn test_nothing_is_emitted_for_a_failing_module() {
        let mut b = Builder::new("recovery.pr");
        let unknown = b.identifier_expression("ghost");
        let unknown = define(&mut b, "q", false, None, unknown);
        let f = function(&mut b, "f", &[], None, vec![unknown], None);
        let module = b.module("recovery", vec![f]);

        let mut backend = RecordingGen::default();
        let result = compile(&builtins(), &module, &AnalyzerOptions::default(), &mut backend);
        assert!(result.is_err());
        assert!(backend.events.is_empty());
    }
}
