/// Literal typing: integer literals stay untyped until their destination is
/// known and otherwise take the cheapest integer type they fit in.
#[cfg(test)]
mod literal_tests {
    use practical_ast::builder::Builder;
    use practical_ast::nodes::OperatorKind;
    use practical_sema::codegen::BinaryOperation;
    use practical_sema::errors::{CastError, SemaError};
    use practical_sema::typed_tree::TypedExpressionKind;
    use practical_sema::value_range::ValueRange;

    use crate::utils::{analysis_errors, analyze, builtins, define, function, variable};

    #[test]
    fn test_unannotated_literal_is_s32() {
        let mut b = Builder::new("literals.pr");
        let three = b.number(3);
        let def = define(&mut b, "x", false, None, three);
        let f = function(&mut b, "f", &[], None, vec![def], None);
        let module = b.module("literals", vec![f]);

        let typed = analyze(&module).unwrap();
        let builtins = builtins();
        let (x, value) = variable(&typed, "f", "x");
        assert_eq!(x.ty.unqualified(), builtins.types().s32);
        assert!(x.ty.is_reference());
        assert!(!x.ty.is_mutable());
        assert_eq!(x.range, Some(ValueRange::signed(3, 3)));
        assert!(matches!(value.kind, TypedExpressionKind::IntLiteral(3)));
    }

    #[test]
    fn test_large_literals_pick_the_first_type_they_fit() {
        let mut b = Builder::new("literals.pr");
        let big = b.number(3_000_000_000_u64);
        let big = define(&mut b, "big", false, None, big);
        let huge = b.number(u64::MAX);
        let huge = define(&mut b, "huge", false, None, huge);
        let f = function(&mut b, "f", &[], None, vec![big, huge], None);
        let module = b.module("literals", vec![f]);

        let typed = analyze(&module).unwrap();
        let builtins = builtins();
        let types = builtins.types();
        assert_eq!(variable(&typed, "f", "big").0.ty.unqualified(), types.s64);
        assert_eq!(variable(&typed, "f", "huge").0.ty.unqualified(), types.u64);
    }

    #[test]
    fn test_literal_is_typed_as_its_destination() {
        let mut b = Builder::new("literals.pr");
        let value = b.number(200);
        let def = define(&mut b, "x", false, Some("U8"), value);
        let f = function(&mut b, "f", &[], None, vec![def], None);
        let module = b.module("literals", vec![f]);

        let typed = analyze(&module).unwrap();
        let builtins = builtins();
        let (x, value) = variable(&typed, "f", "x");
        assert_eq!(x.ty.unqualified(), builtins.types().u8);
        assert_eq!(x.range, Some(ValueRange::unsigned(200, 200)));
        assert!(
            matches!(value.kind, TypedExpressionKind::IntLiteral(200)),
            "A fitting literal needs no cast, got {:?}",
            value.kind
        );
    }

    #[test]
    fn test_literal_too_large_for_destination_is_range_unsafe() {
        let mut b = Builder::new("literals.pr");
        let value = b.number(300);
        let def = define(&mut b, "x", false, Some("U8"), value);
        let f = function(&mut b, "f", &[], None, vec![def], None);
        let module = b.module("literals", vec![f]);

        let errors = analysis_errors(&module);
        assert_eq!(errors.len(), 1);
        assert!(
            matches!(
                &errors[0],
                SemaError::Cast {
                    source: CastError::RangeUnsafe { range: Some(range), .. },
                    ..
                } if *range == ValueRange::signed(300, 300)
            ),
            "Expected RangeUnsafe, got {:?}",
            errors[0]
        );
    }

    #[test]
    fn test_literal_beyond_u64_is_invalid() {
        let mut b = Builder::new("literals.pr");
        let value = b.number("99999999999999999999");
        let def = define(&mut b, "x", false, None, value);
        let f = function(&mut b, "f", &[], None, vec![def], None);
        let module = b.module("literals", vec![f]);

        let errors = analysis_errors(&module);
        assert!(matches!(
            &errors[0],
            SemaError::InvalidLiteral { value, .. } if value == "99999999999999999999"
        ));
    }

    #[test]
    fn test_sum_of_literals_is_s32() {
        let mut b = Builder::new("literals.pr");
        let three = b.number(3);
        let four = b.number(4);
        let sum = b.binary(three, OperatorKind::Add, four);
        let def = define(&mut b, "x", false, None, sum);
        let f = function(&mut b, "f", &[], None, vec![def], None);
        let module = b.module("literals", vec![f]);

        let typed = analyze(&module).unwrap();
        let builtins = builtins();
        let (x, value) = variable(&typed, "f", "x");
        assert_eq!(x.ty.unqualified(), builtins.types().s32);
        assert_eq!(x.range, Some(ValueRange::signed(7, 7)));
        assert!(matches!(
            value.kind,
            TypedExpressionKind::Binary {
                operation: BinaryOperation::PlusSigned,
                ..
            }
        ));
    }

    #[test]
    fn test_expected_type_steers_operator_choice() {
        // The U16 overload types both literals directly; every other one needs
        // a conversion of its result.
        let mut b = Builder::new("literals.pr");
        let three = b.number(3);
        let four = b.number(4);
        let sum = b.binary(three, OperatorKind::Add, four);
        let def = define(&mut b, "x", false, Some("U16"), sum);
        let f = function(&mut b, "f", &[], None, vec![def], None);
        let module = b.module("literals", vec![f]);

        let typed = analyze(&module).unwrap();
        let builtins = builtins();
        let (_, value) = variable(&typed, "f", "x");
        assert_eq!(value.ty, builtins.types().u16);
        let TypedExpressionKind::Binary {
            operation,
            left,
            right,
        } = &value.kind
        else {
            panic!("Expected binary operator, got {:?}", value.kind);
        };
        assert_eq!(*operation, BinaryOperation::PlusUnsigned);
        assert_eq!(left.ty, builtins.types().u16);
        assert_eq!(right.ty, builtins.types().u16);
    }

    #[test]
    fn test_bool_literal() {
        let mut b = Builder::new("literals.pr");
        let value = b.bool_literal(true);
        let def = define(&mut b, "flag", false, None, value);
        let f = function(&mut b, "f", &[], None, vec![def], None);
        let module = b.module("literals", vec![f]);

        let typed = analyze(&module).unwrap();
        let builtins = builtins();
        let (flag, _) = variable(&typed, "f", "flag");
        assert_eq!(flag.ty.unqualified(), builtins.types().bool);
        assert_eq!(flag.range, Some(ValueRange::unsigned(1, 1)));
    }

    #[test]
    fn test_null_takes_the_pointer_type() {
        let mut b = Builder::new("literals.pr");
        let value = b.null();
        let pointee = b.simple_type("U8");
        let ty = b.pointer_type(pointee);
        let def = b.variable_definition("p", false, Some(ty), value);
        let f = function(&mut b, "f", &[], None, vec![def], None);
        let module = b.module("literals", vec![f]);

        let typed = analyze(&module).unwrap();
        let (p, value) = variable(&typed, "f", "p");
        assert_eq!(p.ty.unqualified().to_string(), "U8@");
        assert!(matches!(value.kind, TypedExpressionKind::NullLiteral));
        assert_eq!(p.range, None);
    }

    #[test]
    fn test_null_without_pointer_destination_is_rejected() {
        let mut b = Builder::new("literals.pr");
        let untyped = b.null();
        let untyped = define(&mut b, "p", false, None, untyped);
        let f = function(&mut b, "f", &[], None, vec![untyped], None);
        let integer = b.null();
        let integer = define(&mut b, "q", false, Some("U32"), integer);
        let g = function(&mut b, "g", &[], None, vec![integer], None);
        let module = b.module("literals", vec![f, g]);

        let errors = analysis_errors(&module);
        assert_eq!(errors.len(), 2);
        assert!(
            errors
                .iter()
                .all(|error| matches!(error, SemaError::UntypedNull { .. }))
        );
    }
}
