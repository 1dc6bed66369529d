use modelspace_parse::{ASTNodeType, Value, parse, parse_formula};

fn binary_op(node: &ASTNodeType) -> (&str, &ASTNodeType, &ASTNodeType) {
    match node {
        ASTNodeType::BinaryOp { op, left, right } => (op, &left.node_type, &right.node_type),
        other => panic!("expected binary op, got {other}"),
    }
}

#[test]
fn multiplication_binds_tighter_than_addition() {
    let ast = parse("=1 + 2 * 3").unwrap();
    let (op, left, right) = binary_op(&ast.node_type);
    assert_eq!(op, "+");
    assert_eq!(left, &ASTNodeType::Literal(Value::Int(1)));
    let (inner, _, _) = binary_op(right);
    assert_eq!(inner, "*");
}

#[test]
fn comparison_is_lowest() {
    let ast = parse("=a & \"x\" = b").unwrap();
    let (op, left, _) = binary_op(&ast.node_type);
    assert_eq!(op, "=");
    assert_eq!(binary_op(left).0, "&");
}

#[test]
fn postfix_chain_attribute_index_call() {
    let ast = parse("=Sub[1].rate(x := 2)").unwrap();
    let ASTNodeType::Call { callee, args } = &ast.node_type else {
        panic!("expected call");
    };
    assert_eq!(args.len(), 1);
    assert_eq!(args[0].name.as_deref(), Some("x"));
    let ASTNodeType::Attribute { target, name } = &callee.node_type else {
        panic!("expected attribute");
    };
    assert_eq!(name, "rate");
    assert!(matches!(target.node_type, ASTNodeType::Index { .. }));
}

#[test]
fn literals_are_typed() {
    assert_eq!(
        parse("=2.5").unwrap().node_type,
        ASTNodeType::Literal(Value::Number(2.5))
    );
    assert_eq!(
        parse("=\"a\"\"b\"").unwrap().node_type,
        ASTNodeType::Literal(Value::Text("a\"b".into()))
    );
    assert_eq!(
        parse("=none").unwrap().node_type,
        ASTNodeType::Literal(Value::Empty)
    );
    assert_eq!(
        parse("=True").unwrap().node_type,
        ASTNodeType::Literal(Value::Bool(true))
    );
}

#[test]
fn text_without_equals_is_constant() {
    assert_eq!(
        parse("hello").unwrap().node_type,
        ASTNodeType::Literal(Value::Text("hello".into()))
    );
}

#[test]
fn lambda_declares_params_with_defaults() {
    let f = parse_formula("=LAMBDA(x, y := -1, z := {1, 2}, x + y)").unwrap();
    let names: Vec<&str> = f.param_names().collect();
    assert_eq!(names, vec!["x", "y", "z"]);
    assert_eq!(f.params[0].default, None);
    assert_eq!(f.params[1].default, Some(Value::Int(-1)));
    assert_eq!(
        f.params[2].default,
        Some(Value::Array(vec![Value::Int(1), Value::Int(2)]))
    );
    assert_eq!(binary_op(&f.body.node_type).0, "+");
}

#[test]
fn plain_formula_has_no_params() {
    let f = parse_formula("=SUM(a, b)").unwrap();
    assert!(f.params.is_empty());
    assert_eq!(f.body.free_names(), vec!["SUM", "a", "b"]);
}

#[test]
fn lambda_errors() {
    assert!(parse_formula("=LAMBDA()").is_err());
    assert!(parse_formula("=LAMBDA(x, x, 1)").is_err());
    assert!(parse_formula("=LAMBDA(x := 1, y, 1)").is_err());
    assert!(parse_formula("=LAMBDA(x := y, 1)").is_err());
    assert!(parse_formula("=LAMBDA(1, 1)").is_err());
}

#[test]
fn syntax_errors_carry_position() {
    let err = parse("=1 +").unwrap_err();
    assert_eq!(err.position, Some(4));
    let err = parse("=foo(1,,2)").unwrap_err();
    assert!(err.message.contains("Empty argument"));
    assert!(parse("=a.1").is_err());
}
