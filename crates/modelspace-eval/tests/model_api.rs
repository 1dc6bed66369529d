use modelspace_eval::{
    ErrorKind, Formula, FormulaRegistry, MemberKind, Model, ModelConfig, SpaceOptions, Value,
    new_model,
};

fn expr(text: &str) -> Formula {
    Formula::expr(text).unwrap()
}

fn cells_of(model: &mut Model, dotted: &str) -> modelspace_eval::CellsId {
    match model.get_object(dotted).unwrap() {
        Value::Cells(c) => c,
        other => panic!("{dotted} is {other:?}"),
    }
}

/// A base projection, a product specializing it and per-policy children.
fn projection_model() -> Model {
    #[cfg(feature = "tracing")]
    modelspace_eval::telemetry::init_tracing();

    let mut model = new_model("Life", ModelConfig::default());
    let base = model
        .new_space(None, SpaceOptions::named("Base"))
        .unwrap();
    model.set_name(base, "rate", 0.1).unwrap();
    model
        .new_cells(
            base,
            Some("balance"),
            expr("=LAMBDA(t, IF(t = 0, premium, balance(t - 1) * (1 + rate)))"),
        )
        .unwrap();
    model.new_cells(base, Some("premium"), expr("=100")).unwrap();

    let product = model
        .new_space(
            None,
            SpaceOptions::named("Product")
                .with_base(base)
                .with_formula(expr("=LAMBDA(policy, NONE)")),
        )
        .unwrap();
    model
        .new_cells(product, Some("premium"), expr("=policy * 50"))
        .unwrap();
    model
}

#[test]
fn projection_through_inheritance_and_parameters() {
    let mut model = projection_model();
    let product = model.top_space("Product").unwrap();
    let base = model.top_space("Base").unwrap();

    let base_balance = cells_of(&mut model, "Base.balance");
    let got = model.call(base_balance, &[Value::Int(2)]).unwrap();
    assert_eq!(got, Value::Number(100.0 * 1.1 * 1.1));

    let policy = model.get_child(product, &[Value::Int(4)], &[]).unwrap();
    assert_eq!(model.mro(policy).unwrap(), vec![policy, product, base]);
    let balance = match model.get(policy, "balance").unwrap() {
        Value::Cells(c) => c,
        other => panic!("unexpected {other:?}"),
    };
    assert_eq!(
        model.call(balance, &[Value::Int(1)]).unwrap(),
        Value::Number(200.0 * 1.1)
    );

    // A new rate on the base reaches every derived result
    model.set_name(base, "rate", 0.0).unwrap();
    assert_eq!(
        model.call(balance, &[Value::Int(1)]).unwrap(),
        Value::Number(200.0)
    );
    assert_eq!(
        model.call(base_balance, &[Value::Int(2)]).unwrap(),
        Value::Number(100.0)
    );
}

#[test]
fn member_views_separate_own_and_derived() {
    let mut model = projection_model();
    let product = model.top_space("Product").unwrap();

    let own: Vec<String> = model
        .own_members(product, MemberKind::Cells)
        .unwrap()
        .into_keys()
        .collect();
    let derived: Vec<String> = model
        .derived_members(product, MemberKind::Cells)
        .unwrap()
        .into_keys()
        .collect();
    assert_eq!(own, vec!["premium"]);
    assert_eq!(derived, vec!["balance"]);

    let ns = model.namespace(product).unwrap();
    assert!(ns.contains_key("rate"));
    assert!(ns.contains_key("balance"));
    assert!(!ns.contains_key("policy"));
}

#[test]
fn saved_projection_restores() {
    let mut model = projection_model();
    let balance = cells_of(&mut model, "Base.balance");
    model.call(balance, &[Value::Int(3)]).unwrap();

    let blob = model.save().unwrap();
    let mut loaded = Model::load(&blob, &FormulaRegistry::new()).unwrap();
    assert_eq!(loaded.cells_items(balance).unwrap().len(), 4);

    let base = loaded.top_space("Base").unwrap();
    loaded.set_name(base, "rate", 0.5).unwrap();
    assert!(loaded.cells_items(balance).unwrap().is_empty());
    assert_eq!(
        loaded.call(balance, &[Value::Int(1)]).unwrap(),
        Value::Number(150.0)
    );
}

#[test]
fn errors_reach_the_caller() {
    let mut model = projection_model();
    let base = model.top_space("Base").unwrap();

    let err = model
        .new_space(None, SpaceOptions::named("Base"))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Name);
    assert_eq!(err.kind().to_string(), "NameError");

    model.del_name(base, "rate").unwrap();
    let balance = cells_of(&mut model, "Base.balance");
    let err = model.call(balance, &[Value::Int(1)]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Lookup);
    assert!(err.to_string().contains("rate"));
}
