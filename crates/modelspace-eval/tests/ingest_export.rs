use modelspace_eval::{
    ErrorKind, ExportRow, Formula, IngestRecord, Model, SpaceOptions, Value, arg_key,
};

fn regional_model() -> (Model, modelspace_eval::SpaceId) {
    let mut model = Model::new("Sales");
    let region = model
        .new_space(
            None,
            SpaceOptions::named("Region").with_formula(Formula::expr("=LAMBDA(r, NONE)").unwrap()),
        )
        .unwrap();
    model
        .new_cells(
            region,
            Some("doubled"),
            Formula::expr("=LAMBDA(year, amount(year) * 2)").unwrap(),
        )
        .unwrap();
    (model, region)
}

#[test]
fn ingest_creates_missing_cells_in_children() {
    let (mut model, region) = regional_model();
    let records = vec![
        IngestRecord::new("amount", vec![Value::Int(2024)], 10).in_child(vec!["north".into()]),
        IngestRecord::new("amount", vec![Value::Int(2025)], 12).in_child(vec!["north".into()]),
        IngestRecord::new("amount", vec![Value::Int(2024)], 7).in_child(vec!["south".into()]),
    ];
    assert_eq!(model.ingest(region, &records, &["year"]).unwrap(), 3);

    let north = model.get_child(region, &["north".into()], &[]).unwrap();
    let south = model.get_child(region, &["south".into()], &[]).unwrap();
    let doubled = match model.get(north, "doubled").unwrap() {
        Value::Cells(c) => c,
        other => panic!("unexpected {other:?}"),
    };
    assert_eq!(model.call(doubled, &[Value::Int(2025)]).unwrap(), Value::Int(24));

    let rows = model.export(north).unwrap();
    assert_eq!(
        rows,
        vec![
            ExportRow {
                cells: "amount".into(),
                args: arg_key([Value::Int(2024)]),
                value: Value::Int(10),
            },
            ExportRow {
                cells: "amount".into(),
                args: arg_key([Value::Int(2025)]),
                value: Value::Int(12),
            },
            ExportRow {
                cells: "doubled".into(),
                args: arg_key([Value::Int(2025)]),
                value: Value::Int(24),
            },
        ]
    );

    // Siblings are independent
    assert_eq!(model.export(south).unwrap().len(), 1);
    assert!(model.export(region).unwrap().is_empty());
}

#[test]
fn ingest_overwrites_and_invalidates() {
    let (mut model, region) = regional_model();
    let first = [IngestRecord::new("amount", vec![Value::Int(1)], 5).in_child(vec!["east".into()])];
    model.ingest(region, &first, &["year"]).unwrap();

    let east = model.get_child(region, &["east".into()], &[]).unwrap();
    let doubled = match model.get(east, "doubled").unwrap() {
        Value::Cells(c) => c,
        other => panic!("unexpected {other:?}"),
    };
    assert_eq!(model.call(doubled, &[Value::Int(1)]).unwrap(), Value::Int(10));

    let second = [IngestRecord::new("amount", vec![Value::Int(1)], 6).in_child(vec!["east".into()])];
    model.ingest(region, &second, &["year"]).unwrap();
    assert_eq!(model.call(doubled, &[Value::Int(1)]).unwrap(), Value::Int(12));
}

#[test]
fn ingest_rejects_non_cells_targets() {
    let mut model = Model::new("M");
    let s = model.new_space(None, SpaceOptions::named("S")).unwrap();
    model.set_name(s, "rate", 0.5).unwrap();

    let err = model
        .ingest(s, &[IngestRecord::new("rate", vec![], 1)], &[])
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Name);

    let stored = model
        .ingest(s, &[IngestRecord::new("scalar", vec![], "x")], &[])
        .unwrap();
    assert_eq!(stored, 1);
    assert_eq!(
        model.get_object("S.scalar").map(|v| v.as_cells().is_some()),
        Ok(true)
    );
}
