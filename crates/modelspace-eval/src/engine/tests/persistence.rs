use super::common::{cells, cells_at, expr, top_space};
use crate::engine::{Model, SpaceOptions};
use crate::formula::{Formula, FormulaRegistry, FormulaSource, Signature};
use modelspace_common::{ErrorKind, ModelError, Value};

fn offset() -> Formula {
    Formula::native("offset", Signature::positional(&["x"]), |ctx, args| {
        match (&args[0], ctx.lookup("shift")?) {
            (Value::Int(x), Value::Int(s)) => Ok(Value::Int(x + s)),
            _ => Err(ModelError::type_error("ints only")),
        }
    })
}

#[test]
fn test_roundtrip_keeps_values_and_structure() {
    let mut m = Model::new("M");
    let p = top_space(&mut m, "P");
    m.set_name(p, "rate", 2).unwrap();
    let fib = cells(
        &mut m,
        p,
        "fib",
        "=LAMBDA(n, IF(n < 2, n, fib(n - 1) + fib(n - 2)))",
    );
    let input = cells(&mut m, p, "input", "=LAMBDA(k, NONE)");
    m.set_value(input, &[Value::Int(1)], "given").unwrap();
    let c = m
        .new_space(None, SpaceOptions::named("C").with_base(p))
        .unwrap();
    m.call(fib, &[Value::Int(10)]).unwrap();

    let blob = m.save().unwrap();
    let mut loaded = Model::load(&blob, &FormulaRegistry::new()).unwrap();

    assert_eq!(loaded.name(), "M");
    assert_eq!(loaded.top_spaces(), m.top_spaces());
    assert_eq!(loaded.mro(c).unwrap(), vec![c, p]);
    assert_eq!(loaded.cells_items(fib).unwrap().len(), 11);
    assert_eq!(
        loaded.call(input, &[Value::Int(1)]).unwrap(),
        Value::Text("given".into())
    );
    assert_eq!(
        loaded.cells_formula(fib).unwrap(),
        FormulaSource::Expr("=LAMBDA(n, IF(n < 2, n, fib(n - 1) + fib(n - 2)))".into())
    );

    // Evaluation picks up where the saved model stopped
    assert_eq!(loaded.call(fib, &[Value::Int(15)]).unwrap(), Value::Int(610));
    let derived = cells_at(&mut loaded, c, "fib");
    assert_eq!(loaded.call(derived, &[Value::Int(12)]).unwrap(), Value::Int(144));
}

#[test]
fn test_invalidation_survives_roundtrip() {
    let mut m = Model::new("M");
    let s = top_space(&mut m, "S");
    let base = cells(&mut m, s, "base", "=2");
    let dbl = cells(&mut m, s, "dbl", "=LAMBDA(x, x * base())");
    m.set_name(s, "k", 1).unwrap();
    let plus = cells(&mut m, s, "plus", "=k + 1");
    m.call(dbl, &[Value::Int(4)]).unwrap();
    m.call(plus, &[]).unwrap();

    let mut loaded = Model::load(&m.save().unwrap(), &FormulaRegistry::new()).unwrap();
    assert_eq!(loaded.cells_items(dbl).unwrap().len(), 1);

    loaded.set_value(base, &[], 10).unwrap();
    assert!(loaded.cells_items(dbl).unwrap().is_empty());
    assert_eq!(loaded.call(dbl, &[Value::Int(4)]).unwrap(), Value::Int(40));

    loaded.set_name(s, "k", 5).unwrap();
    assert!(loaded.cells_items(plus).unwrap().is_empty());
    assert_eq!(loaded.call(plus, &[]).unwrap(), Value::Int(6));
}

#[test]
fn test_dynamic_spaces_are_saved() {
    let mut m = Model::new("M");
    let s = m
        .new_space(
            None,
            SpaceOptions::named("S").with_formula(expr("=LAMBDA(i, NONE)")),
        )
        .unwrap();
    cells(&mut m, s, "v", "=i * 3");
    let child = m.get_child(s, &[Value::Int(2)], &[]).unwrap();

    let mut loaded = Model::load(&m.save().unwrap(), &FormulaRegistry::new()).unwrap();
    assert_eq!(loaded.get_child(s, &[Value::Int(2)], &[]).unwrap(), child);
    let v = cells_at(&mut loaded, child, "v");
    assert_eq!(loaded.call(v, &[]).unwrap(), Value::Int(6));
    assert_ne!(loaded.get_child(s, &[Value::Int(3)], &[]).unwrap(), child);
}

#[test]
fn test_native_formulas_come_from_registry() {
    let mut m = Model::new("M");
    let s = top_space(&mut m, "S");
    m.set_name(s, "shift", 100).unwrap();
    let f = m.new_cells(s, Some("f"), offset()).unwrap();
    assert_eq!(m.call(f, &[Value::Int(1)]).unwrap(), Value::Int(101));
    let blob = m.save().unwrap();

    let err = Model::load(&blob, &FormulaRegistry::new()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Restore);

    let mut registry = FormulaRegistry::new();
    registry.register(&offset());
    assert_eq!(registry.len(), 1);
    let mut loaded = Model::load(&blob, &registry).unwrap();
    assert_eq!(
        loaded.cells_formula(f).unwrap(),
        FormulaSource::Native("offset".into())
    );
    assert_eq!(loaded.call(f, &[Value::Int(2)]).unwrap(), Value::Int(102));
}

#[test]
fn test_garbage_blob_is_rejected() {
    let err = Model::load(b"not a model", &FormulaRegistry::new()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Serialization);
}
