use super::common::{cells, cells_at, expr, space_at, top_space};
use crate::engine::{MemberKind, Model, SpaceOptions, SpaceOrigin};
use modelspace_common::{ErrorKind, Value};

#[test]
fn test_override_suppresses_inheritance() {
    let mut m = Model::new("M");
    let p = top_space(&mut m, "P");
    let px = cells(&mut m, p, "x", "=1");
    let c = m
        .new_space(None, SpaceOptions::named("C").with_base(p))
        .unwrap();

    // Derived copy of P.x
    let derived = cells_at(&mut m, c, "x");
    assert_ne!(derived, px);
    assert!(m.is_derived_cells(derived).unwrap());
    assert_eq!(m.call(derived, &[]).unwrap(), Value::Int(1));

    // Own cells takes over and ignores later changes to P.x
    let own = cells(&mut m, c, "x", "=2");
    assert_eq!(cells_at(&mut m, c, "x"), own);
    m.set_formula(px, expr("=10")).unwrap();
    assert_eq!(m.call(own, &[]).unwrap(), Value::Int(2));
    assert!(m.derived_members(c, MemberKind::Cells).unwrap().is_empty());

    // Removing it lets P.x through again
    m.remove_cells(own).unwrap();
    let again = cells_at(&mut m, c, "x");
    assert!(m.is_derived_cells(again).unwrap());
    assert_eq!(m.call(again, &[]).unwrap(), Value::Int(10));
}

#[test]
fn test_derived_cells_kept_while_formula_unchanged() {
    let mut m = Model::new("M");
    let p = top_space(&mut m, "P");
    let px = cells(&mut m, p, "x", "=1");
    let c = m
        .new_space(None, SpaceOptions::named("C").with_base(p))
        .unwrap();
    let first = cells_at(&mut m, c, "x");

    // An unrelated change re-derives but keeps the copy
    m.set_name(p, "unrelated", 5).unwrap();
    assert_eq!(cells_at(&mut m, c, "x"), first);

    // A new formula replaces it
    m.set_formula(px, expr("=2")).unwrap();
    let second = cells_at(&mut m, c, "x");
    assert_ne!(second, first);
    assert!(!m.contains_cells(first));
    assert_eq!(m.call(second, &[]).unwrap(), Value::Int(2));
}

#[test]
fn test_inherited_formula_resolves_in_derived_space() {
    let mut m = Model::new("M");
    let p = top_space(&mut m, "P");
    m.set_name(p, "rate", 2).unwrap();
    cells(&mut m, p, "scaled", "=LAMBDA(x, x * rate)");
    let c = m
        .new_space(None, SpaceOptions::named("C").with_base(p))
        .unwrap();
    m.set_name(c, "rate", 3).unwrap();

    let in_p = cells_at(&mut m, p, "scaled");
    let in_c = cells_at(&mut m, c, "scaled");
    assert_eq!(m.call(in_p, &[Value::Int(10)]).unwrap(), Value::Int(20));
    assert_eq!(m.call(in_c, &[Value::Int(10)]).unwrap(), Value::Int(30));
}

#[test]
fn test_first_base_wins() {
    let mut m = Model::new("M");
    let b1 = top_space(&mut m, "B1");
    let b2 = top_space(&mut m, "B2");
    cells(&mut m, b1, "x", "=1");
    cells(&mut m, b2, "x", "=2");
    cells(&mut m, b2, "y", "=20");
    let c = m
        .new_space(None, SpaceOptions::named("C").with_bases([b1, b2]))
        .unwrap();

    let x = cells_at(&mut m, c, "x");
    let y = cells_at(&mut m, c, "y");
    assert_eq!(m.call(x, &[]).unwrap(), Value::Int(1));
    assert_eq!(m.call(y, &[]).unwrap(), Value::Int(20));
}

#[test]
fn test_diamond_override_in_middle_base() {
    // D(B, C), B(A), C(A); C overrides A.x
    let mut m = Model::new("M");
    let a = top_space(&mut m, "A");
    cells(&mut m, a, "x", "=1");
    let b = m
        .new_space(None, SpaceOptions::named("B").with_base(a))
        .unwrap();
    let c = m
        .new_space(None, SpaceOptions::named("C").with_base(a))
        .unwrap();
    cells(&mut m, c, "x", "=3");
    let d = m
        .new_space(None, SpaceOptions::named("D").with_bases([b, c]))
        .unwrap();

    let x = cells_at(&mut m, d, "x");
    assert_eq!(m.call(x, &[]).unwrap(), Value::Int(3));
}

#[test]
fn test_own_and_derived_names_stay_disjoint() {
    let mut m = Model::new("M");
    let p = top_space(&mut m, "P");
    m.set_name(p, "x", 1).unwrap();
    cells(&mut m, p, "y", "=2");
    let c = m
        .new_space(None, SpaceOptions::named("C").with_base(p))
        .unwrap();
    assert!(m.derived_members(c, MemberKind::Refs).unwrap().contains_key("x"));

    // An own cells named like an inherited ref hides it entirely
    let own = cells(&mut m, c, "x", "=5");
    assert!(m.derived_members(c, MemberKind::Refs).unwrap().is_empty());
    assert_eq!(m.get(c, "x").unwrap(), Value::Cells(own));
    assert!(m.derived_members(c, MemberKind::Cells).unwrap().contains_key("y"));
}

#[test]
fn test_derived_spaces_follow_their_base() {
    let mut m = Model::new("M");
    let a = top_space(&mut m, "A");
    let b = m.new_space(Some(a), SpaceOptions::named("B")).unwrap();
    m.set_name(b, "x", 3).unwrap();
    let c = m
        .new_space(None, SpaceOptions::named("C").with_base(a))
        .unwrap();

    let cb = space_at(&mut m, c, "B");
    assert_ne!(cb, b);
    assert_eq!(m.origin(cb).unwrap(), SpaceOrigin::Derived);
    assert_eq!(m.parent(cb).unwrap(), Some(c));
    assert_eq!(m.fullname(cb), "M.C.B");
    assert_eq!(m.get(cb, "x").unwrap(), Value::Int(3));

    m.set_name(b, "x", 4).unwrap();
    assert_eq!(m.get(cb, "x").unwrap(), Value::Int(4));
}

#[test]
fn test_remove_derived_is_permanent_until_rederived() {
    let mut m = Model::new("M");
    let p = top_space(&mut m, "P");
    cells(&mut m, p, "x", "=1");
    let c = m
        .new_space(None, SpaceOptions::named("C").with_base(p))
        .unwrap();
    let derived = cells_at(&mut m, c, "x");

    assert!(m.remove_derived(c, "x").unwrap());
    assert!(!m.contains_cells(derived));
    assert_eq!(m.get(c, "x").unwrap_err().kind(), ErrorKind::Lookup);
    assert!(!m.remove_derived(c, "x").unwrap());
    assert_eq!(
        m.revert_derived(c, "x").unwrap_err().kind(),
        ErrorKind::Unsupported
    );

    // A change in the base re-derives the member
    cells(&mut m, p, "y", "=2");
    assert!(m.get(c, "x").is_ok());
}

#[test]
fn test_del_name_dispatches_by_member() {
    let mut m = Model::new("M");
    let p = top_space(&mut m, "P");
    cells(&mut m, p, "f", "=1");
    m.set_name(p, "r", 1).unwrap();
    m.new_space(Some(p), SpaceOptions::named("Child")).unwrap();
    let c = m
        .new_space(None, SpaceOptions::named("C").with_base(p))
        .unwrap();

    // Derived ref
    m.del_name(c, "r").unwrap();
    assert!(m.get(c, "r").is_err());
    // Own members
    m.del_name(p, "f").unwrap();
    m.del_name(p, "Child").unwrap();
    m.del_name(p, "r").unwrap();
    assert!(m.own_members(p, MemberKind::Cells).unwrap().is_empty());
    assert!(m.own_members(p, MemberKind::Spaces).unwrap().is_empty());
    assert_eq!(m.del_name(p, "nothing").unwrap_err().kind(), ErrorKind::Lookup);
}

#[test]
fn test_set_formula_on_derived_cells_is_rejected() {
    let mut m = Model::new("M");
    let p = top_space(&mut m, "P");
    cells(&mut m, p, "x", "=1");
    let c = m
        .new_space(None, SpaceOptions::named("C").with_base(p))
        .unwrap();
    let derived = cells_at(&mut m, c, "x");
    let err = m.set_formula(derived, expr("=2")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unsupported);
}
