// Last line of defense before serialization: a strict JSON encoder has no representation for NaN
// or the infinities, and those values can come out of upstream arithmetic legitimately.

use crate::Datum;

/// Replace every non-finite float in `value`, at any depth, with Null.  Everything else, including
/// the order of map keys, is left unchanged.  This never fails.

pub fn sanitize(value: Datum) -> Datum {
    match value {
        Datum::Float(f) if !f.is_finite() => Datum::Null,
        Datum::Float32(f) if !f.is_finite() => Datum::Null,
        Datum::List(vs) => Datum::List(vs.into_iter().map(sanitize).collect()),
        Datum::Map(fields) => Datum::Map(
            fields
                .into_iter()
                .map(|(k, v)| (k, sanitize(v)))
                .collect(),
        ),
        other => other,
    }
}

#[test]
fn test_sanitize_scalars() {
    assert!(sanitize(Datum::Float(f64::NAN)) == Datum::Null);
    assert!(sanitize(Datum::Float(f64::INFINITY)) == Datum::Null);
    assert!(sanitize(Datum::Float(f64::NEG_INFINITY)) == Datum::Null);
    assert!(sanitize(Datum::Float(3.5)) == Datum::Float(3.5));
    assert!(sanitize(Datum::Float32(f32::NAN)) == Datum::Null);
    assert!(sanitize(Datum::Float32(f32::NEG_INFINITY)) == Datum::Null);
    assert!(sanitize(Datum::Float32(1.25)) == Datum::Float32(1.25));
    assert!(sanitize(Datum::Int(3)) == Datum::Int(3));
    assert!(sanitize(Datum::Bool(true)) == Datum::Bool(true));
    assert!(sanitize(Datum::Null) == Datum::Null);
}

#[test]
fn test_sanitize_containers() {
    let list = Datum::List(vec![Datum::Int(1), Datum::Float(f64::NAN), Datum::from("x")]);
    assert!(sanitize(list) == Datum::List(vec![Datum::Int(1), Datum::Null, Datum::from("x")]));

    let map = Datum::Map(vec![("a".to_string(), Datum::Float(f64::INFINITY))]);
    assert!(sanitize(map) == Datum::Map(vec![("a".to_string(), Datum::Null)]));

    let nested = Datum::Map(vec![
        ("b".to_string(), Datum::List(vec![Datum::List(vec![Datum::Float(f64::NAN)])])),
        ("a".to_string(), Datum::Float(2.0)),
    ]);
    let clean = sanitize(nested);
    assert!(
        clean
            == Datum::Map(vec![
                ("b".to_string(), Datum::List(vec![Datum::List(vec![Datum::Null])])),
                ("a".to_string(), Datum::Float(2.0)),
            ])
    );
    assert!(serde_json::to_string(&clean).unwrap() == r#"{"b":[[null]],"a":2.0}"#);
}
