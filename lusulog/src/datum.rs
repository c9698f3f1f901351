// A dynamically typed value, used for rows exported from the store and for chart payloads.
//
// serde_json::Value cannot represent NaN or infinities at all, so the values computed upstream are
// carried in a Datum until they have been through the sanitizer, and only then serialized.

use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};

#[derive(Debug, Clone, PartialEq)]
pub enum Datum {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Float32(f32),
    Text(String),
    List(Vec<Datum>),

    /// Keys are kept in insertion order.
    Map(Vec<(String, Datum)>),
}

impl Datum {
    /// Look up `key` in a Map.  Returns None for other variants and for missing keys.

    pub fn get(&self, key: &str) -> Option<&Datum> {
        if let Datum::Map(fields) = self {
            fields.iter().find(|(k, _)| k == key).map(|(_, v)| v)
        } else {
            None
        }
    }

    /// The text used when comparing a scalar against a set of accepted filter values.  Floats use
    /// the shortest representation that round-trips, so 0.85 compares equal to "0.85".  Null and
    /// containers have no key and never match a filter.

    pub fn filter_key(&self) -> Option<String> {
        match self {
            Datum::Null | Datum::List(_) | Datum::Map(_) => None,
            Datum::Bool(b) => Some(b.to_string()),
            Datum::Int(i) => Some(i.to_string()),
            Datum::Float(f) => Some(f.to_string()),
            Datum::Float32(f) => Some(f.to_string()),
            Datum::Text(s) => Some(s.clone()),
        }
    }

    /// Text for columnar display; Null is the empty string.

    pub fn display_text(&self) -> String {
        match self {
            Datum::List(_) | Datum::Map(_) => serde_json::to_string(self).unwrap_or_default(),
            _ => self.filter_key().unwrap_or_default(),
        }
    }
}

impl From<bool> for Datum {
    fn from(b: bool) -> Datum {
        Datum::Bool(b)
    }
}

impl From<i64> for Datum {
    fn from(i: i64) -> Datum {
        Datum::Int(i)
    }
}

impl From<f64> for Datum {
    fn from(f: f64) -> Datum {
        Datum::Float(f)
    }
}

impl From<f32> for Datum {
    fn from(f: f32) -> Datum {
        Datum::Float32(f)
    }
}

impl From<&str> for Datum {
    fn from(s: &str) -> Datum {
        Datum::Text(s.to_string())
    }
}

impl From<String> for Datum {
    fn from(s: String) -> Datum {
        Datum::Text(s)
    }
}

impl<T> From<Option<T>> for Datum
where
    T: Into<Datum>,
{
    fn from(v: Option<T>) -> Datum {
        v.map_or(Datum::Null, Into::into)
    }
}

impl<T> From<Vec<T>> for Datum
where
    T: Into<Datum>,
{
    fn from(vs: Vec<T>) -> Datum {
        Datum::List(vs.into_iter().map(Into::into).collect())
    }
}

impl Serialize for Datum {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Datum::Null => serializer.serialize_unit(),
            Datum::Bool(b) => serializer.serialize_bool(*b),
            Datum::Int(i) => serializer.serialize_i64(*i),
            Datum::Float(f) => serializer.serialize_f64(*f),
            Datum::Float32(f) => serializer.serialize_f32(*f),
            Datum::Text(s) => serializer.serialize_str(s),
            Datum::List(vs) => {
                let mut seq = serializer.serialize_seq(Some(vs.len()))?;
                for v in vs {
                    seq.serialize_element(v)?;
                }
                seq.end()
            }
            Datum::Map(fields) => {
                let mut map = serializer.serialize_map(Some(fields.len()))?;
                for (k, v) in fields {
                    map.serialize_entry(k, v)?;
                }
                map.end()
            }
        }
    }
}

#[test]
fn test_filter_key() {
    assert!(Datum::Float(0.85).filter_key() == Some("0.85".to_string()));
    assert!(Datum::Float(1.0).filter_key() == Some("1".to_string()));
    assert!(Datum::Int(7).filter_key() == Some("7".to_string()));
    assert!(Datum::from("Annular").filter_key() == Some("Annular".to_string()));
    assert!(Datum::Null.filter_key().is_none());
    assert!(Datum::List(vec![]).filter_key().is_none());
}

#[test]
fn test_serialize_preserves_key_order() {
    let d = Datum::Map(vec![
        ("z".to_string(), Datum::Int(1)),
        ("a".to_string(), Datum::from(vec![Some(0.5), None])),
    ]);
    assert!(serde_json::to_string(&d).unwrap() == r#"{"z":1,"a":[0.5,null]}"#);
    assert!(d.get("a").is_some());
    assert!(d.get("b").is_none());
}
