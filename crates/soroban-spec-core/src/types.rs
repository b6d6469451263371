/// Native application values accepted and produced by the conversion engine
use num_bigint::BigInt;
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};
use stellar_xdr::curr::ScVal;

/// A union value: a case tag plus positional payload. `values: None` is a
/// void case.
#[derive(Debug, Clone, PartialEq)]
pub struct NativeUnion {
    pub tag: String,
    pub values: Option<Vec<NativeValue>>,
}

impl NativeUnion {
    /// Void case
    pub fn void(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            values: None,
        }
    }

    /// Tuple case carrying `values` in declaration order
    pub fn tuple(tag: impl Into<String>, values: Vec<NativeValue>) -> Self {
        Self {
            tag: tag.into(),
            values: Some(values),
        }
    }
}

/// Value on the application side of the engine
#[derive(Debug, Clone, PartialEq)]
pub enum NativeValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    BigInt(BigInt),
    String(String),
    Bytes(Vec<u8>),
    Seq(Vec<NativeValue>),
    /// Ordered mapping; insertion order is kept through conversion
    Map(Vec<(NativeValue, NativeValue)>),
    Union(NativeUnion),
    /// Already-encoded wire value, passed through unchanged
    Wire(ScVal),
}

impl NativeValue {
    /// Short name of the runtime shape, used in mismatch errors
    pub fn kind(&self) -> &'static str {
        match self {
            NativeValue::Null => "null",
            NativeValue::Bool(_) => "bool",
            NativeValue::Int(_) => "int",
            NativeValue::Float(_) => "float",
            NativeValue::BigInt(_) => "bigint",
            NativeValue::String(_) => "string",
            NativeValue::Bytes(_) => "bytes",
            NativeValue::Seq(_) => "sequence",
            NativeValue::Map(_) => "map",
            NativeValue::Union(_) => "union",
            NativeValue::Wire(_) => "wire value",
        }
    }

    /// Build an ordered map from string keys
    pub fn map<K: Into<String>>(entries: impl IntoIterator<Item = (K, NativeValue)>) -> Self {
        NativeValue::Map(
            entries
                .into_iter()
                .map(|(k, v)| (NativeValue::String(k.into()), v))
                .collect(),
        )
    }

    /// Look up a map entry by string key
    pub fn get(&self, key: &str) -> Option<&NativeValue> {
        match self {
            NativeValue::Map(entries) => entries.iter().find_map(|(k, v)| match k {
                NativeValue::String(s) if s == key => Some(v),
                _ => None,
            }),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            NativeValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            NativeValue::Int(n) => Some(*n),
            NativeValue::BigInt(b) => i64::try_from(b).ok(),
            _ => None,
        }
    }
}

impl std::fmt::Display for NativeValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NativeValue::Null => write!(f, "null"),
            NativeValue::Bool(b) => write!(f, "{}", b),
            NativeValue::Int(n) => write!(f, "{}", n),
            NativeValue::Float(x) => write!(f, "{}", x),
            NativeValue::BigInt(n) => write!(f, "{}", n),
            NativeValue::String(s) => write!(f, "\"{}\"", s),
            NativeValue::Bytes(b) => write!(f, "0x{}", hex::encode(b)),
            NativeValue::Seq(v) => write!(f, "[...({} items)]", v.len()),
            NativeValue::Map(m) => write!(f, "{{...({} entries)}}", m.len()),
            NativeValue::Union(u) => match &u.values {
                Some(values) => write!(f, "{}({} values)", u.tag, values.len()),
                None => write!(f, "{}", u.tag),
            },
            NativeValue::Wire(v) => write!(f, "wire({:?})", v),
        }
    }
}

impl From<bool> for NativeValue {
    fn from(b: bool) -> Self {
        NativeValue::Bool(b)
    }
}

macro_rules! native_from_int {
    ($($t:ty),*) => {
        $(
            impl From<$t> for NativeValue {
                fn from(n: $t) -> Self {
                    NativeValue::Int(n as i64)
                }
            }
        )*
    };
}

native_from_int!(i8, i16, i32, i64, u8, u16, u32);

impl From<u64> for NativeValue {
    fn from(n: u64) -> Self {
        match i64::try_from(n) {
            Ok(v) => NativeValue::Int(v),
            Err(_) => NativeValue::BigInt(BigInt::from(n)),
        }
    }
}

impl From<i128> for NativeValue {
    fn from(n: i128) -> Self {
        match i64::try_from(n) {
            Ok(v) => NativeValue::Int(v),
            Err(_) => NativeValue::BigInt(BigInt::from(n)),
        }
    }
}

impl From<u128> for NativeValue {
    fn from(n: u128) -> Self {
        match i64::try_from(n) {
            Ok(v) => NativeValue::Int(v),
            Err(_) => NativeValue::BigInt(BigInt::from(n)),
        }
    }
}

impl From<BigInt> for NativeValue {
    fn from(n: BigInt) -> Self {
        NativeValue::BigInt(n)
    }
}

impl From<f64> for NativeValue {
    fn from(x: f64) -> Self {
        NativeValue::Float(x)
    }
}

impl From<&str> for NativeValue {
    fn from(s: &str) -> Self {
        NativeValue::String(s.to_string())
    }
}

impl From<String> for NativeValue {
    fn from(s: String) -> Self {
        NativeValue::String(s)
    }
}

impl From<Vec<u8>> for NativeValue {
    fn from(b: Vec<u8>) -> Self {
        NativeValue::Bytes(b)
    }
}

impl From<Vec<NativeValue>> for NativeValue {
    fn from(v: Vec<NativeValue>) -> Self {
        NativeValue::Seq(v)
    }
}

impl From<NativeUnion> for NativeValue {
    fn from(u: NativeUnion) -> Self {
        NativeValue::Union(u)
    }
}

impl From<ScVal> for NativeValue {
    fn from(v: ScVal) -> Self {
        NativeValue::Wire(v)
    }
}

impl<T: Into<NativeValue>> From<Option<T>> for NativeValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(NativeValue::Null)
    }
}

/// JSON objects keep their key order (serde_json without `preserve_order`
/// sorts keys, which is also a stable order). Numbers that do not fit `i64`
/// become `BigInt` when integral, `Float` otherwise.
impl From<serde_json::Value> for NativeValue {
    fn from(value: serde_json::Value) -> Self {
        use serde_json::Value;
        match value {
            Value::Null => NativeValue::Null,
            Value::Bool(b) => NativeValue::Bool(b),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    NativeValue::Int(i)
                } else if let Some(u) = n.as_u64() {
                    NativeValue::BigInt(BigInt::from(u))
                } else {
                    NativeValue::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            Value::String(s) => NativeValue::String(s),
            Value::Array(items) => NativeValue::Seq(items.into_iter().map(Into::into).collect()),
            Value::Object(map) => NativeValue::Map(
                map.into_iter()
                    .map(|(k, v)| (NativeValue::String(k), v.into()))
                    .collect(),
            ),
        }
    }
}

/// JSON-friendly rendering: big integers as decimal strings, bytes as hex,
/// unions as `{tag: [values]}` (or the bare tag when void). Maps with
/// non-string keys become a list of `[key, value]` pairs.
impl Serialize for NativeValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            NativeValue::Null => serializer.serialize_unit(),
            NativeValue::Bool(b) => serializer.serialize_bool(*b),
            NativeValue::Int(n) => serializer.serialize_i64(*n),
            NativeValue::Float(x) => serializer.serialize_f64(*x),
            NativeValue::BigInt(n) => serializer.serialize_str(&n.to_string()),
            NativeValue::String(s) => serializer.serialize_str(s),
            NativeValue::Bytes(b) => serializer.serialize_str(&hex::encode(b)),
            NativeValue::Seq(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            NativeValue::Map(entries) => {
                if entries.iter().all(|(k, _)| matches!(k, NativeValue::String(_))) {
                    let mut map = serializer.serialize_map(Some(entries.len()))?;
                    for (k, v) in entries {
                        map.serialize_entry(k, v)?;
                    }
                    map.end()
                } else {
                    let mut seq = serializer.serialize_seq(Some(entries.len()))?;
                    for (k, v) in entries {
                        seq.serialize_element(&(k, v))?;
                    }
                    seq.end()
                }
            }
            NativeValue::Union(u) => match &u.values {
                None => serializer.serialize_str(&u.tag),
                Some(values) => {
                    let mut map = serializer.serialize_map(Some(1))?;
                    map.serialize_entry(&u.tag, values)?;
                    map.end()
                }
            },
            NativeValue::Wire(v) => v.serialize(serializer),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_json_object_and_lookup() {
        let value = NativeValue::from(json!({ "to": "GABC", "amount": 10 }));
        assert_eq!(value.get("amount"), Some(&NativeValue::Int(10)));
        assert_eq!(value.get("to").and_then(|v| v.as_str()), Some("GABC"));
        assert_eq!(value.get("missing"), None);
    }

    #[test]
    fn test_from_large_unsigned() {
        assert_eq!(
            NativeValue::from(u64::MAX),
            NativeValue::BigInt(BigInt::from(u64::MAX))
        );
        assert_eq!(NativeValue::from(7u64), NativeValue::Int(7));
    }

    #[test]
    fn test_serialize_json() {
        let value = NativeValue::map([
            ("owner", NativeValue::from("GABC")),
            ("balance", NativeValue::BigInt(BigInt::from(u128::MAX))),
            ("hash", NativeValue::Bytes(vec![0xab])),
            ("state", NativeValue::Union(NativeUnion::tuple("Active", vec![1.into()]))),
        ]);
        assert_eq!(
            serde_json::to_value(&value).unwrap(),
            json!({
                "owner": "GABC",
                "balance": u128::MAX.to_string(),
                "hash": "ab",
                "state": { "Active": [1] }
            })
        );
    }

    #[test]
    fn test_display() {
        assert_eq!(NativeValue::Bytes(vec![0xde, 0xad]).to_string(), "0xdead");
        assert_eq!(NativeValue::Union(NativeUnion::void("None")).to_string(), "None");
        assert_eq!(NativeValue::from(Option::<i32>::None), NativeValue::Null);
    }
}
