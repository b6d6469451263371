//! Native value → `ScVal` conversion, directed by the contract spec.

use crate::error::SpecError;
use crate::spec::{type_name, ContractSpec, UdtRef};
use crate::strkey;
use crate::types::{NativeUnion, NativeValue};
use num_bigint::{BigInt, Sign};
use stellar_xdr::curr::{
    Duration, Int128Parts, Int256Parts, ScAddress, ScBytes, ScMap, ScMapEntry, ScSpecTypeDef,
    ScSpecUdtStructV0, ScSpecUdtUnionCaseV0, ScSpecUdtUnionV0, ScString, ScSymbol, ScVal, ScVec,
    StringM, TimePoint, UInt128Parts, UInt256Parts,
};
use tracing::trace;

const SYMBOL_MAX_LEN: usize = 32;

impl ContractSpec {
    /// Encode the named arguments of `function` in declaration order
    pub fn func_args_to_xdr<K: AsRef<str>>(
        &self,
        function: &str,
        args: &[(K, NativeValue)],
    ) -> Result<Vec<ScVal>, SpecError> {
        let func = self.find_function(function)?;
        trace!(function, inputs = func.inputs.len(), "encoding call arguments");

        func.inputs
            .iter()
            .map(|input| {
                let name = input.name.to_utf8_string_lossy();
                let value = args
                    .iter()
                    .find(|(k, _)| k.as_ref() == name)
                    .map(|(_, v)| v)
                    .ok_or_else(|| SpecError::ArgumentNotFound {
                        argument: name.clone(),
                        function: function.to_string(),
                    })?;
                self.native_to_xdr(value, &input.type_)
            })
            .collect()
    }

    /// Same as [`ContractSpec::func_args_to_xdr`] for a JSON object of arguments
    pub fn func_args_from_json(
        &self,
        function: &str,
        args: &serde_json::Value,
    ) -> Result<Vec<ScVal>, SpecError> {
        let pairs: Vec<(String, NativeValue)> = match NativeValue::from(args.clone()) {
            NativeValue::Null => Vec::new(),
            NativeValue::Map(entries) => entries
                .into_iter()
                .filter_map(|(k, v)| match k {
                    NativeValue::String(k) => Some((k, v)),
                    _ => None,
                })
                .collect(),
            other => return Err(SpecError::mismatch("object", other.kind())),
        };
        self.func_args_to_xdr(function, &pairs)
    }

    /// Convert one native value to the wire type declared by `ty`
    pub fn native_to_xdr(&self, value: &NativeValue, ty: &ScSpecTypeDef) -> Result<ScVal, SpecError> {
        if let NativeValue::Wire(v) = value {
            return Ok(v.clone());
        }

        match ty {
            ScSpecTypeDef::Val => self.infer_xdr(value),
            ScSpecTypeDef::Void => match value {
                NativeValue::Null => Ok(ScVal::Void),
                other => Err(SpecError::mismatch("void", other.kind())),
            },
            ScSpecTypeDef::Bool => match value {
                NativeValue::Bool(b) => Ok(ScVal::Bool(*b)),
                other => Err(SpecError::mismatch("bool", other.kind())),
            },
            ScSpecTypeDef::U32 => Ok(ScVal::U32(small_int(value, "u32")?)),
            ScSpecTypeDef::I32 => Ok(ScVal::I32(small_int(value, "i32")?)),
            ScSpecTypeDef::U64 => Ok(ScVal::U64(small_int(value, "u64")?)),
            ScSpecTypeDef::I64 => Ok(ScVal::I64(small_int(value, "i64")?)),
            ScSpecTypeDef::Timepoint => Ok(ScVal::Timepoint(TimePoint(small_int(
                value,
                "timepoint",
            )?))),
            ScSpecTypeDef::Duration => Ok(ScVal::Duration(Duration(small_int(
                value, "duration",
            )?))),
            ScSpecTypeDef::U128 => {
                let n = integer_value(value, "u128", false)?;
                let v = u128::try_from(&n).map_err(|_| SpecError::out_of_range(&n, "u128"))?;
                Ok(ScVal::U128(UInt128Parts {
                    hi: (v >> 64) as u64,
                    lo: v as u64,
                }))
            }
            ScSpecTypeDef::I128 => {
                let n = integer_value(value, "i128", false)?;
                let v = i128::try_from(&n).map_err(|_| SpecError::out_of_range(&n, "i128"))?;
                Ok(ScVal::I128(Int128Parts {
                    hi: (v >> 64) as i64,
                    lo: v as u64,
                }))
            }
            ScSpecTypeDef::U256 => {
                let n = integer_value(value, "u256", false)?;
                Ok(ScVal::U256(u256_parts(&n)?))
            }
            ScSpecTypeDef::I256 => {
                let n = integer_value(value, "i256", false)?;
                Ok(ScVal::I256(i256_parts(&n)?))
            }
            ScSpecTypeDef::Bytes => {
                let bytes = bytes_value(value, "bytes")?;
                Ok(ScVal::Bytes(sc_bytes(bytes)?))
            }
            ScSpecTypeDef::BytesN(b) => {
                let bytes = bytes_value(value, "bytesN")?;
                if bytes.len() != b.n as usize {
                    return Err(SpecError::failed(format!(
                        "expected {} bytes for bytesN<{}>, got {}",
                        b.n,
                        b.n,
                        bytes.len()
                    )));
                }
                Ok(ScVal::Bytes(sc_bytes(bytes)?))
            }
            ScSpecTypeDef::String => match value {
                NativeValue::String(s) => Ok(ScVal::String(sc_string(s)?)),
                other => Err(SpecError::mismatch("string", other.kind())),
            },
            ScSpecTypeDef::Symbol => match value {
                NativeValue::String(s) => Ok(ScVal::Symbol(symbol(s)?)),
                other => Err(SpecError::mismatch("symbol", other.kind())),
            },
            ScSpecTypeDef::Address => match value {
                NativeValue::String(s) => match strkey::parse_sc_address(s) {
                    // Muxed accounts have their own spec type and the host refuses them here
                    Ok(ScAddress::MuxedAccount(_)) => Err(SpecError::failed(format!(
                        "muxed address `{}` is not accepted for address",
                        s
                    ))),
                    Ok(address) => Ok(ScVal::Address(address)),
                    Err(e) => Err(SpecError::failed(format!("invalid address `{}`: {}", s, e))),
                },
                other => Err(SpecError::mismatch("address", other.kind())),
            },
            ScSpecTypeDef::Option(o) => match value {
                NativeValue::Null => Ok(ScVal::Void),
                inner => self.native_to_xdr(inner, &o.value_type),
            },
            ScSpecTypeDef::Result(_) => Err(SpecError::failed(format!(
                "{} is not supported",
                type_name(ty)
            ))),
            ScSpecTypeDef::Vec(v) => match value {
                NativeValue::Seq(items) => {
                    let converted = items
                        .iter()
                        .map(|item| self.native_to_xdr(item, &v.element_type))
                        .collect::<Result<Vec<_>, _>>()?;
                    sc_vec(converted)
                }
                other => Err(SpecError::mismatch(type_name(ty), other.kind())),
            },
            ScSpecTypeDef::Map(m) => match value {
                NativeValue::Map(entries) => {
                    let converted = entries
                        .iter()
                        .map(|(k, v)| {
                            Ok(ScMapEntry {
                                key: self.native_to_xdr(k, &m.key_type)?,
                                val: self.native_to_xdr(v, &m.value_type)?,
                            })
                        })
                        .collect::<Result<Vec<_>, SpecError>>()?;
                    sc_map(converted)
                }
                other => Err(SpecError::mismatch(type_name(ty), other.kind())),
            },
            ScSpecTypeDef::Tuple(t) => match value {
                NativeValue::Seq(items) => {
                    if items.len() != t.value_types.len() {
                        return Err(SpecError::failed(format!(
                            "{} expects {} elements, got {}",
                            type_name(ty),
                            t.value_types.len(),
                            items.len()
                        )));
                    }
                    let converted = items
                        .iter()
                        .zip(t.value_types.iter())
                        .map(|(item, item_ty)| self.native_to_xdr(item, item_ty))
                        .collect::<Result<Vec<_>, _>>()?;
                    sc_vec(converted)
                }
                other => Err(SpecError::mismatch(type_name(ty), other.kind())),
            },
            ScSpecTypeDef::Udt(u) => self.udt_to_xdr(value, &u.name.to_utf8_string_lossy()),
            other => Err(SpecError::failed(format!(
                "{} is not supported",
                type_name(other)
            ))),
        }
    }

    fn udt_to_xdr(&self, value: &NativeValue, name: &str) -> Result<ScVal, SpecError> {
        match self.find_entry(name)? {
            UdtRef::Struct(s) => self.struct_to_xdr(value, s),
            UdtRef::Union(u) => self.union_to_xdr(value, u),
            UdtRef::Enum(e) => enum_to_xdr(
                value,
                name,
                e.cases.iter().map(|c| (c.name.to_utf8_string_lossy(), c.value)),
            ),
            UdtRef::ErrorEnum(e) => enum_to_xdr(
                value,
                name,
                e.cases.iter().map(|c| (c.name.to_utf8_string_lossy(), c.value)),
            ),
        }
    }

    fn struct_to_xdr(&self, value: &NativeValue, s: &ScSpecUdtStructV0) -> Result<ScVal, SpecError> {
        let struct_name = s.name.to_utf8_string_lossy();

        if is_positional(s) {
            let items = match value {
                NativeValue::Seq(items) => {
                    if items.len() != s.fields.len() {
                        return Err(SpecError::failed(format!(
                            "struct {} expects {} fields, got {}",
                            struct_name,
                            s.fields.len(),
                            items.len()
                        )));
                    }
                    items
                        .iter()
                        .zip(s.fields.iter())
                        .map(|(item, field)| self.native_to_xdr(item, &field.type_))
                        .collect::<Result<Vec<_>, _>>()?
                }
                NativeValue::Map(entries) => s
                    .fields
                    .iter()
                    .map(|field| {
                        let field_name = field.name.to_utf8_string_lossy();
                        let item = entries
                            .iter()
                            .find(|(k, _)| is_index_key(k, &field_name))
                            .map(|(_, v)| v)
                            .ok_or_else(|| missing_field(&field_name, &struct_name))?;
                        self.native_to_xdr(item, &field.type_)
                    })
                    .collect::<Result<Vec<_>, _>>()?,
                other => return Err(SpecError::mismatch(struct_name, other.kind())),
            };
            return sc_vec(items);
        }

        if !matches!(value, NativeValue::Map(_)) {
            return Err(SpecError::mismatch(struct_name, value.kind()));
        }

        let entries = s
            .fields
            .iter()
            .map(|field| {
                let field_name = field.name.to_utf8_string_lossy();
                let item = value
                    .get(&field_name)
                    .ok_or_else(|| missing_field(&field_name, &struct_name))?;
                Ok(ScMapEntry {
                    key: ScVal::Symbol(symbol(&field_name)?),
                    val: self.native_to_xdr(item, &field.type_)?,
                })
            })
            .collect::<Result<Vec<_>, SpecError>>()?;
        sc_map(entries)
    }

    fn union_to_xdr(&self, value: &NativeValue, u: &ScSpecUdtUnionV0) -> Result<ScVal, SpecError> {
        let union_name = u.name.to_utf8_string_lossy();
        let NativeValue::Union(NativeUnion { tag, values }) = value else {
            return Err(SpecError::mismatch(union_name, value.kind()));
        };

        let case = u
            .cases
            .iter()
            .find(|c| case_name(c) == *tag)
            .ok_or_else(|| {
                SpecError::failed(format!("unknown case `{}` for union {}", tag, union_name))
            })?;

        let mut items = vec![ScVal::Symbol(symbol(tag)?)];
        match case {
            ScSpecUdtUnionCaseV0::VoidV0(_) => {
                if values.as_ref().is_some_and(|v| !v.is_empty()) {
                    return Err(SpecError::failed(format!(
                        "case `{}` of union {} takes no values",
                        tag, union_name
                    )));
                }
            }
            ScSpecUdtUnionCaseV0::TupleV0(t) => {
                let values = values.as_ref().ok_or_else(|| {
                    SpecError::failed(format!(
                        "case `{}` of union {} requires {} values",
                        tag,
                        union_name,
                        t.type_.len()
                    ))
                })?;
                if values.len() != t.type_.len() {
                    return Err(SpecError::failed(format!(
                        "case `{}` of union {} requires {} values, got {}",
                        tag,
                        union_name,
                        t.type_.len(),
                        values.len()
                    )));
                }
                for (item, item_ty) in values.iter().zip(t.type_.iter()) {
                    items.push(self.native_to_xdr(item, item_ty)?);
                }
            }
        }
        sc_vec(items)
    }

    /// Wire type from the runtime shape of an untyped value
    fn infer_xdr(&self, value: &NativeValue) -> Result<ScVal, SpecError> {
        match value {
            NativeValue::Wire(v) => Ok(v.clone()),
            NativeValue::Null => Ok(ScVal::Void),
            NativeValue::Bool(b) => Ok(ScVal::Bool(*b)),
            NativeValue::Int(n) => Ok(if (0..=u32::MAX as i64).contains(n) {
                ScVal::U32(*n as u32)
            } else if *n < 0 && *n >= i32::MIN as i64 {
                ScVal::I32(*n as i32)
            } else {
                ScVal::I64(*n)
            }),
            NativeValue::BigInt(n) => {
                if i128::try_from(n).is_ok() {
                    self.native_to_xdr(value, &ScSpecTypeDef::I128)
                } else if n.sign() != Sign::Minus {
                    Ok(ScVal::U256(u256_parts(n)?))
                } else {
                    Ok(ScVal::I256(i256_parts(n)?))
                }
            }
            NativeValue::String(s) => Ok(ScVal::String(sc_string(s)?)),
            NativeValue::Bytes(b) => Ok(ScVal::Bytes(sc_bytes(b.clone())?)),
            NativeValue::Seq(items) => {
                let converted = items
                    .iter()
                    .map(|item| self.infer_xdr(item))
                    .collect::<Result<Vec<_>, _>>()?;
                sc_vec(converted)
            }
            NativeValue::Map(entries) => {
                let converted = entries
                    .iter()
                    .map(|(k, v)| {
                        Ok(ScMapEntry {
                            key: self.infer_xdr(k)?,
                            val: self.infer_xdr(v)?,
                        })
                    })
                    .collect::<Result<Vec<_>, SpecError>>()?;
                sc_map(converted)
            }
            NativeValue::Float(_) | NativeValue::Union(_) => Err(SpecError::failed(format!(
                "cannot infer a wire type for a {} value",
                value.kind()
            ))),
        }
    }
}

fn enum_to_xdr(
    value: &NativeValue,
    name: &str,
    cases: impl Iterator<Item = (String, u32)>,
) -> Result<ScVal, SpecError> {
    let mut cases = cases;
    let found = match value {
        NativeValue::String(tag) => cases.find(|(n, _)| n == tag).map(|(_, v)| v),
        NativeValue::Int(n) => cases.find(|(_, v)| i64::from(*v) == *n).map(|(_, v)| v),
        NativeValue::BigInt(n) => cases
            .find(|(_, v)| BigInt::from(*v) == *n)
            .map(|(_, v)| v),
        other => return Err(SpecError::mismatch(format!("enum {}", name), other.kind())),
    };

    found.map(ScVal::U32).ok_or_else(|| SpecError::InvalidEnumValue {
        name: name.to_string(),
        value: match value {
            NativeValue::String(s) => s.clone(),
            other => other.to_string(),
        },
    })
}

/// Structs whose fields are named "0", "1", ... encode as a vector
pub(crate) fn is_positional(s: &ScSpecUdtStructV0) -> bool {
    !s.fields.is_empty()
        && s.fields.iter().all(|f| {
            let name = f.name.to_utf8_string_lossy();
            !name.is_empty() && name.bytes().all(|b| b.is_ascii_digit())
        })
}

pub(crate) fn case_name(case: &ScSpecUdtUnionCaseV0) -> String {
    match case {
        ScSpecUdtUnionCaseV0::VoidV0(v) => v.name.to_utf8_string_lossy(),
        ScSpecUdtUnionCaseV0::TupleV0(t) => t.name.to_utf8_string_lossy(),
    }
}

fn is_index_key(key: &NativeValue, field_name: &str) -> bool {
    match key {
        NativeValue::Int(n) => n.to_string() == field_name,
        NativeValue::String(s) => s == field_name,
        _ => false,
    }
}

fn missing_field(field: &str, struct_name: &str) -> SpecError {
    SpecError::failed(format!("missing field `{}` for struct {}", field, struct_name))
}

fn integer_value(value: &NativeValue, type_name: &str, allow_float: bool) -> Result<BigInt, SpecError> {
    match value {
        NativeValue::Int(n) => Ok(BigInt::from(*n)),
        NativeValue::BigInt(n) => Ok(n.clone()),
        NativeValue::Float(x) if allow_float => {
            if !x.is_finite() {
                return Err(SpecError::failed(format!("{} is not a valid {}", x, type_name)));
            }
            Ok(BigInt::from(x.trunc() as i128))
        }
        NativeValue::String(s) => s.trim().parse::<BigInt>().map_err(|_| {
            SpecError::failed(format!("`{}` is not a valid {}", s, type_name))
        }),
        other => Err(SpecError::mismatch(type_name, other.kind())),
    }
}

fn small_int<T>(value: &NativeValue, type_name: &str) -> Result<T, SpecError>
where
    T: for<'a> TryFrom<&'a BigInt>,
{
    let n = integer_value(value, type_name, true)?;
    T::try_from(&n).map_err(|_| SpecError::out_of_range(&n, type_name))
}

fn u256_parts(n: &BigInt) -> Result<UInt256Parts, SpecError> {
    if n.sign() == Sign::Minus {
        return Err(SpecError::out_of_range(n, "u256"));
    }
    let (_, magnitude) = n.to_bytes_be();
    if magnitude.len() > 32 {
        return Err(SpecError::out_of_range(n, "u256"));
    }
    let mut buf = [0u8; 32];
    buf[32 - magnitude.len()..].copy_from_slice(&magnitude);
    Ok(UInt256Parts {
        hi_hi: limb(&buf, 0),
        hi_lo: limb(&buf, 1),
        lo_hi: limb(&buf, 2),
        lo_lo: limb(&buf, 3),
    })
}

fn i256_parts(n: &BigInt) -> Result<Int256Parts, SpecError> {
    let bytes = n.to_signed_bytes_be();
    if bytes.len() > 32 {
        return Err(SpecError::out_of_range(n, "i256"));
    }
    let fill = if n.sign() == Sign::Minus { 0xff } else { 0x00 };
    let mut buf = [fill; 32];
    buf[32 - bytes.len()..].copy_from_slice(&bytes);
    Ok(Int256Parts {
        hi_hi: limb(&buf, 0) as i64,
        hi_lo: limb(&buf, 1),
        lo_hi: limb(&buf, 2),
        lo_lo: limb(&buf, 3),
    })
}

fn limb(buf: &[u8; 32], index: usize) -> u64 {
    let mut word = [0u8; 8];
    word.copy_from_slice(&buf[index * 8..index * 8 + 8]);
    u64::from_be_bytes(word)
}

fn bytes_value(value: &NativeValue, type_name: &str) -> Result<Vec<u8>, SpecError> {
    match value {
        NativeValue::Bytes(b) => Ok(b.clone()),
        NativeValue::String(s) => {
            let digits = s.strip_prefix("0x").unwrap_or(s);
            hex::decode(digits).map_err(|e| {
                SpecError::failed(format!("invalid hex string for {}: {}", type_name, e))
            })
        }
        other => Err(SpecError::mismatch(type_name, other.kind())),
    }
}

pub(crate) fn symbol(s: &str) -> Result<ScSymbol, SpecError> {
    if s.len() > SYMBOL_MAX_LEN || !s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(SpecError::failed(format!("`{}` is not a valid symbol", s)));
    }
    StringM::try_from(s.as_bytes().to_vec())
        .map(ScSymbol)
        .map_err(|e| SpecError::failed(format!("invalid symbol `{}`: {}", s, e)))
}

fn sc_string(s: &str) -> Result<ScString, SpecError> {
    StringM::try_from(s.as_bytes().to_vec())
        .map(ScString)
        .map_err(|e| SpecError::failed(format!("invalid string: {}", e)))
}

fn sc_bytes(bytes: Vec<u8>) -> Result<ScBytes, SpecError> {
    bytes
        .try_into()
        .map(ScBytes)
        .map_err(|e| SpecError::failed(format!("invalid bytes: {}", e)))
}

fn sc_vec(items: Vec<ScVal>) -> Result<ScVal, SpecError> {
    items
        .try_into()
        .map(|v| ScVal::Vec(Some(ScVec(v))))
        .map_err(|e| SpecError::failed(format!("vector too long: {}", e)))
}

fn sc_map(entries: Vec<ScMapEntry>) -> Result<ScVal, SpecError> {
    entries
        .try_into()
        .map(|m| ScVal::Map(Some(ScMap(m))))
        .map_err(|e| SpecError::failed(format!("map too large: {}", e)))
}
