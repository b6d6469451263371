/// XDR → native decoding, untyped and spec-directed
use crate::convert::{case_name, is_positional};
use crate::error::SpecError;
use crate::spec::{type_name, ContractSpec, UdtRef};
use crate::strkey::format_sc_address;
use crate::types::{NativeUnion, NativeValue};
use base64::Engine;
use num_bigint::{BigInt, Sign};
use stellar_xdr::curr::{
    Int128Parts, Int256Parts, Limits, ReadXdr, ScError, ScSpecTypeDef, ScSpecUdtStructV0,
    ScSpecUdtUnionCaseV0, ScSpecUdtUnionV0, ScVal, UInt128Parts, UInt256Parts,
};

/// Decode a base64-encoded XDR `ScVal` without type information
pub fn decode_scval(xdr_base64: &str) -> Result<NativeValue, SpecError> {
    let engine = base64::engine::general_purpose::STANDARD;
    let xdr_bytes = engine
        .decode(xdr_base64)
        .map_err(|e| SpecError::Xdr(format!("invalid base64 value: {}", e)))?;

    decode_scval_bytes(&xdr_bytes)
}

/// Decode XDR bytes directly
pub fn decode_scval_bytes(bytes: &[u8]) -> Result<NativeValue, SpecError> {
    let scval = ScVal::from_xdr(bytes, Limits::none())?;
    Ok(decode_scval_native(&scval))
}

/// Untyped decode: every wire value maps to its natural native shape.
/// Values with no native counterpart (errors, instances, ledger keys) are
/// kept as `Wire`.
pub fn decode_scval_native(scval: &ScVal) -> NativeValue {
    match scval {
        ScVal::Bool(b) => NativeValue::Bool(*b),
        ScVal::Void => NativeValue::Null,
        ScVal::U32(n) => NativeValue::Int(*n as i64),
        ScVal::I32(n) => NativeValue::Int(*n as i64),
        ScVal::U64(n) => NativeValue::from(*n),
        ScVal::I64(n) => NativeValue::Int(*n),
        ScVal::Timepoint(t) => NativeValue::from(t.0),
        ScVal::Duration(d) => NativeValue::from(d.0),
        ScVal::U128(parts) => NativeValue::from(u128_from_parts(parts)),
        ScVal::I128(parts) => NativeValue::from(i128_from_parts(parts)),
        ScVal::U256(parts) => normalize(u256_from_parts(parts)),
        ScVal::I256(parts) => normalize(i256_from_parts(parts)),
        ScVal::Bytes(b) => NativeValue::Bytes(b.0.to_vec()),
        ScVal::String(s) => NativeValue::String(s.0.to_utf8_string_lossy()),
        ScVal::Symbol(s) => NativeValue::String(s.0.to_utf8_string_lossy()),
        ScVal::Vec(Some(items)) => {
            NativeValue::Seq(items.0.iter().map(decode_scval_native).collect())
        }
        ScVal::Vec(None) => NativeValue::Seq(Vec::new()),
        ScVal::Map(Some(entries)) => NativeValue::Map(
            entries
                .0
                .iter()
                .map(|e| (decode_scval_native(&e.key), decode_scval_native(&e.val)))
                .collect(),
        ),
        ScVal::Map(None) => NativeValue::Map(Vec::new()),
        ScVal::Address(addr) => NativeValue::String(format_sc_address(addr)),
        other => NativeValue::Wire(other.clone()),
    }
}

impl ContractSpec {
    /// Decode a wire value against its declared type
    pub fn xdr_to_native(&self, val: &ScVal, ty: &ScSpecTypeDef) -> Result<NativeValue, SpecError> {
        match (ty, val) {
            (ScSpecTypeDef::Val, v) => Ok(decode_scval_native(v)),
            (ScSpecTypeDef::Option(_), ScVal::Void) => Ok(NativeValue::Null),
            (ScSpecTypeDef::Option(o), v) => self.xdr_to_native(v, &o.value_type),
            (ScSpecTypeDef::Void, ScVal::Void) => Ok(NativeValue::Null),
            (ScSpecTypeDef::Bool, ScVal::Bool(b)) => Ok(NativeValue::Bool(*b)),
            (ScSpecTypeDef::U32, ScVal::U32(_))
            | (ScSpecTypeDef::I32, ScVal::I32(_))
            | (ScSpecTypeDef::U64, ScVal::U64(_))
            | (ScSpecTypeDef::I64, ScVal::I64(_))
            | (ScSpecTypeDef::Timepoint, ScVal::Timepoint(_))
            | (ScSpecTypeDef::Duration, ScVal::Duration(_))
            | (ScSpecTypeDef::U128, ScVal::U128(_))
            | (ScSpecTypeDef::I128, ScVal::I128(_))
            | (ScSpecTypeDef::U256, ScVal::U256(_))
            | (ScSpecTypeDef::I256, ScVal::I256(_))
            | (ScSpecTypeDef::String, ScVal::String(_))
            | (ScSpecTypeDef::Symbol, ScVal::Symbol(_))
            | (ScSpecTypeDef::Bytes, ScVal::Bytes(_))
            | (ScSpecTypeDef::Address, ScVal::Address(_)) => Ok(decode_scval_native(val)),
            (ScSpecTypeDef::BytesN(b), ScVal::Bytes(bytes)) => {
                if bytes.0.len() != b.n as usize {
                    return Err(SpecError::failed(format!(
                        "expected {} bytes for bytesN<{}>, got {}",
                        b.n,
                        b.n,
                        bytes.0.len()
                    )));
                }
                Ok(NativeValue::Bytes(bytes.0.to_vec()))
            }
            (ScSpecTypeDef::Vec(v), ScVal::Vec(items)) => {
                let items = items.as_ref().map(|i| i.0.as_slice()).unwrap_or_default();
                items
                    .iter()
                    .map(|item| self.xdr_to_native(item, &v.element_type))
                    .collect::<Result<Vec<_>, _>>()
                    .map(NativeValue::Seq)
            }
            (ScSpecTypeDef::Map(m), ScVal::Map(entries)) => {
                let entries = entries.as_ref().map(|e| e.0.as_slice()).unwrap_or_default();
                entries
                    .iter()
                    .map(|e| {
                        Ok((
                            self.xdr_to_native(&e.key, &m.key_type)?,
                            self.xdr_to_native(&e.val, &m.value_type)?,
                        ))
                    })
                    .collect::<Result<Vec<_>, SpecError>>()
                    .map(NativeValue::Map)
            }
            (ScSpecTypeDef::Tuple(t), ScVal::Vec(items)) => {
                let items = items.as_ref().map(|i| i.0.as_slice()).unwrap_or_default();
                if items.len() != t.value_types.len() {
                    return Err(SpecError::failed(format!(
                        "{} expects {} elements, got {}",
                        type_name(ty),
                        t.value_types.len(),
                        items.len()
                    )));
                }
                items
                    .iter()
                    .zip(t.value_types.iter())
                    .map(|(item, item_ty)| self.xdr_to_native(item, item_ty))
                    .collect::<Result<Vec<_>, _>>()
                    .map(NativeValue::Seq)
            }
            (ScSpecTypeDef::Udt(u), v) => self.udt_to_native(v, &u.name.to_utf8_string_lossy()),
            // A contract error code is named by the declared error enum
            (ScSpecTypeDef::Result(r), ScVal::Error(ScError::Contract(code))) => {
                match r.error_type.as_ref() {
                    ScSpecTypeDef::Udt(_) => self.xdr_to_native(&ScVal::U32(*code), &r.error_type),
                    _ => Ok(NativeValue::Wire(val.clone())),
                }
            }
            (ScSpecTypeDef::Result(_), ScVal::Error(_)) => Ok(NativeValue::Wire(val.clone())),
            (ScSpecTypeDef::Result(r), v) => self.xdr_to_native(v, &r.ok_type),
            (ty, v) => Err(SpecError::mismatch(type_name(ty), v.name().to_lowercase())),
        }
    }

    /// Decode the return value of `function`; a function without outputs
    /// yields `Null`
    pub fn func_res_to_native(&self, function: &str, val: &ScVal) -> Result<NativeValue, SpecError> {
        match self.output_type(function)? {
            Some(ty) => self.xdr_to_native(val, ty),
            None => Ok(NativeValue::Null),
        }
    }

    fn udt_to_native(&self, val: &ScVal, name: &str) -> Result<NativeValue, SpecError> {
        match self.find_entry(name)? {
            UdtRef::Struct(s) => self.struct_to_native(val, s),
            UdtRef::Union(u) => self.union_to_native(val, u),
            UdtRef::Enum(e) => {
                enum_to_native(val, name, e.cases.iter().map(|c| (c.name.to_utf8_string_lossy(), c.value)))
            }
            UdtRef::ErrorEnum(e) => {
                enum_to_native(val, name, e.cases.iter().map(|c| (c.name.to_utf8_string_lossy(), c.value)))
            }
        }
    }

    fn struct_to_native(&self, val: &ScVal, s: &ScSpecUdtStructV0) -> Result<NativeValue, SpecError> {
        let struct_name = s.name.to_utf8_string_lossy();

        if is_positional(s) {
            let ScVal::Vec(Some(items)) = val else {
                return Err(SpecError::mismatch(struct_name, val.name().to_lowercase()));
            };
            if items.0.len() != s.fields.len() {
                return Err(SpecError::failed(format!(
                    "struct {} expects {} fields, got {}",
                    struct_name,
                    s.fields.len(),
                    items.0.len()
                )));
            }
            return items
                .0
                .iter()
                .zip(s.fields.iter())
                .enumerate()
                .map(|(i, (item, field))| {
                    Ok((NativeValue::Int(i as i64), self.xdr_to_native(item, &field.type_)?))
                })
                .collect::<Result<Vec<_>, SpecError>>()
                .map(NativeValue::Map);
        }

        let ScVal::Map(Some(entries)) = val else {
            return Err(SpecError::mismatch(struct_name, val.name().to_lowercase()));
        };
        s.fields
            .iter()
            .map(|field| {
                let field_name = field.name.to_utf8_string_lossy();
                let entry = entries
                    .0
                    .iter()
                    .find(|e| matches!(&e.key, ScVal::Symbol(k) if k.0.to_utf8_string_lossy() == field_name))
                    .ok_or_else(|| {
                        SpecError::failed(format!(
                            "missing field `{}` for struct {}",
                            field_name, struct_name
                        ))
                    })?;
                Ok((
                    NativeValue::String(field_name),
                    self.xdr_to_native(&entry.val, &field.type_)?,
                ))
            })
            .collect::<Result<Vec<_>, SpecError>>()
            .map(NativeValue::Map)
    }

    fn union_to_native(&self, val: &ScVal, u: &ScSpecUdtUnionV0) -> Result<NativeValue, SpecError> {
        let union_name = u.name.to_utf8_string_lossy();
        let items = match val {
            ScVal::Vec(Some(items)) if !items.0.is_empty() => items.0.as_slice(),
            other => return Err(SpecError::mismatch(union_name, other.name().to_lowercase())),
        };
        let ScVal::Symbol(tag) = &items[0] else {
            return Err(SpecError::failed(format!(
                "union {} value does not start with a symbol tag",
                union_name
            )));
        };
        let tag = tag.0.to_utf8_string_lossy();

        let case = u
            .cases
            .iter()
            .find(|c| case_name(c) == tag)
            .ok_or_else(|| {
                SpecError::failed(format!("unknown case `{}` for union {}", tag, union_name))
            })?;

        let payload = &items[1..];
        match case {
            ScSpecUdtUnionCaseV0::VoidV0(_) if payload.is_empty() => {
                Ok(NativeValue::Union(NativeUnion::void(tag)))
            }
            ScSpecUdtUnionCaseV0::TupleV0(t) if payload.len() == t.type_.len() => {
                let values = payload
                    .iter()
                    .zip(t.type_.iter())
                    .map(|(item, item_ty)| self.xdr_to_native(item, item_ty))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(NativeValue::Union(NativeUnion::tuple(tag, values)))
            }
            _ => Err(SpecError::failed(format!(
                "case `{}` of union {} has {} values, which does not match its declaration",
                tag,
                union_name,
                payload.len()
            ))),
        }
    }
}

fn enum_to_native(
    val: &ScVal,
    name: &str,
    mut cases: impl Iterator<Item = (String, u32)>,
) -> Result<NativeValue, SpecError> {
    let ScVal::U32(value) = val else {
        return Err(SpecError::mismatch(format!("enum {}", name), val.name().to_lowercase()));
    };
    cases
        .find(|(_, v)| v == value)
        .map(|(tag, _)| NativeValue::String(tag))
        .ok_or_else(|| SpecError::InvalidEnumValue {
            name: name.to_string(),
            value: value.to_string(),
        })
}

fn normalize(n: BigInt) -> NativeValue {
    match i64::try_from(&n) {
        Ok(v) => NativeValue::Int(v),
        Err(_) => NativeValue::BigInt(n),
    }
}

fn u128_from_parts(parts: &UInt128Parts) -> u128 {
    ((parts.hi as u128) << 64) | (parts.lo as u128)
}

fn i128_from_parts(parts: &Int128Parts) -> i128 {
    ((parts.hi as i128) << 64) | (parts.lo as i128)
}

fn limbs_be(hi_hi: u64, hi_lo: u64, lo_hi: u64, lo_lo: u64) -> [u8; 32] {
    let mut buf = [0u8; 32];
    for (i, limb) in [hi_hi, hi_lo, lo_hi, lo_lo].iter().enumerate() {
        buf[i * 8..i * 8 + 8].copy_from_slice(&limb.to_be_bytes());
    }
    buf
}

fn u256_from_parts(parts: &UInt256Parts) -> BigInt {
    let buf = limbs_be(parts.hi_hi, parts.hi_lo, parts.lo_hi, parts.lo_lo);
    BigInt::from_bytes_be(Sign::Plus, &buf)
}

fn i256_from_parts(parts: &Int256Parts) -> BigInt {
    let buf = limbs_be(parts.hi_hi as u64, parts.hi_lo, parts.lo_hi, parts.lo_lo);
    BigInt::from_signed_bytes_be(&buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builders::*;
    use stellar_xdr::curr::WriteXdr;

    #[test]
    fn test_decode_bool() {
        assert_eq!(decode_scval_native(&ScVal::Bool(true)), NativeValue::Bool(true));
    }

    #[test]
    fn test_decode_uint128() {
        let scval = ScVal::U128(UInt128Parts { hi: 0, lo: 1000 });
        assert_eq!(decode_scval_native(&scval), NativeValue::Int(1000));

        let scval = ScVal::U128(UInt128Parts { hi: 1, lo: 0 });
        assert_eq!(
            decode_scval_native(&scval),
            NativeValue::BigInt(BigInt::from(1u128 << 64))
        );
    }

    #[test]
    fn test_decode_negative_i256() {
        let scval = ScVal::I256(Int256Parts {
            hi_hi: -1,
            hi_lo: u64::MAX,
            lo_hi: u64::MAX,
            lo_lo: u64::MAX - 4,
        });
        assert_eq!(decode_scval_native(&scval), NativeValue::Int(-5));
    }

    #[test]
    fn test_decode_base64() {
        let engine = base64::engine::general_purpose::STANDARD;
        let encoded = engine.encode(ScVal::U32(7).to_xdr(Limits::none()).unwrap());
        assert_eq!(decode_scval(&encoded).unwrap(), NativeValue::Int(7));
        assert!(decode_scval("not base64!").is_err());
    }

    #[test]
    fn test_typed_enum_and_mismatch() {
        let spec = ContractSpec::new(vec![
            enum_entry("Color", &[("Red", 0), ("Green", 1)]).unwrap(),
        ]);
        let ty = udt("Color").unwrap();

        assert_eq!(
            spec.xdr_to_native(&ScVal::U32(1), &ty).unwrap(),
            NativeValue::String("Green".to_string())
        );
        assert!(matches!(
            spec.xdr_to_native(&ScVal::U32(9), &ty),
            Err(SpecError::InvalidEnumValue { .. })
        ));
        assert!(matches!(
            spec.xdr_to_native(&ScVal::Bool(true), &ScSpecTypeDef::U32),
            Err(SpecError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_result_output_decodes_ok_and_contract_error() {
        let spec = ContractSpec::new(vec![
            error_enum_entry("Error", &[("Overflow", 1), ("Paused", 2)]).unwrap(),
            function(
                "bump",
                vec![],
                vec![result_of(ScSpecTypeDef::U32, udt("Error").unwrap())],
            )
            .unwrap(),
        ]);

        assert_eq!(
            spec.func_res_to_native("bump", &ScVal::U32(5)).unwrap(),
            NativeValue::Int(5)
        );
        assert_eq!(
            spec.func_res_to_native("bump", &ScVal::Error(ScError::Contract(2))).unwrap(),
            NativeValue::String("Paused".to_string())
        );
        assert!(matches!(
            spec.func_res_to_native("bump", &ScVal::Error(ScError::Contract(9))),
            Err(SpecError::InvalidEnumValue { .. })
        ));
        assert!(matches!(
            spec.func_res_to_native("bump", &ScVal::Bool(true)),
            Err(SpecError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_func_res_without_output() {
        let spec = ContractSpec::new(vec![function("poke", vec![], vec![]).unwrap()]);
        assert_eq!(
            spec.func_res_to_native("poke", &ScVal::Void).unwrap(),
            NativeValue::Null
        );
    }
}
