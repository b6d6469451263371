//! Constructors for spec entries.
//!
//! Every constructor fails with `SpecError::Xdr` when a name or list exceeds
//! its XDR limit.

use crate::error::SpecError;
use stellar_xdr::curr::{
    ScSpecEntry, ScSpecFunctionInputV0, ScSpecFunctionV0, ScSpecTypeBytesN, ScSpecTypeDef,
    ScSpecTypeMap, ScSpecTypeOption, ScSpecTypeResult, ScSpecTypeTuple, ScSpecTypeUdt,
    ScSpecTypeVec, ScSpecUdtEnumCaseV0, ScSpecUdtEnumV0, ScSpecUdtErrorEnumCaseV0,
    ScSpecUdtErrorEnumV0, ScSpecUdtStructFieldV0, ScSpecUdtStructV0, ScSpecUdtUnionCaseTupleV0,
    ScSpecUdtUnionCaseV0, ScSpecUdtUnionCaseVoidV0, ScSpecUdtUnionV0, ScSymbol, StringM, VecM,
};

/// Union case shape accepted by [`union_entry`]
pub enum CaseDef<'a> {
    Void(&'a str),
    Tuple(&'a str, Vec<ScSpecTypeDef>),
}

pub fn function(
    name: &str,
    inputs: Vec<(&str, ScSpecTypeDef)>,
    outputs: Vec<ScSpecTypeDef>,
) -> Result<ScSpecEntry, SpecError> {
    let inputs = inputs
        .into_iter()
        .map(|(n, t)| {
            Ok(ScSpecFunctionInputV0 {
                doc: StringM::default(),
                name: string_m(n)?,
                type_: t,
            })
        })
        .collect::<Result<Vec<_>, SpecError>>()?;

    Ok(ScSpecEntry::FunctionV0(ScSpecFunctionV0 {
        doc: StringM::default(),
        name: ScSymbol(string_m(name)?),
        inputs: vec_m(inputs)?,
        outputs: vec_m(outputs)?,
    }))
}

pub fn struct_entry(
    name: &str,
    fields: Vec<(&str, ScSpecTypeDef)>,
) -> Result<ScSpecEntry, SpecError> {
    let fields = fields
        .into_iter()
        .map(|(n, t)| {
            Ok(ScSpecUdtStructFieldV0 {
                doc: StringM::default(),
                name: string_m(n)?,
                type_: t,
            })
        })
        .collect::<Result<Vec<_>, SpecError>>()?;

    Ok(ScSpecEntry::UdtStructV0(ScSpecUdtStructV0 {
        doc: StringM::default(),
        lib: StringM::default(),
        name: string_m(name)?,
        fields: vec_m(fields)?,
    }))
}

pub fn union_entry(name: &str, cases: Vec<CaseDef<'_>>) -> Result<ScSpecEntry, SpecError> {
    let cases = cases
        .into_iter()
        .map(|c| {
            Ok(match c {
                CaseDef::Void(tag) => ScSpecUdtUnionCaseV0::VoidV0(ScSpecUdtUnionCaseVoidV0 {
                    doc: StringM::default(),
                    name: string_m(tag)?,
                }),
                CaseDef::Tuple(tag, types) => {
                    ScSpecUdtUnionCaseV0::TupleV0(ScSpecUdtUnionCaseTupleV0 {
                        doc: StringM::default(),
                        name: string_m(tag)?,
                        type_: vec_m(types)?,
                    })
                }
            })
        })
        .collect::<Result<Vec<_>, SpecError>>()?;

    Ok(ScSpecEntry::UdtUnionV0(ScSpecUdtUnionV0 {
        doc: StringM::default(),
        lib: StringM::default(),
        name: string_m(name)?,
        cases: vec_m(cases)?,
    }))
}

pub fn enum_entry(name: &str, cases: &[(&str, u32)]) -> Result<ScSpecEntry, SpecError> {
    let cases = cases
        .iter()
        .map(|(tag, value)| {
            Ok(ScSpecUdtEnumCaseV0 {
                doc: StringM::default(),
                name: string_m(tag)?,
                value: *value,
            })
        })
        .collect::<Result<Vec<_>, SpecError>>()?;

    Ok(ScSpecEntry::UdtEnumV0(ScSpecUdtEnumV0 {
        doc: StringM::default(),
        lib: StringM::default(),
        name: string_m(name)?,
        cases: vec_m(cases)?,
    }))
}

pub fn error_enum_entry(name: &str, cases: &[(&str, u32)]) -> Result<ScSpecEntry, SpecError> {
    let cases = cases
        .iter()
        .map(|(tag, value)| {
            Ok(ScSpecUdtErrorEnumCaseV0 {
                doc: StringM::default(),
                name: string_m(tag)?,
                value: *value,
            })
        })
        .collect::<Result<Vec<_>, SpecError>>()?;

    Ok(ScSpecEntry::UdtErrorEnumV0(ScSpecUdtErrorEnumV0 {
        doc: StringM::default(),
        lib: StringM::default(),
        name: string_m(name)?,
        cases: vec_m(cases)?,
    }))
}

pub fn udt(name: &str) -> Result<ScSpecTypeDef, SpecError> {
    Ok(ScSpecTypeDef::Udt(ScSpecTypeUdt {
        name: string_m(name)?,
    }))
}

pub fn vec_of(element: ScSpecTypeDef) -> ScSpecTypeDef {
    ScSpecTypeDef::Vec(Box::new(ScSpecTypeVec {
        element_type: Box::new(element),
    }))
}

pub fn option_of(value: ScSpecTypeDef) -> ScSpecTypeDef {
    ScSpecTypeDef::Option(Box::new(ScSpecTypeOption {
        value_type: Box::new(value),
    }))
}

pub fn map_of(key: ScSpecTypeDef, value: ScSpecTypeDef) -> ScSpecTypeDef {
    ScSpecTypeDef::Map(Box::new(ScSpecTypeMap {
        key_type: Box::new(key),
        value_type: Box::new(value),
    }))
}

pub fn tuple_of(types: Vec<ScSpecTypeDef>) -> Result<ScSpecTypeDef, SpecError> {
    Ok(ScSpecTypeDef::Tuple(Box::new(ScSpecTypeTuple {
        value_types: vec_m(types)?,
    })))
}

pub fn result_of(ok: ScSpecTypeDef, error: ScSpecTypeDef) -> ScSpecTypeDef {
    ScSpecTypeDef::Result(Box::new(ScSpecTypeResult {
        ok_type: Box::new(ok),
        error_type: Box::new(error),
    }))
}

pub fn bytes_n(n: u32) -> ScSpecTypeDef {
    ScSpecTypeDef::BytesN(ScSpecTypeBytesN { n })
}

pub(crate) fn string_m<const N: u32>(s: &str) -> Result<StringM<N>, SpecError> {
    Ok(StringM::try_from(s.as_bytes().to_vec())?)
}

fn vec_m<T, const N: u32>(items: Vec<T>) -> Result<VecM<T, N>, SpecError> {
    Ok(VecM::try_from(items)?)
}
