//! Immutable view of a contract's published interface.
//!
//! Entries are indexed by name once at construction; user-defined type
//! resolution during conversion is a map lookup.

use crate::error::{ParseError, SpecError};
use base64::Engine;
use std::collections::HashMap;
use stellar_xdr::curr::{
    Limits, ReadXdr, ScSpecEntry, ScSpecFunctionV0, ScSpecTypeDef, ScSpecUdtEnumV0,
    ScSpecUdtErrorEnumV0, ScSpecUdtStructV0, ScSpecUdtUnionV0, WriteXdr,
};

/// Name of the constructor function a contract may declare
pub const CONSTRUCTOR_FN: &str = "__constructor";

#[derive(Debug, Clone, Default)]
pub struct ContractSpec {
    entries: Vec<ScSpecEntry>,
    functions: HashMap<String, usize>,
    udts: HashMap<String, usize>,
}

/// A resolved user-defined type
#[derive(Debug, Clone, Copy)]
pub enum UdtRef<'a> {
    Struct(&'a ScSpecUdtStructV0),
    Union(&'a ScSpecUdtUnionV0),
    Enum(&'a ScSpecUdtEnumV0),
    ErrorEnum(&'a ScSpecUdtErrorEnumV0),
}

impl ContractSpec {
    pub fn new(entries: Vec<ScSpecEntry>) -> Self {
        let mut functions = HashMap::new();
        let mut udts = HashMap::new();

        for (idx, entry) in entries.iter().enumerate() {
            match entry {
                ScSpecEntry::FunctionV0(f) => {
                    functions.insert(f.name.0.to_utf8_string_lossy(), idx);
                }
                ScSpecEntry::UdtStructV0(s) => {
                    udts.insert(s.name.to_utf8_string_lossy(), idx);
                }
                ScSpecEntry::UdtUnionV0(u) => {
                    udts.insert(u.name.to_utf8_string_lossy(), idx);
                }
                ScSpecEntry::UdtEnumV0(e) => {
                    udts.insert(e.name.to_utf8_string_lossy(), idx);
                }
                ScSpecEntry::UdtErrorEnumV0(e) => {
                    udts.insert(e.name.to_utf8_string_lossy(), idx);
                }
                ScSpecEntry::EventV0(_) => {}
            }
        }

        Self {
            entries,
            functions,
            udts,
        }
    }

    /// Load the spec published in a contract image
    pub fn from_wasm(wasm: &[u8]) -> Result<Self, ParseError> {
        Ok(crate::scanner::parse(wasm)?.spec())
    }

    /// Load from base64 XDR entries, as emitted by `soroban contract bindings`
    pub fn from_xdr_base64<S: AsRef<str>>(entries: &[S]) -> Result<Self, SpecError> {
        let engine = base64::engine::general_purpose::STANDARD;
        let mut decoded = Vec::with_capacity(entries.len());
        for entry in entries {
            let bytes = engine
                .decode(entry.as_ref())
                .map_err(|e| SpecError::Xdr(format!("invalid base64 spec entry: {}", e)))?;
            decoded.push(ScSpecEntry::from_xdr(bytes, Limits::none())?);
        }
        Ok(Self::new(decoded))
    }

    /// Base64 XDR form of every entry
    pub fn to_xdr_base64(&self) -> Result<Vec<String>, SpecError> {
        let engine = base64::engine::general_purpose::STANDARD;
        self.entries
            .iter()
            .map(|e| Ok(engine.encode(e.to_xdr(Limits::none())?)))
            .collect()
    }

    pub fn entries(&self) -> &[ScSpecEntry] {
        &self.entries
    }

    pub fn functions(&self) -> impl Iterator<Item = &ScSpecFunctionV0> {
        self.entries.iter().filter_map(|e| match e {
            ScSpecEntry::FunctionV0(f) => Some(f),
            _ => None,
        })
    }

    /// User-defined type entries in declaration order
    pub fn udts(&self) -> impl Iterator<Item = &ScSpecEntry> {
        self.entries.iter().filter(|e| {
            !matches!(e, ScSpecEntry::FunctionV0(_) | ScSpecEntry::EventV0(_))
        })
    }

    pub fn find_function(&self, name: &str) -> Result<&ScSpecFunctionV0, SpecError> {
        match self.functions.get(name).map(|idx| &self.entries[*idx]) {
            Some(ScSpecEntry::FunctionV0(f)) => Ok(f),
            _ => Err(SpecError::FunctionNotFound {
                function: name.to_string(),
            }),
        }
    }

    pub fn has_function(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    /// Resolve a user-defined type by name
    pub fn find_entry(&self, name: &str) -> Result<UdtRef<'_>, SpecError> {
        let entry = self
            .udts
            .get(name)
            .map(|idx| &self.entries[*idx])
            .ok_or_else(|| SpecError::EntryNotFound {
                name: name.to_string(),
            })?;

        match entry {
            ScSpecEntry::UdtStructV0(s) => Ok(UdtRef::Struct(s)),
            ScSpecEntry::UdtUnionV0(u) => Ok(UdtRef::Union(u)),
            ScSpecEntry::UdtEnumV0(e) => Ok(UdtRef::Enum(e)),
            ScSpecEntry::UdtErrorEnumV0(e) => Ok(UdtRef::ErrorEnum(e)),
            _ => Err(SpecError::EntryNotFound {
                name: name.to_string(),
            }),
        }
    }

    /// Declared output of a function, if any
    pub fn output_type(&self, function: &str) -> Result<Option<&ScSpecTypeDef>, SpecError> {
        Ok(self.find_function(function)?.outputs.first())
    }
}

/// Readable name of a type definition, used in error messages
pub fn type_name(ty: &ScSpecTypeDef) -> String {
    match ty {
        ScSpecTypeDef::Val => "val".to_string(),
        ScSpecTypeDef::Bool => "bool".to_string(),
        ScSpecTypeDef::Void => "void".to_string(),
        ScSpecTypeDef::Error => "error".to_string(),
        ScSpecTypeDef::U32 => "u32".to_string(),
        ScSpecTypeDef::I32 => "i32".to_string(),
        ScSpecTypeDef::U64 => "u64".to_string(),
        ScSpecTypeDef::I64 => "i64".to_string(),
        ScSpecTypeDef::Timepoint => "timepoint".to_string(),
        ScSpecTypeDef::Duration => "duration".to_string(),
        ScSpecTypeDef::U128 => "u128".to_string(),
        ScSpecTypeDef::I128 => "i128".to_string(),
        ScSpecTypeDef::U256 => "u256".to_string(),
        ScSpecTypeDef::I256 => "i256".to_string(),
        ScSpecTypeDef::Bytes => "bytes".to_string(),
        ScSpecTypeDef::String => "string".to_string(),
        ScSpecTypeDef::Symbol => "symbol".to_string(),
        ScSpecTypeDef::Address => "address".to_string(),
        ScSpecTypeDef::Option(o) => format!("option<{}>", type_name(&o.value_type)),
        ScSpecTypeDef::Result(r) => format!(
            "result<{}, {}>",
            type_name(&r.ok_type),
            type_name(&r.error_type)
        ),
        ScSpecTypeDef::Vec(v) => format!("vec<{}>", type_name(&v.element_type)),
        ScSpecTypeDef::Map(m) => format!(
            "map<{}, {}>",
            type_name(&m.key_type),
            type_name(&m.value_type)
        ),
        ScSpecTypeDef::Tuple(t) => format!(
            "tuple<{}>",
            t.value_types
                .iter()
                .map(type_name)
                .collect::<Vec<_>>()
                .join(", ")
        ),
        ScSpecTypeDef::BytesN(b) => format!("bytesN<{}>", b.n),
        ScSpecTypeDef::Udt(u) => u.name.to_utf8_string_lossy(),
        other => other.name().to_lowercase(),
    }
}
