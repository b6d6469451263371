//! Contract image scanner.
//!
//! A deployed contract carries its interface in three custom sections, each
//! introduced by a literal marker. A section runs from just after its marker
//! to the nearest other marker at a higher offset, or to the end of the image.
//! Records are read with an explicit cursor; the first record that fails to
//! decode ends the section and the records read so far are kept.

use crate::error::{ParseError, Section};
use crate::spec::ContractSpec;
use std::io::Cursor;
use std::ops::Range;
use stellar_xdr::curr::{
    Limited, Limits, ReadXdr, ScEnvMetaEntry, ScMetaEntry, ScSpecEntry, ScSpecEventV0,
    ScSpecFunctionV0, ScSpecUdtEnumV0, ScSpecUdtErrorEnumV0, ScSpecUdtStructV0, ScSpecUdtUnionV0,
};
use tracing::debug;

const SEP_META_KEY: &str = "sep";

/// Everything a contract image publishes about itself
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ContractInfo {
    /// Protocol in the high 32 bits, pre-release in the low 32 bits
    pub interface_version: u64,
    pub spec_entries: Vec<ScSpecEntry>,
    /// Key/value metadata in first-seen key order
    pub meta_entries: Vec<(String, String)>,
    pub funcs: Vec<ScSpecFunctionV0>,
    pub udt_structs: Vec<ScSpecUdtStructV0>,
    pub udt_unions: Vec<ScSpecUdtUnionV0>,
    pub udt_enums: Vec<ScSpecUdtEnumV0>,
    pub udt_error_enums: Vec<ScSpecUdtErrorEnumV0>,
    pub events: Vec<ScSpecEventV0>,
    /// Stellar Ecosystem Proposals the contract declares, deduplicated
    pub supported_seps: Vec<String>,
}

impl ContractInfo {
    /// Build the spec model from the scanned entries
    pub fn spec(&self) -> ContractSpec {
        ContractSpec::new(self.spec_entries.clone())
    }

    pub fn protocol_version(&self) -> u32 {
        (self.interface_version >> 32) as u32
    }

    pub fn pre_release_version(&self) -> u32 {
        self.interface_version as u32
    }

    pub fn meta(&self, key: &str) -> Option<&str> {
        self.meta_entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Scan a contract image for its interface version, spec and metadata
pub fn parse(contract_image: &[u8]) -> Result<ContractInfo, ParseError> {
    let env_range = section_range(contract_image, Section::EnvMeta)
        .ok_or(ParseError::SectionMissing(Section::EnvMeta))?;
    let interface_version = read_interface_version(&contract_image[env_range])?;

    let spec_range = section_range(contract_image, Section::Spec)
        .ok_or(ParseError::SectionMissing(Section::Spec))?;
    let spec_entries: Vec<ScSpecEntry> = read_records(&contract_image[spec_range], Section::Spec)
        .into_iter()
        .filter(|entry| {
            let supported = spec_entry_supported(entry);
            if !supported {
                debug!(kind = entry.name(), "skipping spec entry with non-utf8 name");
            }
            supported
        })
        .collect();

    let mut meta_entries: Vec<(String, String)> = Vec::new();
    if let Some(meta_range) = section_range(contract_image, Section::Meta) {
        for entry in read_records::<ScMetaEntry>(&contract_image[meta_range], Section::Meta) {
            let ScMetaEntry::ScMetaV0(m) = entry;
            let Ok(key) = m.key.to_utf8_string() else {
                debug!("skipping meta entry with non-utf8 key");
                continue;
            };
            let val = m.val.to_utf8_string_lossy();
            match meta_entries.iter_mut().find(|(k, _)| *k == key) {
                Some(existing) => existing.1 = val,
                None => meta_entries.push((key, val)),
            }
        }
    }

    let mut info = ContractInfo {
        interface_version,
        meta_entries,
        ..Default::default()
    };

    for entry in &spec_entries {
        match entry {
            ScSpecEntry::FunctionV0(f) => info.funcs.push(f.clone()),
            ScSpecEntry::UdtStructV0(s) => info.udt_structs.push(s.clone()),
            ScSpecEntry::UdtUnionV0(u) => info.udt_unions.push(u.clone()),
            ScSpecEntry::UdtEnumV0(e) => info.udt_enums.push(e.clone()),
            ScSpecEntry::UdtErrorEnumV0(e) => info.udt_error_enums.push(e.clone()),
            ScSpecEntry::EventV0(e) => info.events.push(e.clone()),
        }
    }
    info.spec_entries = spec_entries;
    info.supported_seps = supported_seps(info.meta(SEP_META_KEY));

    debug!(
        interface_version = info.interface_version,
        entries = info.spec_entries.len(),
        meta = info.meta_entries.len(),
        "scanned contract image"
    );
    Ok(info)
}

fn locate(image: &[u8], marker: &[u8]) -> Option<usize> {
    image.windows(marker.len()).position(|w| w == marker)
}

fn section_range(image: &[u8], section: Section) -> Option<Range<usize>> {
    let start = locate(image, section.marker())? + section.marker().len();
    let end = [Section::EnvMeta, Section::Spec, Section::Meta]
        .into_iter()
        .filter(|other| *other != section)
        .filter_map(|other| locate(image, other.marker()))
        .filter(|pos| *pos >= start)
        .min()
        .unwrap_or(image.len());
    Some(start..end)
}

fn read_interface_version(bytes: &[u8]) -> Result<u64, ParseError> {
    let mut reader = Limited::new(Cursor::new(bytes), Limits::none());
    let entry = ScEnvMetaEntry::read_xdr(&mut reader).map_err(|e| ParseError::Decode {
        section: Section::EnvMeta,
        reason: e.to_string(),
    })?;

    #[allow(unreachable_patterns)]
    match entry {
        ScEnvMetaEntry::ScEnvMetaKindInterfaceVersion(v) => {
            Ok(((v.protocol as u64) << 32) | v.pre_release as u64)
        }
        other => Err(ParseError::Decode {
            section: Section::EnvMeta,
            reason: format!("unexpected entry {}", other.name()),
        }),
    }
}

/// Read records until the range is exhausted or one fails to decode
fn read_records<T: ReadXdr>(bytes: &[u8], section: Section) -> Vec<T> {
    let mut reader = Limited::new(Cursor::new(bytes), Limits::none());
    let mut records = Vec::new();

    while (reader.inner.position() as usize) < bytes.len() {
        let offset = reader.inner.position();
        match T::read_xdr(&mut reader) {
            Ok(record) => records.push(record),
            Err(e) => {
                debug!(%section, offset, error = %e, "stopped reading section");
                break;
            }
        }
    }
    records
}

/// Entries are indexed by name, so a name that is not UTF-8 cannot be held
fn spec_entry_supported(entry: &ScSpecEntry) -> bool {
    match entry {
        ScSpecEntry::FunctionV0(f) => f.name.0.to_utf8_string().is_ok(),
        ScSpecEntry::UdtStructV0(s) => s.name.to_utf8_string().is_ok(),
        ScSpecEntry::UdtUnionV0(u) => u.name.to_utf8_string().is_ok(),
        ScSpecEntry::UdtEnumV0(e) => e.name.to_utf8_string().is_ok(),
        ScSpecEntry::UdtErrorEnumV0(e) => e.name.to_utf8_string().is_ok(),
        ScSpecEntry::EventV0(e) => e.name.0.to_utf8_string().is_ok(),
    }
}

fn supported_seps(value: Option<&str>) -> Vec<String> {
    let mut seps: Vec<String> = Vec::new();
    for token in value.unwrap_or_default().split(',') {
        let token = token.trim();
        if !token.is_empty() && !seps.iter().any(|s| s == token) {
            seps.push(token.to_string());
        }
    }
    seps
}
