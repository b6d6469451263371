//! Synthetic contract images for tests.

use crate::builders::string_m;
use crate::error::{Section, SpecError};
use stellar_xdr::curr::{
    Limits, ScEnvMetaEntry, ScEnvMetaEntryInterfaceVersion, ScMetaEntry, ScMetaV0, ScSpecEntry,
    WriteXdr,
};

const WASM_HEADER: &[u8] = b"\0asm\x01\0\0\0";

/// One piece of a synthetic image, written in the order given
pub enum ImagePart<'a> {
    EnvMeta { protocol: u32, pre_release: u32 },
    Spec(&'a [ScSpecEntry]),
    Meta(&'a [(&'a str, &'a str)]),
    /// Appended verbatim, for cut-short or corrupt records
    Raw(&'a [u8]),
}

/// Wasm header followed by the parts, each section introduced by its marker
pub fn contract_image_from(parts: &[ImagePart<'_>]) -> Result<Vec<u8>, SpecError> {
    let mut image = WASM_HEADER.to_vec();
    for part in parts {
        match part {
            ImagePart::EnvMeta {
                protocol,
                pre_release,
            } => {
                image.extend_from_slice(Section::EnvMeta.marker());
                let env = ScEnvMetaEntry::ScEnvMetaKindInterfaceVersion(
                    ScEnvMetaEntryInterfaceVersion {
                        protocol: *protocol,
                        pre_release: *pre_release,
                    },
                );
                image.extend(env.to_xdr(Limits::none())?);
            }
            ImagePart::Spec(entries) => {
                image.extend_from_slice(Section::Spec.marker());
                for entry in entries.iter() {
                    image.extend(entry.to_xdr(Limits::none())?);
                }
            }
            ImagePart::Meta(pairs) => {
                image.extend_from_slice(Section::Meta.marker());
                for (key, val) in pairs.iter() {
                    let entry = ScMetaEntry::ScMetaV0(ScMetaV0 {
                        key: string_m(key)?,
                        val: string_m(val)?,
                    });
                    image.extend(entry.to_xdr(Limits::none())?);
                }
            }
            ImagePart::Raw(bytes) => image.extend_from_slice(bytes),
        }
    }
    Ok(image)
}

/// Env-meta, spec, then meta when `meta` is non-empty
pub fn contract_image(
    protocol: u32,
    pre_release: u32,
    entries: &[ScSpecEntry],
    meta: &[(&str, &str)],
) -> Result<Vec<u8>, SpecError> {
    let mut parts = vec![
        ImagePart::EnvMeta {
            protocol,
            pre_release,
        },
        ImagePart::Spec(entries),
    ];
    if !meta.is_empty() {
        parts.push(ImagePart::Meta(meta));
    }
    contract_image_from(&parts)
}
