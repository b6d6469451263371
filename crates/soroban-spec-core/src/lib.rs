//! soroban-spec-core: Contract interface model and value conversion
//!
//! Scans the interface a Soroban contract publishes in its image and converts
//! between native values and `ScVal` under the direction of that interface.

pub mod builders;
pub mod convert;
pub mod decode;
pub mod error;
pub mod scanner;
pub mod spec;
pub mod strkey;
#[cfg(any(test, feature = "testutils"))]
#[doc(hidden)]
pub mod testutils;
pub mod types;

pub use decode::{decode_scval, decode_scval_bytes, decode_scval_native};
pub use error::{ParseError, Section, SpecError, StrkeyError};
pub use scanner::{parse, ContractInfo};
pub use spec::{type_name, ContractSpec, UdtRef, CONSTRUCTOR_FN};
pub use types::{NativeUnion, NativeValue};

/// Re-exported so callers can name wire types without a direct dependency
pub use stellar_xdr;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_spec_has_no_functions() {
        let spec = ContractSpec::default();
        assert_eq!(spec.functions().count(), 0);
        assert!(!spec.has_function(CONSTRUCTOR_FN));
    }
}
