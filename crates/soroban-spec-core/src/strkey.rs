//! Stellar key encoding (StrKey format).
//!
//! Base32 payload of a version byte, the raw key and a CRC16-XModem checksum.

use crate::error::StrkeyError;
use stellar_xdr::curr::{
    AccountId, ContractId, Hash, MuxedEd25519Account, PublicKey, ScAddress, Uint256,
};

const VERSION_ACCOUNT_ID: u8 = 6 << 3; // 'G'
const VERSION_SEED: u8 = 18 << 3; // 'S'
const VERSION_CONTRACT: u8 = 2 << 3; // 'C'
const VERSION_MUXED_ACCOUNT: u8 = 12 << 3; // 'M'

/// Encode an account ID (G...).
pub fn encode_account_id(key: &[u8; 32]) -> String {
    encode_check(VERSION_ACCOUNT_ID, key)
}

/// Decode an account ID (G...).
pub fn decode_account_id(s: &str) -> Result<[u8; 32], StrkeyError> {
    decode_fixed(VERSION_ACCOUNT_ID, s)
}

/// Encode a secret seed (S...).
pub fn encode_secret_seed(seed: &[u8; 32]) -> String {
    encode_check(VERSION_SEED, seed)
}

/// Decode a secret seed (S...).
pub fn decode_secret_seed(s: &str) -> Result<[u8; 32], StrkeyError> {
    decode_fixed(VERSION_SEED, s)
}

/// Encode a contract ID (C...).
pub fn encode_contract(hash: &[u8; 32]) -> String {
    encode_check(VERSION_CONTRACT, hash)
}

/// Decode a contract ID (C...).
pub fn decode_contract(s: &str) -> Result<[u8; 32], StrkeyError> {
    decode_fixed(VERSION_CONTRACT, s)
}

/// Encode a muxed account (M...).
pub fn encode_muxed_account(key: &[u8; 32], id: u64) -> String {
    let mut data = key.to_vec();
    data.extend_from_slice(&id.to_be_bytes());
    encode_check(VERSION_MUXED_ACCOUNT, &data)
}

/// Decode a muxed account (M...).
pub fn decode_muxed_account(s: &str) -> Result<([u8; 32], u64), StrkeyError> {
    let data = decode_check(VERSION_MUXED_ACCOUNT, s)?;
    if data.len() != 40 {
        return Err(StrkeyError::Invalid(format!(
            "muxed account data length {} != 40",
            data.len()
        )));
    }
    let mut key = [0u8; 32];
    key.copy_from_slice(&data[..32]);
    let mut id = [0u8; 8];
    id.copy_from_slice(&data[32..40]);
    Ok((key, u64::from_be_bytes(id)))
}

/// Parse an account (G...), contract (C...) or muxed (M...) address
pub fn parse_sc_address(s: &str) -> Result<ScAddress, StrkeyError> {
    match s.chars().next() {
        Some('G') => {
            let key = decode_account_id(s)?;
            Ok(ScAddress::Account(AccountId(PublicKey::PublicKeyTypeEd25519(
                Uint256(key),
            ))))
        }
        Some('C') => {
            let hash = decode_contract(s)?;
            Ok(ScAddress::Contract(ContractId(Hash(hash))))
        }
        Some('M') => {
            let (key, id) = decode_muxed_account(s)?;
            Ok(ScAddress::MuxedAccount(MuxedEd25519Account {
                id,
                ed25519: Uint256(key),
            }))
        }
        Some(c) => Err(StrkeyError::UnsupportedPrefix(c)),
        None => Err(StrkeyError::Invalid("empty address".to_string())),
    }
}

/// Render an address in strkey form. Balance and pool ids have no strkey
/// form understood here and are rendered as hex.
pub fn format_sc_address(addr: &ScAddress) -> String {
    match addr {
        ScAddress::Account(AccountId(PublicKey::PublicKeyTypeEd25519(Uint256(key)))) => {
            encode_account_id(key)
        }
        ScAddress::Contract(ContractId(Hash(hash))) => encode_contract(hash),
        ScAddress::MuxedAccount(m) => encode_muxed_account(&m.ed25519.0, m.id),
        ScAddress::ClaimableBalance(b) => match b {
            stellar_xdr::curr::ClaimableBalanceId::ClaimableBalanceIdTypeV0(hash) => {
                format!("ClaimableBalance({})", hex::encode(hash.0))
            }
        },
        ScAddress::LiquidityPool(p) => format!("LiquidityPool({})", hex::encode(p.0 .0)),
    }
}

fn encode_check(version: u8, data: &[u8]) -> String {
    let mut payload = vec![version];
    payload.extend_from_slice(data);

    let checksum = crc16_xmodem(&payload);
    payload.extend_from_slice(&checksum.to_le_bytes());

    base32::encode(base32::Alphabet::Rfc4648 { padding: false }, &payload)
}

fn decode_fixed(expected_version: u8, s: &str) -> Result<[u8; 32], StrkeyError> {
    let data = decode_check(expected_version, s)?;
    if data.len() != 32 {
        return Err(StrkeyError::Invalid(format!(
            "payload length {} != 32",
            data.len()
        )));
    }
    let mut key = [0u8; 32];
    key.copy_from_slice(&data);
    Ok(key)
}

fn decode_check(expected_version: u8, s: &str) -> Result<Vec<u8>, StrkeyError> {
    let decoded = base32::decode(base32::Alphabet::Rfc4648 { padding: false }, s)
        .ok_or_else(|| StrkeyError::Invalid("invalid base32".to_string()))?;

    if decoded.len() < 3 {
        return Err(StrkeyError::Invalid("too short".to_string()));
    }

    let version = decoded[0];
    if version != expected_version {
        return Err(StrkeyError::Invalid(format!(
            "version byte {:02x} != {:02x}",
            version, expected_version
        )));
    }

    let checksum_pos = decoded.len() - 2;
    let checksum = u16::from_le_bytes([decoded[checksum_pos], decoded[checksum_pos + 1]]);
    if checksum != crc16_xmodem(&decoded[..checksum_pos]) {
        return Err(StrkeyError::Invalid("checksum mismatch".to_string()));
    }

    Ok(decoded[1..checksum_pos].to_vec())
}

/// CRC16-XModem checksum.
fn crc16_xmodem(data: &[u8]) -> u16 {
    let mut crc: u16 = 0;
    for byte in data {
        crc ^= (*byte as u16) << 8;
        for _ in 0..8 {
            if crc & 0x8000 != 0 {
                crc = (crc << 1) ^ 0x1021;
            } else {
                crc <<= 1;
            }
        }
    }
    crc
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_account_id_roundtrip() {
        let key = [7u8; 32];
        let encoded = encode_account_id(&key);
        assert!(encoded.starts_with('G'));
        assert_eq!(encoded.len(), 56);
        assert_eq!(decode_account_id(&encoded).unwrap(), key);
    }

    #[test]
    fn test_contract_roundtrip() {
        let hash = [0xabu8; 32];
        let encoded = encode_contract(&hash);
        assert!(encoded.starts_with('C'));
        assert_eq!(decode_contract(&encoded).unwrap(), hash);
    }

    #[test]
    fn test_known_account_id() {
        // all-zero key
        assert_eq!(
            encode_account_id(&[0u8; 32]),
            "GAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAWHF"
        );
    }

    #[test]
    fn test_invalid_checksum() {
        let mut encoded = encode_account_id(&[1u8; 32]);
        let last = encoded.pop().unwrap();
        encoded.push(if last == 'A' { 'B' } else { 'A' });
        assert!(decode_account_id(&encoded).is_err());
    }

    #[test]
    fn test_wrong_version_rejected() {
        let seed = encode_secret_seed(&[3u8; 32]);
        assert!(decode_account_id(&seed).is_err());
    }

    #[test]
    fn test_muxed_account() {
        let encoded = encode_muxed_account(&[9u8; 32], 42);
        assert!(encoded.starts_with('M'));
        assert_eq!(decode_muxed_account(&encoded).unwrap(), ([9u8; 32], 42));
    }

    #[test]
    fn test_sc_address_roundtrip() {
        let account = encode_account_id(&[5u8; 32]);
        let contract = encode_contract(&[6u8; 32]);
        for s in [account, contract] {
            let addr = parse_sc_address(&s).unwrap();
            assert_eq!(format_sc_address(&addr), s);
        }
    }

    #[test]
    fn test_unsupported_prefix() {
        assert_eq!(
            parse_sc_address("XYZ"),
            Err(StrkeyError::UnsupportedPrefix('X'))
        );
    }
}
