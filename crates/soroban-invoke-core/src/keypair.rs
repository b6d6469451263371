/// Ed25519 identities in Stellar strkey form
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use soroban_spec_core::strkey;
use soroban_spec_core::StrkeyError;
use stellar_xdr::curr::{AccountId, MuxedAccount, PublicKey, ScAddress, Uint256};

#[derive(Clone)]
pub struct Keypair {
    signing_key: SigningKey,
}

impl Keypair {
    pub fn random() -> Self {
        let mut csprng = OsRng;
        Keypair {
            signing_key: SigningKey::generate(&mut csprng),
        }
    }

    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Keypair {
            signing_key: SigningKey::from_bytes(seed),
        }
    }

    /// Parse a secret seed (S...)
    pub fn from_secret(secret: &str) -> Result<Self, StrkeyError> {
        let seed = strkey::decode_secret_seed(secret.trim())?;
        Ok(Self::from_seed(&seed))
    }

    pub fn public_key(&self) -> [u8; 32] {
        self.signing_key.verifying_key().to_bytes()
    }

    /// Account id (G...)
    pub fn account_id(&self) -> String {
        strkey::encode_account_id(&self.public_key())
    }

    /// Secret seed (S...)
    pub fn secret(&self) -> String {
        strkey::encode_secret_seed(&self.signing_key.to_bytes())
    }

    pub fn sign(&self, message: &[u8]) -> [u8; 64] {
        self.signing_key.sign(message).to_bytes()
    }

    /// Last four bytes of the public key, used as the decorated signature hint
    pub fn signature_hint(&self) -> [u8; 4] {
        let key = self.public_key();
        [key[28], key[29], key[30], key[31]]
    }

    pub fn xdr_account_id(&self) -> AccountId {
        AccountId(PublicKey::PublicKeyTypeEd25519(Uint256(self.public_key())))
    }

    pub fn sc_address(&self) -> ScAddress {
        ScAddress::Account(self.xdr_account_id())
    }

    pub fn muxed_account(&self) -> MuxedAccount {
        MuxedAccount::Ed25519(Uint256(self.public_key()))
    }
}

/// Check an ed25519 signature against a raw public key
pub fn verify_signature(public_key: &[u8; 32], message: &[u8], signature: &[u8; 64]) -> bool {
    match VerifyingKey::from_bytes(public_key) {
        Ok(key) => key
            .verify(message, &Signature::from_bytes(signature))
            .is_ok(),
        Err(_) => false,
    }
}

impl std::fmt::Debug for Keypair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Keypair")
            .field("account_id", &self.account_id())
            .finish_non_exhaustive()
    }
}
