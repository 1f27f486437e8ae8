//! Detached signatures over raw transaction bytes

use async_trait::async_trait;
use boxsig_types::Address;
use ed25519_dalek::{Signature, Signer as _, SigningKey, Verifier, VerifyingKey};
use thiserror::Error;

/// Domain separation tag prepended to transaction bytes before signing
pub const TX_DOMAIN_PREFIX: &[u8] = b"TX";

/// Length of an ed25519 signature
pub const SIGNATURE_LEN: usize = 64;

#[derive(Error, Debug)]
pub enum SignatureError {
    #[error("signing failed: {0}")]
    SigningFailed(String),

    #[error("verification failed")]
    VerificationFailed,
}

/// Opaque signing capability
///
/// The coordinator never sees key material; it hands over the bytes to be
/// signed and stores whatever comes back.
#[async_trait]
pub trait Signer: Send + Sync {
    /// Address the signatures verify against
    fn address(&self) -> Address;

    /// Produce a detached signature over `message`
    async fn sign(&self, message: &[u8]) -> Result<Vec<u8>, SignatureError>;
}

/// In-process ed25519 signer
pub struct Ed25519Signer {
    key: SigningKey,
}

impl Ed25519Signer {
    pub fn new(key: SigningKey) -> Self {
        Self { key }
    }

    /// Build from a 32-byte secret seed
    pub fn from_seed(seed: [u8; 32]) -> Self {
        Self::new(SigningKey::from_bytes(&seed))
    }
}

impl std::fmt::Debug for Ed25519Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ed25519Signer")
            .field("address", &self.address())
            .finish_non_exhaustive()
    }
}

fn tagged(message: &[u8]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(TX_DOMAIN_PREFIX.len() + message.len());
    bytes.extend_from_slice(TX_DOMAIN_PREFIX);
    bytes.extend_from_slice(message);
    bytes
}

#[async_trait]
impl Signer for Ed25519Signer {
    fn address(&self) -> Address {
        Address::from_public_key(self.key.verifying_key().to_bytes())
    }

    async fn sign(&self, message: &[u8]) -> Result<Vec<u8>, SignatureError> {
        let signature: Signature = self.key.sign(&tagged(message));
        tracing::trace!(signer = %self.address(), len = message.len(), "signed transaction bytes");
        Ok(signature.to_bytes().to_vec())
    }
}

/// Verify a detached transaction signature produced by `address`
pub fn verify_signature(
    address: &Address,
    message: &[u8],
    signature: &[u8],
) -> Result<(), SignatureError> {
    let key =
        VerifyingKey::from_bytes(address.as_bytes()).map_err(|_| SignatureError::VerificationFailed)?;
    let signature = Signature::from_bytes(
        signature
            .try_into()
            .map_err(|_| SignatureError::VerificationFailed)?,
    );
    key.verify(&tagged(message), &signature)
        .map_err(|_| SignatureError::VerificationFailed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_from_seed() {
        let signer = Ed25519Signer::from_seed([7u8; 32]);
        assert_eq!(
            signer.address().to_string(),
            "5JFGYY7CTRJAVPXVKB5RGLWF7GKUO5VOX27HXESCD3VGSFCG2IWAKDM5YU"
        );
    }

    #[tokio::test]
    async fn test_sign_and_verify() {
        let signer = Ed25519Signer::from_seed([7u8; 32]);
        let message = b"zero payment with a note";

        let signature = signer.sign(message).await.unwrap();
        assert_eq!(signature.len(), SIGNATURE_LEN);
        assert!(verify_signature(&signer.address(), message, &signature).is_ok());
    }

    #[tokio::test]
    async fn test_verify_rejects_tampering() {
        let signer = Ed25519Signer::from_seed([7u8; 32]);
        let signature = signer.sign(b"original").await.unwrap();

        assert!(verify_signature(&signer.address(), b"altered", &signature).is_err());
        assert!(verify_signature(&signer.address(), b"original", &signature[..63]).is_err());

        let other = Ed25519Signer::from_seed([8u8; 32]);
        assert!(verify_signature(&other.address(), b"original", &signature).is_err());
    }

    #[test]
    fn test_signature_is_domain_separated() {
        // Signing the raw bytes without the tag must not verify
        let key = SigningKey::from_bytes(&[7u8; 32]);
        let raw: Signature = key.sign(b"payload");
        let address = Address::from_public_key(key.verifying_key().to_bytes());
        assert!(verify_signature(&address, b"payload", &raw.to_bytes()).is_err());
    }
}
