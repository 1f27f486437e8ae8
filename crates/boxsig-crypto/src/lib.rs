//! Cryptographic primitives for boxsig
//!
//! Multisig address resolution and the signer seam, built on the
//! RustCrypto `sha2` and `ed25519-dalek` implementations.

pub mod multisig;
pub mod signer;

pub use multisig::{resolve, MultisigAccount, MAX_SIGNERS, MULTISIG_VERSION};
pub use signer::{verify_signature, Ed25519Signer, SignatureError, Signer};
