//! Ledger account addresses

use boxsig_errors::{Error, Result};
use data_encoding::BASE32_NOPAD;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha512_256};
use std::fmt;
use std::str::FromStr;

/// Length of the raw public key behind an address
pub const ADDRESS_LEN: usize = 32;

/// Trailing checksum bytes appended before base32 encoding
pub const CHECKSUM_LEN: usize = 4;

/// Length of the textual form of an address
pub const ADDRESS_STR_LEN: usize = 58;

const APP_ID_PREFIX: &[u8] = b"appID";

/// Account address - the 32-byte ed25519 public key of the account
///
/// Text form is `base32(key || checksum)` without padding, where the checksum
/// is the last four bytes of `SHA-512/256(key)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address([u8; ADDRESS_LEN]);

impl Default for Address {
    fn default() -> Self {
        Self::zero()
    }
}

impl Address {
    /// Wrap a raw public key
    pub const fn from_public_key(key: [u8; ADDRESS_LEN]) -> Self {
        Self(key)
    }

    /// The all-zero address, used by the contract as "no admin"
    pub const fn zero() -> Self {
        Self([0u8; ADDRESS_LEN])
    }

    /// Build an address from a raw key slice
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let key: [u8; ADDRESS_LEN] = bytes.try_into().map_err(|_| {
            Error::InvalidAddress(format!(
                "expected {ADDRESS_LEN} key bytes, got {}",
                bytes.len()
            ))
        })?;
        Ok(Self(key))
    }

    /// Escrow address controlled by an application
    pub fn for_application(app_id: u64) -> Self {
        let mut hasher = Sha512_256::new();
        hasher.update(APP_ID_PREFIX);
        hasher.update(app_id.to_be_bytes());
        Self(hasher.finalize().into())
    }

    /// Get the raw public key bytes
    pub fn as_bytes(&self) -> &[u8; ADDRESS_LEN] {
        &self.0
    }

    /// Checksum appended to the key in the text form
    pub fn checksum(&self) -> [u8; CHECKSUM_LEN] {
        let digest = Sha512_256::digest(self.0);
        let mut checksum = [0u8; CHECKSUM_LEN];
        checksum.copy_from_slice(&digest[digest.len() - CHECKSUM_LEN..]);
        checksum
    }

    /// Encode to the 58-character text form
    pub fn encode(&self) -> String {
        let mut raw = Vec::with_capacity(ADDRESS_LEN + CHECKSUM_LEN);
        raw.extend_from_slice(&self.0);
        raw.extend_from_slice(&self.checksum());
        BASE32_NOPAD.encode(&raw)
    }

    /// Decode the text form, verifying length and checksum
    pub fn decode(s: &str) -> Result<Self> {
        if s.len() != ADDRESS_STR_LEN {
            return Err(Error::InvalidAddress(format!(
                "expected {ADDRESS_STR_LEN} characters, got {}",
                s.len()
            )));
        }

        let raw = BASE32_NOPAD
            .decode(s.as_bytes())
            .map_err(|e| Error::InvalidAddress(format!("{s}: {e}")))?;
        if raw.len() != ADDRESS_LEN + CHECKSUM_LEN {
            return Err(Error::InvalidAddress(format!(
                "{s}: decoded to {} bytes",
                raw.len()
            )));
        }

        let address = Self::from_slice(&raw[..ADDRESS_LEN])?;
        if address.checksum()[..] != raw[ADDRESS_LEN..] {
            return Err(Error::InvalidAddress(format!("{s}: checksum mismatch")));
        }

        Ok(address)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.encode())
    }
}

impl FromStr for Address {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::decode(s)
    }
}

impl TryFrom<String> for Address {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        Self::decode(&s)
    }
}

impl From<Address> for String {
    fn from(address: Address) -> Self {
        address.encode()
    }
}
