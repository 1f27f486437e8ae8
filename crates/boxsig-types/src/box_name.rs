//! Box names addressing transaction slots and signature entries
//!
//! Two fixed-width layouts are persisted on-chain and must not change:
//!
//! ```text
//! slot key       (9 bytes):  group id (u64, big-endian) | slot index (u8)
//! signature key (40 bytes):  group id (u64, big-endian) | address public key (32)
//! ```
//!
//! Both start with the group id, so every box belonging to a group shares
//! the same 8-byte prefix.

use crate::address::{Address, ADDRESS_LEN};
use boxsig_errors::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Width of the group id prefix
pub const GROUP_ID_LEN: usize = 8;

/// Width of a transaction slot key
pub const SLOT_KEY_LEN: usize = GROUP_ID_LEN + 1;

/// Width of a signature key
pub const SIGNATURE_KEY_LEN: usize = GROUP_ID_LEN + ADDRESS_LEN;

/// Box name of one transaction slot within a group
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SlotKey([u8; SLOT_KEY_LEN]);

/// Box name of one signer's signatures for a group
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SignatureKey(#[serde(with = "signature_key_bytes")] [u8; SIGNATURE_KEY_LEN]);

/// Derive the box name of slot `slot_index` in group `group_id`
pub fn derive_slot_key(group_id: u64, slot_index: u8) -> SlotKey {
    let mut key = [0u8; SLOT_KEY_LEN];
    key[..GROUP_ID_LEN].copy_from_slice(&group_id.to_be_bytes());
    key[GROUP_ID_LEN] = slot_index;
    SlotKey(key)
}

/// Derive the box name holding `address`'s signatures for group `group_id`
pub fn derive_signature_key(address: &Address, group_id: u64) -> SignatureKey {
    let mut key = [0u8; SIGNATURE_KEY_LEN];
    key[..GROUP_ID_LEN].copy_from_slice(&group_id.to_be_bytes());
    key[GROUP_ID_LEN..].copy_from_slice(address.as_bytes());
    SignatureKey(key)
}

/// Same as [`derive_signature_key`], decoding the address text first
pub fn signature_key_for(address: &str, group_id: u64) -> Result<SignatureKey> {
    let address = Address::decode(address)?;
    Ok(derive_signature_key(&address, group_id))
}

/// Prefix shared by every box of a group
pub fn group_prefix(group_id: u64) -> [u8; GROUP_ID_LEN] {
    group_id.to_be_bytes()
}

fn read_group_id(bytes: &[u8]) -> u64 {
    let mut id = [0u8; GROUP_ID_LEN];
    id.copy_from_slice(&bytes[..GROUP_ID_LEN]);
    u64::from_be_bytes(id)
}

impl SlotKey {
    pub fn group_id(&self) -> u64 {
        read_group_id(&self.0)
    }

    pub fn slot_index(&self) -> u8 {
        self.0[GROUP_ID_LEN]
    }

    pub fn as_bytes(&self) -> &[u8; SLOT_KEY_LEN] {
        &self.0
    }
}

impl SignatureKey {
    pub fn group_id(&self) -> u64 {
        read_group_id(&self.0)
    }

    pub fn address(&self) -> Address {
        let mut key = [0u8; ADDRESS_LEN];
        key.copy_from_slice(&self.0[GROUP_ID_LEN..]);
        Address::from_public_key(key)
    }

    pub fn as_bytes(&self) -> &[u8; SIGNATURE_KEY_LEN] {
        &self.0
    }
}

impl TryFrom<&[u8]> for SlotKey {
    type Error = Error;

    fn try_from(bytes: &[u8]) -> Result<Self> {
        let key: [u8; SLOT_KEY_LEN] = bytes.try_into().map_err(|_| {
            Error::EncodingError(format!(
                "slot key must be {SLOT_KEY_LEN} bytes, got {}",
                bytes.len()
            ))
        })?;
        Ok(Self(key))
    }
}

impl TryFrom<&[u8]> for SignatureKey {
    type Error = Error;

    fn try_from(bytes: &[u8]) -> Result<Self> {
        let key: [u8; SIGNATURE_KEY_LEN] = bytes.try_into().map_err(|_| {
            Error::EncodingError(format!(
                "signature key must be {SIGNATURE_KEY_LEN} bytes, got {}",
                bytes.len()
            ))
        })?;
        Ok(Self(key))
    }
}

/// Either kind of box name
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum BoxName {
    Slot(SlotKey),
    Signature(SignatureKey),
}

impl BoxName {
    /// Classify raw box name bytes by width
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        match bytes.len() {
            SLOT_KEY_LEN => Ok(BoxName::Slot(SlotKey::try_from(bytes)?)),
            SIGNATURE_KEY_LEN => Ok(BoxName::Signature(SignatureKey::try_from(bytes)?)),
            other => Err(Error::EncodingError(format!(
                "box name of {other} bytes is neither a slot nor a signature key"
            ))),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            BoxName::Slot(key) => key.as_bytes(),
            BoxName::Signature(key) => key.as_bytes(),
        }
    }

    /// Group owning this box
    pub fn group_id(&self) -> u64 {
        match self {
            BoxName::Slot(key) => key.group_id(),
            BoxName::Signature(key) => key.group_id(),
        }
    }
}

impl From<SlotKey> for BoxName {
    fn from(key: SlotKey) -> Self {
        BoxName::Slot(key)
    }
}

impl From<SignatureKey> for BoxName {
    fn from(key: SignatureKey) -> Self {
        BoxName::Signature(key)
    }
}

impl fmt::Display for BoxName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.as_bytes()))
    }
}

// serde only derives array impls up to 32 elements
mod signature_key_bytes {
    use super::SIGNATURE_KEY_LEN;
    use serde::{de::Error as _, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8; SIGNATURE_KEY_LEN], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<[u8; SIGNATURE_KEY_LEN], D::Error>
    where
        D: Deserializer<'de>,
    {
        let text = String::deserialize(deserializer)?;
        let bytes = hex::decode(&text).map_err(D::Error::custom)?;
        bytes
            .try_into()
            .map_err(|_| D::Error::custom("signature key must be 40 bytes"))
    }
}
