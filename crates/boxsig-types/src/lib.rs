//! Core types for boxsig
//!
//! Addresses, the fixed-width box names that address transaction slots and
//! signature entries in contract storage, and the network parameters used
//! when composing funding payments.

pub mod address;
pub mod box_name;
pub mod params;

pub use address::Address;
pub use box_name::{
    derive_signature_key, derive_slot_key, group_prefix, signature_key_for, BoxName,
    SignatureKey, SlotKey, GROUP_ID_LEN, SIGNATURE_KEY_LEN, SLOT_KEY_LEN,
};
pub use params::{SuggestedParams, DEFAULT_VALIDITY_WINDOW, MIN_TXN_FEE};
