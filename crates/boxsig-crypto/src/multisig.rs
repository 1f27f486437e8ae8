//! Multisignature account addresses
//!
//! The composite address is `SHA-512/256("MultisigAddr" || version || threshold || pk_1 || ... || pk_n)`.
//! Signer order is significant: the same keys in a different order resolve
//! to a different account.

use boxsig_errors::{Error, Result};
use boxsig_types::Address;
use sha2::{Digest, Sha512_256};

/// The only multisig version the ledger accepts
pub const MULTISIG_VERSION: u8 = 1;

/// Upper bound on signers, fixed by the one-byte encoding
pub const MAX_SIGNERS: usize = u8::MAX as usize;

const MULTISIG_PREFIX: &[u8] = b"MultisigAddr";

/// Resolve the canonical multisig address for `threshold`-of-`addresses`
pub fn resolve(version: u8, threshold: u16, addresses: &[Address]) -> Result<Address> {
    let (version, threshold) = validate_header(version, threshold, addresses)?;

    let mut hasher = Sha512_256::new();
    hasher.update(MULTISIG_PREFIX);
    hasher.update([version, threshold]);
    for address in addresses {
        hasher.update(address.as_bytes());
    }

    Ok(Address::from_public_key(hasher.finalize().into()))
}

/// Check the header fields and narrow them to their one-byte encoding
fn validate_header(version: u8, threshold: u16, addresses: &[Address]) -> Result<(u8, u8)> {
    if version != MULTISIG_VERSION {
        return Err(Error::UnsupportedMultisigVersion(version));
    }
    if threshold == 0 || usize::from(threshold) > addresses.len() {
        return Err(Error::ThresholdOutOfRange {
            threshold,
            signers: addresses.len(),
        });
    }
    if addresses.len() > MAX_SIGNERS {
        return Err(Error::EncodingError(format!(
            "{} signers exceed the limit of {MAX_SIGNERS}",
            addresses.len()
        )));
    }
    // threshold <= len <= 255
    let threshold = u8::try_from(threshold)
        .map_err(|_| Error::EncodingError(format!("threshold {threshold} overflows u8")))?;
    Ok((version, threshold))
}

/// A threshold account over an ordered signer list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultisigAccount {
    version: u8,
    threshold: u16,
    signers: Vec<Address>,
    address: Address,
}

impl MultisigAccount {
    /// Validate the parameters and resolve the composite address once
    pub fn new(version: u8, threshold: u16, signers: Vec<Address>) -> Result<Self> {
        let address = resolve(version, threshold, &signers)?;
        Ok(Self {
            version,
            threshold,
            signers,
            address,
        })
    }

    pub fn version(&self) -> u8 {
        self.version
    }

    pub fn threshold(&self) -> u16 {
        self.threshold
    }

    pub fn signers(&self) -> &[Address] {
        &self.signers
    }

    /// The composite address transactions must be sent from
    pub fn address(&self) -> Address {
        self.address
    }

    /// Whether `address` is one of the signers
    pub fn contains(&self, address: &Address) -> bool {
        self.signers.contains(address)
    }

    /// Whether `count` distinct signatures meet the threshold
    pub fn is_satisfied_by(&self, count: usize) -> bool {
        count >= usize::from(self.threshold)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn signers() -> Vec<Address> {
        [
            "DN7MBMCL5JQ3PFUQS7TMX5AH4EEKOBJVDUF4TCV6WERATKFLQF4MQUPZTA",
            "BFRTECKTOOE7A5LHCF3TTEOH2A7BW46IYT2SX5VP6ANKEXHZYJY77SJTVM",
            "47YPQTIGQEO7T4Y4RWDYWEKV6RTR2UNBQXBABEEGM72ESWDQNCQ52OPASU",
        ]
        .iter()
        .map(|s| s.parse().unwrap())
        .collect()
    }

    #[test]
    fn test_known_two_of_three() {
        let address = resolve(1, 2, &signers()).unwrap();
        assert_eq!(
            address.to_string(),
            "RWJLJCMQAFZ2ATP2INM2GZTKNL6OULCCUBO5TQPXH3V2KR4AG7U5UA5JNM"
        );
    }

    #[test]
    fn test_order_matters() {
        let mut reversed = signers();
        reversed.reverse();
        assert_ne!(
            resolve(1, 2, &signers()).unwrap(),
            resolve(1, 2, &reversed).unwrap()
        );
    }

    #[test]
    fn test_threshold_bounds() {
        assert_eq!(
            resolve(1, 0, &signers()).unwrap_err(),
            Error::ThresholdOutOfRange {
                threshold: 0,
                signers: 3
            }
        );
        assert_eq!(
            resolve(1, 4, &signers()).unwrap_err(),
            Error::ThresholdOutOfRange {
                threshold: 4,
                signers: 3
            }
        );
        assert!(matches!(
            resolve(1, 1, &[]),
            Err(Error::ThresholdOutOfRange { .. })
        ));
        assert!(resolve(1, 3, &signers()).is_ok());
    }

    #[test]
    fn test_version_checked() {
        assert_eq!(
            resolve(2, 2, &signers()).unwrap_err(),
            Error::UnsupportedMultisigVersion(2)
        );
    }

    #[test]
    fn test_too_many_signers() {
        let many = vec![Address::zero(); MAX_SIGNERS + 1];
        assert!(matches!(
            resolve(1, 1, &many),
            Err(Error::EncodingError(_))
        ));
    }

    #[test]
    fn test_account() {
        let account = MultisigAccount::new(1, 2, signers()).unwrap();
        assert_eq!(account.address(), resolve(1, 2, &signers()).unwrap());
        assert!(account.contains(&signers()[1]));
        assert!(!account.contains(&Address::zero()));
        assert!(!account.is_satisfied_by(1));
        assert!(account.is_satisfied_by(2));
    }

    proptest! {
        #[test]
        fn resolution_is_deterministic(keys in proptest::collection::vec(any::<[u8; 32]>(), 1..8)) {
            let addresses: Vec<Address> = keys.into_iter().map(Address::from_public_key).collect();
            let threshold = addresses.len() as u16;
            prop_assert_eq!(
                resolve(1, threshold, &addresses).unwrap(),
                resolve(1, threshold, &addresses).unwrap()
            );
        }
    }
}
