use crate::{now_ms, Error, Identity, KeyBundle, Result};
use hkdf::Hkdf;
use sha2::Sha256;

/// External signing capability of the connected wallet.
///
/// Implementations may require interactive confirmation from the wallet
/// holder; a rejected or unavailable signer fails with
/// [`Error::KeyResolution`].
pub trait WalletSigner: Send + Sync {
    fn address(&self) -> Identity;

    /// Sign an arbitrary message with the wallet key. One interactive
    /// signature is the cost of first-time key derivation.
    fn sign_message(&self, message: &str) -> Result<Vec<u8>>;
}

/// The fixed text a wallet signs to authorize a messaging key for its
/// address. Changing this orphans every previously derived bundle.
pub fn derivation_challenge(identity: &Identity) -> String {
    format!("wallet-chat: authorize messaging key\naddress: {identity}\nversion: 1")
}

/// Derive a fresh key bundle from one wallet signature.
///
/// Purely local: nothing is published to the network (the contact bundle
/// goes out when the session connects) and nothing is persisted outside the
/// process. The signature need not be reproducible; the derived bundle is
/// cached by the key store and reused from then on.
pub fn derive_key_bundle(signer: &dyn WalletSigner) -> Result<KeyBundle> {
    let identity = signer.address();
    let challenge = derivation_challenge(&identity);
    let signature = signer.sign_message(&challenge).map_err(|e| match e {
        Error::KeyResolution(_) => e,
        other => Error::KeyResolution(other.to_string()),
    })?;
    if signature.is_empty() {
        return Err(Error::KeyResolution("signer returned an empty signature".to_string()));
    }

    let hk = Hkdf::<Sha256>::new(Some(identity.as_str().as_bytes()), &signature);
    let mut secret_key = [0u8; 32];
    hk.expand(b"wallet-chat messaging key v1", &mut secret_key)
        .map_err(|e| Error::KeyResolution(e.to_string()))?;

    Ok(KeyBundle {
        address: identity,
        secret_key,
        created_at: now_ms(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedSigner {
        address: Identity,
        signature: Vec<u8>,
    }

    impl WalletSigner for FixedSigner {
        fn address(&self) -> Identity {
            self.address.clone()
        }

        fn sign_message(&self, _message: &str) -> Result<Vec<u8>> {
            Ok(self.signature.clone())
        }
    }

    struct RejectingSigner {
        address: Identity,
    }

    impl WalletSigner for RejectingSigner {
        fn address(&self) -> Identity {
            self.address.clone()
        }

        fn sign_message(&self, _message: &str) -> Result<Vec<u8>> {
            Err(Error::KeyResolution("user rejected the request".to_string()))
        }
    }

    #[test]
    fn test_same_signature_derives_same_bundle() {
        let signer = FixedSigner {
            address: Identity::new("0x01").unwrap(),
            signature: vec![0xAB; 65],
        };
        let a = derive_key_bundle(&signer).unwrap();
        let b = derive_key_bundle(&signer).unwrap();
        assert_eq!(a.secret_key, b.secret_key);
        assert_eq!(a.address, signer.address());
    }

    #[test]
    fn test_different_signatures_derive_different_keys() {
        let address = Identity::new("0x01").unwrap();
        let a = derive_key_bundle(&FixedSigner {
            address: address.clone(),
            signature: vec![1; 65],
        })
        .unwrap();
        let b = derive_key_bundle(&FixedSigner {
            address,
            signature: vec![2; 65],
        })
        .unwrap();
        assert_ne!(a.secret_key, b.secret_key);
    }

    #[test]
    fn test_rejected_signature_fails_key_resolution() {
        let signer = RejectingSigner {
            address: Identity::new("0x01").unwrap(),
        };
        let err = derive_key_bundle(&signer).unwrap_err();
        assert!(matches!(err, Error::KeyResolution(_)));
    }

    #[test]
    fn test_empty_signature_is_rejected() {
        let signer = FixedSigner {
            address: Identity::new("0x01").unwrap(),
            signature: Vec::new(),
        };
        assert!(matches!(
            derive_key_bundle(&signer).unwrap_err(),
            Error::KeyResolution(_)
        ));
    }

    #[test]
    fn test_challenge_names_the_address() {
        let identity = Identity::new("0x0ad3a479b31072bc14bde6aad601e4cbf13e78a8").unwrap();
        let challenge = derivation_challenge(&identity);
        assert!(challenge.contains(identity.as_str()));
    }
}
