//! Deterministic per-feed identities.
//!
//! A feed's key pair is `HMAC-SHA256(secret, canonical_url)` interpreted as a
//! secp256k1 secret key, so the same feed always maps to the same identity without
//! any stored key material.

use hmac::{Hmac, Mac};
use secp256k1::{Keypair, Secp256k1, SecretKey, XOnlyPublicKey};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Error)]
pub enum IdentityError {
    /// The digest is zero or not below the curve order. Astronomically unlikely.
    #[error("Derived digest is not a valid secp256k1 secret key")]
    InvalidScalar(#[from] secp256k1::Error),
    /// The MAC rejected the secret as a key.
    #[error("Secret is not usable as an HMAC key")]
    InvalidSecret,
}

/// A feed's signing identity.
///
/// `Debug` never prints the private key.
#[derive(Clone, PartialEq, Eq)]
pub struct Identity {
    public_key: XOnlyPublicKey,
    private_key: SecretKey,
}

impl Identity {
    /// Hex-encoded x-only public key, as used in message events.
    pub fn public_key_hex(&self) -> String {
        hex::encode(self.public_key.serialize())
    }

    pub fn public_key(&self) -> &XOnlyPublicKey {
        &self.public_key
    }

    /// Hex-encoded private key, for handing to the signing step.
    pub fn private_key_hex(&self) -> String {
        hex::encode(self.private_key.secret_bytes())
    }

    pub fn private_key(&self) -> &SecretKey {
        &self.private_key
    }
}

impl std::fmt::Debug for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Identity")
            .field("public_key", &self.public_key_hex())
            .field("private_key", &"[REDACTED]")
            .finish()
    }
}

/// Keyed digest of `canonical_url` under `secret`.
fn private_key_bytes(canonical_url: &str, secret: &str) -> Result<[u8; 32], IdentityError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| IdentityError::InvalidSecret)?;
    mac.update(canonical_url.as_bytes());

    let mut bytes = [0u8; 32];
    bytes.copy_from_slice(&mac.finalize().into_bytes());
    Ok(bytes)
}

/// Derives the key pair for a feed.
///
/// Pure: identical `(canonical_url, secret)` inputs always produce identical keys.
///
/// # Errors
///
/// Returns [`IdentityError::InvalidScalar`] in the negligible case that the digest
/// is not a usable secret key, and [`IdentityError::InvalidSecret`] if the MAC
/// refuses the secret.
///
/// # Examples
///
/// ```
/// use rssbridge::identity::derive;
///
/// let identity = derive("https://nitter.moomoo.me/Bitcoin/rss", "test").unwrap();
/// assert_eq!(
///     identity.private_key_hex(),
///     "27660ab89e69f59bb8d9f0bd60da4a8515cdd3e2ca4f91d72a242b086d6aaaa7"
/// );
/// ```
pub fn derive(canonical_url: &str, secret: &str) -> Result<Identity, IdentityError> {
    let private_key = SecretKey::from_slice(&private_key_bytes(canonical_url, secret)?)?;
    let secp = Secp256k1::signing_only();
    let keypair = Keypair::from_secret_key(&secp, &private_key);
    let (public_key, _parity) = XOnlyPublicKey::from_keypair(&keypair);

    Ok(Identity {
        public_key,
        private_key,
    })
}
