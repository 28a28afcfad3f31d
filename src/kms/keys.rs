//! Raw key pair operations for the supported [KeyType]s.

use anyhow::{bail, Context};
use base64::prelude::*;
use ed25519_dalek::{Signer as _, Verifier as _};
use p256::elliptic_curve::sec1::ToEncodedPoint;
use rand::rngs::OsRng;
use zeroize::Zeroizing;

use super::KeyType;

/// Private key material held in memory only while it is used.
pub struct PrivateKey {
    key_type: KeyType,
    bytes: Zeroizing<Vec<u8>>,
}

impl std::fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrivateKey")
            .field("key_type", &self.key_type)
            .finish_non_exhaustive()
    }
}

impl PrivateKey {
    pub fn generate(key_type: KeyType) -> Self {
        let bytes = match key_type {
            KeyType::Ed25519 => ed25519_dalek::SigningKey::generate(&mut OsRng)
                .to_bytes()
                .to_vec(),
            KeyType::EcdsaP256 => p256::ecdsa::SigningKey::random(&mut OsRng)
                .to_bytes()
                .to_vec(),
        };

        Self {
            key_type,
            bytes: Zeroizing::new(bytes),
        }
    }

    pub fn from_bytes(key_type: KeyType, bytes: &[u8]) -> anyhow::Result<Self> {
        let key = Self {
            key_type,
            bytes: Zeroizing::new(bytes.to_vec()),
        };
        // Reject malformed material at import time rather than at first use.
        key.public_key()?;
        Ok(key)
    }

    pub fn key_type(&self) -> KeyType {
        self.key_type
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    fn ed25519(&self) -> anyhow::Result<ed25519_dalek::SigningKey> {
        let bytes: [u8; 32] = self
            .bytes
            .as_slice()
            .try_into()
            .context("ed25519 private key must be 32 bytes")?;
        Ok(ed25519_dalek::SigningKey::from_bytes(&bytes))
    }

    fn p256(&self) -> anyhow::Result<p256::ecdsa::SigningKey> {
        p256::ecdsa::SigningKey::from_slice(&self.bytes).context("invalid P-256 private key")
    }

    pub fn public_key(&self) -> anyhow::Result<Vec<u8>> {
        Ok(match self.key_type {
            KeyType::Ed25519 => self.ed25519()?.verifying_key().to_bytes().to_vec(),
            KeyType::EcdsaP256 => self
                .p256()?
                .verifying_key()
                .to_encoded_point(true)
                .as_bytes()
                .to_vec(),
        })
    }

    pub fn sign(&self, payload: &[u8]) -> anyhow::Result<Vec<u8>> {
        Ok(match self.key_type {
            KeyType::Ed25519 => self.ed25519()?.sign(payload).to_bytes().to_vec(),
            KeyType::EcdsaP256 => {
                let sig: p256::ecdsa::Signature = self.p256()?.sign(payload);
                sig.to_vec()
            }
        })
    }
}

fn jwk_field<'a>(jwk: &'a serde_json::Value, name: &str) -> anyhow::Result<&'a str> {
    jwk.get(name)
        .and_then(serde_json::Value::as_str)
        .with_context(|| format!("JWK is missing `{name}`"))
}

fn jwk_key_type(jwk: &serde_json::Value) -> anyhow::Result<KeyType> {
    match (jwk_field(jwk, "kty")?, jwk_field(jwk, "crv")?) {
        ("OKP", "Ed25519") => Ok(KeyType::Ed25519),
        ("EC", "P-256") => Ok(KeyType::EcdsaP256),
        (kty, crv) => bail!("unsupported JWK key type {kty}/{crv}"),
    }
}

impl PrivateKey {
    /// Parse a private JWK (`OKP`/`Ed25519` or `EC`/`P-256`).
    pub fn from_jwk(jwk: &serde_json::Value) -> anyhow::Result<Self> {
        let key_type = jwk_key_type(jwk)?;
        let d = Zeroizing::new(
            BASE64_URL_SAFE_NO_PAD
                .decode(jwk_field(jwk, "d")?)
                .context("JWK `d` is not base64url")?,
        );
        Self::from_bytes(key_type, &d)
    }
}

/// Parse a public JWK into its key type and raw public key bytes.
pub fn public_key_from_jwk(jwk: &serde_json::Value) -> anyhow::Result<(KeyType, Vec<u8>)> {
    let key_type = jwk_key_type(jwk)?;
    let bytes = match key_type {
        KeyType::Ed25519 => BASE64_URL_SAFE_NO_PAD
            .decode(jwk_field(jwk, "x")?)
            .context("JWK `x` is not base64url")?,
        KeyType::EcdsaP256 => {
            let public = p256::PublicKey::from_jwk_str(&jwk.to_string())
                .context("invalid P-256 JWK")?;
            public.to_encoded_point(true).as_bytes().to_vec()
        }
    };
    Ok((key_type, bytes))
}

/// Encode a raw public key as a public JWK.
pub fn public_key_to_jwk(key_type: KeyType, public_key: &[u8]) -> anyhow::Result<serde_json::Value> {
    Ok(match key_type {
        KeyType::Ed25519 => serde_json::json!({
            "kty": "OKP",
            "crv": "Ed25519",
            "x": BASE64_URL_SAFE_NO_PAD.encode(public_key),
        }),
        KeyType::EcdsaP256 => {
            let public =
                p256::PublicKey::from_sec1_bytes(public_key).context("invalid P-256 public key")?;
            serde_json::from_str(&public.to_jwk_string()).context("invalid P-256 JWK")?
        }
    })
}

/// Verify `signature` over `payload` with a raw public key.
///
/// Returns `Ok(false)` for a well-formed signature that does not match, and an
/// error if the key or signature cannot be decoded.
pub fn verify(
    key_type: KeyType,
    public_key: &[u8],
    payload: &[u8],
    signature: &[u8],
) -> anyhow::Result<bool> {
    match key_type {
        KeyType::Ed25519 => {
            let Ok(bytes) = <[u8; 32]>::try_from(public_key) else {
                bail!("ed25519 public key must be 32 bytes")
            };
            let key = ed25519_dalek::VerifyingKey::from_bytes(&bytes)
                .context("invalid ed25519 public key")?;
            let signature = ed25519_dalek::Signature::from_slice(signature)
                .context("invalid ed25519 signature")?;
            Ok(key.verify(payload, &signature).is_ok())
        }
        KeyType::EcdsaP256 => {
            let key = p256::ecdsa::VerifyingKey::from_sec1_bytes(public_key)
                .context("invalid P-256 public key")?;
            let signature = p256::ecdsa::Signature::from_slice(signature)
                .context("invalid P-256 signature")?;
            Ok(key.verify(payload, &signature).is_ok())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_and_verify_each_key_type() {
        for key_type in [KeyType::Ed25519, KeyType::EcdsaP256] {
            let key = PrivateKey::generate(key_type);
            let public = key.public_key().unwrap();
            let sig = key.sign(b"payload").unwrap();

            assert!(verify(key_type, &public, b"payload", &sig).unwrap());
            assert!(!verify(key_type, &public, b"tampered", &sig).unwrap());
        }
    }

    #[test]
    fn import_rejects_malformed_keys() {
        assert!(PrivateKey::from_bytes(KeyType::Ed25519, &[1u8; 31]).is_err());
        assert!(PrivateKey::from_bytes(KeyType::EcdsaP256, &[0u8; 32]).is_err());
    }

    #[test]
    fn imported_key_matches_generated_public_key() {
        let key = PrivateKey::generate(KeyType::EcdsaP256);
        let imported = PrivateKey::from_bytes(KeyType::EcdsaP256, key.as_bytes()).unwrap();
        assert_eq!(key.public_key().unwrap(), imported.public_key().unwrap());
        assert_eq!(imported.public_key().unwrap().len(), 33);
    }

    #[test]
    fn jwk_round_trip() {
        for key_type in [KeyType::Ed25519, KeyType::EcdsaP256] {
            let public = PrivateKey::generate(key_type).public_key().unwrap();
            let jwk = public_key_to_jwk(key_type, &public).unwrap();
            assert_eq!(public_key_from_jwk(&jwk).unwrap(), (key_type, public));
        }
    }

    #[test]
    fn private_jwk_import() {
        let key = PrivateKey::generate(KeyType::Ed25519);
        let jwk = serde_json::json!({
            "kty": "OKP",
            "crv": "Ed25519",
            "d": BASE64_URL_SAFE_NO_PAD.encode(key.as_bytes()),
        });
        let imported = PrivateKey::from_jwk(&jwk).unwrap();
        assert_eq!(imported.public_key().unwrap(), key.public_key().unwrap());

        let unsupported = serde_json::json!({"kty": "EC", "crv": "secp256k1", "d": "AA"});
        assert!(PrivateKey::from_jwk(&unsupported).is_err());
    }
}
