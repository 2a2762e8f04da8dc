//! JWS/JSF signer.
//!
//! Signs canonicalized document bytes with RSA (PKCS#1v1.5), ECDSA
//! (P-256/P-384/P-521), or Ed25519, embedding a JSF-style `signature` object
//! into the document.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use ed25519_dalek::Signer as _;
use heimdall_model::SignatureInfo;
use rsa::pkcs1v15::SigningKey as RsaSigningKey;
use rsa::signature::{RandomizedSigner, SignatureEncoding};
use rsa::RsaPrivateKey;
use serde_json::{json, Value};
use sha2::{Sha256, Sha384, Sha512};
use signature::Signer as EcSigner;
use thiserror::Error;
use zeroize::Zeroizing;

#[derive(Error, Debug)]
pub enum SignError {
    #[error("could not load the signing key: {0}")]
    KeyError(String),
    #[error("algorithm/key mismatch: key is not usable with {0}")]
    AlgorithmMismatch(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignAlgorithm {
    Rs256,
    Rs384,
    Rs512,
    Es256,
    Es384,
    Es512,
    Ed25519,
}

impl SignAlgorithm {
    pub fn jws_name(self) -> &'static str {
        match self {
            Self::Rs256 => "RS256",
            Self::Rs384 => "RS384",
            Self::Rs512 => "RS512",
            Self::Es256 => "ES256",
            Self::Es384 => "ES384",
            Self::Es512 => "ES512",
            Self::Ed25519 => "Ed25519",
        }
    }

    pub fn from_jws_name(name: &str) -> Option<Self> {
        match name {
            "RS256" => Some(Self::Rs256),
            "RS384" => Some(Self::Rs384),
            "RS512" => Some(Self::Rs512),
            "ES256" => Some(Self::Es256),
            "ES384" => Some(Self::Es384),
            "ES512" => Some(Self::Es512),
            "Ed25519" => Some(Self::Ed25519),
            _ => None,
        }
    }
}

/// Loads `pem_bytes`, signs `message`, and drops the decoded key material
/// (wrapped in `Zeroizing`) before returning. Private keys never appear in
/// logs — only the algorithm name is traced.
pub fn sign(
    message: &[u8],
    pem_bytes: &[u8],
    algorithm: SignAlgorithm,
    key_id: Option<String>,
) -> Result<SignatureInfo, SignError> {
    let pem_str = Zeroizing::new(
        std::str::from_utf8(pem_bytes)
            .map_err(|e| SignError::KeyError(e.to_string()))?
            .to_string(),
    );

    let (value, public_key) = match algorithm {
        SignAlgorithm::Rs256 => sign_rsa_sha256(&pem_str, message)?,
        SignAlgorithm::Rs384 => sign_rsa_sha384(&pem_str, message)?,
        SignAlgorithm::Rs512 => sign_rsa_sha512(&pem_str, message)?,
        SignAlgorithm::Es256 => sign_es256(&pem_str, message)?,
        SignAlgorithm::Es384 => sign_es384(&pem_str, message)?,
        SignAlgorithm::Es512 => sign_es512(&pem_str, message)?,
        SignAlgorithm::Ed25519 => sign_ed25519(&pem_str, message)?,
    };

    tracing::debug!(algorithm = algorithm.jws_name(), "signed document");

    Ok(SignatureInfo {
        algorithm: algorithm.jws_name().to_string(),
        key_id,
        value,
        public_key: Some(public_key),
        certificate_chain: None,
    })
}

fn sign_rsa_sha256(pem_str: &str, message: &[u8]) -> Result<(String, Value), SignError> {
    let private_key =
        RsaPrivateKey::from_pkcs8_pem(pem_str).map_err(|e| SignError::KeyError(e.to_string()))?;
    let signing_key = RsaSigningKey::<Sha256>::new(private_key.clone());
    let mut rng = rand_core::OsRng;
    let signature = signing_key.sign_with_rng(&mut rng, message);
    let value = URL_SAFE_NO_PAD.encode(signature.to_bytes());
    Ok((value, rsa_jwk(&private_key.to_public_key())))
}

fn sign_rsa_sha384(pem_str: &str, message: &[u8]) -> Result<(String, Value), SignError> {
    let private_key =
        RsaPrivateKey::from_pkcs8_pem(pem_str).map_err(|e| SignError::KeyError(e.to_string()))?;
    let signing_key = RsaSigningKey::<Sha384>::new(private_key.clone());
    let mut rng = rand_core::OsRng;
    let signature = signing_key.sign_with_rng(&mut rng, message);
    let value = URL_SAFE_NO_PAD.encode(signature.to_bytes());
    Ok((value, rsa_jwk(&private_key.to_public_key())))
}

fn sign_rsa_sha512(pem_str: &str, message: &[u8]) -> Result<(String, Value), SignError> {
    let private_key =
        RsaPrivateKey::from_pkcs8_pem(pem_str).map_err(|e| SignError::KeyError(e.to_string()))?;
    let signing_key = RsaSigningKey::<Sha512>::new(private_key.clone());
    let mut rng = rand_core::OsRng;
    let signature = signing_key.sign_with_rng(&mut rng, message);
    let value = URL_SAFE_NO_PAD.encode(signature.to_bytes());
    Ok((value, rsa_jwk(&private_key.to_public_key())))
}

fn rsa_jwk(public_key: &rsa::RsaPublicKey) -> Value {
    use rsa::traits::PublicKeyParts;
    json!({
        "kty": "RSA",
        "n": URL_SAFE_NO_PAD.encode(public_key.n().to_bytes_be()),
        "e": URL_SAFE_NO_PAD.encode(public_key.e().to_bytes_be()),
    })
}

fn sign_es256(pem_str: &str, message: &[u8]) -> Result<(String, Value), SignError> {
    use p256::ecdsa::{Signature, SigningKey, VerifyingKey};
    use p256::pkcs8::DecodePrivateKey;

    let signing_key =
        SigningKey::from_pkcs8_pem(pem_str).map_err(|e| SignError::KeyError(e.to_string()))?;
    let signature: Signature = signing_key.sign(message);
    let value = URL_SAFE_NO_PAD.encode(signature.to_bytes());
    let verifying_key: VerifyingKey = *signing_key.verifying_key();
    let encoded = verifying_key.to_encoded_point(false);
    let public_key = json!({
        "kty": "EC",
        "crv": "P-256",
        "x": encoded.x().map(|b| URL_SAFE_NO_PAD.encode(b)),
        "y": encoded.y().map(|b| URL_SAFE_NO_PAD.encode(b)),
    });
    Ok((value, public_key))
}

fn sign_es384(pem_str: &str, message: &[u8]) -> Result<(String, Value), SignError> {
    use p384::ecdsa::{Signature, SigningKey, VerifyingKey};
    use p384::pkcs8::DecodePrivateKey;

    let signing_key =
        SigningKey::from_pkcs8_pem(pem_str).map_err(|e| SignError::KeyError(e.to_string()))?;
    let signature: Signature = signing_key.sign(message);
    let value = URL_SAFE_NO_PAD.encode(signature.to_bytes());
    let verifying_key: VerifyingKey = *signing_key.verifying_key();
    let encoded = verifying_key.to_encoded_point(false);
    let public_key = json!({
        "kty": "EC",
        "crv": "P-384",
        "x": encoded.x().map(|b| URL_SAFE_NO_PAD.encode(b)),
        "y": encoded.y().map(|b| URL_SAFE_NO_PAD.encode(b)),
    });
    Ok((value, public_key))
}

fn sign_es512(pem_str: &str, message: &[u8]) -> Result<(String, Value), SignError> {
    use p521::ecdsa::{Signature, SigningKey, VerifyingKey};
    use p521::pkcs8::DecodePrivateKey;

    let signing_key =
        SigningKey::from_pkcs8_pem(pem_str).map_err(|e| SignError::KeyError(e.to_string()))?;
    let signature: Signature = signing_key.sign(message);
    let value = URL_SAFE_NO_PAD.encode(signature.to_bytes());
    let verifying_key: VerifyingKey = *signing_key.verifying_key();
    let encoded = verifying_key.to_encoded_point(false);
    let public_key = json!({
        "kty": "EC",
        "crv": "P-521",
        "x": encoded.x().map(|b| URL_SAFE_NO_PAD.encode(b)),
        "y": encoded.y().map(|b| URL_SAFE_NO_PAD.encode(b)),
    });
    Ok((value, public_key))
}

fn sign_ed25519(pem_str: &str, message: &[u8]) -> Result<(String, Value), SignError> {
    use ed25519_dalek::{SigningKey, VerifyingKey};

    let signing_key =
        SigningKey::from_pkcs8_pem(pem_str).map_err(|e| SignError::KeyError(e.to_string()))?;
    let signature = signing_key.sign(message);
    let value = URL_SAFE_NO_PAD.encode(signature.to_bytes());
    let verifying_key: VerifyingKey = signing_key.verifying_key();
    let public_key = json!({
        "kty": "OKP",
        "crv": "Ed25519",
        "x": URL_SAFE_NO_PAD.encode(verifying_key.to_bytes()),
    });
    Ok((value, public_key))
}

/// Embeds `signature` as a top-level sibling of `components`, JSF-style.
/// `keyId`/`certificateChain` are omitted when absent rather than emitted
/// as `null`.
pub fn embed_signature(document: &mut Value, signature: &SignatureInfo) {
    if let Value::Object(map) = document {
        let mut entry = json!({
            "algorithm": signature.algorithm,
            "publicKey": signature.public_key,
            "value": signature.value,
        });
        if let Value::Object(entry_map) = &mut entry {
            if let Some(key_id) = &signature.key_id {
                entry_map.insert("keyId".to_string(), json!(key_id));
            }
            if let Some(chain) = &signature.certificate_chain {
                entry_map.insert("certificateChain".to_string(), json!(chain));
            }
        }
        map.insert("signature".to_string(), entry);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Ed25519 is the cheapest algorithm to exercise without a slow RSA
    // keygen in a unit test, so it carries the round-trip coverage here.
    #[test]
    fn ed25519_sign_produces_86_char_unpadded_base64url() {
        use ed25519_dalek::SigningKey as DalekSigningKey;
        use pkcs8::EncodePrivateKey;

        let seed = [7u8; 32];
        let signing_key = DalekSigningKey::from_bytes(&seed);
        let pem = signing_key
            .to_pkcs8_pem(pkcs8::LineEnding::LF)
            .expect("encode test key");

        let message = b"hello heimdall";
        let info = sign(message, pem.as_bytes(), SignAlgorithm::Ed25519, Some("test-key".into())).unwrap();
        assert_eq!(info.algorithm, "Ed25519");
        assert_eq!(info.value.len(), 86);
        assert!(!info.value.contains('='));
    }

    #[test]
    fn algorithm_name_round_trips() {
        for alg in [
            SignAlgorithm::Rs256,
            SignAlgorithm::Rs384,
            SignAlgorithm::Rs512,
            SignAlgorithm::Es256,
            SignAlgorithm::Es384,
            SignAlgorithm::Es512,
            SignAlgorithm::Ed25519,
        ] {
            assert_eq!(SignAlgorithm::from_jws_name(alg.jws_name()), Some(alg));
        }
        assert_eq!(SignAlgorithm::from_jws_name("bogus"), None);
    }

    #[test]
    fn embedding_inserts_top_level_signature_sibling() {
        let mut doc = json!({ "components": [] });
        let info = SignatureInfo {
            algorithm: "Ed25519".to_string(),
            key_id: None,
            value: "abc".to_string(),
            public_key: Some(json!({ "kty": "OKP" })),
            certificate_chain: None,
        };
        embed_signature(&mut doc, &info);
        assert_eq!(doc["signature"]["algorithm"], "Ed25519");
        assert!(doc.get("components").is_some());
    }
}
