//! Canonicalization and JWS/JSF signing.

mod canonical;
mod signer;

pub use canonical::canonicalize;
pub use signer::{embed_signature, sign, SignAlgorithm, SignError};

use serde_json::Value;

/// Verifies `document`'s embedded `signature` against the canonical bytes
/// of everything else in it. The inverse of `sign` + `embed_signature`:
/// strip `signature`, re-canonicalize, recompute, compare.
pub fn verify(document: &Value, public_key_jwk: &Value) -> bool {
    let Some(signature) = document.get("signature") else {
        return false;
    };
    let Some(alg) = signature.get("algorithm").and_then(Value::as_str) else {
        return false;
    };
    let Some(value) = signature.get("value").and_then(Value::as_str) else {
        return false;
    };

    let canonical_bytes = canonicalize(document);
    verify_raw(&canonical_bytes, value, alg, public_key_jwk)
}

fn verify_raw(message: &[u8], value_b64url: &str, alg: &str, jwk: &Value) -> bool {
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use base64::Engine;

    let Ok(sig_bytes) = URL_SAFE_NO_PAD.decode(value_b64url) else {
        return false;
    };

    match alg {
        "Ed25519" => verify_ed25519(message, &sig_bytes, jwk),
        "ES256" => verify_es256(message, &sig_bytes, jwk),
        "ES384" => verify_es384(message, &sig_bytes, jwk),
        "ES512" => verify_es512(message, &sig_bytes, jwk),
        "RS256" => verify_rsa::<sha2::Sha256>(message, &sig_bytes, jwk),
        "RS384" => verify_rsa::<sha2::Sha384>(message, &sig_bytes, jwk),
        "RS512" => verify_rsa::<sha2::Sha512>(message, &sig_bytes, jwk),
        _ => false,
    }
}

fn b64url_field(jwk: &Value, field: &str) -> Option<Vec<u8>> {
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use base64::Engine;
    URL_SAFE_NO_PAD.decode(jwk.get(field)?.as_str()?).ok()
}

fn verify_ed25519(message: &[u8], sig_bytes: &[u8], jwk: &Value) -> bool {
    use ed25519_dalek::{Signature, Verifier, VerifyingKey};

    let Some(x) = b64url_field(jwk, "x") else { return false };
    let Ok(key_bytes) = <[u8; 32]>::try_from(x.as_slice()) else { return false };
    let Ok(verifying_key) = VerifyingKey::from_bytes(&key_bytes) else { return false };
    let Ok(sig) = Signature::from_slice(sig_bytes) else { return false };
    verifying_key.verify(message, &sig).is_ok()
}

fn verify_es256(message: &[u8], sig_bytes: &[u8], jwk: &Value) -> bool {
    use p256::ecdsa::{Signature, VerifyingKey};
    use p256::EncodedPoint;
    use signature::Verifier;

    let (Some(x), Some(y)) = (b64url_field(jwk, "x"), b64url_field(jwk, "y")) else {
        return false;
    };
    let point = EncodedPoint::from_affine_coordinates(x.as_slice().into(), y.as_slice().into(), false);
    let Ok(verifying_key) = VerifyingKey::from_encoded_point(&point) else { return false };
    let Ok(sig) = Signature::from_slice(sig_bytes) else { return false };
    verifying_key.verify(message, &sig).is_ok()
}

fn verify_es384(message: &[u8], sig_bytes: &[u8], jwk: &Value) -> bool {
    use p384::ecdsa::{Signature, VerifyingKey};
    use p384::EncodedPoint;
    use signature::Verifier;

    let (Some(x), Some(y)) = (b64url_field(jwk, "x"), b64url_field(jwk, "y")) else {
        return false;
    };
    let point = EncodedPoint::from_affine_coordinates(x.as_slice().into(), y.as_slice().into(), false);
    let Ok(verifying_key) = VerifyingKey::from_encoded_point(&point) else { return false };
    let Ok(sig) = Signature::from_slice(sig_bytes) else { return false };
    verifying_key.verify(message, &sig).is_ok()
}

fn verify_es512(message: &[u8], sig_bytes: &[u8], jwk: &Value) -> bool {
    use p521::ecdsa::{Signature, VerifyingKey};
    use p521::EncodedPoint;
    use signature::Verifier;

    let (Some(x), Some(y)) = (b64url_field(jwk, "x"), b64url_field(jwk, "y")) else {
        return false;
    };
    let point = EncodedPoint::from_affine_coordinates(x.as_slice().into(), y.as_slice().into(), false);
    let Ok(verifying_key) = VerifyingKey::from_encoded_point(&point) else { return false };
    let Ok(sig) = Signature::from_slice(sig_bytes) else { return false };
    verifying_key.verify(message, &sig).is_ok()
}

fn verify_rsa<D>(message: &[u8], sig_bytes: &[u8], jwk: &Value) -> bool
where
    D: sha2::Digest,
{
    use rsa::pkcs1v15::{Signature, VerifyingKey};
    use rsa::traits::PublicKeyParts;
    use rsa::{BigUint, RsaPublicKey};
    use signature::Verifier;

    let (Some(n), Some(e)) = (b64url_field(jwk, "n"), b64url_field(jwk, "e")) else {
        return false;
    };
    let Ok(public_key) = RsaPublicKey::new(BigUint::from_bytes_be(&n), BigUint::from_bytes_be(&e)) else {
        return false;
    };
    let _ = public_key.n();
    let verifying_key: VerifyingKey<D> = VerifyingKey::new(public_key);
    let Ok(sig) = Signature::try_from(sig_bytes) else { return false };
    verifying_key.verify(message, &sig).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::SigningKey;
    use pkcs8::EncodePrivateKey;
    use serde_json::json;

    #[test]
    fn ed25519_round_trip_sign_embed_verify() {
        let seed = [9u8; 32];
        let signing_key = SigningKey::from_bytes(&seed);
        let pem = signing_key.to_pkcs8_pem(pkcs8::LineEnding::LF).unwrap();

        let mut document = json!({ "bomFormat": "CycloneDX", "components": [] });
        let canonical = canonicalize(&document);
        let info = sign(&canonical, pem.as_bytes(), SignAlgorithm::Ed25519, None).unwrap();
        embed_signature(&mut document, &info);

        let jwk = info.public_key.clone().unwrap();
        assert!(verify(&document, &jwk));

        // Mutating a byte outside `signature` must invalidate the signature.
        document["bomFormat"] = json!("Mutated");
        assert!(!verify(&document, &jwk));
    }

    #[test]
    fn verify_rejects_missing_signature() {
        let document = json!({ "bomFormat": "CycloneDX" });
        assert!(!verify(&document, &json!({})));
    }
}
