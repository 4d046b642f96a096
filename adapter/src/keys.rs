use ed25519_dalek::{Signer, SigningKey};
use rand::rngs::OsRng;
use rand::RngCore;
use secrecy::{ExposeSecret, SecretString};
use stellar_xdr::curr::{BytesM, DecoratedSignature, Signature, SignatureHint};
use zeroize::Zeroizing;

use crate::envelope::Envelope;
use crate::errors::{AdapterError, AdapterResult};

/// Ed25519 key pair in StrKey form. The secret never appears in `Debug` output.
#[derive(Debug, Clone)]
pub struct KeyPair {
    public_key: String,
    secret_key: SecretString,
}

impl KeyPair {
    pub fn public_key(&self) -> &str {
        &self.public_key
    }

    pub fn secret_key(&self) -> &SecretString {
        &self.secret_key
    }

    /// Plain `S...` seed. Only exported on explicit request.
    pub fn expose_secret(&self) -> &str {
        self.secret_key.expose_secret()
    }
}

/// Generates, loads and signs with account keys.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeyManager;

impl KeyManager {
    pub fn new() -> Self {
        Self
    }

    pub fn generate(&self) -> KeyPair {
        let mut seed = Zeroizing::new([0u8; 32]);
        OsRng.fill_bytes(&mut seed[..]);
        let signing_key = SigningKey::from_bytes(&seed);
        keypair_from_signing_key(&signing_key)
    }

    /// Load a key pair from an `S...` secret seed.
    pub fn load(&self, secret: &SecretString) -> AdapterResult<KeyPair> {
        let signing_key = signing_key_from_secret(secret)?;
        Ok(keypair_from_signing_key(&signing_key))
    }

    pub fn derive_public(&self, secret: &SecretString) -> AdapterResult<String> {
        let signing_key = signing_key_from_secret(secret)?;
        Ok(public_address(&signing_key))
    }

    /// Append a decorated signature over the envelope's network-bound hash.
    pub fn sign(&self, mut envelope: Envelope, secret: &SecretString) -> AdapterResult<Envelope> {
        let signing_key = signing_key_from_secret(secret)?;
        let hash = envelope.hash()?;
        let signature = signing_key.sign(&hash);

        let public = signing_key.verifying_key().to_bytes();
        let mut hint = [0u8; 4];
        hint.copy_from_slice(&public[28..]);

        envelope.push_signature(DecoratedSignature {
            hint: SignatureHint(hint),
            signature: Signature(BytesM::try_from(signature.to_bytes().to_vec())?),
        })?;
        Ok(envelope)
    }
}

fn signing_key_from_secret(secret: &SecretString) -> AdapterResult<SigningKey> {
    let seed = stellar_strkey::ed25519::PrivateKey::from_string(secret.expose_secret().trim())
        .map_err(|_| {
            AdapterError::InvalidKeyMaterial("Secret key is not a valid S... seed".to_string())
        })?;
    let seed = Zeroizing::new(seed.0);
    Ok(SigningKey::from_bytes(&seed))
}

fn public_address(signing_key: &SigningKey) -> String {
    stellar_strkey::ed25519::PublicKey(signing_key.verifying_key().to_bytes()).to_string()
}

fn keypair_from_signing_key(signing_key: &SigningKey) -> KeyPair {
    let seed = Zeroizing::new(signing_key.to_bytes());
    let secret = stellar_strkey::ed25519::PrivateKey(*seed).to_string();
    KeyPair {
        public_key: public_address(signing_key),
        secret_key: SecretString::from(secret),
    }
}
