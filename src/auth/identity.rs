//! Client identity: an ECDSA key pair and the Client ID derived from it.
//!
//! A Client ID has the form
//!
//! ```text
//! WebCrypto-raw.EC.<curve>$<base64 of the raw public key>
//! ```
//!
//! where the raw public key is the uncompressed SEC1 point (`0x04 || X || Y`).
//! The ID is a pure function of the curve and public key, so two processes
//! holding the same key pair always agree on it.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use ring::rand::SystemRandom;
use ring::signature::{
    EcdsaKeyPair, EcdsaSigningAlgorithm, EcdsaVerificationAlgorithm, KeyPair, UnparsedPublicKey,
    ECDSA_P256_SHA256_FIXED, ECDSA_P256_SHA256_FIXED_SIGNING, ECDSA_P384_SHA384_FIXED,
    ECDSA_P384_SHA384_FIXED_SIGNING,
};
use thiserror::Error;
use zeroize::Zeroizing;

use crate::core::constants::{CLIENT_ID_PREFIX, CLIENT_ID_SEPARATOR};

/// Key handling failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentityError {
    /// The curve name is not one we support.
    #[error("unsupported curve: {0}")]
    UnsupportedCurve(String),

    /// The key material was rejected.
    #[error("key rejected: {0}")]
    KeyRejected(String),

    /// The system random source failed.
    #[error("key generation failed")]
    Generation,

    /// A Client ID string could not be parsed.
    #[error("malformed client id: {0}")]
    MalformedClientId(String),
}

/// The signing function failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct SignError(String);

impl SignError {
    /// Create an error with a description.
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Supported elliptic curves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Curve {
    /// NIST P-256 with SHA-256.
    P256,
    /// NIST P-384 with SHA-384.
    P384,
}

impl Curve {
    /// The name used inside a Client ID.
    pub fn name(self) -> &'static str {
        match self {
            Curve::P256 => "P-256",
            Curve::P384 => "P-384",
        }
    }

    fn signing(self) -> &'static EcdsaSigningAlgorithm {
        match self {
            Curve::P256 => &ECDSA_P256_SHA256_FIXED_SIGNING,
            Curve::P384 => &ECDSA_P384_SHA384_FIXED_SIGNING,
        }
    }

    fn verification(self) -> &'static EcdsaVerificationAlgorithm {
        match self {
            Curve::P256 => &ECDSA_P256_SHA256_FIXED,
            Curve::P384 => &ECDSA_P384_SHA384_FIXED,
        }
    }
}

impl FromStr for Curve {
    type Err = IdentityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "P-256" => Ok(Curve::P256),
            "P-384" => Ok(Curve::P384),
            other => Err(IdentityError::UnsupportedCurve(other.to_owned())),
        }
    }
}

/// A stable identifier derived from a public key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientId(String);

/// Derive the Client ID of `public_key` on `curve`.
pub fn client_id(curve: Curve, public_key: &[u8]) -> ClientId {
    ClientId(format!(
        "{CLIENT_ID_PREFIX}{}{CLIENT_ID_SEPARATOR}{}",
        curve.name(),
        BASE64.encode(public_key)
    ))
}

impl ClientId {
    /// The textual form.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Split the ID back into its curve and raw public key.
    pub fn parse(&self) -> Result<(Curve, Vec<u8>), IdentityError> {
        let malformed = || IdentityError::MalformedClientId(self.0.clone());

        let rest = self.0.strip_prefix(CLIENT_ID_PREFIX).ok_or_else(malformed)?;
        let (curve, key) = rest.split_once(CLIENT_ID_SEPARATOR).ok_or_else(malformed)?;
        let curve: Curve = curve.parse()?;
        let key = BASE64.decode(key).map_err(|_| malformed())?;
        Ok((curve, key))
    }

    /// Check `signature` over `payload` against the key encoded in this ID.
    pub fn verify(&self, payload: &[u8], signature: &[u8]) -> bool {
        let Ok((curve, key)) = self.parse() else {
            return false;
        };
        UnparsedPublicKey::new(curve.verification(), key)
            .verify(payload, signature)
            .is_ok()
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ClientId {
    type Err = IdentityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let id = ClientId(s.to_owned());
        id.parse()?;
        Ok(id)
    }
}

/// Produces signatures for the proof-of-possession handshake.
///
/// Implementations may suspend, e.g. to call out to a hardware key store.
#[async_trait]
pub trait Signer: Send + Sync + 'static {
    /// Sign `payload`.
    async fn sign(&self, payload: &[u8]) -> Result<Vec<u8>, SignError>;
}

/// Adapts an async closure into a [`Signer`].
///
/// ```ignore
/// let signer = FnSigner(|payload: Vec<u8>| async move { remote_sign(payload).await });
/// ```
#[derive(Clone)]
pub struct FnSigner<F>(pub F);

impl<F> fmt::Debug for FnSigner<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FnSigner")
    }
}

#[async_trait]
impl<F, Fut> Signer for FnSigner<F>
where
    F: Fn(Vec<u8>) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = Result<Vec<u8>, SignError>> + Send + 'static,
{
    async fn sign(&self, payload: &[u8]) -> Result<Vec<u8>, SignError> {
        (self.0)(payload.to_vec()).await
    }
}

/// An ECDSA key pair held in process memory.
///
/// Signatures use the fixed-width `r || s` encoding.
pub struct ClientIdentity {
    curve: Curve,
    key_pair: EcdsaKeyPair,
    rng: SystemRandom,
}

impl ClientIdentity {
    /// Generate a fresh key pair.
    pub fn generate(curve: Curve) -> Result<Self, IdentityError> {
        let pkcs8 = Self::generate_pkcs8(curve)?;
        Self::from_pkcs8(curve, &pkcs8)
    }

    /// Generate a PKCS#8 document suitable for [`ClientIdentity::from_pkcs8`].
    pub fn generate_pkcs8(curve: Curve) -> Result<Zeroizing<Vec<u8>>, IdentityError> {
        let rng = SystemRandom::new();
        let document = EcdsaKeyPair::generate_pkcs8(curve.signing(), &rng)
            .map_err(|_| IdentityError::Generation)?;
        Ok(Zeroizing::new(document.as_ref().to_vec()))
    }

    /// Load a key pair from a PKCS#8 document.
    pub fn from_pkcs8(curve: Curve, pkcs8: &[u8]) -> Result<Self, IdentityError> {
        let rng = SystemRandom::new();
        let key_pair = EcdsaKeyPair::from_pkcs8(curve.signing(), pkcs8, &rng)
            .map_err(|e| IdentityError::KeyRejected(e.to_string()))?;
        Ok(Self {
            curve,
            key_pair,
            rng,
        })
    }

    /// The raw uncompressed public key.
    pub fn public_key(&self) -> &[u8] {
        self.key_pair.public_key().as_ref()
    }

    /// The Client ID of this key pair.
    pub fn client_id(&self) -> ClientId {
        client_id(self.curve, self.public_key())
    }
}

impl fmt::Debug for ClientIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientIdentity")
            .field("curve", &self.curve)
            .field("client_id", &self.client_id().as_str())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Signer for ClientIdentity {
    async fn sign(&self, payload: &[u8]) -> Result<Vec<u8>, SignError> {
        self.key_pair
            .sign(&self.rng, payload)
            .map(|signature| signature.as_ref().to_vec())
            .map_err(|_| SignError::new("ecdsa signing failed"))
    }
}
