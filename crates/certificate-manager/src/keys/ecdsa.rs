//! Abstraction layer around the [`ecdsa`] crate. This module provides types
//! which abstract away the generation of ECDSA keys on the NIST P-256 curve,
//! used to sign certificate signing requests with `SHA256withECDSA`.
use p256::{NistP256, pkcs8::DecodePrivateKey};
use rand_core::{CryptoRngCore, OsRng};
use snafu::{ResultExt, Snafu, ensure};
use tracing::instrument;

use crate::keys::CertificateKeypair;

/// P-256 is the only supported curve, so this is the only valid key size.
pub const KEY_SIZE: usize = 256;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display(
        "EC key size of {key_size} bits is not supported, only P-256 ({KEY_SIZE} bits) is available"
    ))]
    UnsupportedKeySize { key_size: usize },

    #[snafu(display("failed to deserialize ECDSA key from DER-encoded PKCS8"))]
    DeserializeKeyFromDer { source: p256::pkcs8::Error },
}

#[derive(Debug)]
pub struct SigningKey(p256::ecdsa::SigningKey);

impl CertificateKeypair for SigningKey {
    type Error = Error;
    type Signature = ecdsa::der::Signature<NistP256>;
    type SigningKey = p256::ecdsa::SigningKey;
    type VerifyingKey = p256::ecdsa::VerifyingKey;

    #[instrument(name = "create_ecdsa_signing_key")]
    fn new(key_size: usize) -> Result<Self> {
        let mut csprng = OsRng;
        Self::new_with_rng(&mut csprng, key_size)
    }

    #[instrument(name = "create_ecdsa_signing_key_custom_rng", skip(rng))]
    fn new_with_rng<Rng>(rng: &mut Rng, key_size: usize) -> Result<Self>
    where
        Rng: CryptoRngCore + Sized,
    {
        ensure!(key_size == KEY_SIZE, UnsupportedKeySizeSnafu { key_size });

        let signing_key = p256::ecdsa::SigningKey::random(rng);
        Ok(Self(signing_key))
    }

    fn signing_key(&self) -> &Self::SigningKey {
        &self.0
    }

    fn verifying_key(&self) -> Self::VerifyingKey {
        *self.0.verifying_key()
    }

    #[instrument(name = "create_ecdsa_signing_key_from_pkcs8_der", skip(input))]
    fn from_pkcs8_der(input: &[u8]) -> Result<Self, Self::Error> {
        let signing_key =
            p256::ecdsa::SigningKey::from_pkcs8_der(input).context(DeserializeKeyFromDerSnafu)?;

        Ok(Self(signing_key))
    }

    fn algorithm_name() -> &'static str {
        "EC"
    }

    fn key_size(&self) -> usize {
        KEY_SIZE
    }
}
