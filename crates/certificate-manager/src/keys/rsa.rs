//! Abstraction layer around the [`rsa`] crate. This module provides types
//! which abstract away the generation of RSA keys used to sign certificate
//! signing requests with `SHA256withRSA`.
use rand_core::{CryptoRngCore, OsRng};
use rsa::{RsaPrivateKey, pkcs8::DecodePrivateKey, traits::PublicKeyParts};
use signature::Keypair;
use snafu::{ResultExt, Snafu, ensure};
use tracing::instrument;

use crate::keys::CertificateKeypair;

/// The smallest RSA key size in bits this crate generates.
pub const MIN_KEY_SIZE: usize = 1024;

/// The largest RSA key size in bits this crate generates.
pub const MAX_KEY_SIZE: usize = 8192;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, PartialEq, Snafu)]
pub enum Error {
    #[snafu(display(
        "RSA key size of {key_size} bits is outside of the supported range {MIN_KEY_SIZE}..={MAX_KEY_SIZE}"
    ))]
    UnsupportedKeySize { key_size: usize },

    #[snafu(display("failed to create RSA key"))]
    CreateKey { source: rsa::Error },

    #[snafu(display("failed to deserialize the signing (private) key from DER-encoded PKCS8"))]
    DeserializeSigningKey { source: rsa::pkcs8::Error },
}

#[derive(Debug)]
pub struct SigningKey(rsa::pkcs1v15::SigningKey<sha2::Sha256>);

impl CertificateKeypair for SigningKey {
    type Error = Error;
    type Signature = rsa::pkcs1v15::Signature;
    type SigningKey = rsa::pkcs1v15::SigningKey<sha2::Sha256>;
    type VerifyingKey = rsa::pkcs1v15::VerifyingKey<sha2::Sha256>;

    /// Generates a new RSA key with the default random-number generator
    /// [`OsRng`].
    ///
    /// It should be noted that the generation of the key takes longer for
    /// larger key sizes. The generation of an RSA key with a key size of
    /// `4096` can take up to multiple seconds.
    #[instrument(name = "create_rsa_signing_key")]
    fn new(key_size: usize) -> Result<Self> {
        let mut csprng = OsRng;
        Self::new_with_rng(&mut csprng, key_size)
    }

    #[instrument(name = "create_rsa_signing_key_custom_rng", skip(rng))]
    fn new_with_rng<Rng>(rng: &mut Rng, key_size: usize) -> Result<Self>
    where
        Rng: CryptoRngCore + ?Sized,
    {
        ensure!(
            (MIN_KEY_SIZE..=MAX_KEY_SIZE).contains(&key_size),
            UnsupportedKeySizeSnafu { key_size }
        );

        let private_key = RsaPrivateKey::new(rng, key_size).context(CreateKeySnafu)?;
        let signing_key = rsa::pkcs1v15::SigningKey::<sha2::Sha256>::new(private_key);

        Ok(Self(signing_key))
    }

    fn signing_key(&self) -> &Self::SigningKey {
        &self.0
    }

    fn verifying_key(&self) -> Self::VerifyingKey {
        self.0.verifying_key()
    }

    #[instrument(name = "create_rsa_signing_key_from_pkcs8_der", skip(input))]
    fn from_pkcs8_der(input: &[u8]) -> Result<Self, Self::Error> {
        let private_key =
            RsaPrivateKey::from_pkcs8_der(input).context(DeserializeSigningKeySnafu)?;
        let signing_key = rsa::pkcs1v15::SigningKey::<sha2::Sha256>::new(private_key);

        Ok(Self(signing_key))
    }

    fn algorithm_name() -> &'static str {
        "RSA"
    }

    fn key_size(&self) -> usize {
        let private_key: &RsaPrivateKey = self.0.as_ref();
        private_key.size() * 8
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(0)]
    #[case(512)]
    #[case(1023)]
    #[case(8193)]
    fn reject_unsupported_key_sizes(#[case] key_size: usize) {
        let error = SigningKey::new(key_size).expect_err("key size must be rejected");
        assert_eq!(error, Error::UnsupportedKeySize { key_size });
    }

    #[test]
    fn generated_key_round_trips_through_pkcs8() {
        let key = SigningKey::new(MIN_KEY_SIZE).expect("failed to create RSA key");
        assert_eq!(key.key_size(), MIN_KEY_SIZE);

        let der = key.to_private_key_der().expect("failed to encode private key");
        let decoded = SigningKey::from_pkcs8_der(&der).expect("failed to decode private key");

        assert_eq!(
            decoded.subject_public_key_info().unwrap(),
            key.subject_public_key_info().unwrap()
        );
    }

    #[test]
    fn garbage_is_not_a_private_key() {
        let error = SigningKey::from_pkcs8_der(b"not a key").expect_err("must fail to decode");
        assert!(matches!(error, Error::DeserializeSigningKey { .. }));
    }
}
