//! Contains primitives to create private keys, which are used to sign
//! certificate signing requests. These keys are generated per subject and
//! their PKCS#8 encoding is written to disk next to the request.
//!
//! Currently, two algorithms are supported: RSA and ECDSA (on the NIST P-256
//! curve). Both are selected through [`KeyAlgorithm`] in the
//! [`CertificateConfig`](crate::config::CertificateConfig).
//!
//! ```no_run
//! use certificate_manager::keys::{CertificateKeypair, rsa::SigningKey};
//! let key = SigningKey::new(2048).unwrap();
//! ```
//!
//! It should be noted, that the `rsa` crate is currently vulnerable to the
//! Marvin attack. See:
//!
//! - <https://people.redhat.com/~hkario/marvin/>
//! - <https://rustsec.org/advisories/RUSTSEC-2023-0071.html>
use std::fmt::Debug;

use p256::pkcs8::{EncodePrivateKey, LineEnding};
use rand_core::CryptoRngCore;
use signature::{Keypair, Signer};
use x509_cert::spki::{
    EncodePublicKey, SignatureAlgorithmIdentifier, SignatureBitStringEncoding,
    SubjectPublicKeyInfoOwned,
};
use zeroize::Zeroizing;

pub mod ecdsa;
pub mod rsa;

pub trait CertificateKeypair
where
    <Self::SigningKey as Keypair>::VerifyingKey: EncodePublicKey,
    Self: Debug + Sized,
{
    type SigningKey: SignatureAlgorithmIdentifier
        + Keypair
        + Signer<Self::Signature>
        + EncodePrivateKey;
    type Signature: SignatureBitStringEncoding;
    type VerifyingKey: EncodePublicKey;

    type Error: std::error::Error + 'static;

    /// Generates a new key of `key_size` bits with the default random-number
    /// generator [`rand_core::OsRng`].
    fn new(key_size: usize) -> Result<Self, Self::Error>;

    /// Generates a new key of `key_size` bits with a custom random-number
    /// generator.
    fn new_with_rng<Rng>(rng: &mut Rng, key_size: usize) -> Result<Self, Self::Error>
    where
        Rng: CryptoRngCore + Sized;

    /// Returns the signing (private) key half of the keypair.
    fn signing_key(&self) -> &Self::SigningKey;

    /// Returns the verifying (public) half of the keypair.
    fn verifying_key(&self) -> Self::VerifyingKey;

    /// Creates a signing key pair from the DER-encoded PKCS#8 private key.
    fn from_pkcs8_der(input: &[u8]) -> Result<Self, Self::Error>;

    /// The name of the key algorithm such as `RSA` or `EC`.
    fn algorithm_name() -> &'static str;

    /// The key length in bits.
    fn key_size(&self) -> usize;

    /// Encodes the private key as PEM-encoded PKCS#8 (`PRIVATE KEY`).
    fn to_private_key_pem(
        &self,
        line_ending: LineEnding,
    ) -> p256::pkcs8::Result<Zeroizing<String>> {
        self.signing_key().to_pkcs8_pem(line_ending)
    }

    /// Encodes the private key as DER-encoded PKCS#8.
    fn to_private_key_der(&self) -> p256::pkcs8::Result<Zeroizing<Vec<u8>>> {
        let document = self.signing_key().to_pkcs8_der()?;
        Ok(Zeroizing::new(document.as_bytes().to_vec()))
    }

    /// Encodes the public key as PEM-encoded SubjectPublicKeyInfo (`PUBLIC KEY`).
    fn to_public_key_pem(&self, line_ending: LineEnding) -> x509_cert::spki::Result<String> {
        self.verifying_key().to_public_key_pem(line_ending)
    }

    /// Returns the SubjectPublicKeyInfo of the verifying half.
    fn subject_public_key_info(&self) -> x509_cert::spki::Result<SubjectPublicKeyInfoOwned> {
        SubjectPublicKeyInfoOwned::from_key(self.verifying_key())
    }
}
