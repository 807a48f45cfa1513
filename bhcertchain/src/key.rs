// Copyright (C) 2020-2025  The Blockhouse Technology Limited (TBTL).
//
// This program is free software: you can redistribute it and/or modify it
// under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or (at your
// option) any later version.
//
// This program is distributed in the hope that it will be useful, but
// WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU Affero General Public
// License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

use bherror::traits::{ErrorContext as _, ForeignError as _};
use openssl::{
    ec::EcKey,
    pkey::{Id, PKey, Private},
    rsa::Rsa,
    ssl::{SslContext, SslMethod},
};

use crate::{Certificate, Error, Result};

/// A decoded private key of one of the supported algorithms.
#[derive(Clone, Debug)]
pub enum PrivateKey {
    /// RSA private key.
    Rsa(Rsa<Private>),
    /// ECDSA private key on any named curve (e.g. P-256, P-384).
    Ec(EcKey<Private>),
    /// Ed25519 private key.
    Ed25519(PKey<Private>),
}

impl PrivateKey {
    /// Classify a generic OpenSSL private key.
    ///
    /// Returns [`Error::UnsupportedKey`] for algorithms other than RSA, ECDSA and Ed25519.
    pub fn from_pkey(pkey: PKey<Private>) -> Result<Self> {
        match pkey.id() {
            Id::RSA => pkey
                .rsa()
                .map(Self::Rsa)
                .foreign_err(|| Error::KeyDecode("invalid RSA key".to_owned())),
            Id::EC => pkey
                .ec_key()
                .map(Self::Ec)
                .foreign_err(|| Error::KeyDecode("invalid EC key".to_owned())),
            Id::ED25519 => Ok(Self::Ed25519(pkey)),
            other => Err(bherror::Error::root(Error::UnsupportedKey))
                .ctx(|| format!("key type {}", other.as_raw())),
        }
    }

    /// The PEM label matching the encoding produced by [`PrivateKey::to_pem`].
    pub fn pem_label(&self) -> &'static str {
        match self {
            Self::Rsa(_) => "RSA PRIVATE KEY",
            Self::Ec(_) => "EC PRIVATE KEY",
            Self::Ed25519(_) => "PRIVATE KEY",
        }
    }

    /// Encode the key as PEM: PKCS1 for RSA, SEC1 for ECDSA and PKCS8 for Ed25519.
    pub fn to_pem(&self) -> Result<Vec<u8>> {
        match self {
            Self::Rsa(rsa) => rsa.private_key_to_pem(),
            Self::Ec(ec) => ec.private_key_to_pem(),
            Self::Ed25519(pkey) => pkey.private_key_to_pem_pkcs8(),
        }
        .foreign_err(|| Error::Encode)
        .ctx(|| "cannot encode private key as PEM")
    }

    /// Convert into a generic OpenSSL private key.
    pub fn to_pkey(&self) -> Result<PKey<Private>> {
        match self {
            Self::Rsa(rsa) => PKey::from_rsa(rsa.clone()),
            Self::Ec(ec) => PKey::from_ec_key(ec.clone()),
            Self::Ed25519(pkey) => Ok(pkey.clone()),
        }
        .foreign_err(|| Error::Encode)
    }
}

/// Check that the private key belongs to the certificate.
///
/// The certificate and key are installed into a TLS context, exactly as a TLS server would load
/// them, and the TLS library is asked to confirm that they form a pair.  This works the same for
/// every key algorithm.
///
/// Returns [`Error::KeyMismatch`] if they do not form a pair.
pub fn check_cert_and_key(cert: &Certificate, key: &PrivateKey) -> Result<()> {
    let pkey = key.to_pkey()?;

    let mut context = SslContext::builder(SslMethod::tls())
        .foreign_err(|| Error::KeyMismatch)
        .ctx(|| "cannot create TLS context")?;
    context
        .set_certificate(cert.x509())
        .foreign_err(|| Error::KeyMismatch)
        .ctx(|| "certificate rejected")?;
    context
        .set_private_key(&pkey)
        .foreign_err(|| Error::KeyMismatch)
        .ctx(|| "private key rejected")?;
    context
        .check_private_key()
        .foreign_err(|| Error::KeyMismatch)
}

/// Returns `true` if the private key belongs to the certificate.
///
/// See [`check_cert_and_key`].
pub fn verify_cert_and_key(cert: &Certificate, key: &PrivateKey) -> bool {
    check_cert_and_key(cert, key).is_ok()
}
