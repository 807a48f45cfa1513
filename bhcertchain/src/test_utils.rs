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

//! A lightweight certificate authority for generating certificate hierarchies at runtime.
//!
//! The purpose of this module is being able to programatically generate chains of arbitrary
//! depth, key algorithm and "issuing certificate" URLs, without having to shell out to e.g. the
//! `openssl` tool and without checking in fixtures that expire.
//!
//! Do NOT use this module for production code, but only tests.

use openssl::{
    asn1::Asn1Time,
    bn::{BigNum, MsbOption},
    ec::{EcGroup, EcKey},
    hash::MessageDigest,
    nid::Nid,
    pkey::{PKey, Private},
    rsa::Rsa,
    x509::{
        extension::{
            AuthorityKeyIdentifier, BasicConstraints, ExtendedKeyUsage, KeyUsage,
            SubjectAlternativeName, SubjectKeyIdentifier,
        },
        X509Builder, X509Extension, X509NameBuilder, X509Ref, X509,
    },
};

use crate::{Certificate, PrivateKey};

/// X.509v3
///
/// See [RFC 5280 - section 4.1.2.1](https://datatracker.ietf.org/doc/html/rfc5280#section-4.1.2.1)
const VERSION: i32 = 2;

/// Length of the certificate serial number in bits.
///
/// See [RFC 5280 - section 4.1.2.2](https://datatracker.ietf.org/doc/html/rfc5280#section-4.1.2.2).
const SERIAL_NUMBER_BITS: i32 = 159;

/// Hardcoded duration of the validity period of the generated certificates.
const VALIDITY_PERIOD_IN_DAYS: u32 = 30;

/// Organization put into the subject of every generated certificate.
const ORGANIZATION: &str = "TBTL";

/// Key algorithms supported by the generated certificates.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyAlgorithm {
    /// RSA with a 2048 bit modulus.
    Rsa,
    /// ECDSA on the P-256 curve.
    EcP256,
    /// ECDSA on the P-384 curve.
    EcP384,
    /// Ed25519.
    Ed25519,
}

impl KeyAlgorithm {
    fn digest(self) -> MessageDigest {
        match self {
            Self::Rsa | Self::EcP256 => MessageDigest::sha256(),
            Self::EcP384 => MessageDigest::sha384(),
            // Ed25519 signs the message itself
            Self::Ed25519 => MessageDigest::null(),
        }
    }
}

/// Generate a fresh private key.
pub fn generate_private_key(algorithm: KeyAlgorithm) -> PKey<Private> {
    match algorithm {
        KeyAlgorithm::Rsa => PKey::from_rsa(Rsa::generate(2048).unwrap()).unwrap(),
        KeyAlgorithm::EcP256 => generate_ec_key(Nid::X9_62_PRIME256V1),
        KeyAlgorithm::EcP384 => generate_ec_key(Nid::SECP384R1),
        KeyAlgorithm::Ed25519 => PKey::generate_ed25519().unwrap(),
    }
}

fn generate_ec_key(curve: Nid) -> PKey<Private> {
    let group = EcGroup::from_curve_name(curve).unwrap();
    PKey::from_ec_key(EcKey::generate(&group).unwrap()).unwrap()
}

/// A generated certificate together with its private key.
///
/// CA certificates can issue further certificates, see [`TestCa::issue_intermediate`] and
/// [`TestCa::issue_leaf`].
#[derive(Clone, Debug)]
pub struct TestCa {
    certificate: Certificate,
    pkey: PKey<Private>,
    algorithm: KeyAlgorithm,
}

impl TestCa {
    /// Generate a self-signed root CA with the subject `O=TBTL, CN={common_name}`.
    pub fn root(common_name: &str, algorithm: KeyAlgorithm) -> Self {
        let pkey = generate_private_key(algorithm);

        let mut builder = certificate_builder(common_name, &pkey, None);
        append_ca_extensions(&mut builder);
        let subject_key_identifier = SubjectKeyIdentifier::new()
            .build(&builder.x509v3_context(None, None))
            .unwrap();
        builder.append_extension(subject_key_identifier).unwrap();
        builder.sign(&pkey, algorithm.digest()).unwrap();

        Self::new(builder.build(), pkey, algorithm)
    }

    /// Issue an intermediate CA certificate signed by this CA.
    ///
    /// The `issuer_urls` are put, in order, into the Authority Information Access extension as
    /// the locations of the certificate of this CA.
    pub fn issue_intermediate(
        &self,
        common_name: &str,
        algorithm: KeyAlgorithm,
        issuer_urls: &[&str],
    ) -> Self {
        self.issue(common_name, algorithm, issuer_urls, true)
    }

    /// Issue a leaf (end-entity) TLS server certificate signed by this CA.
    ///
    /// The common name is also used as the DNS subject alternative name.
    pub fn issue_leaf(
        &self,
        common_name: &str,
        algorithm: KeyAlgorithm,
        issuer_urls: &[&str],
    ) -> Self {
        self.issue(common_name, algorithm, issuer_urls, false)
    }

    /// The generated certificate.
    pub fn certificate(&self) -> &Certificate {
        &self.certificate
    }

    /// The private key of the certificate.
    pub fn pkey(&self) -> &PKey<Private> {
        &self.pkey
    }

    /// The private key of the certificate as a [`PrivateKey`].
    pub fn private_key(&self) -> PrivateKey {
        PrivateKey::from_pkey(self.pkey.clone()).unwrap()
    }

    fn new(x509: X509, pkey: PKey<Private>, algorithm: KeyAlgorithm) -> Self {
        Self {
            certificate: Certificate::from_x509(x509).unwrap(),
            pkey,
            algorithm,
        }
    }

    fn issue(
        &self,
        common_name: &str,
        algorithm: KeyAlgorithm,
        issuer_urls: &[&str],
        is_ca: bool,
    ) -> Self {
        let pkey = generate_private_key(algorithm);
        let issuer = self.certificate.x509();

        let mut builder = certificate_builder(common_name, &pkey, Some(issuer));
        if is_ca {
            append_ca_extensions(&mut builder);
        } else {
            append_leaf_extensions(&mut builder, issuer, common_name);
        }

        let subject_key_identifier = SubjectKeyIdentifier::new()
            .build(&builder.x509v3_context(Some(issuer), None))
            .unwrap();
        builder.append_extension(subject_key_identifier).unwrap();
        let authority_key_identifier = AuthorityKeyIdentifier::new()
            .keyid(false)
            .issuer(false)
            .build(&builder.x509v3_context(Some(issuer), None))
            .unwrap();
        builder.append_extension(authority_key_identifier).unwrap();

        if !issuer_urls.is_empty() {
            let value = issuer_urls
                .iter()
                .map(|url| format!("caIssuers;URI:{url}"))
                .collect::<Vec<_>>()
                .join(",");
            // `openssl` has no typed builder for the Authority Information Access extension
            #[allow(deprecated)]
            let authority_info_access = X509Extension::new_nid(
                None,
                Some(&builder.x509v3_context(Some(issuer), None)),
                Nid::INFO_ACCESS,
                &value,
            )
            .unwrap();
            builder.append_extension(authority_info_access).unwrap();
        }

        builder.sign(&self.pkey, self.algorithm.digest()).unwrap();

        Self::new(builder.build(), pkey, algorithm)
    }
}

/// Generate a chain with the given number of intermediates, all keys of the same algorithm.
///
/// The chain is ordered from the leaf (`leaf.test`) to the root (`Test Root`), and has
/// `intermediates + 2` elements.  Intermediate `i` (counting from the root) is called
/// `Test Intermediate {i}`.
pub fn generate_chain(intermediates: usize, algorithm: KeyAlgorithm) -> Vec<TestCa> {
    let mut chain = vec![TestCa::root("Test Root", algorithm)];
    for i in 1..=intermediates {
        let issuer = &chain[chain.len() - 1];
        let intermediate =
            issuer.issue_intermediate(&format!("Test Intermediate {i}"), algorithm, &[]);
        chain.push(intermediate);
    }
    let leaf = chain[chain.len() - 1].issue_leaf("leaf.test", algorithm, &[]);
    chain.push(leaf);

    chain.reverse();
    chain
}

fn certificate_builder(
    common_name: &str,
    pkey: &PKey<Private>,
    issuer: Option<&X509Ref>,
) -> X509Builder {
    let mut name = X509NameBuilder::new().unwrap();
    name.append_entry_by_nid(Nid::ORGANIZATIONNAME, ORGANIZATION)
        .unwrap();
    name.append_entry_by_nid(Nid::COMMONNAME, common_name)
        .unwrap();
    let name = name.build();

    let mut serial = BigNum::new().unwrap();
    serial
        .rand(SERIAL_NUMBER_BITS, MsbOption::MAYBE_ZERO, false)
        .unwrap();
    let serial_number = serial.to_asn1_integer().unwrap();

    let mut builder = X509::builder().unwrap();
    builder.set_version(VERSION).unwrap();
    builder.set_serial_number(&serial_number).unwrap();
    builder.set_pubkey(pkey).unwrap();
    builder.set_subject_name(&name).unwrap();
    match issuer {
        Some(issuer) => builder.set_issuer_name(issuer.subject_name()).unwrap(),
        None => builder.set_issuer_name(&name).unwrap(),
    }
    builder
        .set_not_before(&Asn1Time::days_from_now(0).unwrap())
        .unwrap();
    builder
        .set_not_after(&Asn1Time::days_from_now(VALIDITY_PERIOD_IN_DAYS).unwrap())
        .unwrap();

    builder
}

fn append_ca_extensions(builder: &mut X509Builder) {
    let basic_constraints = BasicConstraints::new().critical().ca().build().unwrap();
    builder.append_extension(basic_constraints).unwrap();

    let key_usage = KeyUsage::new()
        .critical()
        .key_cert_sign()
        .crl_sign()
        .build()
        .unwrap();
    builder.append_extension(key_usage).unwrap();
}

fn append_leaf_extensions(builder: &mut X509Builder, issuer: &X509Ref, common_name: &str) {
    let basic_constraints = BasicConstraints::new().build().unwrap();
    builder.append_extension(basic_constraints).unwrap();

    let key_usage = KeyUsage::new()
        .critical()
        .digital_signature()
        .key_encipherment()
        .build()
        .unwrap();
    builder.append_extension(key_usage).unwrap();

    let extended_key_usage = ExtendedKeyUsage::new().server_auth().build().unwrap();
    builder.append_extension(extended_key_usage).unwrap();

    let subject_alternative_name = SubjectAlternativeName::new()
        .dns(common_name)
        .build(&builder.x509v3_context(Some(issuer), None))
        .unwrap();
    builder.append_extension(subject_alternative_name).unwrap();
}
