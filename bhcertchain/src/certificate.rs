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
    nid::Nid,
    x509::{X509NameRef, X509},
};
use x509_parser::extensions::{GeneralName, ParsedExtension};

use crate::{Error, Result};

/// Object identifier of the `caIssuers` access method in the Authority Information Access
/// extension.
///
/// See [RFC 5280 - section 4.2.2.1](https://datatracker.ietf.org/doc/html/rfc5280#section-4.2.2.1)
const CA_ISSUERS_OID: &str = "1.3.6.1.5.5.7.48.2";

/// A decoded X.509 certificate, together with the metadata needed to reconstruct chains.
///
/// The identity of a certificate is the canonical string form of its Subject distinguished name,
/// see [`Certificate::subject`].  Two certificates with the same subject are treated as the same
/// certificate when chains are assembled, even when they differ otherwise (e.g. a renewed
/// certificate with an unchanged subject).
///
/// A [`Certificate`] is immutable once decoded.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Certificate {
    x509: X509,
    der: Vec<u8>,
    subject: String,
    issuer: String,
    subject_serial: Option<String>,
    is_ca: bool,
    issuer_urls: Vec<String>,
}

impl Certificate {
    /// Decode a single certificate in the _DER_ format.
    pub fn from_der(der: &[u8]) -> Result<Self> {
        let x509 = X509::from_der(der)
            .foreign_err(|| Error::Decode("invalid DER certificate".to_owned()))?;

        Self::from_x509(x509)
    }

    /// Wrap an already parsed [`X509`] certificate.
    pub fn from_x509(x509: X509) -> Result<Self> {
        let der = x509
            .to_der()
            .foreign_err(|| Error::Decode("cannot re-encode certificate".to_owned()))?;

        let (subject, issuer, is_ca, issuer_urls) = {
            let (_, parsed) = x509_parser::parse_x509_certificate(&der)
                .foreign_err(|| Error::Decode("malformed X.509 structure".to_owned()))?;

            (
                parsed.subject().to_string(),
                parsed.issuer().to_string(),
                parsed.is_ca(),
                issuing_certificate_urls(&parsed),
            )
        };
        let subject_serial = name_entry(x509.subject_name(), Nid::SERIALNUMBER);

        Ok(Self {
            x509,
            der,
            subject,
            issuer,
            subject_serial,
            is_ca,
            issuer_urls,
        })
    }

    /// Canonical string of the Subject distinguished name, e.g. `C=HR, O=TBTL, CN=leaf`.
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Canonical string of the Issuer distinguished name.
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// The first Common Name (CN) attribute of the subject, if any.
    pub fn common_name(&self) -> Option<String> {
        name_entry(self.x509.subject_name(), Nid::COMMONNAME)
    }

    /// The certificate serial number as a decimal string.
    pub fn serial_number(&self) -> Result<String> {
        let serial = self
            .x509
            .serial_number()
            .to_bn()
            .and_then(|bn| bn.to_dec_str())
            .foreign_err(|| Error::Encode)
            .ctx(|| "cannot convert serial number")?;

        Ok(serial.to_string())
    }

    /// Whether the basic constraints extension marks this certificate as a CA.
    pub fn is_ca(&self) -> bool {
        self.is_ca
    }

    /// Whether this certificate is a root CA, i.e. it is a CA and it is self-signed.
    pub fn is_root_ca(&self) -> bool {
        is_root_ca(self)
    }

    /// The "issuing certificate" URLs (`caIssuers` of the Authority Information Access
    /// extension), in the order they appear in the certificate.
    pub fn issuer_urls(&self) -> &[String] {
        &self.issuer_urls
    }

    /// The raw certificate in the _DER_ format.
    pub fn der(&self) -> &[u8] {
        &self.der
    }

    /// The underlying OpenSSL certificate.
    pub fn x509(&self) -> &X509 {
        &self.x509
    }

    /// Key used to tell leaf certificates apart: the subject, extended with the subject
    /// `serialNumber` attribute when present.
    pub(crate) fn leaf_identity(&self) -> String {
        match &self.subject_serial {
            Some(serial) => format!("{}{}", self.subject, serial),
            None => self.subject.clone(),
        }
    }
}

/// Returns `true` if the certificate is marked as a CA and its Subject and Issuer are the same.
pub fn is_root_ca(cert: &Certificate) -> bool {
    cert.is_ca && cert.subject == cert.issuer
}

fn issuing_certificate_urls(parsed: &x509_parser::certificate::X509Certificate<'_>) -> Vec<String> {
    let mut urls = Vec::new();

    for extension in parsed.extensions() {
        if let ParsedExtension::AuthorityInfoAccess(aia) = extension.parsed_extension() {
            for access in &aia.accessdescs {
                if access.access_method.to_id_string() != CA_ISSUERS_OID {
                    continue;
                }
                if let GeneralName::URI(uri) = &access.access_location {
                    if !uri.is_empty() {
                        urls.push(uri.to_string());
                    }
                }
            }
        }
    }

    urls
}

fn name_entry(name: &X509NameRef, nid: Nid) -> Option<String> {
    name.entries_by_nid(nid)
        .next()
        .and_then(|entry| entry.data().to_string().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{KeyAlgorithm, TestCa};

    #[test]
    fn test_metadata_of_generated_chain() {
        let root = TestCa::root("Metadata Root", KeyAlgorithm::EcP256);
        let intermediate = root.issue_intermediate(
            "Metadata Intermediate",
            KeyAlgorithm::EcP256,
            &["http://pki.test/root.crt"],
        );
        let leaf = intermediate.issue_leaf("metadata.test", KeyAlgorithm::EcP256, &[]);

        let root = root.certificate();
        assert!(root.is_ca());
        assert!(root.is_root_ca());
        assert_eq!(root.subject(), root.issuer());
        assert!(root.issuer_urls().is_empty());

        let intermediate = intermediate.certificate();
        assert!(intermediate.is_ca());
        assert!(!intermediate.is_root_ca());
        assert_eq!(intermediate.issuer(), root.subject());
        assert_eq!(intermediate.issuer_urls(), ["http://pki.test/root.crt"]);

        let leaf = leaf.certificate();
        assert!(!leaf.is_ca());
        assert!(!leaf.is_root_ca());
        assert!(leaf.subject().contains("CN=metadata.test"));
        assert_eq!(leaf.common_name().as_deref(), Some("metadata.test"));
        assert_eq!(leaf.leaf_identity(), leaf.subject());
    }

    #[test]
    fn test_common_name_keeps_non_ascii_characters() {
        let root = TestCa::root("Čvorišće Root", KeyAlgorithm::EcP256);

        assert_eq!(
            root.certificate().common_name().as_deref(),
            Some("Čvorišće Root")
        );
    }

    #[test]
    fn test_from_der_round_trip() {
        let root = TestCa::root("Der Root", KeyAlgorithm::EcP256);
        let original = root.certificate();

        let decoded = Certificate::from_der(original.der()).unwrap();

        assert_eq!(&decoded, original);
        assert_eq!(
            decoded.serial_number().unwrap(),
            original.serial_number().unwrap()
        );
    }

    #[test]
    fn test_from_der_rejects_garbage() {
        let err = Certificate::from_der(&[0x30, 0x03, 0x02, 0x01]).unwrap_err();
        assert!(matches!(err.error, Error::Decode(_)));
    }
}
