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

//! Decoding of certificate and private key containers.
//!
//! Each supported container format is a _probe_: a function which either decodes the bytes or
//! reports why they are not in its format.  The probes are tried in a fixed order and the first
//! hit wins.  Only when every probe misses are the reasons concatenated into the returned error.

use std::path::Path;

use bherror::traits::{ErrorContext as _, ForeignError as _};
use openssl::{
    pkcs12::Pkcs12,
    pkcs7::Pkcs7,
    pkey::{PKey, Private},
    x509::X509,
};

use crate::{Certificate, Error, PrivateKey, Result};

/// Separator placed between the failure reasons of the individual probes.
const REASON_SEPARATOR: &str = "   >>   ";

/// Outcome of a single format probe: the decoded value, or the reason the bytes are not in the
/// probed format.
type Probe<T> = std::result::Result<T, String>;

type CertProbe = fn(&[u8], &str) -> Probe<Vec<X509>>;
type KeyProbe = fn(&[u8], &str) -> Probe<PKey<Private>>;

const CERT_PROBES: [(&str, CertProbe); 5] = [
    ("PEM", probe_pem),
    ("DER", probe_der),
    ("PKCS7 PEM", probe_pkcs7_pem),
    ("PKCS7 DER", probe_pkcs7_der),
    ("PKCS12", probe_pkcs12),
];

const KEY_PROBES: [(&str, KeyProbe); 3] = [
    ("PEM", probe_key_pem),
    ("encrypted PKCS8 PEM", probe_key_pkcs8_encrypted),
    ("PKCS12", probe_key_pkcs12),
];

/// Decode DER or PEM encoded certificates from a PKCS1 (plain X.509), PKCS7 or PKCS12 container.
///
/// The `password` is only used for PKCS12 containers.
///
/// Returns [`Error::NoCertificates`] if the input is empty or a container holds no certificates,
/// and [`Error::Decode`] with the failure reason of every format otherwise.
pub fn decode_cert_bytes(bytes: &[u8], password: &str) -> Result<Vec<Certificate>> {
    if is_blank(bytes) {
        return Err(bherror::Error::root(Error::NoCertificates)).ctx(|| "input is empty");
    }

    let mut reasons = Vec::new();
    for (format, probe) in CERT_PROBES {
        match probe(bytes, password) {
            Ok(certs) => {
                tracing::debug!(format, count = certs.len(), "decoded certificates");
                return into_certificates(certs);
            }
            Err(reason) => reasons.push(format!("{format}: {reason}")),
        }
    }

    Err(bherror::Error::root(Error::Decode(
        reasons.join(REASON_SEPARATOR),
    )))
}

/// Decode PEM encoded X.509 certificates.
///
/// If you don't know in what format the data is encoded, use [`decode_cert_bytes`].
pub fn decode_cert_bytes_pem(bytes: &[u8]) -> Result<Vec<Certificate>> {
    probe_pem(bytes, "")
        .map_err(|reason| bherror::Error::root(Error::Decode(reason)))
        .and_then(into_certificates)
}

/// Decode one or more concatenated DER encoded X.509 certificates.
///
/// If you don't know in what format the data is encoded, use [`decode_cert_bytes`].
pub fn decode_cert_bytes_der(bytes: &[u8]) -> Result<Vec<Certificate>> {
    probe_der(bytes, "")
        .map_err(|reason| bherror::Error::root(Error::Decode(reason)))
        .and_then(into_certificates)
}

/// Decode the certificates of a PEM encoded PKCS7 container.
///
/// If you don't know in what format the data is encoded, use [`decode_cert_bytes`].
pub fn decode_cert_bytes_pkcs7_pem(bytes: &[u8]) -> Result<Vec<Certificate>> {
    probe_pkcs7_pem(bytes, "")
        .map_err(|reason| bherror::Error::root(Error::Decode(reason)))
        .and_then(into_certificates)
}

/// Decode the certificates of a DER encoded PKCS7 container.
///
/// If you don't know in what format the data is encoded, use [`decode_cert_bytes`].
pub fn decode_cert_bytes_pkcs7_der(bytes: &[u8]) -> Result<Vec<Certificate>> {
    probe_pkcs7_der(bytes, "")
        .map_err(|reason| bherror::Error::root(Error::Decode(reason)))
        .and_then(into_certificates)
}

/// Decode the certificates of a password protected PKCS12 container.
///
/// The certificate belonging to the private key comes first, followed by the CA certificates.
///
/// If you don't know in what format the data is encoded, use [`decode_cert_bytes`].
pub fn decode_cert_bytes_pkcs12(bytes: &[u8], password: &str) -> Result<Vec<Certificate>> {
    probe_pkcs12(bytes, password)
        .map_err(|reason| bherror::Error::root(Error::Decode(reason)))
        .and_then(into_certificates)
}

/// Read a file with certificates and decode it with [`decode_cert_bytes`].
pub fn decode_cert_file(path: impl AsRef<Path>, password: &str) -> Result<Vec<Certificate>> {
    let bytes = read_file(path.as_ref())?;
    decode_cert_bytes(&bytes, password)
}

/// Decode a private key from a PEM (PKCS1, SEC1 or PKCS8), an encrypted PKCS8 PEM or a PKCS12
/// container.
///
/// The `password` is used for encrypted PKCS8 and for PKCS12 containers.
pub fn decode_key_bytes(bytes: &[u8], password: &str) -> Result<PrivateKey> {
    let mut reasons = Vec::new();
    for (format, probe) in KEY_PROBES {
        match probe(bytes, password) {
            Ok(pkey) => {
                tracing::debug!(format, "decoded private key");
                return PrivateKey::from_pkey(pkey);
            }
            Err(reason) => reasons.push(format!("{format}: {reason}")),
        }
    }

    Err(bherror::Error::root(Error::KeyDecode(
        reasons.join(REASON_SEPARATOR),
    )))
}

/// Read a file with a private key and decode it with [`decode_key_bytes`].
pub fn decode_key_file(path: impl AsRef<Path>, password: &str) -> Result<PrivateKey> {
    let bytes = read_file(path.as_ref())?;
    decode_key_bytes(&bytes, password)
}

/// Encode a certificate as PEM.
pub fn encode_cert_as_pem(cert: &Certificate) -> Result<Vec<u8>> {
    cert.x509()
        .to_pem()
        .foreign_err(|| Error::Encode)
        .ctx(|| "cannot encode certificate as PEM")
}

fn read_file(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).foreign_err(|| Error::Io(path.display().to_string()))
}

fn into_certificates(certs: Vec<X509>) -> Result<Vec<Certificate>> {
    if certs.is_empty() {
        return Err(bherror::Error::root(Error::NoCertificates));
    }

    certs.into_iter().map(Certificate::from_x509).collect()
}

fn is_blank(bytes: &[u8]) -> bool {
    bytes.iter().all(u8::is_ascii_whitespace)
}

fn probe_pem(bytes: &[u8], _password: &str) -> Probe<Vec<X509>> {
    if !contains(bytes, b"-----BEGIN") {
        return Err("not PEM data".to_owned());
    }

    let certs = X509::stack_from_pem(bytes).map_err(|err| err.to_string())?;
    if certs.is_empty() {
        return Err("no PEM certificate blocks".to_owned());
    }

    Ok(certs)
}

fn probe_der(bytes: &[u8], _password: &str) -> Probe<Vec<X509>> {
    let mut certs = Vec::new();
    let mut rest = bytes;

    while !rest.is_empty() {
        let (remaining, _) =
            x509_parser::parse_x509_certificate(rest).map_err(|err| err.to_string())?;
        let der = &rest[..rest.len() - remaining.len()];
        certs.push(X509::from_der(der).map_err(|err| err.to_string())?);
        rest = remaining;
    }

    Ok(certs)
}

fn probe_pkcs7_pem(bytes: &[u8], _password: &str) -> Probe<Vec<X509>> {
    let blocks = pem_blocks(bytes, "PKCS7");
    if blocks.is_empty() {
        return Err("no PEM PKCS7 blocks".to_owned());
    }

    let mut certs = Vec::new();
    for block in blocks {
        let pkcs7 = Pkcs7::from_pem(block).map_err(|err| err.to_string())?;
        certs.extend(pkcs7_certificates(&pkcs7));
    }

    Ok(certs)
}

fn probe_pkcs7_der(bytes: &[u8], _password: &str) -> Probe<Vec<X509>> {
    let pkcs7 = Pkcs7::from_der(bytes).map_err(|err| err.to_string())?;
    Ok(pkcs7_certificates(&pkcs7))
}

fn pkcs7_certificates(pkcs7: &Pkcs7) -> Vec<X509> {
    pkcs7
        .signed()
        .and_then(|signed| signed.certificates())
        .map(|certs| certs.iter().map(|cert| cert.to_owned()).collect())
        .unwrap_or_default()
}

fn probe_pkcs12(bytes: &[u8], password: &str) -> Probe<Vec<X509>> {
    let parsed = Pkcs12::from_der(bytes)
        .and_then(|pkcs12| pkcs12.parse2(password))
        .map_err(|err| err.to_string())?;

    let mut certs: Vec<X509> = parsed.cert.into_iter().collect();
    if let Some(ca) = parsed.ca {
        certs.extend(ca);
    }

    Ok(certs)
}

fn probe_key_pem(bytes: &[u8], _password: &str) -> Probe<PKey<Private>> {
    if !contains(bytes, b"-----BEGIN") {
        return Err("not a PEM key".to_owned());
    }
    if contains(bytes, b"ENCRYPTED") {
        return Err("encrypted key".to_owned());
    }

    PKey::private_key_from_pem(bytes).map_err(|err| err.to_string())
}

fn probe_key_pkcs8_encrypted(bytes: &[u8], password: &str) -> Probe<PKey<Private>> {
    if !contains(bytes, b"-----BEGIN") {
        return Err("not a PEM key".to_owned());
    }
    if !contains(bytes, b"ENCRYPTED") {
        return Err("unencrypted key".to_owned());
    }

    PKey::private_key_from_pem_passphrase(bytes, password.as_bytes())
        .map_err(|err| err.to_string())
}

fn probe_key_pkcs12(bytes: &[u8], password: &str) -> Probe<PKey<Private>> {
    Pkcs12::from_der(bytes)
        .and_then(|pkcs12| pkcs12.parse2(password))
        .map_err(|err| err.to_string())?
        .pkey
        .ok_or_else(|| "no private key in PKCS12 container".to_owned())
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack
        .windows(needle.len())
        .any(|window| window == needle)
}

/// Splits out every `-----BEGIN {label}-----` ... `-----END {label}-----` block, markers included.
fn pem_blocks<'a>(bytes: &'a [u8], label: &str) -> Vec<&'a [u8]> {
    let begin = format!("-----BEGIN {label}-----");
    let end = format!("-----END {label}-----");

    let mut blocks = Vec::new();
    let mut rest = bytes;
    while let Some(start) = find(rest, begin.as_bytes()) {
        let Some(stop) = find(&rest[start..], end.as_bytes()) else {
            break;
        };
        let stop = start + stop + end.len();
        blocks.push(&rest[start..stop]);
        rest = &rest[stop..];
    }

    blocks
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use openssl::{pkcs12::Pkcs12, stack::Stack, symm::Cipher};

    use super::*;
    use crate::{
        test_utils::{KeyAlgorithm, TestCa},
        verify_cert_and_key,
    };

    const PASSWORD: &str = "1234";

    fn chain() -> Vec<TestCa> {
        let root = TestCa::root("Decode Root", KeyAlgorithm::EcP256);
        let intermediate =
            root.issue_intermediate("Decode Intermediate", KeyAlgorithm::EcP256, &[]);
        let leaf = intermediate.issue_leaf("myserver", KeyAlgorithm::EcP256, &[]);
        vec![leaf, intermediate, root]
    }

    fn pem_bundle(chain: &[TestCa]) -> Vec<u8> {
        chain
            .iter()
            .flat_map(|ca| encode_cert_as_pem(ca.certificate()).unwrap())
            .collect()
    }

    fn pkcs12_bundle(chain: &[TestCa]) -> Vec<u8> {
        let mut ca = Stack::new().unwrap();
        for cert in &chain[1..] {
            ca.push(cert.certificate().x509().clone()).unwrap();
        }

        let mut builder = Pkcs12::builder();
        builder
            .name("myserver")
            .pkey(chain[0].pkey())
            .cert(chain[0].certificate().x509())
            .ca(ca);
        builder.build2(PASSWORD).unwrap().to_der().unwrap()
    }

    fn assert_serials(decoded: &[Certificate], expected: &[TestCa]) {
        assert_eq!(decoded.len(), expected.len());
        for (decoded, expected) in decoded.iter().zip(expected) {
            assert_eq!(
                decoded.serial_number().unwrap(),
                expected.certificate().serial_number().unwrap()
            );
        }
    }

    #[test]
    fn test_decode_cert_bytes_pem() {
        let chain = chain();
        let bytes = pem_bundle(&chain);

        assert_serials(&decode_cert_bytes_pem(&bytes).unwrap(), &chain);
        assert_serials(&decode_cert_bytes(&bytes, "").unwrap(), &chain);
    }

    #[test]
    fn test_decode_cert_bytes_pem_with_extra_newlines() {
        let chain = chain();
        let mut bytes = b"\n\n".to_vec();
        for ca in &chain {
            bytes.extend(encode_cert_as_pem(ca.certificate()).unwrap());
            bytes.extend(b"\n\n\n");
        }

        assert_serials(&decode_cert_bytes(&bytes, "").unwrap(), &chain);
    }

    #[test]
    fn test_decode_cert_bytes_der() {
        let chain = chain();
        let single = chain[0].certificate().der().to_vec();
        let concatenated: Vec<u8> = chain
            .iter()
            .flat_map(|ca| ca.certificate().der().to_vec())
            .collect();

        let decoded = decode_cert_bytes_der(&single).unwrap();
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded[0].common_name().as_deref(), Some("myserver"));

        assert_serials(&decode_cert_bytes(&concatenated, "").unwrap(), &chain);
    }

    #[test]
    fn test_decode_cert_bytes_pkcs7() {
        let chain = chain();
        let mut certs = Stack::new().unwrap();
        for ca in &chain {
            certs.push(ca.certificate().x509().clone()).unwrap();
        }
        // The `openssl` crate cannot build a certs-only structure, so sign an empty payload to get
        // a container carrying the certificates.
        let pkcs7 = Pkcs7::sign(
            chain[0].certificate().x509(),
            chain[0].pkey(),
            &certs,
            b"",
            openssl::pkcs7::Pkcs7Flags::empty(),
        )
        .unwrap();

        let der = pkcs7.to_der().unwrap();
        let decoded = decode_cert_bytes_pkcs7_der(&der).unwrap();
        assert!(decoded
            .iter()
            .any(|cert| cert.common_name().as_deref() == Some("myserver")));
        assert!(!decode_cert_bytes(&der, "").unwrap().is_empty());

        let pem = pkcs7.to_pem().unwrap();
        let decoded = decode_cert_bytes_pkcs7_pem(&pem).unwrap();
        assert!(decoded
            .iter()
            .any(|cert| cert.common_name().as_deref() == Some("myserver")));
        assert!(!decode_cert_bytes(&pem, "").unwrap().is_empty());
    }

    #[test]
    fn test_decode_cert_bytes_pkcs12() {
        let chain = chain();
        let bytes = pkcs12_bundle(&chain);

        let decoded = decode_cert_bytes_pkcs12(&bytes, PASSWORD).unwrap();
        assert_eq!(decoded[0].common_name().as_deref(), Some("myserver"));
        assert_eq!(decoded.len(), 3);

        let decoded = decode_cert_bytes(&bytes, PASSWORD).unwrap();
        assert_eq!(decoded[0].common_name().as_deref(), Some("myserver"));

        let err = decode_cert_bytes(&bytes, "wrong").unwrap_err();
        assert_matches!(err.error, Error::Decode(_));
    }

    #[test]
    fn test_decode_cert_bytes_errors() {
        let err = decode_cert_bytes(b"", "").unwrap_err();
        assert_matches!(err.error, Error::NoCertificates);

        let err = decode_cert_bytes(b" \n\t", "").unwrap_err();
        assert_matches!(err.error, Error::NoCertificates);

        let err = decode_cert_bytes(b"certainly not a certificate", "").unwrap_err();
        let Error::Decode(reason) = err.error else {
            panic!("unexpected error {:?}", err);
        };
        // every probe contributes a reason
        assert_eq!(reason.matches(REASON_SEPARATOR).count(), CERT_PROBES.len() - 1);
    }

    #[test]
    fn test_decode_cert_file() {
        let chain = chain();
        let path = std::env::temp_dir().join(format!("bhcertchain-{}.crt", std::process::id()));
        std::fs::write(&path, pem_bundle(&chain)).unwrap();

        let decoded = decode_cert_file(&path, "");
        std::fs::remove_file(&path).unwrap();
        assert_serials(&decoded.unwrap(), &chain);

        let err = decode_cert_file("/nonexistent/bhcertchain.crt", "").unwrap_err();
        assert_matches!(err.error, Error::Io(_));
    }

    #[test]
    fn test_decode_key_bytes() {
        let chain = chain();
        let leaf = &chain[0];

        // unencrypted PKCS8
        let pem = leaf.pkey().private_key_to_pem_pkcs8().unwrap();
        let key = decode_key_bytes(&pem, "").unwrap();
        assert_eq!(key.pem_label(), "EC PRIVATE KEY");
        assert!(verify_cert_and_key(leaf.certificate(), &key));

        // encrypted PKCS8
        let pem = leaf
            .pkey()
            .private_key_to_pem_pkcs8_passphrase(Cipher::aes_256_cbc(), PASSWORD.as_bytes())
            .unwrap();
        let key = decode_key_bytes(&pem, PASSWORD).unwrap();
        assert!(verify_cert_and_key(leaf.certificate(), &key));
        let err = decode_key_bytes(&pem, "wrong").unwrap_err();
        assert_matches!(err.error, Error::KeyDecode(_));

        // PKCS12
        let key = decode_key_bytes(&pkcs12_bundle(&chain), PASSWORD).unwrap();
        assert!(verify_cert_and_key(leaf.certificate(), &key));

        let err = decode_key_bytes(b"not a key", "").unwrap_err();
        assert_matches!(err.error, Error::KeyDecode(_));
    }

    #[test]
    fn test_key_pem_round_trip() {
        for algorithm in [
            KeyAlgorithm::Rsa,
            KeyAlgorithm::EcP256,
            KeyAlgorithm::EcP384,
            KeyAlgorithm::Ed25519,
        ] {
            let root = TestCa::root("Round Trip Root", algorithm);
            let key = root.private_key();

            let decoded = decode_key_bytes(&key.to_pem().unwrap(), "").unwrap();

            assert_eq!(decoded.pem_label(), key.pem_label());
            assert!(verify_cert_and_key(root.certificate(), &decoded));
        }
    }

    #[test]
    fn test_cert_pem_round_trip() {
        let chain = chain();
        for ca in &chain {
            let original = ca.certificate();
            let decoded = decode_cert_bytes(&encode_cert_as_pem(original).unwrap(), "").unwrap();

            assert_eq!(decoded.len(), 1);
            assert_eq!(decoded[0].subject(), original.subject());
            assert_eq!(decoded[0].issuer(), original.issuer());
            assert_eq!(
                decoded[0].serial_number().unwrap(),
                original.serial_number().unwrap()
            );
        }
    }
}
