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

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! This crate provides functions and types for turning an unordered, possibly incomplete or
//! duplicated set of X.509 certificates into meaningful certificate chains, and for verifying
//! them.
//!
//! # Details
//!
//! Certificates are identified by their Subject distinguished name and linked to their issuers by
//! the Issuer distinguished name.  The primary API this crate offers is:
//!
//! - [`decode_cert_bytes`] and [`decode_key_bytes`] for reading certificates and private keys out
//!   of PEM, DER, PKCS7 and PKCS12 containers,
//! - [`sort_certs`] for ordering certificates from the leaf to the root CA (or the other way
//!   around),
//! - [`split_certs_as_tree`] for splitting certificates into a [`CertTree`] of a leaf,
//!   intermediates and roots,
//! - [`verify_chain`] for verifying a [`CertTree`] against its roots, or against the trust store
//!   of the operating system,
//! - [`verify_cert_and_key`] for checking that a private key belongs to a certificate.
//!
//! # Examples
//!
//! ## Ordering a Bundle
//!
//! ```no_run
//! let bundle = std::fs::read("path-to-bundle.pem").expect("read bundle");
//! let certs = bhcertchain::decode_cert_bytes(&bundle, "").expect("valid bundle");
//!
//! // Leaf first, root CA last.
//! for cert in bhcertchain::sort_certs(&certs, false) {
//!     println!("{}", cert.subject());
//! }
//! ```
//!
//! ## Verifying a Bundle
//!
//! ```no_run
//! let bundle = std::fs::read("path-to-bundle.p12").expect("read bundle");
//! let certs = bhcertchain::decode_cert_bytes(&bundle, "password").expect("valid bundle");
//!
//! let tree = bhcertchain::split_certs_as_tree(&certs).expect("non-empty bundle");
//! let verification = tree.verify().expect("verification performed");
//!
//! if let Some(reason) = verification.reason() {
//!     println!("not trusted: {reason}");
//! }
//! ```
//!
//! ## Matching a Key
//!
//! ```no_run
//! let cert = bhcertchain::decode_cert_file("path-to-certificate.pem", "")
//!     .expect("valid certificate");
//! let key = bhcertchain::decode_key_file("path-to-private-key.pem", "")
//!     .expect("valid private key");
//!
//! assert!(bhcertchain::verify_cert_and_key(&cert[0], &key));
//! ```

mod certificate;
mod chain;
mod decode;
mod error;
mod key;
mod registry;
#[cfg(any(feature = "test-utils", test))]
pub mod test_utils;
mod tree;
mod verify;

pub use certificate::*;
pub use chain::*;
pub use decode::*;
pub use error::*;
pub use key::*;
pub use registry::*;
pub use tree::*;
pub use verify::*;
