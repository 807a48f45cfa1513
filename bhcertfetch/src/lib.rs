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

//! This crate provides functions for retrieving X.509 certificate chains from the network.
//!
//! # Details
//!
//! A chain can be obtained in two ways:
//!
//! - from the TLS handshake with a server, see [`retrieve_certs_from_addr`].  The certificates
//!   come in the order the server sent them.  A server which is not trusted still yields its
//!   chain, together with a warning.
//! - by following the "issuing certificate" URLs embedded in the certificates, see
//!   [`retrieve_chain_from_issuer_urls`].  The certificates come in hop order.
//!
//! Either chain can be handed to [`bhcertchain::sort_certs`] or
//! [`bhcertchain::split_certs_as_tree`] for further processing.
//!
//! # Examples
//!
//! ```no_run
//! let config = bhcertfetch::RetrievalConfig::default();
//!
//! let retrieved = bhcertfetch::retrieve_certs_from_addr("example.com:443", config.timeout)
//!     .expect("handshake");
//! if let Some(warning) = &retrieved.warning {
//!     println!("not trusted: {warning}");
//! }
//!
//! let walked = bhcertfetch::retrieve_chain_from_issuer_urls(&retrieved.certificates[0], &config)
//!     .expect("HTTP client");
//! for cert in &walked.certificates {
//!     println!("{}", cert.subject());
//! }
//! ```

mod config;
mod error;
mod handshake;
mod issuer;

pub use config::{RetrievalConfig, DEFAULT_MAX_ISSUER_HOPS, DEFAULT_TIMEOUT};
pub use error::*;
pub use handshake::*;
pub use issuer::*;
