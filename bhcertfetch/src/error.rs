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

/// Error returned by the crate API.
#[derive(strum_macros::Display, Debug, PartialEq, Clone)]
pub enum Error {
    /// The address is not of the form `host:port` or `[ipv6]:port`.
    #[strum(to_string = "Invalid address {0}")]
    InvalidAddress(String),
    /// The TCP connection could not be established.
    #[strum(to_string = "Cannot connect to {0}")]
    Connect(String),
    /// The retrieval did not finish within the timeout.
    #[strum(to_string = "Timed out retrieving certificates from {0}")]
    Timeout(String),
    /// The TLS connector could not be set up.
    #[strum(to_string = "TLS setup failed")]
    Tls,
    /// The TLS handshake failed.
    #[strum(to_string = "TLS handshake with {0} failed")]
    Handshake(String),
    /// The server presented no certificates.
    #[strum(to_string = "No certificates found")]
    NoCertificates,
    /// A certificate could not be converted.
    #[strum(to_string = "Invalid certificate")]
    Certificate,
    /// The HTTP client could not be set up.
    #[strum(to_string = "HTTP client setup failed")]
    HttpClient,
    /// Fetching an issuer URL failed.
    #[strum(to_string = "Cannot fetch {0}")]
    Fetch(String),
    /// The content of an issuer URL is not a certificate.
    #[strum(to_string = "Cannot decode certificate from {0}")]
    Decode(String),
    /// An issuer URL led back to a certificate already in the chain.
    #[strum(to_string = "Issuer loop at {0}")]
    IssuerLoop(String),
    /// The walk over issuer URLs reached the maximum number of hops.
    #[strum(to_string = "Hop limit of {0} reached")]
    HopLimit(usize),
}

impl bherror::BhError for Error {}

/// The [`bherror::Result`] type with the error type of
/// [`bhcertfetch::Error`](Error), used throughout this crate.
pub type Result<T> = bherror::Result<T, Error>;
