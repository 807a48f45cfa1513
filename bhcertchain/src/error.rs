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
    /// The bytes could not be decoded as a certificate container by any of the known formats.
    #[strum(to_string = "Certificate decoding failed: {0}")]
    Decode(String),
    /// The container was structurally valid, but held no certificates.
    #[strum(to_string = "No certificates found")]
    NoCertificates,
    /// The bytes could not be decoded as a private key by any of the known formats.
    #[strum(to_string = "Private key decoding failed: {0}")]
    KeyDecode(String),
    /// The private key uses an algorithm other than RSA, ECDSA or Ed25519.
    #[strum(to_string = "Unsupported private key algorithm")]
    UnsupportedKey,
    /// The private key does not belong to the certificate.
    #[strum(to_string = "Private key does not match the certificate")]
    KeyMismatch,
    /// Encoding a certificate or a key failed.
    #[strum(to_string = "Encoding failed")]
    Encode,
    /// Reading a certificate or key file failed.
    #[strum(to_string = "Cannot read file {0}")]
    Io(String),
    /// None of the certificates is a leaf (non-CA) certificate.
    #[strum(to_string = "No leaf found")]
    NoLeaf,
    /// More than one distinct leaf (non-CA) certificate was found.
    #[strum(to_string = "More than one leaf found")]
    MultipleLeaves,
    /// The verification context could not be set up.
    #[strum(to_string = "Chain verification could not be performed")]
    Verification,
}

impl bherror::BhError for Error {}

/// The [`bherror::Result`] type with the error type of
/// [`bhcertchain::Error`](Error), used throughout this crate.
pub type Result<T> = bherror::Result<T, Error>;
