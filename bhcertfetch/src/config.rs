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

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default timeout of a single network operation.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default maximum number of issuer URL hops.
pub const DEFAULT_MAX_ISSUER_HOPS: usize = 16;

/// Settings of the remote chain retrieval.
///
/// Missing fields take their default values, so the configuration can be loaded from a partial
/// JSON or TOML document.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Timeout applied to the TCP connect, the TLS handshake and every HTTP request.
    ///
    /// [`Duration::ZERO`] disables the timeout.
    pub timeout: Duration,
    /// Maximum number of certificates fetched by following issuer URLs.
    pub max_issuer_hops: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            max_issuer_hops: DEFAULT_MAX_ISSUER_HOPS,
        }
    }
}

impl RetrievalConfig {
    /// The timeout as an [`Option`], [`None`] meaning no timeout.
    pub fn timeout(&self) -> Option<Duration> {
        non_zero(self.timeout)
    }
}

pub(crate) fn non_zero(timeout: Duration) -> Option<Duration> {
    (!timeout.is_zero()).then_some(timeout)
}
