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

use crate::{sort_certs, Certificate};

/// Certificates split into the three roles of a verification: the certificate to verify, the
/// intermediate certificates and the root CA certificates.
#[derive(Clone, Debug)]
pub struct CertTree {
    leaf: Certificate,
    intermediates: Vec<Certificate>,
    roots: Vec<Certificate>,
}

impl CertTree {
    /// Construct a tree from already classified certificates.
    ///
    /// When `roots` is empty, verification falls back to the system trust store.
    pub fn new(
        leaf: Certificate,
        intermediates: Vec<Certificate>,
        roots: Vec<Certificate>,
    ) -> Self {
        Self {
            leaf,
            intermediates,
            roots,
        }
    }

    /// The certificate to verify.
    pub fn leaf(&self) -> &Certificate {
        &self.leaf
    }

    /// Certificates between the leaf and the roots.
    pub fn intermediates(&self) -> &[Certificate] {
        &self.intermediates
    }

    /// Trust anchors.
    pub fn roots(&self) -> &[Certificate] {
        &self.roots
    }
}

/// Split the certificates into a [`CertTree`].
///
/// The certificates are first put into leaf-to-root order with [`sort_certs`].  The first
/// certificate becomes the leaf, root CA certificates (see [`Certificate::is_root_ca`]) become the
/// roots, and everything else becomes an intermediate.  The leaf is never counted as a root, even
/// when it is a self-signed CA.
///
/// Returns [`None`] for an empty input.
pub fn split_certs_as_tree(certs: &[Certificate]) -> Option<CertTree> {
    let mut sorted = sort_certs(certs, false).into_iter();
    let leaf = sorted.next()?;

    let (roots, intermediates) = sorted.partition(Certificate::is_root_ca);

    Some(CertTree::new(leaf, intermediates, roots))
}
