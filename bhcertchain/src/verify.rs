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
    error::ErrorStack,
    stack::Stack,
    x509::{store::X509StoreBuilder, X509StoreContext, X509},
};

use crate::{CertTree, Certificate, Error, Result};

/// Outcome of verifying a [`CertTree`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Verification {
    /// The leaf chains up to a trusted root.
    Verified,
    /// The chain is not trusted, with the reason reported by the TLS library.
    Failed(String),
}

impl Verification {
    /// Returns `true` if the chain was verified.
    pub fn is_verified(&self) -> bool {
        matches!(self, Self::Verified)
    }

    /// The reason the verification failed, if it did.
    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Verified => None,
            Self::Failed(reason) => Some(reason),
        }
    }
}

/// Where the trusted roots come from.
enum TrustAnchors<'a> {
    /// The trust store of the operating system.
    System,
    /// Only the given certificates.
    Custom(&'a [Certificate]),
}

impl<'a> TrustAnchors<'a> {
    fn for_roots(roots: &'a [Certificate]) -> Self {
        if roots.is_empty() {
            Self::System
        } else {
            Self::Custom(roots)
        }
    }
}

/// Verify that the leaf of the tree chains up to one of its roots through its intermediates.
///
/// When the tree has no roots, the trust store of the operating system is used instead.
///
/// A chain that is not trusted is not an error, it is reported as [`Verification::Failed`].  An
/// error is returned only when the verification could not be performed at all.
pub fn verify_chain(tree: &CertTree) -> Result<Verification> {
    let intermediates = chain_to_stack(tree.intermediates())?;
    let anchors = TrustAnchors::for_roots(tree.roots());

    let mut builder = X509StoreBuilder::new().foreign_err(|| Error::Verification)?;
    match anchors {
        TrustAnchors::System => builder
            .set_default_paths()
            .foreign_err(|| Error::Verification)
            .ctx(|| "cannot load the system trust store")?,
        TrustAnchors::Custom(roots) => {
            for root in roots {
                builder
                    .add_cert(root.x509().clone())
                    .foreign_err(|| Error::Verification)?;
            }
        }
    }
    let store = builder.build();

    // The untrusted intermediates only help build the path to a root.  Their order and whether
    // the leaf is among them does not matter.
    let mut context = X509StoreContext::new().foreign_err(|| Error::Verification)?;
    let (is_valid, reason) = context
        .init(&store, tree.leaf().x509(), &intermediates, |ctx| {
            let is_valid = clean_up_after_openssl(|| ctx.verify_cert())?;
            let reason = format!("{} at depth {}", ctx.error(), ctx.error_depth());
            Ok((is_valid, reason))
        })
        .foreign_err(|| Error::Verification)?;

    if is_valid {
        return Ok(Verification::Verified);
    }

    tracing::debug!(subject = tree.leaf().subject(), %reason, "chain verification failed");
    Ok(Verification::Failed(reason))
}

impl CertTree {
    /// Verify the tree, see [`verify_chain`].
    pub fn verify(&self) -> Result<Verification> {
        verify_chain(self)
    }
}

fn chain_to_stack(chain: &[Certificate]) -> Result<Stack<X509>> {
    let mut stack = Stack::new().foreign_err(|| Error::Verification)?;

    for cert in chain {
        stack
            .push(cert.x509().clone())
            .foreign_err(|| Error::Verification)?;
    }

    Ok(stack)
}

/// Clears the OpenSSL error queue after a successful call, which may leave stale entries.
fn clean_up_after_openssl<T>(
    f: impl FnOnce() -> std::result::Result<T, ErrorStack>,
) -> std::result::Result<T, ErrorStack> {
    let return_value = f()?;

    drop(ErrorStack::get());

    Ok(return_value)
}
