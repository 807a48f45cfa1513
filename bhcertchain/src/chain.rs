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

use std::collections::{HashMap, HashSet};

use bherror::traits::ErrorContext as _;

use crate::{Certificate, Error, Registry, Result};

/// Chains reconstructed from an unordered set of certificates by following the issuers.
///
/// Every chain starts at a certificate which is not the issuer of any other certificate in the
/// set, and ends either at a self-signed certificate or at a certificate whose issuer is not in
/// the set.
#[derive(Debug)]
pub struct ChainGraph<'a> {
    registry: Registry<'a>,
    chains: HashMap<&'a str, Vec<&'a Certificate>>,
    starts: Vec<&'a str>,
}

impl<'a> ChainGraph<'a> {
    /// Subjects of the certificates the chains start with, in the order they were discovered.
    pub fn starts(&self) -> &[&'a str] {
        &self.starts
    }

    /// The chain starting with the certificate with the given subject.
    pub fn chain(&self, start: &str) -> Option<&[&'a Certificate]> {
        self.chains.get(start).map(Vec::as_slice)
    }

    /// Iterate over the chains, in the order of [`ChainGraph::starts`].
    pub fn chains(&self) -> impl Iterator<Item = &[&'a Certificate]> + '_ {
        self.starts.iter().filter_map(|start| self.chain(start))
    }

    /// The registry the chains were built from.
    pub fn registry(&self) -> &Registry<'a> {
        &self.registry
    }
}

/// Reconstruct the chains of the given certificates.
///
/// Each chain is ordered from its start (usually a leaf) to the root, or the other way around if
/// `reverse` is `true`.  Certificates sharing a subject are deduplicated, the first one wins.
/// Chains with a missing issuer are not an error, they simply end early.
pub fn sort_certs_as_chains(certs: &[Certificate], reverse: bool) -> ChainGraph<'_> {
    let registry = Registry::new(certs);

    let mut skip = HashSet::new();
    let mut subject_chains: HashMap<&str, Vec<&str>> = HashMap::new();
    let mut starts: Vec<&str> = Vec::new();

    for &subject in registry.encounter_order() {
        if skip.contains(subject) {
            continue;
        }

        let mut chain = vec![subject];
        let mut current = subject;
        while let Some(issuer) = registry.issuer_of(current) {
            skip.insert(issuer);

            if issuer == current {
                break;
            }
            if registry.get(issuer).is_none() {
                tracing::debug!(subject = current, issuer, "issuer not found, chain is incomplete");
                break;
            }
            if chain.contains(&issuer) {
                tracing::debug!(subject = current, issuer, "issuer loop, chain stopped");
                break;
            }

            chain.push(issuer);
            // an earlier chain starting at the issuer is a suffix of this one
            if subject_chains.remove(issuer).is_some() {
                starts.retain(|start| *start != issuer);
            }
            current = issuer;
        }

        subject_chains.insert(subject, chain);
        starts.push(subject);
    }

    let chains = subject_chains
        .into_iter()
        .map(|(start, subjects)| {
            let mut chain: Vec<_> = subjects
                .into_iter()
                .filter_map(|subject| registry.get(subject))
                .collect();
            if reverse {
                chain.reverse();
            }
            (start, chain)
        })
        .collect();

    ChainGraph {
        registry,
        chains,
        starts,
    }
}

/// Sort the certificates from leaf to root CA, or the other way around if `reverse` is `true`.
///
/// All the certificates end up in the result exactly once (by subject).  Chains starting at a
/// leaf certificate come first, followed by the chains of CA certificates without a leaf.  Within
/// a chain, the order of [`sort_certs_as_chains`] is kept.
pub fn sort_certs(certs: &[Certificate], reverse: bool) -> Vec<Certificate> {
    let graph = sort_certs_as_chains(certs, reverse);

    let (from_leaves, no_leaves): (Vec<&str>, Vec<&str>) = graph
        .starts()
        .iter()
        .copied()
        .partition(|start| graph.registry().is_leaf(start));

    let mut seen = HashSet::new();
    from_leaves
        .iter()
        .chain(&no_leaves)
        .filter_map(|start| graph.chain(start))
        .flatten()
        .copied()
        .filter(|&cert| seen.insert(cert.subject()))
        .cloned()
        .collect()
}

/// Find the leaf certificate, the certificate farthest from the root CA (usually the certificate
/// of a server).
///
/// Returns [`Error::NoLeaf`] if none of the certificates is a leaf, and [`Error::MultipleLeaves`]
/// if there is more than one distinct leaf.
pub fn find_leaf(certs: &[Certificate]) -> Result<&Certificate> {
    let mut candidates = HashSet::new();
    let mut found = None;

    for cert in certs.iter().filter(|cert| !cert.is_ca()) {
        candidates.insert(cert.leaf_identity());
        found = Some(cert);
    }

    match (candidates.len(), found) {
        (1, Some(leaf)) => Ok(leaf),
        (0, _) => Err(bherror::Error::root(Error::NoLeaf)),
        (count, _) => Err(bherror::Error::root(Error::MultipleLeaves))
            .ctx(|| format!("{count} leaf candidates")),
    }
}
