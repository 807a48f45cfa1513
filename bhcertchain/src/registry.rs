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

use crate::Certificate;

/// Lookup structures over a set of certificates, keyed by the subject.
///
/// The first certificate with a given subject wins, later certificates with the same subject are
/// ignored.
#[derive(Debug, Default)]
pub struct Registry<'a> {
    by_subject: HashMap<&'a str, &'a Certificate>,
    issuer_of: HashMap<&'a str, &'a str>,
    leaves: HashSet<&'a str>,
    encounter_order: Vec<&'a str>,
}

impl<'a> Registry<'a> {
    /// Register the certificates in the given order.
    pub fn new(certs: &'a [Certificate]) -> Self {
        let mut registry = Self::default();

        for cert in certs {
            let subject = cert.subject();
            if registry.by_subject.contains_key(subject) {
                continue;
            }

            if !cert.is_ca() {
                registry.leaves.insert(subject);
            }
            registry.by_subject.insert(subject, cert);
            registry.issuer_of.insert(subject, cert.issuer());
            registry.encounter_order.push(subject);
        }

        registry
    }

    /// The certificate registered under the subject.
    pub fn get(&self, subject: &str) -> Option<&'a Certificate> {
        self.by_subject.get(subject).copied()
    }

    /// The issuer of the certificate registered under the subject.
    ///
    /// The issuer itself need not be registered.
    pub fn issuer_of(&self, subject: &str) -> Option<&'a str> {
        self.issuer_of.get(subject).copied()
    }

    /// Whether the certificate registered under the subject is not a CA.
    pub fn is_leaf(&self, subject: &str) -> bool {
        self.leaves.contains(subject)
    }

    /// Registered subjects, in the order they were first seen.
    pub fn encounter_order(&self) -> &[&'a str] {
        &self.encounter_order
    }

    /// Number of distinct registered subjects.
    pub fn len(&self) -> usize {
        self.encounter_order.len()
    }

    /// Whether nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.encounter_order.is_empty()
    }
}
