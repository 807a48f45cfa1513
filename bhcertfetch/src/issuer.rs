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

//! Reconstruction of a chain by following the "issuing certificate" URLs (the `caIssuers` access
//! method of the Authority Information Access extension) of its certificates.

use std::collections::HashSet;

use bhcertchain::Certificate;
use bherror::traits::{ForeignError as _, PropagateError as _};
use reqwest::blocking::{Client, ClientBuilder};

use crate::{Error, Result, RetrievalConfig};

/// Interface providing functionality of sending HTTP GET request.
///
/// Motivation for introducing this abstraction is to allow an implementation of a more
/// restrictive HTTP client (e.g. one whitelisting hosts), as issuer URLs come from untrusted
/// certificates.
pub trait HttpGetClient: Sync {
    /// Error type used by this trait.
    type Err: std::error::Error + Send + Sync + 'static;

    /// Performs a HTTP GET request with provided `url` and returns the response body.
    fn get(&self, url: &str) -> std::result::Result<Vec<u8>, Self::Err>;
}

/// [`HttpGetClient`] implementation using the blocking [`reqwest`] client.
#[derive(Clone, Debug)]
pub struct ReqwestGetClient(Client);

impl ReqwestGetClient {
    /// Construct [`ReqwestGetClient`] from [`Client`].
    pub fn new(client: Client) -> Self {
        Self(client)
    }

    /// Construct [`ReqwestGetClient`] from [`ClientBuilder`].
    pub fn from_builder(builder: ClientBuilder) -> reqwest::Result<Self> {
        Ok(Self(builder.build()?))
    }

    /// Construct [`ReqwestGetClient`] with the timeout of the given configuration.
    pub fn from_config(config: &RetrievalConfig) -> reqwest::Result<Self> {
        Self::from_builder(Client::builder().timeout(config.timeout()))
    }
}

impl HttpGetClient for ReqwestGetClient {
    type Err = reqwest::Error;

    fn get(&self, url: &str) -> reqwest::Result<Vec<u8>> {
        let response = self.0.get(url).send()?.error_for_status()?;
        Ok(response.bytes()?.to_vec())
    }
}

/// Certificates collected by following issuer URLs.
#[derive(Debug)]
pub struct IssuerChain {
    /// The starting certificate followed by every fetched issuer, in hop order.
    pub certificates: Vec<Certificate>,
    /// The error of the last failed attempt, if the walk did not end cleanly.
    ///
    /// A failed URL is followed by the next URL of the same certificate, and a successful hop
    /// clears the error.
    pub last_error: Option<bherror::Error<Error>>,
}

/// Retrieve the chain of `cert` by following its issuer URLs, using a [`ReqwestGetClient`]
/// configured from `config`.
///
/// See [`retrieve_chain_with_client`].
pub fn retrieve_chain_from_issuer_urls(
    cert: &Certificate,
    config: &RetrievalConfig,
) -> Result<IssuerChain> {
    let client = ReqwestGetClient::from_config(config).foreign_err(|| Error::HttpClient)?;

    Ok(retrieve_chain_with_client(
        cert,
        &client,
        config.max_issuer_hops,
    ))
}

/// Retrieve the chain of `cert` by following its issuer URLs with the given client.
///
/// The issuer URLs of a certificate are tried in order, and the first URL which can be fetched
/// and decoded provides the next certificate (the first one it contains).  The walk ends at a
/// certificate with no issuer URLs, at a certificate whose URLs all fail, at a certificate
/// pointing to itself, at a certificate already in the chain ([`Error::IssuerLoop`]) or after
/// `max_hops` fetched certificates ([`Error::HopLimit`]).
///
/// The walk itself never fails; the collected certificates are returned together with the last
/// error for inspection.
pub fn retrieve_chain_with_client<C: HttpGetClient>(
    cert: &Certificate,
    client: &C,
    max_hops: usize,
) -> IssuerChain {
    let mut certificates = vec![cert.clone()];
    let mut visited = HashSet::from([cert.subject().to_owned()]);
    let mut last_error = None;

    let mut current = cert.clone();
    let mut hops = 0;
    while !current.issuer_urls().is_empty() {
        if hops == max_hops {
            last_error = Some(bherror::Error::root(Error::HopLimit(max_hops)));
            break;
        }

        let mut next = None;
        for url in current.issuer_urls().iter().map(String::as_str) {
            match fetch_issuer(client, url) {
                Ok(issuer) => {
                    tracing::debug!(url, subject = issuer.subject(), "fetched issuer");
                    last_error = None;
                    next = Some(issuer);
                    break;
                }
                Err(err) => {
                    tracing::warn!(url, reason = %err, "issuer hop failed");
                    last_error = Some(err);
                }
            }
        }
        let Some(issuer) = next else {
            break;
        };
        hops += 1;

        if issuer.subject() == current.subject() {
            tracing::debug!(subject = issuer.subject(), "self-issued certificate, walk ended");
            break;
        }
        if !visited.insert(issuer.subject().to_owned()) {
            last_error = Some(bherror::Error::root(Error::IssuerLoop(
                issuer.subject().to_owned(),
            )));
            break;
        }

        certificates.push(issuer.clone());
        current = issuer;
    }

    IssuerChain {
        certificates,
        last_error,
    }
}

fn fetch_issuer<C: HttpGetClient>(client: &C, url: &str) -> Result<Certificate> {
    let bytes = client
        .get(url)
        .foreign_err(|| Error::Fetch(url.to_owned()))?;

    bhcertchain::decode_cert_bytes(&bytes, "")
        .with_err(|| Error::Decode(url.to_owned()))?
        .into_iter()
        .next()
        .ok_or_else(|| bherror::Error::root(Error::Decode(url.to_owned())))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use assert_matches::assert_matches;
    use bhcertchain::{
        encode_cert_as_pem,
        test_utils::{KeyAlgorithm, TestCa},
    };

    use super::*;

    const ROOT_URL: &str = "http://pki.test/root.crt";
    const INTERMEDIATE_URL: &str = "http://pki.test/intermediate.der";
    const MISSING_URL: &str = "http://pki.test/missing.crt";

    /// Serves fixed responses, failing with "not found" for any other URL.
    #[derive(Default)]
    struct MockGetClient(HashMap<String, Vec<u8>>);

    impl MockGetClient {
        fn with(mut self, url: &str, body: Vec<u8>) -> Self {
            self.0.insert(url.to_owned(), body);
            self
        }
    }

    impl HttpGetClient for MockGetClient {
        type Err = std::io::Error;

        fn get(&self, url: &str) -> std::io::Result<Vec<u8>> {
            self.0
                .get(url)
                .cloned()
                .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::NotFound, url.to_owned()))
        }
    }

    struct Pki {
        root: TestCa,
        intermediate: TestCa,
        leaf: TestCa,
    }

    fn pki(leaf_urls: &[&str]) -> Pki {
        let root = TestCa::root("Issuer Walk Root", KeyAlgorithm::EcP256);
        let intermediate =
            root.issue_intermediate("Issuer Walk Intermediate", KeyAlgorithm::EcP256, &[ROOT_URL]);
        let leaf = intermediate.issue_leaf("walk.test", KeyAlgorithm::EcP256, leaf_urls);

        Pki {
            root,
            intermediate,
            leaf,
        }
    }

    fn client(pki: &Pki) -> MockGetClient {
        MockGetClient::default()
            .with(ROOT_URL, encode_cert_as_pem(pki.root.certificate()).unwrap())
            .with(
                INTERMEDIATE_URL,
                pki.intermediate.certificate().der().to_vec(),
            )
    }

    fn subjects(chain: &IssuerChain) -> Vec<&str> {
        chain.certificates.iter().map(Certificate::subject).collect()
    }

    #[test]
    fn test_walk_to_root() {
        let pki = pki(&[INTERMEDIATE_URL]);

        let chain = retrieve_chain_with_client(pki.leaf.certificate(), &client(&pki), 16);

        assert!(chain.last_error.is_none());
        assert_eq!(
            subjects(&chain),
            [
                pki.leaf.certificate().subject(),
                pki.intermediate.certificate().subject(),
                pki.root.certificate().subject(),
            ]
        );
    }

    #[test]
    fn test_failed_url_falls_through() {
        let pki = pki(&[MISSING_URL, INTERMEDIATE_URL]);

        let chain = retrieve_chain_with_client(pki.leaf.certificate(), &client(&pki), 16);

        // the failure of the first URL is cleared by the success of the second one
        assert!(chain.last_error.is_none());
        assert_eq!(chain.certificates.len(), 3);
    }

    #[test]
    fn test_all_urls_fail() {
        let pki = pki(&[MISSING_URL, "http://pki.test/garbage.crt"]);
        let client = client(&pki).with("http://pki.test/garbage.crt", b"garbage".to_vec());

        let chain = retrieve_chain_with_client(pki.leaf.certificate(), &client, 16);

        assert_eq!(subjects(&chain), [pki.leaf.certificate().subject()]);
        assert_matches!(chain.last_error.unwrap().error, Error::Decode(_));
    }

    #[test]
    fn test_later_hop_fails() {
        let pki = pki(&[INTERMEDIATE_URL]);
        let client = MockGetClient::default().with(
            INTERMEDIATE_URL,
            pki.intermediate.certificate().der().to_vec(),
        );

        let chain = retrieve_chain_with_client(pki.leaf.certificate(), &client, 16);

        assert_eq!(chain.certificates.len(), 2);
        assert_matches!(chain.last_error.unwrap().error, Error::Fetch(_));
    }

    #[test]
    fn test_no_issuer_urls() {
        let pki = pki(&[]);

        let chain = retrieve_chain_with_client(pki.leaf.certificate(), &client(&pki), 16);

        assert_eq!(chain.certificates, [pki.leaf.certificate().clone()]);
        assert!(chain.last_error.is_none());
    }

    #[test]
    fn test_self_issued_hop_ends_cleanly() {
        let pki = pki(&[INTERMEDIATE_URL]);
        // the intermediate points at itself
        let client =
            MockGetClient::default().with(ROOT_URL, pki.intermediate.certificate().der().to_vec());

        let chain = retrieve_chain_with_client(pki.intermediate.certificate(), &client, 16);

        assert_eq!(chain.certificates, [pki.intermediate.certificate().clone()]);
        assert!(chain.last_error.is_none());
    }

    #[test]
    fn test_issuer_loop() {
        let pki = pki(&[INTERMEDIATE_URL]);
        // the intermediate points back at the leaf
        let client = MockGetClient::default()
            .with(
                INTERMEDIATE_URL,
                pki.intermediate.certificate().der().to_vec(),
            )
            .with(ROOT_URL, pki.leaf.certificate().der().to_vec());

        let chain = retrieve_chain_with_client(pki.leaf.certificate(), &client, 16);

        assert_eq!(chain.certificates.len(), 2);
        assert_matches!(chain.last_error.unwrap().error, Error::IssuerLoop(_));
    }

    #[test]
    fn test_client_shared_between_threads() {
        let pki = pki(&[INTERMEDIATE_URL]);
        let client = client(&pki);

        std::thread::scope(|scope| {
            let walks: Vec<_> = (0..4)
                .map(|_| {
                    scope.spawn(|| {
                        let chain = retrieve_chain_with_client(pki.leaf.certificate(), &client, 16);
                        (chain.certificates.len(), chain.last_error.is_none())
                    })
                })
                .collect();

            for walk in walks {
                assert_eq!(walk.join().unwrap(), (3, true));
            }
        });
    }

    #[test]
    fn test_hop_limit() {
        let pki = pki(&[INTERMEDIATE_URL]);

        let chain = retrieve_chain_with_client(pki.leaf.certificate(), &client(&pki), 1);

        assert_eq!(chain.certificates.len(), 2);
        assert_matches!(chain.last_error.unwrap().error, Error::HopLimit(1));

        let chain = retrieve_chain_with_client(pki.leaf.certificate(), &client(&pki), 0);
        assert_eq!(chain.certificates.len(), 1);
        assert_matches!(chain.last_error.unwrap().error, Error::HopLimit(0));
    }
}
