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

use std::{
    io::{self, Read, Write},
    net::{SocketAddr, TcpStream, ToSocketAddrs as _},
    sync::mpsc,
    thread,
    time::{Duration, Instant},
};

use bhcertchain::Certificate;
use bherror::traits::{ErrorContext as _, ForeignError as _, PropagateError as _};
use openssl::ssl::{HandshakeError, SslConnector, SslMethod, SslStream, SslVerifyMode};

use crate::{config::non_zero, Error, Result};

/// Certificates presented by a server during the TLS handshake.
#[derive(Debug)]
pub struct HandshakeChain {
    /// The certificates in the order the server sent them, the server's own certificate first.
    pub certificates: Vec<Certificate>,
    /// The reason the chain was not trusted, if the handshake had to be repeated without
    /// certificate verification.
    pub warning: Option<bherror::Error<Error>>,
}

/// Retrieve the certificates offered by the server at `addr` (`host:port` or `[ipv6]:port`).
///
/// The host part is used for SNI and for checking the server certificate.  If the handshake
/// fails, it is repeated once with certificate verification disabled, and the original failure is
/// returned as [`HandshakeChain::warning`] next to the certificates.
///
/// The `timeout` bounds the whole call: name resolution, the TCP connect and the TLS handshake,
/// including the repeated one.  Running out of time is an [`Error::Timeout`].  [`Duration::ZERO`]
/// disables the timeout.
pub fn retrieve_certs_from_addr(addr: &str, timeout: Duration) -> Result<HandshakeChain> {
    let (host, port) = split_host_port(addr)?;
    let deadline = Deadline::after(timeout);

    let warning = match handshake(host, port, deadline, true) {
        Ok(stream) => {
            let certificates = peer_certificates(&stream)?;
            return Ok(HandshakeChain {
                certificates,
                warning: None,
            });
        }
        Err(err) if matches!(err.error, Error::Handshake(_)) => err,
        Err(err) => return Err(err),
    };

    tracing::warn!(addr, reason = %warning, "TLS handshake failed, retrying without verification");

    let stream = handshake(host, port, deadline, false)?;
    let certificates = peer_certificates(&stream)?;

    Ok(HandshakeChain {
        certificates,
        warning: Some(warning),
    })
}

/// Split an address of the form `host:port` or `[ipv6]:port`.
pub fn split_host_port(addr: &str) -> Result<(&str, u16)> {
    let invalid = || bherror::Error::root(Error::InvalidAddress(addr.to_owned()));

    let (host, port) = match addr.strip_prefix('[') {
        Some(rest) => {
            let (host, rest) = rest.split_once(']').ok_or_else(invalid)?;
            let port = rest.strip_prefix(':').ok_or_else(invalid)?;
            (host, port)
        }
        None => {
            let (host, port) = addr.rsplit_once(':').ok_or_else(invalid)?;
            // an unbracketed IPv6 address is ambiguous
            if host.contains(':') {
                return Err(invalid()).ctx(|| "IPv6 addresses must be enclosed in brackets");
            }
            (host, port)
        }
    };

    if host.is_empty() {
        return Err(invalid()).ctx(|| "missing host");
    }
    let port = port
        .parse::<u16>()
        .foreign_err(|| Error::InvalidAddress(addr.to_owned()))
        .ctx(|| "invalid port")?;

    Ok((host, port))
}

/// The point in time by which a retrieval has to be done, if any.
#[derive(Clone, Copy, Debug)]
struct Deadline(Option<Instant>);

impl Deadline {
    /// A deadline `timeout` from now, none for a zero `timeout`.
    fn after(timeout: Duration) -> Self {
        Self(non_zero(timeout).and_then(|timeout| Instant::now().checked_add(timeout)))
    }

    /// Time left until the deadline, [`None`] meaning unbounded.
    ///
    /// Fails with [`io::ErrorKind::TimedOut`] once the deadline has passed.
    fn remaining(self) -> io::Result<Option<Duration>> {
        let Some(deadline) = self.0 else {
            return Ok(None);
        };

        match deadline.checked_duration_since(Instant::now()) {
            Some(remaining) if !remaining.is_zero() => Ok(Some(remaining)),
            _ => Err(io::Error::new(io::ErrorKind::TimedOut, "deadline exceeded")),
        }
    }

    fn has_passed(self) -> bool {
        self.0.is_some_and(|deadline| Instant::now() >= deadline)
    }
}

/// A [`TcpStream`] whose every read and write is bounded by the time left until the deadline.
///
/// A peer trickling bytes cannot stretch the exchange past the deadline, since each call gets
/// only what is left of it.
#[derive(Debug)]
struct DeadlineStream {
    stream: TcpStream,
    deadline: Deadline,
}

impl Read for DeadlineStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stream.set_read_timeout(self.deadline.remaining()?)?;
        self.stream.read(buf)
    }
}

impl Write for DeadlineStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.stream.set_write_timeout(self.deadline.remaining()?)?;
        self.stream.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.stream.flush()
    }
}

fn handshake(
    host: &str,
    port: u16,
    deadline: Deadline,
    verify: bool,
) -> Result<SslStream<DeadlineStream>> {
    let stream = DeadlineStream {
        stream: connect(host, port, deadline)?,
        deadline,
    };

    let mut builder = SslConnector::builder(SslMethod::tls()).foreign_err(|| Error::Tls)?;
    if !verify {
        builder.set_verify(SslVerifyMode::NONE);
    }
    let connector = builder.build();

    let mut result = connector
        .configure()
        .foreign_err(|| Error::Tls)?
        .verify_hostname(verify)
        .connect(host, stream);

    // An expired socket timeout surfaces as `WouldBlock`; resuming makes the stream report
    // whether the deadline is really gone.
    loop {
        match result {
            Ok(stream) => return Ok(stream),
            Err(HandshakeError::WouldBlock(mid_handshake)) => result = mid_handshake.handshake(),
            Err(err) => {
                let error = if deadline.has_passed() {
                    Error::Timeout(format!("{host}:{port}"))
                } else {
                    Error::Handshake(format!("{host}:{port}"))
                };
                return Err(bherror::Error::root(error).ctx(err.to_string()));
            }
        }
    }
}

fn connect(host: &str, port: u16, deadline: Deadline) -> Result<TcpStream> {
    let connect_error = || Error::Connect(format!("{host}:{port}"));
    let timeout_error = || Error::Timeout(format!("{host}:{port}"));

    let addrs = resolve(host, port, deadline)?;

    let mut last_error = None;
    for addr in addrs {
        let remaining = deadline
            .remaining()
            .foreign_err(timeout_error)
            .ctx(|| "connecting")?;
        let stream = match remaining {
            Some(remaining) => TcpStream::connect_timeout(&addr, remaining),
            None => TcpStream::connect(addr),
        };
        match stream {
            Ok(stream) => {
                tracing::debug!(%addr, "connected");
                return Ok(stream);
            }
            Err(err) => last_error = Some(err),
        }
    }

    match last_error {
        Some(err) if deadline.has_passed() => Err(err).foreign_err(timeout_error),
        Some(err) => Err(err).foreign_err(connect_error),
        None => Err(bherror::Error::root(connect_error())).ctx(|| "no addresses"),
    }
}

/// Resolve the host, giving up on the lookup once the deadline has passed.
fn resolve(host: &str, port: u16, deadline: Deadline) -> Result<Vec<SocketAddr>> {
    let connect_error = || Error::Connect(format!("{host}:{port}"));
    let timeout_error = || Error::Timeout(format!("{host}:{port}"));

    let remaining = deadline
        .remaining()
        .foreign_err(timeout_error)
        .ctx(|| "resolving host")?;
    let Some(remaining) = remaining else {
        return (host, port)
            .to_socket_addrs()
            .map(Iterator::collect::<Vec<_>>)
            .foreign_err(connect_error)
            .ctx(|| "cannot resolve host");
    };

    // The system resolver cannot be interrupted, so a lookup past the deadline is left to
    // finish on its own.
    let (sender, receiver) = mpsc::channel();
    let target = (host.to_owned(), port);
    thread::spawn(move || {
        let _ = sender.send(target.to_socket_addrs().map(Iterator::collect::<Vec<_>>));
    });

    match receiver.recv_timeout(remaining) {
        Ok(addrs) => addrs
            .foreign_err(connect_error)
            .ctx(|| "cannot resolve host"),
        Err(mpsc::RecvTimeoutError::Timeout) => {
            Err(bherror::Error::root(timeout_error())).ctx(|| "resolving host")
        }
        Err(mpsc::RecvTimeoutError::Disconnected) => {
            Err(bherror::Error::root(connect_error())).ctx(|| "resolver exited")
        }
    }
}

fn peer_certificates(stream: &SslStream<DeadlineStream>) -> Result<Vec<Certificate>> {
    let Some(chain) = stream.ssl().peer_cert_chain() else {
        return Err(bherror::Error::root(Error::NoCertificates));
    };
    if chain.is_empty() {
        return Err(bherror::Error::root(Error::NoCertificates));
    }

    chain
        .iter()
        .map(|cert| Certificate::from_x509(cert.to_owned()).with_err(|| Error::Certificate))
        .collect()
}
