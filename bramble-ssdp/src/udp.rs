//! The socket seam between the [`crate::Engine`] and the real network

use ::std::net::{IpAddr, SocketAddr};

/// The system calls which can fail while setting up or using a socket
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Syscall {
    /// socket() failed
    Socket,
    /// bind() failed
    Bind,
    /// A setsockopt() variant failed
    SetOption,
    /// Joining the multicast group failed
    JoinMulticast,
    /// sendto() failed
    SendTo,
    /// recvfrom() failed
    RecvFrom,
}

/// Errors returned from the UDP trait methods
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A system call returned an error
    #[error("error from syscall {0:?}")]
    Syscall(Syscall, #[source] ::std::io::Error),
}

/// Sending UDP datagrams, with the desired source address made explicit
///
/// The `from` address matters on multi-homed hosts, where a discovery
/// response must originate from the address the search arrived on;
/// single-homed implementations are free to ignore it.
pub trait TargetedSend {
    /// Build and send one datagram
    ///
    /// The closure is handed a scratch buffer of (at least) `size`
    /// bytes and returns how many it wrote; only that prefix is sent.
    ///
    /// # Errors
    ///
    /// Returns `Err` if the underlying send fails.
    fn send_with<F>(
        &self,
        size: usize,
        to: &SocketAddr,
        from: &IpAddr,
        f: F,
    ) -> Result<(), Error>
    where
        F: FnOnce(&mut [u8]) -> usize;
}

/// Receiving UDP datagrams, recording which local IP is answerable
///
/// The reported address is the one a peer would expect a reply to
/// originate from, which the engine threads through to the `LOCATION`
/// header of its response.
pub trait TargetedReceive {
    /// Receive one datagram
    ///
    /// # Errors
    ///
    /// Returns `Err` if the underlying receive fails; a receive that
    /// would block is an error too (callers poll).
    fn receive_to(
        &self,
        buffer: &mut [u8],
    ) -> Result<(usize, IpAddr, SocketAddr), Error>;
}

/// Trait implementations for `std::net` sockets
pub mod std;
