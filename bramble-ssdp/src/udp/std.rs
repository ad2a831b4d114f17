use super::{Error, Syscall, TargetedReceive, TargetedSend};
use std::net::{IpAddr, Ipv4Addr, SocketAddr, SocketAddrV4};

fn syscall(s: Syscall) -> impl FnOnce(std::io::Error) -> Error {
    move |e| Error::Syscall(s, e)
}

/// A non-blocking UDP socket joined to the SSDP multicast group
///
/// Setup either succeeds completely or fails with the syscall that
/// broke; there is no half-initialised state. The socket is
/// single-homed: it reports `local_ip` as the address peers should
/// reply to.
pub struct MulticastSocket {
    socket: std::net::UdpSocket,
    local_ip: IpAddr,
}

impl MulticastSocket {
    /// Bind to `port` on all interfaces and join `group` on `local_ip`
    ///
    /// # Errors
    ///
    /// Any failing system call aborts the setup and is returned.
    pub fn bind(
        group: Ipv4Addr,
        port: u16,
        local_ip: Ipv4Addr,
    ) -> Result<Self, Error> {
        let socket = socket2::Socket::new(
            socket2::Domain::IPV4,
            socket2::Type::DGRAM,
            None,
        )
        .map_err(syscall(Syscall::Socket))?;
        socket
            .set_reuse_address(true)
            .map_err(syscall(Syscall::SetOption))?;
        socket
            .set_nonblocking(true)
            .map_err(syscall(Syscall::SetOption))?;
        socket
            .set_multicast_ttl_v4(1)
            .map_err(syscall(Syscall::SetOption))?;
        let addr = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port);
        socket
            .bind(&socket2::SockAddr::from(addr))
            .map_err(syscall(Syscall::Bind))?;
        socket
            .join_multicast_v4(&group, &local_ip)
            .map_err(syscall(Syscall::JoinMulticast))?;
        Ok(Self {
            socket: socket.into(),
            local_ip: IpAddr::V4(local_ip),
        })
    }
}

impl TargetedSend for MulticastSocket {
    fn send_with<F>(
        &self,
        size: usize,
        to: &SocketAddr,
        _from: &IpAddr,
        f: F,
    ) -> Result<(), Error>
    where
        F: FnOnce(&mut [u8]) -> usize,
    {
        let mut buffer = vec![0u8; size];
        let n = f(&mut buffer);
        self.socket
            .send_to(&buffer[0..n], to)
            .map_err(syscall(Syscall::SendTo))?;
        Ok(())
    }
}

impl TargetedReceive for MulticastSocket {
    fn receive_to(
        &self,
        buffer: &mut [u8],
    ) -> Result<(usize, IpAddr, SocketAddr), Error> {
        let (n, from) = self
            .socket
            .recv_from(buffer)
            .map_err(syscall(Syscall::RecvFrom))?;
        Ok((n, self.local_ip, from))
    }
}
