//! Ephemeral UDP port allocation.
//!
//! The kernel assigns a free port when a socket binds to port 0; reading that
//! port back and dropping the socket releases it. The result is advisory
//! only — nothing stops a second bind from racing for the same port before
//! the real consumer gets to it. Callers that need that guarantee wrap this
//! in their own retry loop (the Egress Supervisor does).

use std::net::{SocketAddr, UdpSocket};

use socket2::{Domain, Socket, Type};

/// Binds to `(host, 0)` with address reuse explicitly disabled for
/// exclusive use, reads the kernel-assigned port, and releases the socket.
pub fn allocate_udp_port(host: &str) -> std::io::Result<u16> {
    let addr: SocketAddr = format!("{host}:0").parse().map_err(std::io::Error::other)?;

    let socket = Socket::new(Domain::for_address(addr), Type::DGRAM, None)?;
    socket.set_reuse_address(false)?;
    socket.bind(&addr.into())?;

    let udp: UdpSocket = socket.into();
    let port = udp.local_addr()?.port();
    drop(udp);
    Ok(port)
}

/// Allocates two independent ports (RTP, RTCP) for a single session.
///
/// Binding back-to-back rather than reusing one bind-and-release cycle keeps
/// the two allocations from colliding with each other in the rare case the
/// kernel hands back the same port twice in a row after release.
pub fn allocate_udp_port_pair(host: &str) -> std::io::Result<(u16, u16)> {
    let rtp = allocate_udp_port(host)?;
    let rtcp = allocate_udp_port(host)?;
    Ok((rtp, rtcp))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocates_a_usable_port() {
        let port = allocate_udp_port("127.0.0.1").expect("allocation should succeed");
        assert!(port > 0);
        // The port should be free again immediately after allocation.
        let _ = UdpSocket::bind(("127.0.0.1", port)).expect("port should be free after release");
    }

    #[test]
    fn allocates_distinct_ports_for_a_pair() {
        let (rtp, rtcp) = allocate_udp_port_pair("127.0.0.1").expect("pair allocation should succeed");
        assert_ne!(rtp, rtcp);
    }
}
