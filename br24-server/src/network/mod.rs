use socket2::{Domain, Protocol, Type};
use std::net::SocketAddrV4;
use std::{
    io,
    net::{IpAddr, Ipv4Addr, SocketAddr},
};
use tokio::net::UdpSocket;

use crate::radar::RadarError;

// this will be common for all our sockets
pub fn new_socket() -> io::Result<socket2::Socket> {
    let socket = socket2::Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;

    // tokio drives the socket, so it must never block
    socket.set_nonblocking(true)?;
    socket.set_reuse_address(true)?;

    Ok(socket)
}

/// On Windows, unlike all Unix variants, it is improper to bind to the multicast address
///
/// see https://msdn.microsoft.com/en-us/library/windows/desktop/ms737550(v=vs.85).aspx
#[cfg(windows)]
fn bind_to_multicast(
    socket: &socket2::Socket,
    addr: &SocketAddrV4,
    nic_addr: &Ipv4Addr,
) -> io::Result<()> {
    socket.join_multicast_v4(addr.ip(), nic_addr)?;

    let socketaddr = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), addr.port());
    socket.bind(&socket2::SockAddr::from(socketaddr))?;
    log::trace!("Binding multicast socket to {}", socketaddr);

    Ok(())
}

/// On unixes we bind to the multicast address, which causes multicast packets to be filtered
#[cfg(unix)]
fn bind_to_multicast(
    socket: &socket2::Socket,
    addr: &SocketAddrV4,
    nic_addr: &Ipv4Addr,
) -> io::Result<()> {
    // Linux is special, if we don't disable IP_MULTICAST_ALL the kernel forgets on
    // which device the multicast packet arrived and sends it to all sockets.
    #[cfg(target_os = "linux")]
    {
        use std::{mem, os::unix::io::AsRawFd};

        unsafe {
            let optval: libc::c_int = 0;
            let ret = libc::setsockopt(
                socket.as_raw_fd(),
                libc::SOL_IP,
                libc::IP_MULTICAST_ALL,
                &optval as *const _ as *const libc::c_void,
                mem::size_of_val(&optval) as libc::socklen_t,
            );
            if ret != 0 {
                return Err(io::Error::last_os_error());
            }
        }
    }

    let socketaddr = SocketAddr::new(IpAddr::V4(*addr.ip()), addr.port());
    socket.bind(&socket2::SockAddr::from(socketaddr))?;

    socket.join_multicast_v4(addr.ip(), nic_addr)?;

    log::trace!(
        "Binding multicast socket to {} for multicast group {} nic {}",
        socketaddr,
        addr.ip(),
        nic_addr
    );

    Ok(())
}

pub fn create_udp_multicast_listen(
    addr: &SocketAddrV4,
    nic_addr: &Ipv4Addr,
) -> io::Result<UdpSocket> {
    let socket: socket2::Socket = new_socket()?;

    bind_to_multicast(&socket, addr, nic_addr)?;

    let socket = UdpSocket::from_std(socket.into())?;
    Ok(socket)
}

/// Listen on a multicast group, or directly on a unicast address.
///
/// The unicast case is what a bench setup or a test harness uses; port 0
/// picks a free port.
pub fn create_udp_listen(addr: &SocketAddrV4, nic_addr: &Ipv4Addr) -> io::Result<UdpSocket> {
    if addr.ip().is_multicast() {
        return create_udp_multicast_listen(addr, nic_addr);
    }

    let socket: socket2::Socket = new_socket()?;
    socket.bind(&socket2::SockAddr::from(*addr))?;
    log::trace!("Binding socket to {}", addr);

    let socket = UdpSocket::from_std(socket.into())?;
    Ok(socket)
}

pub fn create_multicast_send(addr: &SocketAddrV4, nic_addr: &Ipv4Addr) -> io::Result<UdpSocket> {
    let socket: socket2::Socket = new_socket()?;

    let socketaddr = SocketAddr::new(IpAddr::V4(*addr.ip()), addr.port());
    let socketaddr_nic = SocketAddr::new(IpAddr::V4(*nic_addr), 0);
    if addr.ip().is_multicast() {
        socket.set_multicast_if_v4(nic_addr)?;
    }
    socket.bind(&socket2::SockAddr::from(socketaddr_nic))?;
    socket.connect(&socket2::SockAddr::from(socketaddr))?;

    let socket = UdpSocket::from_std(socket.into())?;
    Ok(socket)
}

/// Resolve the `--interface` argument to the IPv4 address to join groups on.
///
/// Accepts an IPv4 address or an interface name. Without an argument the
/// groups are joined on all interfaces.
pub fn find_nic_addr(interface: Option<&str>) -> Result<Ipv4Addr, RadarError> {
    use network_interface::{NetworkInterface, NetworkInterfaceConfig};

    let Some(interface) = interface else {
        return Ok(Ipv4Addr::UNSPECIFIED);
    };
    if let Ok(addr) = interface.parse::<Ipv4Addr>() {
        return Ok(addr);
    }

    let interfaces = NetworkInterface::show().map_err(|_| RadarError::EnumerationFailed)?;
    let itf = interfaces
        .iter()
        .find(|itf| itf.name == interface)
        .ok_or_else(|| RadarError::InterfaceNotFound(interface.to_owned()))?;

    for addr in &itf.addr {
        if let IpAddr::V4(nic_ip) = addr.ip() {
            log::debug!("Using interface {} ({})", itf.name, nic_ip);
            return Ok(nic_ip);
        }
    }
    Err(RadarError::InterfaceNoV4(interface.to_owned()))
}
