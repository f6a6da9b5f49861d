use std::net::{Ipv4Addr, SocketAddr, UdpSocket};
use std::process::Command;

use regex::Regex;
use slog::warn;
use socket2::{Domain, Protocol, SockAddr, Type};

use crate::{Error, Result, StationId};

/// Broadcast channel for control messages.
pub trait Transport {
    fn broadcast_send(&self, payload: &[u8]) -> Result<()>;

    /// Block until a frame arrives. Returns its length and sender.
    fn recv(&self, buf: &mut [u8]) -> Result<(usize, StationId)>;
}

pub struct Socket {
    sk: UdpSocket,
    dst: SocketAddr,
}

impl Socket {
    /// Listen on `port` and broadcast to `broadcast:port`. With `iface` set,
    /// only frames arriving on that interface are received.
    pub fn new(iface: Option<&str>, port: u16, broadcast: Ipv4Addr) -> Result<Self> {
        let sk = socket2::Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))
            .map_err(Error::Transport)?;
        if let Some(iface) = iface {
            bind_device(&sk, iface)?;
        }
        sk.set_reuse_address(true).map_err(Error::Transport)?;
        sk.set_broadcast(true).map_err(Error::Transport)?;
        sk.bind(&SockAddr::from(SocketAddr::from((Ipv4Addr::UNSPECIFIED, port))))
            .map_err(Error::Transport)?;

        let sk: UdpSocket = sk.into();
        // port 0 picks an ephemeral port; peers must use the same one
        let port = sk.local_addr().map_err(Error::Transport)?.port();
        Ok(Socket {
            sk,
            dst: SocketAddr::from((broadcast, port)),
        })
    }

    pub fn try_clone(&self) -> Result<Self> {
        Ok(Socket {
            sk: self.sk.try_clone().map_err(Error::Transport)?,
            dst: self.dst,
        })
    }
}

#[cfg(any(target_os = "linux", target_os = "android"))]
fn bind_device(sk: &socket2::Socket, iface: &str) -> Result<()> {
    sk.bind_device(Some(iface.as_bytes())).map_err(Error::Transport)
}

#[cfg(not(any(target_os = "linux", target_os = "android")))]
fn bind_device(_sk: &socket2::Socket, iface: &str) -> Result<()> {
    Err(Error::Setup(format!("cannot bind to {} on this platform", iface)))
}

impl Transport for Socket {
    fn broadcast_send(&self, payload: &[u8]) -> Result<()> {
        self.sk
            .send_to(payload, self.dst)
            .map(|_| ())
            .map_err(Error::Transport)
    }

    fn recv(&self, buf: &mut [u8]) -> Result<(usize, StationId)> {
        let (n, from) = self.sk.recv_from(buf).map_err(Error::Transport)?;
        Ok((n, StationId::new(from.ip().to_string())))
    }
}

/// IPv4 address and broadcast address of an interface, from `ip addr show`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IfaceAddrs {
    pub addr: Ipv4Addr,
    pub broadcast: Ipv4Addr,
}

pub fn parse_ip_addr(ip_addr_out: &str) -> Option<IfaceAddrs> {
    let re = Regex::new(r"inet ([0-9]{1,3}(?:\.[0-9]{1,3}){3})/[0-9]+(?: brd ([0-9]{1,3}(?:\.[0-9]{1,3}){3}))?").ok()?;
    let caps = re.captures(ip_addr_out)?;
    let addr = caps.get(1)?.as_str().parse().ok()?;
    let broadcast = caps
        .get(2)
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(Ipv4Addr::BROADCAST);
    Some(IfaceAddrs { addr, broadcast })
}

pub fn get_iface_addrs(logger: &slog::Logger, iface: &str) -> Option<IfaceAddrs> {
    let ip_addr = match Command::new("ip").arg("addr").arg("show").arg(iface).output() {
        Ok(out) => out,
        Err(e) => {
            warn!(logger, "ip addr show failed to run"; "err" => ?e);
            return None;
        }
    };

    if ip_addr.status.success() {
        let ip_addr_out = String::from_utf8_lossy(&ip_addr.stdout);
        let addrs = parse_ip_addr(&ip_addr_out);
        if addrs.is_none() {
            warn!(logger, "ip addr show has no inet address"; "iface" => iface);
        }
        addrs
    } else {
        warn!(
            logger,
            "ip addr show failed with exit code {:?}",
            ip_addr.status.code()
        );
        None
    }
}
