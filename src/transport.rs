// Copyright 2016 Intel Corporation. All rights reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

//! Datagram transports.
//!
//! The session layer is written against the [`Transport`] trait so that the
//! same engine can run over plain UDP ([`UdpTransport`]), a DTLS-wrapped
//! socket provided by the embedder, or the in-memory [`LoopbackNetwork`]
//! used by the test suite. Transports are strictly non-blocking: inbound
//! readiness is signalled through the callback installed by
//! [`Transport::start`], and [`Transport::recvmsg`] returns `Ok(None)` when
//! there is nothing to read.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::rc::Rc;

use crate::error::Error;
use crate::mainloop::{Scheduler, WatchHandle};

/// Largest datagram the stack will send or receive.
pub const MAX_DATAGRAM_SIZE: usize = 1500;

/// A non-blocking, connectionless datagram endpoint.
pub trait Transport {
    /// Sends one datagram to `addr`. A transport may silently drop (UDP
    /// semantics); an error here means the datagram could not even be queued.
    fn sendmsg(&self, addr: &SocketAddr, buf: &[u8]) -> Result<(), Error>;

    /// Receives one datagram, or `Ok(None)` if none is pending.
    fn recvmsg(&self, buf: &mut [u8]) -> Result<Option<(usize, SocketAddr)>, Error>;

    /// Installs `on_readable` to run (through `sched`) whenever a datagram
    /// may be pending. The callback is expected to drain `recvmsg`.
    fn start(&self, sched: Rc<dyn Scheduler>, on_readable: Box<dyn FnMut()>)
        -> Result<(), Error>;

    /// Tears down the readiness callback installed by [`start`](Self::start).
    fn stop(&self);

    /// The local address this endpoint is bound to.
    fn local_addr(&self) -> Result<SocketAddr, Error>;

    /// Joins a multicast group, so that datagrams addressed to `group` are
    /// delivered to this endpoint.
    fn join_multicast(&self, group: IpAddr) -> Result<(), Error>;

    /// Whether this transport encrypts on the wire (DTLS).
    fn is_secure(&self) -> bool {
        false
    }
}

/// Contract between a DTLS transport and whatever stores its pre-shared keys.
///
/// Both callbacks fill caller-provided buffers and return the number of bytes
/// written, failing with [`Error::OutOfSpace`] when the buffer is too small
/// and [`Error::NotFound`] when no key matches.
pub trait DtlsCredentials {
    /// Writes this device's own identity into `buf`.
    fn get_id(&self, buf: &mut [u8]) -> Result<usize, Error>;

    /// Looks up the pre-shared key for the peer identity `id`.
    fn get_psk(&self, id: &[u8], buf: &mut [u8]) -> Result<usize, Error>;
}

/// [`Transport`] over a non-blocking `std::net::UdpSocket`, wired into the
/// scheduler through a file-descriptor watch.
pub struct UdpTransport {
    socket: std::net::UdpSocket,
    watch: RefCell<Option<(Rc<dyn Scheduler>, WatchHandle)>>,
}

impl UdpTransport {
    /// Binds a UDP socket on `port` (0 for ephemeral), dual-listening on all
    /// interfaces.
    pub fn bind(port: u16) -> Result<Rc<UdpTransport>, Error> {
        let socket = std::net::UdpSocket::bind((Ipv4Addr::UNSPECIFIED, port))?;
        socket.set_nonblocking(true)?;
        Ok(Rc::new(UdpTransport {
            socket,
            watch: RefCell::new(None),
        }))
    }
}

impl Transport for UdpTransport {
    fn sendmsg(&self, addr: &SocketAddr, buf: &[u8]) -> Result<(), Error> {
        match self.socket.send_to(buf, addr) {
            Ok(_) => Ok(()),
            Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                // Treated like radio loss; retransmission covers it.
                warn!("udp: send to {} would block, dropping", addr);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn recvmsg(&self, buf: &mut [u8]) -> Result<Option<(usize, SocketAddr)>, Error> {
        match self.socket.recv_from(buf) {
            Ok((len, addr)) => Ok(Some((len, addr))),
            Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    #[cfg(unix)]
    fn start(
        &self,
        sched: Rc<dyn Scheduler>,
        mut on_readable: Box<dyn FnMut()>,
    ) -> Result<(), Error> {
        use std::os::unix::io::AsRawFd;

        let fd = self.socket.as_raw_fd();
        let handle = sched.fd_watch_add(
            fd,
            Box::new(move || {
                on_readable();
                true
            }),
        );
        *self.watch.borrow_mut() = Some((sched, handle));
        Ok(())
    }

    #[cfg(not(unix))]
    fn start(
        &self,
        _sched: Rc<dyn Scheduler>,
        _on_readable: Box<dyn FnMut()>,
    ) -> Result<(), Error> {
        Err(Error::InvalidArgument)
    }

    fn stop(&self) {
        if let Some((sched, handle)) = self.watch.borrow_mut().take() {
            sched.fd_watch_del(handle);
        }
    }

    fn local_addr(&self) -> Result<SocketAddr, Error> {
        Ok(self.socket.local_addr()?)
    }

    fn join_multicast(&self, group: IpAddr) -> Result<(), Error> {
        match group {
            IpAddr::V4(g) => self.socket.join_multicast_v4(&g, &Ipv4Addr::UNSPECIFIED)?,
            IpAddr::V6(g) => self.socket.join_multicast_v6(&g, 0)?,
        }
        Ok(())
    }
}

struct Endpoint {
    addr: SocketAddr,
    secure: bool,
    queue: RefCell<VecDeque<(SocketAddr, Vec<u8>)>>,
    groups: RefCell<Vec<IpAddr>>,
    handler: RefCell<Option<Box<dyn FnMut()>>>,
    sched: RefCell<Option<Rc<dyn Scheduler>>>,
}

#[derive(Default)]
struct NetworkInner {
    next_port: u16,
    endpoints: HashMap<SocketAddr, Rc<Endpoint>>,
    // Counts of delivered datagrams, keyed by (source, destination).
    delivered: HashMap<(SocketAddr, SocketAddr), usize>,
    blackhole: bool,
}

/// An in-memory datagram fabric connecting [`LoopbackTransport`] endpoints.
///
/// Delivery is asynchronous: `sendmsg` enqueues on the destination and
/// schedules an idle on the destination's scheduler, so a test drives the
/// whole exchange with `ManualScheduler::run_idles` / `advance`. The fabric
/// can be turned into a blackhole to exercise retransmission and timeout
/// paths, and it counts datagrams per (source, destination) pair.
pub struct LoopbackNetwork {
    inner: RefCell<NetworkInner>,
}

impl LoopbackNetwork {
    pub fn new() -> Rc<LoopbackNetwork> {
        Rc::new(LoopbackNetwork {
            inner: RefCell::new(NetworkInner {
                next_port: 49152,
                ..NetworkInner::default()
            }),
        })
    }

    /// Creates an endpoint bound to 127.0.0.1 on `port` (0 for ephemeral).
    pub fn endpoint(self: &Rc<Self>, port: u16) -> Rc<LoopbackTransport> {
        self.endpoint_full(port, false)
    }

    /// Like [`endpoint`](Self::endpoint), but the transport reports itself
    /// as secure, standing in for a DTLS socket.
    pub fn secure_endpoint(self: &Rc<Self>, port: u16) -> Rc<LoopbackTransport> {
        self.endpoint_full(port, true)
    }

    fn endpoint_full(self: &Rc<Self>, port: u16, secure: bool) -> Rc<LoopbackTransport> {
        let mut inner = self.inner.borrow_mut();
        let port = if port == 0 {
            inner.next_port += 1;
            inner.next_port
        } else {
            port
        };
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port);
        let ep = Rc::new(Endpoint {
            addr,
            secure,
            queue: RefCell::new(VecDeque::new()),
            groups: RefCell::new(Vec::new()),
            handler: RefCell::new(None),
            sched: RefCell::new(None),
        });
        inner.endpoints.insert(addr, ep.clone());
        Rc::new(LoopbackTransport {
            net: self.clone(),
            ep,
        })
    }

    /// When `true`, every subsequent datagram is silently discarded.
    pub fn set_blackhole(&self, on: bool) {
        self.inner.borrow_mut().blackhole = on;
    }

    /// How many datagrams have been delivered from `src` to `dst`.
    pub fn delivered(&self, src: SocketAddr, dst: SocketAddr) -> usize {
        *self
            .inner
            .borrow()
            .delivered
            .get(&(src, dst))
            .unwrap_or(&0)
    }

    fn deliver(&self, src: SocketAddr, dst: &SocketAddr, buf: &[u8]) {
        let targets: Vec<Rc<Endpoint>> = {
            let inner = self.inner.borrow();
            if inner.blackhole {
                debug!("loopback: blackhole, dropping {} bytes for {}", buf.len(), dst);
                return;
            }
            if dst.ip().is_multicast() {
                inner
                    .endpoints
                    .values()
                    .filter(|ep| {
                        ep.addr.port() == dst.port()
                            && ep.groups.borrow().contains(&dst.ip())
                            && ep.addr != src
                    })
                    .cloned()
                    .collect()
            } else {
                inner.endpoints.get(dst).cloned().into_iter().collect()
            }
        };

        for ep in targets {
            ep.queue.borrow_mut().push_back((src, buf.to_vec()));
            *self
                .inner
                .borrow_mut()
                .delivered
                .entry((src, ep.addr))
                .or_insert(0) += 1;

            let sched = ep.sched.borrow().clone();
            if let Some(sched) = sched {
                let ep = Rc::downgrade(&ep);
                sched.idle_add(Box::new(move || {
                    if let Some(ep) = ep.upgrade() {
                        // Detach the handler while it runs so it can trigger
                        // further deliveries to this same endpoint.
                        let handler = ep.handler.borrow_mut().take();
                        if let Some(mut handler) = handler {
                            handler();
                            if ep.handler.borrow().is_none() {
                                *ep.handler.borrow_mut() = Some(handler);
                            }
                        }
                    }
                }));
            }
        }
    }

    fn unbind(&self, addr: &SocketAddr) {
        self.inner.borrow_mut().endpoints.remove(addr);
    }
}

/// One endpoint on a [`LoopbackNetwork`].
pub struct LoopbackTransport {
    net: Rc<LoopbackNetwork>,
    ep: Rc<Endpoint>,
}

impl Transport for LoopbackTransport {
    fn sendmsg(&self, addr: &SocketAddr, buf: &[u8]) -> Result<(), Error> {
        if buf.len() > MAX_DATAGRAM_SIZE {
            return Err(Error::OutOfSpace);
        }
        self.net.deliver(self.ep.addr, addr, buf);
        Ok(())
    }

    fn recvmsg(&self, buf: &mut [u8]) -> Result<Option<(usize, SocketAddr)>, Error> {
        match self.ep.queue.borrow_mut().pop_front() {
            Some((src, data)) => {
                if data.len() > buf.len() {
                    return Err(Error::OutOfSpace);
                }
                buf[..data.len()].copy_from_slice(&data);
                Ok(Some((data.len(), src)))
            }
            None => Ok(None),
        }
    }

    fn start(
        &self,
        sched: Rc<dyn Scheduler>,
        on_readable: Box<dyn FnMut()>,
    ) -> Result<(), Error> {
        *self.ep.handler.borrow_mut() = Some(on_readable);
        *self.ep.sched.borrow_mut() = Some(sched);
        Ok(())
    }

    fn stop(&self) {
        self.ep.handler.borrow_mut().take();
        self.ep.sched.borrow_mut().take();
    }

    fn local_addr(&self) -> Result<SocketAddr, Error> {
        Ok(self.ep.addr)
    }

    fn join_multicast(&self, group: IpAddr) -> Result<(), Error> {
        self.ep.groups.borrow_mut().push(group);
        Ok(())
    }

    fn is_secure(&self) -> bool {
        self.ep.secure
    }
}

impl Drop for LoopbackTransport {
    fn drop(&mut self) {
        self.net.unbind(&self.ep.addr);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mainloop::ManualScheduler;
    use std::cell::Cell;

    #[test]
    fn loopback_unicast_delivery() {
        let net = LoopbackNetwork::new();
        let sched: Rc<ManualScheduler> = Rc::new(ManualScheduler::new());
        let a = net.endpoint(0);
        let b = net.endpoint(0);

        let got = Rc::new(Cell::new(false));
        let got_in = got.clone();
        let b_in = b.clone();
        let a_addr = a.local_addr().unwrap();
        b.start(
            sched.clone(),
            Box::new(move || {
                let mut buf = [0u8; 64];
                while let Some((len, src)) = b_in.recvmsg(&mut buf).unwrap() {
                    assert_eq!(&buf[..len], b"hello");
                    assert_eq!(src, a_addr);
                    got_in.set(true);
                }
            }),
        )
        .unwrap();

        a.sendmsg(&b.local_addr().unwrap(), b"hello").unwrap();
        assert!(!got.get());
        sched.run_idles();
        assert!(got.get());
        assert_eq!(net.delivered(a_addr, b.local_addr().unwrap()), 1);
    }

    #[test]
    fn loopback_multicast_reaches_joined_endpoints_only() {
        let net = LoopbackNetwork::new();
        let group: SocketAddr = "224.0.1.187:5683".parse().unwrap();

        let a = net.endpoint(0);
        let b = net.endpoint(5683);
        let c = net.endpoint(5683 + 1);
        b.join_multicast(group.ip()).unwrap();
        c.join_multicast(group.ip()).unwrap();

        a.sendmsg(&group, b"disc").unwrap();

        let mut buf = [0u8; 16];
        assert!(b.recvmsg(&mut buf).unwrap().is_some());
        // Wrong port, no delivery despite having joined.
        assert!(c.recvmsg(&mut buf).unwrap().is_none());
    }

    #[test]
    fn blackhole_discards() {
        let net = LoopbackNetwork::new();
        let a = net.endpoint(0);
        let b = net.endpoint(0);

        net.set_blackhole(true);
        a.sendmsg(&b.local_addr().unwrap(), b"x").unwrap();
        let mut buf = [0u8; 16];
        assert!(b.recvmsg(&mut buf).unwrap().is_none());

        net.set_blackhole(false);
        a.sendmsg(&b.local_addr().unwrap(), b"y").unwrap();
        assert!(b.recvmsg(&mut buf).unwrap().is_some());
    }
}
