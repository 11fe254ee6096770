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

use std::cell::RefCell;
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::rc::{Rc, Weak};
use std::time::Duration;

use rand::Rng;

use super::resource::CoapResource;
use super::{
    ACK_TIMEOUT, ALL_NODES_V4, ALL_NODES_V6_LINK, ALL_NODES_V6_SITE, DEDUP_WINDOW,
    DEFAULT_UDP_PORT, MAX_REPLY_TIMEOUT, MAX_RETRANSMIT,
};
use crate::error::Error;
use crate::mainloop::{Scheduler, TimeoutHandle};
use crate::message::{MsgCode, MsgToken, MsgType, Packet};
use crate::transport::{Transport, UdpTransport, MAX_DATAGRAM_SIZE};

/// Callback for [`CoapServer::send_with_reply`]. Invoked with `Some` for
/// every matching reply and with `None` exactly once if the exchange times
/// out; returning `true` keeps the pending entry alive for further replies
/// (multicast discovery, observation).
pub type ReplyCallback = Box<dyn FnMut(Option<(&Packet, SocketAddr)>) -> bool>;

/// Identifies one pending exchange, for cancellation.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct PendingId(u64);

struct ResourceEntry {
    resource: Rc<CoapResource>,
    observers: Vec<Observer>,
    // 24-bit notification sequence number, per RFC 7641.
    age: u32,
}

#[derive(Clone)]
struct Observer {
    addr: SocketAddr,
    token: MsgToken,
}

struct PendingReply {
    id: u64,
    token: MsgToken,
    msg_id: u16,
    addr: SocketAddr,
    multicast: bool,
    observing: bool,
    timeout: Option<TimeoutHandle>,
    cb: ReplyCallback,
}

struct Outgoing {
    id: u64,
    msg_id: u16,
    addr: SocketAddr,
    bytes: Vec<u8>,
    attempts: u32,
    delay: Duration,
    timer: TimeoutHandle,
    // Set for observe notifications: the observer to prune if the peer
    // never acknowledges or resets.
    notify_target: Option<(Rc<CoapResource>, MsgToken)>,
}

// One slot of the duplicate-detection window. Once the response to the
// request goes out it is kept here, so a retransmitted request whose
// response was lost gets the same response again.
struct DedupEntry {
    addr: SocketAddr,
    msg_id: u16,
    token: MsgToken,
    response: Option<Vec<u8>>,
}

#[derive(Default)]
struct Inner {
    resources: Vec<ResourceEntry>,
    pending: Vec<PendingReply>,
    outgoing: Vec<Outgoing>,
    dedup: VecDeque<DedupEntry>,
    next_msg_id: u16,
    next_id: u64,
}

/// One CoAP endpoint: request dispatch, reliability and observe state for a
/// single transport.
pub struct CoapServer {
    sched: Rc<dyn Scheduler>,
    transport: Rc<dyn Transport>,
    inner: RefCell<Inner>,
    weak_self: RefCell<Weak<CoapServer>>,
}

impl CoapServer {
    /// Wraps `transport` in a session layer driven by `sched`. When the
    /// transport is bound to the default CoAP port the endpoint joins the
    /// all-CoAP-nodes multicast groups so it can answer discovery.
    pub fn bind(
        sched: Rc<dyn Scheduler>,
        transport: Rc<dyn Transport>,
    ) -> Result<Rc<CoapServer>, Error> {
        let server = Rc::new(CoapServer {
            sched: sched.clone(),
            transport: transport.clone(),
            inner: RefCell::new(Inner {
                next_msg_id: rand::thread_rng().gen(),
                ..Inner::default()
            }),
            weak_self: RefCell::new(Weak::new()),
        });
        *server.weak_self.borrow_mut() = Rc::downgrade(&server);

        let local = transport.local_addr()?;
        if local.port() == DEFAULT_UDP_PORT {
            for group in [ALL_NODES_V4, ALL_NODES_V6_LINK, ALL_NODES_V6_SITE] {
                if let Err(e) = transport.join_multicast(group) {
                    warn!("coap: could not join {}: {}", group, e);
                }
            }
        }

        let weak = Rc::downgrade(&server);
        transport.start(
            sched,
            Box::new(move || {
                if let Some(server) = weak.upgrade() {
                    server.on_readable();
                }
            }),
        )?;

        info!("coap: endpoint up on {}", local);
        Ok(server)
    }

    /// Convenience: binds a plain UDP endpoint on `port` (0 for ephemeral).
    pub fn bind_udp(sched: Rc<dyn Scheduler>, port: u16) -> Result<Rc<CoapServer>, Error> {
        CoapServer::bind(sched, UdpTransport::bind(port)?)
    }

    /// Stops delivering datagrams and cancels every timer. Further sends
    /// still go out, but nothing is retransmitted or matched.
    pub fn shutdown(&self) {
        self.transport.stop();
        let mut inner = self.inner.borrow_mut();
        for o in inner.outgoing.drain(..) {
            self.sched.timeout_del(o.timer);
        }
        for p in inner.pending.drain(..) {
            if let Some(t) = p.timeout {
                self.sched.timeout_del(t);
            }
        }
    }

    pub fn local_addr(&self) -> Result<SocketAddr, Error> {
        self.transport.local_addr()
    }

    /// Whether the underlying transport is DTLS.
    pub fn is_secure(&self) -> bool {
        self.transport.is_secure()
    }

    pub fn scheduler(&self) -> Rc<dyn Scheduler> {
        self.sched.clone()
    }

    fn rc_self(&self) -> Rc<CoapServer> {
        self.weak_self
            .borrow()
            .upgrade()
            .unwrap_or_else(|| unreachable!("server outlived its own Rc"))
    }

    // ---- resources and observers ----

    /// Makes `resource` dispatchable on this endpoint.
    pub fn register_resource(&self, resource: Rc<CoapResource>) {
        debug!("coap: registering {:?}", resource);
        self.inner.borrow_mut().resources.push(ResourceEntry {
            resource,
            observers: Vec::new(),
            age: 0,
        });
    }

    /// Removes `resource`, along with its observers, sequence state and any
    /// in-flight notifications.
    pub fn unregister_resource(&self, resource: &Rc<CoapResource>) {
        let mut inner = self.inner.borrow_mut();
        inner
            .resources
            .retain(|e| !Rc::ptr_eq(&e.resource, resource));
        let sched = &self.sched;
        inner.outgoing.retain(|o| match &o.notify_target {
            Some((r, _)) if Rc::ptr_eq(r, resource) => {
                sched.timeout_del(o.timer);
                false
            }
            _ => true,
        });
    }

    /// Number of registered observers of `resource` on this endpoint.
    pub fn observer_count(&self, resource: &Rc<CoapResource>) -> usize {
        self.inner
            .borrow()
            .resources
            .iter()
            .find(|e| Rc::ptr_eq(&e.resource, resource))
            .map(|e| e.observers.len())
            .unwrap_or(0)
    }

    /// Creates a confirmable 2.05 notification carrying the next sequence
    /// number for `resource`. The sequence is 24 bits wide and wraps to 2,
    /// keeping it distinct from the registration values 0 and 1.
    pub fn new_notification(&self, resource: &Rc<CoapResource>) -> Result<Packet, Error> {
        let mut inner = self.inner.borrow_mut();
        let entry = inner
            .resources
            .iter_mut()
            .find(|e| Rc::ptr_eq(&e.resource, resource))
            .ok_or(Error::NotFound)?;

        entry.age = if entry.age >= 0x00FF_FFFF {
            2
        } else {
            entry.age + 1
        };

        let mut pkt = Packet::new(MsgType::Con, MsgCode::SuccessContent);
        pkt.set_observe(entry.age);
        Ok(pkt)
    }

    /// Sends a copy of `pkt` to every observer of `resource`, stamped with
    /// that observer's token. Returns how many notifications went out.
    pub fn notify(&self, resource: &Rc<CoapResource>, pkt: &Packet) -> Result<usize, Error> {
        let observers: Vec<Observer> = {
            let inner = self.inner.borrow();
            inner
                .resources
                .iter()
                .find(|e| Rc::ptr_eq(&e.resource, resource))
                .ok_or(Error::NotFound)?
                .observers
                .clone()
        };

        let mut count = 0;
        for obs in observers {
            let mut copy = pkt.clone();
            copy.set_token(obs.token);
            copy.set_msg_id(0);
            match self.send_tracked(copy, obs.addr, Some((resource.clone(), obs.token))) {
                Ok(()) => count += 1,
                Err(e) => warn!("coap: notify to {} failed: {}", obs.addr, e),
            }
        }
        Ok(count)
    }

    fn add_observer(&self, resource: &Rc<CoapResource>, addr: SocketAddr, token: MsgToken) {
        let mut inner = self.inner.borrow_mut();
        if let Some(entry) = inner
            .resources
            .iter_mut()
            .find(|e| Rc::ptr_eq(&e.resource, resource))
        {
            if !entry
                .observers
                .iter()
                .any(|o| o.addr == addr && o.token == token)
            {
                debug!("coap: {} now observes {:?}", addr, resource);
                entry.observers.push(Observer { addr, token });
            }
        }
    }

    fn remove_observer(&self, resource: &Rc<CoapResource>, addr: &SocketAddr, token: &MsgToken) {
        let mut inner = self.inner.borrow_mut();
        if let Some(entry) = inner
            .resources
            .iter_mut()
            .find(|e| Rc::ptr_eq(&e.resource, resource))
        {
            let before = entry.observers.len();
            entry
                .observers
                .retain(|o| !(o.addr == *addr && o.token == *token));
            if entry.observers.len() != before {
                debug!("coap: {} no longer observes {:?}", addr, resource);
            }
        }
    }

    // ---- sending ----

    fn next_msg_id(&self) -> u16 {
        let mut inner = self.inner.borrow_mut();
        inner.next_msg_id = inner.next_msg_id.wrapping_add(1);
        if inner.next_msg_id == 0 {
            inner.next_msg_id = 1;
        }
        inner.next_msg_id
    }

    fn next_id(&self) -> u64 {
        let mut inner = self.inner.borrow_mut();
        inner.next_id += 1;
        inner.next_id
    }

    /// Sends one message. Confirmable messages are retransmitted with
    /// exponential backoff until acknowledged, reset, or given up on.
    pub fn send(&self, pkt: Packet, addr: SocketAddr) -> Result<(), Error> {
        self.send_tracked(pkt, addr, None)
    }

    fn send_tracked(
        &self,
        mut pkt: Packet,
        addr: SocketAddr,
        notify_target: Option<(Rc<CoapResource>, MsgToken)>,
    ) -> Result<(), Error> {
        if pkt.msg_id() == 0 {
            pkt.set_msg_id(self.next_msg_id());
        }

        let bytes = pkt.serialize()?;
        if bytes.len() > MAX_DATAGRAM_SIZE {
            return Err(Error::OutOfSpace);
        }

        debug!("coap: send {:?} to {}", pkt, addr);
        self.transport.sendmsg(&addr, &bytes)?;

        if pkt.code().is_response() {
            self.cache_response(&pkt, &addr, &bytes);
        }

        if pkt.msg_type() == MsgType::Con {
            // First retransmission fires after a jittered base timeout,
            // doubling on each attempt.
            let delay = ACK_TIMEOUT.mul_f64(rand::thread_rng().gen_range(1.0..1.5));
            let id = self.next_id();
            let timer = self.arm_retransmit(id, delay);
            self.inner.borrow_mut().outgoing.push(Outgoing {
                id,
                msg_id: pkt.msg_id(),
                addr,
                bytes,
                attempts: 0,
                delay,
                timer,
                notify_target,
            });
        }

        Ok(())
    }

    fn arm_retransmit(&self, id: u64, delay: Duration) -> TimeoutHandle {
        let weak = self.weak_self.borrow().clone();
        self.sched.timeout_add(
            delay,
            Box::new(move || {
                if let Some(server) = weak.upgrade() {
                    server.retransmit(id);
                }
                false
            }),
        )
    }

    fn retransmit(&self, id: u64) {
        let taken = {
            let mut inner = self.inner.borrow_mut();
            inner
                .outgoing
                .iter()
                .position(|o| o.id == id)
                .map(|i| inner.outgoing.remove(i))
        };

        let mut out = match taken {
            Some(o) => o,
            None => return,
        };

        if out.attempts >= MAX_RETRANSMIT {
            warn!(
                "coap: giving up on MID {:04X} to {} after {} retransmissions",
                out.msg_id, out.addr, out.attempts
            );
            if let Some((resource, token)) = out.notify_target.take() {
                self.remove_observer(&resource, &out.addr, &token);
            }
            return;
        }

        out.attempts += 1;
        out.delay *= 2;
        debug!(
            "coap: retransmit #{} of MID {:04X} to {}",
            out.attempts, out.msg_id, out.addr
        );
        if let Err(e) = self.transport.sendmsg(&out.addr, &out.bytes) {
            warn!("coap: retransmit failed: {}", e);
        }
        out.timer = self.arm_retransmit(id, out.delay);
        self.inner.borrow_mut().outgoing.push(out);
    }

    /// Sends a request and registers `cb` to receive the replies. Exchanges
    /// carrying an observe registration never time out on their own; all
    /// others fire `cb(None)` after [`MAX_REPLY_TIMEOUT`](super::MAX_REPLY_TIMEOUT).
    pub fn send_with_reply(
        &self,
        mut pkt: Packet,
        addr: SocketAddr,
        cb: ReplyCallback,
    ) -> Result<PendingId, Error> {
        if pkt.msg_id() == 0 {
            pkt.set_msg_id(self.next_msg_id());
        }

        let id = self.next_id();
        let observing = pkt.observe() == Some(0);
        let entry = PendingReply {
            id,
            token: pkt.token(),
            msg_id: pkt.msg_id(),
            addr,
            multicast: addr.ip().is_multicast(),
            observing,
            timeout: if observing {
                None
            } else {
                let weak = self.weak_self.borrow().clone();
                Some(self.sched.timeout_add(
                    MAX_REPLY_TIMEOUT,
                    Box::new(move || {
                        if let Some(server) = weak.upgrade() {
                            server.pending_timeout(id);
                        }
                        false
                    }),
                ))
            },
            cb,
        };

        self.send(pkt, addr)?;
        self.inner.borrow_mut().pending.push(entry);
        Ok(PendingId(id))
    }

    /// Abandons a pending exchange without invoking its callback.
    pub fn cancel_pending(&self, pending: PendingId) {
        let taken = {
            let mut inner = self.inner.borrow_mut();
            inner
                .pending
                .iter()
                .position(|p| p.id == pending.0)
                .map(|i| inner.pending.remove(i))
        };
        if let Some(p) = taken {
            if let Some(t) = p.timeout {
                self.sched.timeout_del(t);
            }
        }
    }

    /// Sends an observe cancellation (OBSERVE=1) with the given token and
    /// drops the matching pending entry, so no further notifications are
    /// delivered to its callback.
    pub fn unobserve(&self, addr: SocketAddr, token: MsgToken, path: &str) -> Result<(), Error> {
        let taken = {
            let mut inner = self.inner.borrow_mut();
            inner
                .pending
                .iter()
                .position(|p| p.token == token && (p.addr == addr || p.multicast))
                .map(|i| inner.pending.remove(i))
        };
        if let Some(p) = taken {
            if let Some(t) = p.timeout {
                self.sched.timeout_del(t);
            }
        }

        let mut pkt = Packet::new_request(MsgCode::MethodGet, MsgType::Con);
        pkt.set_token(token);
        pkt.set_observe(1);
        pkt.add_uri_path_option(path);
        self.send(pkt, addr)
    }

    fn pending_timeout(&self, id: u64) {
        let taken = {
            let mut inner = self.inner.borrow_mut();
            inner
                .pending
                .iter()
                .position(|p| p.id == id)
                .map(|i| inner.pending.remove(i))
        };
        if let Some(mut p) = taken {
            debug!("coap: exchange TOK:{} to {} timed out", p.token, p.addr);
            (p.cb)(None);
        }
    }

    // ---- receiving ----

    fn on_readable(self: &Rc<Self>) {
        let mut buf = [0u8; MAX_DATAGRAM_SIZE];
        loop {
            match self.transport.recvmsg(&mut buf) {
                Ok(Some((len, src))) => self.handle_datagram(&buf[..len], src),
                Ok(None) => break,
                Err(e) => {
                    warn!("coap: receive error: {}", e);
                    break;
                }
            }
        }
    }

    fn handle_datagram(self: &Rc<Self>, data: &[u8], src: SocketAddr) {
        let pkt = match Packet::parse(data) {
            Ok(pkt) => pkt,
            Err(e) => {
                debug!("coap: dropping malformed datagram from {}: {}", src, e);
                return;
            }
        };

        debug!("coap: recv {:?} from {}", pkt, src);

        if pkt.is_ping() {
            let _ = self.send(Packet::new_reset(&pkt), src);
            return;
        }

        match pkt.msg_type() {
            MsgType::Rst => self.handle_reset(&pkt, src),
            MsgType::Ack => {
                self.ack_outgoing(pkt.msg_id(), &src);
                if pkt.code().is_response() {
                    self.dispatch_response(&pkt, src);
                }
            }
            MsgType::Con | MsgType::Non => {
                if pkt.code().is_method() {
                    if pkt.msg_type() == MsgType::Con {
                        if let Some(cached) = self.check_duplicate(&pkt, &src) {
                            debug!(
                                "coap: duplicate MID {:04X} from {}, replaying cached response",
                                pkt.msg_id(),
                                src
                            );
                            if let Some(bytes) = cached {
                                if let Err(e) = self.transport.sendmsg(&src, &bytes) {
                                    warn!("coap: replay to {} failed: {}", src, e);
                                }
                            }
                            return;
                        }
                    }
                    self.dispatch_request(&pkt, src);
                } else if pkt.code().is_response() {
                    self.dispatch_response(&pkt, src);
                }
            }
        }
    }

    /// Duplicate detection for confirmable requests. Returns `Some` when the
    /// message id was already seen from `src`, carrying the cached response
    /// (if one was sent) so the caller can replay it; a fresh message id is
    /// recorded and `None` returned.
    fn check_duplicate(&self, pkt: &Packet, src: &SocketAddr) -> Option<Option<Vec<u8>>> {
        let mut inner = self.inner.borrow_mut();
        if let Some(entry) = inner
            .dedup
            .iter()
            .find(|e| e.addr == *src && e.msg_id == pkt.msg_id())
        {
            return Some(entry.response.clone());
        }
        if inner.dedup.len() == DEDUP_WINDOW {
            inner.dedup.pop_front();
        }
        inner.dedup.push_back(DedupEntry {
            addr: *src,
            msg_id: pkt.msg_id(),
            token: pkt.token(),
            response: None,
        });
        None
    }

    /// Remembers the serialized response in the dedup slot of the request it
    /// answers. Piggybacked acknowledgements share the request's message id;
    /// separate and non-confirmable responses are matched by token.
    fn cache_response(&self, pkt: &Packet, addr: &SocketAddr, bytes: &[u8]) {
        let mut inner = self.inner.borrow_mut();
        let matched = inner.dedup.iter_mut().find(|e| {
            e.addr == *addr
                && if pkt.msg_type() == MsgType::Ack {
                    e.msg_id == pkt.msg_id()
                } else {
                    !pkt.token().is_empty() && e.token == pkt.token()
                }
        });
        if let Some(entry) = matched {
            entry.response = Some(bytes.to_vec());
        }
    }

    fn ack_outgoing(&self, msg_id: u16, src: &SocketAddr) {
        let taken = {
            let mut inner = self.inner.borrow_mut();
            inner
                .outgoing
                .iter()
                .position(|o| o.msg_id == msg_id && o.addr == *src)
                .map(|i| inner.outgoing.remove(i))
        };
        if let Some(o) = taken {
            self.sched.timeout_del(o.timer);
        }
    }

    fn handle_reset(&self, pkt: &Packet, src: SocketAddr) {
        // A reset to an in-flight notification means the observer is gone.
        let taken = {
            let mut inner = self.inner.borrow_mut();
            inner
                .outgoing
                .iter()
                .position(|o| o.msg_id == pkt.msg_id() && o.addr == src)
                .map(|i| inner.outgoing.remove(i))
        };
        if let Some(mut o) = taken {
            self.sched.timeout_del(o.timer);
            if let Some((resource, token)) = o.notify_target.take() {
                self.remove_observer(&resource, &src, &token);
            }
        }

        let taken = {
            let mut inner = self.inner.borrow_mut();
            inner
                .pending
                .iter()
                .position(|p| p.msg_id == pkt.msg_id() && p.addr == src)
                .map(|i| inner.pending.remove(i))
        };
        if let Some(mut p) = taken {
            if let Some(t) = p.timeout {
                self.sched.timeout_del(t);
            }
            (p.cb)(None);
        }
    }

    fn dispatch_response(self: &Rc<Self>, pkt: &Packet, src: SocketAddr) {
        let taken = {
            let mut inner = self.inner.borrow_mut();
            let pos = inner.pending.iter().position(|p| {
                if !p.token.is_empty() || !pkt.token().is_empty() {
                    p.token == pkt.token() && (p.multicast || p.addr == src)
                } else {
                    p.msg_id == pkt.msg_id() && p.addr == src
                }
            });
            pos.map(|i| inner.pending.remove(i))
        };

        let mut entry = match taken {
            Some(entry) => entry,
            None => {
                // An unsolicited notification (or any stray confirmable
                // response) is rejected so the peer stops sending.
                if pkt.msg_type() == MsgType::Con || pkt.observe().is_some() {
                    debug!("coap: resetting unmatched response from {}", src);
                    let _ = self.send(Packet::new_reset(pkt), src);
                }
                return;
            }
        };

        // Separate confirmable responses want an acknowledgement.
        if pkt.msg_type() == MsgType::Con {
            let mut ack = Packet::new(MsgType::Ack, MsgCode::Empty);
            ack.set_msg_id(pkt.msg_id());
            let _ = self.send(ack, src);
        }

        let keep = (entry.cb)(Some((pkt, src)));
        if keep {
            self.inner.borrow_mut().pending.push(entry);
        } else if let Some(t) = entry.timeout {
            self.sched.timeout_del(t);
        }
    }

    fn dispatch_request(self: &Rc<Self>, pkt: &Packet, src: SocketAddr) {
        let resource = {
            let inner = self.inner.borrow();
            inner
                .resources
                .iter()
                .find(|e| e.resource.matches(pkt))
                .map(|e| e.resource.clone())
        };

        let resource = match resource {
            Some(resource) => resource,
            None => {
                let mut rsp = Packet::new_response(pkt);
                rsp.set_code(MsgCode::ClientErrorNotFound);
                let _ = self.send(rsp, src);
                return;
            }
        };

        // Observe registration and cancellation happen regardless of what
        // the handler later answers; a reset prunes a bad registration.
        // Resources that do not accept observers answer an observe GET as a
        // plain GET (RFC 7641, section 1.2).
        match pkt.observe() {
            Some(0) if pkt.code() == MsgCode::MethodGet => {
                if resource.observable() {
                    self.add_observer(&resource, src, pkt.token());
                } else {
                    debug!(
                        "coap: {} asked to observe non-observable {:?}",
                        src, resource
                    );
                }
            }
            Some(1) => {
                self.remove_observer(&resource, &src, &pkt.token());
            }
            _ => {}
        }

        let server = self.rc_self();
        if let Err(e) = resource.handle(&server, pkt, &src) {
            warn!("coap: handler for {:?} failed: {}", resource, e);
            let mut rsp = Packet::new_response(pkt);
            rsp.set_code(MsgCode::ServerErrorInternalServerError);
            let _ = self.send(rsp, src);
        }
    }
}

impl std::fmt::Debug for CoapServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("CoapServer")
            .field("addr", &self.transport.local_addr().ok())
            .field("resources", &inner.resources.len())
            .field("pending", &inner.pending.len())
            .field("outgoing", &inner.outgoing.len())
            .finish()
    }
}
