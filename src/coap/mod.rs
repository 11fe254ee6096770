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

//! CoAP session layer.
//!
//! A [`CoapServer`] wraps one transport endpoint and implements the
//! stateful half of RFC 7252 plus the observe extension of RFC 7641:
//! confirmable retransmission, duplicate detection, request dispatch to
//! registered resources, pending-reply tracking for outgoing requests, and
//! per-resource observer bookkeeping. Despite the name it serves both
//! roles; a client is a `CoapServer` bound to an ephemeral port.

mod resource;
pub use resource::{CoapResource, RequestHandler};

mod server;
pub use server::{CoapServer, PendingId, ReplyCallback};

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::time::Duration;

/// Default port for CoAP over UDP.
pub const DEFAULT_UDP_PORT: u16 = 5683;

/// Default port for CoAP over DTLS.
pub const DEFAULT_DTLS_PORT: u16 = 5684;

/// "All CoAP nodes" IPv4 multicast group.
pub const ALL_NODES_V4: IpAddr = IpAddr::V4(Ipv4Addr::new(224, 0, 1, 187));

/// "All CoAP nodes" link-local IPv6 multicast group.
pub const ALL_NODES_V6_LINK: IpAddr = IpAddr::V6(Ipv6Addr::new(0xff02, 0, 0, 0, 0, 0, 0, 0xfd));

/// "All CoAP nodes" site-local IPv6 multicast group.
pub const ALL_NODES_V6_SITE: IpAddr = IpAddr::V6(Ipv6Addr::new(0xff05, 0, 0, 0, 0, 0, 0, 0xfd));

/// Base acknowledgement timeout before the first retransmission.
pub const ACK_TIMEOUT: Duration = Duration::from_secs(2);

/// Maximum number of retransmissions of a confirmable message.
pub const MAX_RETRANSMIT: u32 = 4;

/// Overall lifetime of a pending reply before the callback is fired with
/// `None`.
pub const MAX_REPLY_TIMEOUT: Duration = Duration::from_secs(2 << 4);

/// Number of (peer, message id) pairs remembered for duplicate detection.
pub const DEDUP_WINDOW: usize = 16;
