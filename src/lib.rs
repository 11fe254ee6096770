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

//! # soletta-oic
//!
//! A single-threaded OIC/OCF application stack over CoAP for small
//! networked devices: discoverable, observable, optionally PSK-secured
//! resources with CBOR representations.
//!
//! The crate is layered bottom-up:
//!
//! * [`mainloop`] — the [`Scheduler`](mainloop::Scheduler) contract the
//!   whole stack is driven by, and a deterministic implementation with a
//!   virtual clock for tests.
//! * [`transport`] — non-blocking datagram endpoints: UDP, an in-memory
//!   loopback fabric, and the credentials contract for DTLS transports.
//! * [`message`] / [`option`] — the CoAP wire format.
//! * [`coap`] — the session layer: request dispatch, retransmission,
//!   deduplication and the observe protocol.
//! * [`oic`] — the application layer: OIC server, client, CBOR payload
//!   codec and pre-shared key storage.
//!
//! ## Serving a resource
//!
//! ```no_run
//! use std::rc::Rc;
//! use soletta_oic::mainloop::ManualScheduler;
//! use soletta_oic::oic::cbor::Field;
//! use soletta_oic::oic::{OicResourceType, OicServer, ResourceFlags};
//!
//! # fn main() -> Result<(), soletta_oic::Error> {
//! let sched = Rc::new(ManualScheduler::new());
//! let server = OicServer::builder(sched).bind()?;
//!
//! let light = OicResourceType::new("core.light", "oic.if.baseline")
//!     .with_get(Box::new(|_from, _input| Ok(vec![Field::boolean("state", true)])));
//! server.register_resource(
//!     light,
//!     ResourceFlags::DISCOVERABLE | ResourceFlags::OBSERVABLE | ResourceFlags::ACTIVE,
//! )?;
//! # Ok(())
//! # }
//! ```

#[macro_use]
extern crate log;

pub mod coap;
pub mod error;
pub mod mainloop;
pub mod message;
pub mod oic;
pub mod option;
pub mod transport;

pub use error::Error;
