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

//! End-to-end exchanges between an OIC server and client over the in-memory
//! loopback fabric, driven by the manually-stepped scheduler.

use std::cell::{Cell, RefCell};
use std::net::SocketAddr;
use std::rc::Rc;
use std::time::Duration;

use soletta_oic::coap::{CoapServer, DEFAULT_DTLS_PORT, DEFAULT_UDP_PORT};
use soletta_oic::mainloop::ManualScheduler;
use soletta_oic::message::{MsgCode, MsgToken, MsgType, Packet};
use soletta_oic::oic::cbor::{Field, Value};
use soletta_oic::oic::client::POLL_OBSERVE_TIMEOUT;
use soletta_oic::oic::{
    OicClient, OicRequest, OicResource, OicResourceType, OicServer, OicServerResource,
    ResourceFlags,
};
use soletta_oic::transport::{LoopbackNetwork, Transport};

const MACHINE_ID: [u8; 16] = [0x11; 16];

fn ms(ms: u64) -> Duration {
    Duration::from_millis(ms)
}

fn mcast() -> SocketAddr {
    SocketAddr::new("224.0.1.187".parse().unwrap(), DEFAULT_UDP_PORT)
}

fn setup() -> (
    Rc<ManualScheduler>,
    Rc<LoopbackNetwork>,
    Rc<OicServer>,
    Rc<OicClient>,
) {
    let sched = Rc::new(ManualScheduler::new());
    let net = LoopbackNetwork::new();
    let server = OicServer::builder(sched.clone())
        .machine_id(MACHINE_ID)
        .device_name("test-device")
        .transport(net.endpoint(DEFAULT_UDP_PORT))
        .unicast_transport(net.endpoint(0))
        .bind()
        .unwrap();
    let client = OicClient::with_transports(sched.clone(), net.endpoint(0), None).unwrap();
    (sched, net, server, client)
}

/// A light switch resource whose state the test can inspect and mutate.
fn light_resource(
    server: &Rc<OicServer>,
    flags: ResourceFlags,
) -> (Rc<OicServerResource>, Rc<Cell<bool>>) {
    let state = Rc::new(Cell::new(false));

    let get_state = state.clone();
    let put_state = state.clone();
    let rtype = OicResourceType::new("core.light", "oic.if.baseline")
        .with_get(Box::new(move |_from, _input| {
            Ok(vec![Field::boolean("state", get_state.get())])
        }))
        .with_put(Box::new(move |_from, input| {
            for field in input {
                if field.key == "state" {
                    if let Value::Bool(on) = &field.value {
                        put_state.set(*on);
                    }
                }
            }
            Ok(Vec::new())
        }))
        .with_delete(Box::new(|_from, _input| Ok(Vec::new())));

    let res = server.register_resource(rtype, flags).unwrap();
    (res, state)
}

fn discover_one(
    sched: &Rc<ManualScheduler>,
    client: &Rc<OicClient>,
    resource_type: &str,
) -> Rc<OicResource> {
    let found = Rc::new(RefCell::new(None));
    let found_in = found.clone();
    client
        .find_resources(
            mcast(),
            resource_type,
            "",
            Box::new(move |res| {
                *found_in.borrow_mut() = res;
                false
            }),
        )
        .unwrap();
    sched.settle(ms(1));
    let res = found.borrow_mut().take();
    res.expect("discovery found nothing")
}

#[test]
fn multicast_discovery_reports_registered_resources() {
    let (sched, _net, server, client) = setup();
    light_resource(
        &server,
        ResourceFlags::DISCOVERABLE | ResourceFlags::OBSERVABLE | ResourceFlags::ACTIVE,
    );

    let res = discover_one(&sched, &client, "core.light");
    assert!(res.href().starts_with("/sol/"));
    assert_eq!(res.device_id(), &MACHINE_ID);
    assert_eq!(res.types(), &["core.light".to_string()]);
    assert_eq!(res.interfaces(), &["oic.if.baseline".to_string()]);
    assert!(res.observable());
    assert!(!res.secure());
}

#[test]
fn discovery_filter_mismatch_times_out() {
    let (sched, _net, server, client) = setup();
    light_resource(
        &server,
        ResourceFlags::DISCOVERABLE | ResourceFlags::ACTIVE,
    );

    let seen = Rc::new(RefCell::new(Vec::new()));
    let seen_in = seen.clone();
    client
        .find_resources(
            mcast(),
            "core.fan",
            "",
            Box::new(move |res| {
                seen_in.borrow_mut().push(res.is_some());
                true
            }),
        )
        .unwrap();

    // Nothing matches; the only callback is the timeout.
    sched.settle(Duration::from_secs(40));
    assert_eq!(&*seen.borrow(), &[false]);
}

#[test]
fn explicitly_discoverable_needs_a_filter() {
    let (sched, _net, server, client) = setup();
    light_resource(
        &server,
        ResourceFlags::DISCOVERABLE_EXPLICIT | ResourceFlags::ACTIVE,
    );

    let hits = Rc::new(Cell::new(0));
    let hits_in = hits.clone();
    client
        .find_resources(
            mcast(),
            "",
            "",
            Box::new(move |res| {
                if res.is_some() {
                    hits_in.set(hits_in.get() + 1);
                }
                true
            }),
        )
        .unwrap();
    sched.settle(Duration::from_secs(40));
    assert_eq!(hits.get(), 0);

    let res = discover_one(&sched, &client, "core.light");
    assert_eq!(res.types(), &["core.light".to_string()]);
}

#[test]
fn get_reads_the_representation() {
    let (sched, _net, server, client) = setup();
    let (_res, state) = light_resource(
        &server,
        ResourceFlags::DISCOVERABLE | ResourceFlags::ACTIVE,
    );
    state.set(true);

    let res = discover_one(&sched, &client, "core.light");

    let got = Rc::new(RefCell::new(None));
    let got_in = got.clone();
    client
        .request(
            &res,
            OicRequest::get(),
            Box::new(move |code, from, fields| {
                assert!(from.is_some());
                *got_in.borrow_mut() = Some((code, fields));
            }),
        )
        .unwrap();
    sched.settle(ms(1));

    let (code, fields) = got.borrow_mut().take().unwrap();
    assert_eq!(code, MsgCode::SuccessContent);
    assert_eq!(fields, vec![Field::boolean("state", true)]);
}

#[test]
fn put_changes_state_and_get_reads_it_back() {
    let (sched, _net, server, client) = setup();
    let (_res, state) = light_resource(
        &server,
        ResourceFlags::DISCOVERABLE | ResourceFlags::ACTIVE,
    );
    assert!(!state.get());

    let res = discover_one(&sched, &client, "core.light");

    let put_code = Rc::new(Cell::new(None));
    let put_code_in = put_code.clone();
    client
        .request(
            &res,
            OicRequest::put().field(Field::boolean("state", true)),
            Box::new(move |code, _from, _fields| put_code_in.set(Some(code))),
        )
        .unwrap();
    sched.settle(ms(1));

    assert_eq!(put_code.get(), Some(MsgCode::SuccessChanged));
    assert!(state.get());

    let fields = Rc::new(RefCell::new(Vec::new()));
    let fields_in = fields.clone();
    client
        .request(
            &res,
            OicRequest::get(),
            Box::new(move |_code, _from, got| *fields_in.borrow_mut() = got),
        )
        .unwrap();
    sched.settle(ms(1));
    assert_eq!(&*fields.borrow(), &[Field::boolean("state", true)]);
}

#[test]
fn delete_then_get_answers_not_found() {
    let (sched, _net, server, client) = setup();
    let (server_res, _state) = light_resource(
        &server,
        ResourceFlags::DISCOVERABLE | ResourceFlags::ACTIVE,
    );

    let res = discover_one(&sched, &client, "core.light");

    let del_code = Rc::new(Cell::new(None));
    let del_code_in = del_code.clone();
    client
        .request(
            &res,
            OicRequest::delete(),
            Box::new(move |code, _from, _fields| del_code_in.set(Some(code))),
        )
        .unwrap();
    sched.settle(ms(1));
    assert_eq!(del_code.get(), Some(MsgCode::SuccessDeleted));

    // The application retires the resource in response.
    server_res.set_active(false);

    let get_code = Rc::new(Cell::new(None));
    let get_code_in = get_code.clone();
    client
        .request(
            &res,
            OicRequest::get(),
            Box::new(move |code, _from, _fields| get_code_in.set(Some(code))),
        )
        .unwrap();
    sched.settle(ms(1));
    assert_eq!(get_code.get(), Some(MsgCode::ClientErrorNotFound));
}

#[test]
fn native_observation_delivers_notifications() {
    let (sched, _net, server, client) = setup();
    let (server_res, state) = light_resource(
        &server,
        ResourceFlags::DISCOVERABLE | ResourceFlags::OBSERVABLE | ResourceFlags::ACTIVE,
    );

    let res = discover_one(&sched, &client, "core.light");
    assert!(res.observable());

    let seen = Rc::new(RefCell::new(Vec::new()));
    let seen_in = seen.clone();
    client
        .set_observable(
            &res,
            Some(Box::new(move |code, _from, fields| {
                seen_in.borrow_mut().push((code, fields));
            })),
            true,
            false,
        )
        .unwrap();
    sched.settle(ms(1));

    // The registration response arrives first.
    assert_eq!(seen.borrow().len(), 1);
    assert_eq!(seen.borrow()[0].0, MsgCode::SuccessContent);

    for on in [true, false] {
        state.set(on);
        server
            .notify(&server_res, &[Field::boolean("state", on)])
            .unwrap();
        sched.settle(ms(1));
    }

    assert_eq!(seen.borrow().len(), 3);
    assert_eq!(seen.borrow()[1].1, vec![Field::boolean("state", true)]);
    assert_eq!(seen.borrow()[2].1, vec![Field::boolean("state", false)]);

    client.set_observable(&res, None, false, false).unwrap();
    sched.settle(ms(1));

    server
        .notify(&server_res, &[Field::boolean("state", true)])
        .unwrap();
    sched.settle(ms(1));
    assert_eq!(seen.borrow().len(), 3);
}

#[test]
fn non_observable_resources_fall_back_to_polling() {
    let (sched, _net, server, client) = setup();
    light_resource(
        &server,
        ResourceFlags::DISCOVERABLE | ResourceFlags::ACTIVE,
    );

    let res = discover_one(&sched, &client, "core.light");
    assert!(!res.observable());

    let polls = Rc::new(Cell::new(0));
    let polls_in = polls.clone();
    client
        .set_observable(
            &res,
            Some(Box::new(move |code, _from, _fields| {
                assert_eq!(code, MsgCode::SuccessContent);
                polls_in.set(polls_in.get() + 1);
            })),
            true,
            false,
        )
        .unwrap();

    // One immediate poll, then one per interval.
    sched.settle(ms(1));
    assert_eq!(polls.get(), 1);
    sched.settle(POLL_OBSERVE_TIMEOUT);
    assert_eq!(polls.get(), 2);
    sched.settle(POLL_OBSERVE_TIMEOUT);
    assert_eq!(polls.get(), 3);

    // Cancellation stops polling at once, including replies in flight.
    client.set_observable(&res, None, false, false).unwrap();
    sched.settle(POLL_OBSERVE_TIMEOUT);
    sched.settle(POLL_OBSERVE_TIMEOUT);
    assert_eq!(polls.get(), 3);
}

#[test]
fn non_observable_resource_accepts_no_observers() {
    let (sched, net, server, client) = setup();
    let (server_res, _state) = light_resource(
        &server,
        ResourceFlags::DISCOVERABLE | ResourceFlags::ACTIVE,
    );
    let res = discover_one(&sched, &client, "core.light");
    assert!(!res.observable());

    // A peer that ignores the advertised flags and registers anyway gets a
    // plain GET response and no notifications afterwards.
    let peer = CoapServer::bind(sched.clone(), net.endpoint(0)).unwrap();
    let mut req = Packet::new_request(MsgCode::MethodGet, MsgType::Con);
    req.set_token(MsgToken::new(&[0xA5]));
    req.set_observe(0);
    req.add_uri_path_option(res.href());

    let seen = Rc::new(RefCell::new(Vec::new()));
    let seen_in = seen.clone();
    peer.send_with_reply(
        req,
        res.addr(),
        Box::new(move |reply| {
            if let Some((pkt, _)) = reply {
                seen_in.borrow_mut().push(pkt.observe());
            }
            true
        }),
    )
    .unwrap();
    sched.settle(ms(1));
    assert_eq!(&*seen.borrow(), &[None]);

    server
        .notify(&server_res, &[Field::boolean("state", true)])
        .unwrap();
    sched.settle(ms(1));
    assert_eq!(seen.borrow().len(), 1);
}

#[test]
fn device_info_query() {
    let (sched, _net, server, client) = setup();
    light_resource(
        &server,
        ResourceFlags::DISCOVERABLE | ResourceFlags::ACTIVE,
    );
    let res = discover_one(&sched, &client, "core.light");

    let info = Rc::new(RefCell::new(None));
    let info_in = info.clone();
    client
        .get_server_info(
            &res,
            Box::new(move |got| *info_in.borrow_mut() = got),
        )
        .unwrap();
    sched.settle(ms(1));

    let info = info.borrow_mut().take().expect("no device info");
    assert_eq!(info.name, "test-device");
    assert_eq!(info.spec_version, "core.1.0.0");
    assert_eq!(info.data_model_version, "res.1.0.0");
    assert_eq!(info.device_id, MACHINE_ID.to_vec());
}

#[test]
fn platform_info_query() {
    let (sched, _net, server, client) = setup();
    light_resource(
        &server,
        ResourceFlags::DISCOVERABLE | ResourceFlags::ACTIVE,
    );
    let res = discover_one(&sched, &client, "core.light");

    let info = Rc::new(RefCell::new(None));
    let info_in = info.clone();
    client
        .get_platform_info(
            &res,
            Box::new(move |got| *info_in.borrow_mut() = got),
        )
        .unwrap();
    sched.settle(ms(1));

    let info = info.borrow_mut().take().expect("no platform info");
    assert_eq!(info.platform_id, MACHINE_ID.to_vec());
    assert_eq!(info.manufacturer_name, "Soletta");
}

#[test]
fn secure_resources_are_served_over_dtls() {
    let sched = Rc::new(ManualScheduler::new());
    let net = LoopbackNetwork::new();
    let server = OicServer::builder(sched.clone())
        .machine_id(MACHINE_ID)
        .transport(net.endpoint(DEFAULT_UDP_PORT))
        .unicast_transport(net.endpoint(0))
        .secure_transport(net.secure_endpoint(DEFAULT_DTLS_PORT))
        .bind()
        .unwrap();
    let client = OicClient::with_transports(
        sched.clone(),
        net.endpoint(0),
        Some(net.secure_endpoint(0)),
    )
    .unwrap();

    let (_res, state) = light_resource(
        &server,
        ResourceFlags::DISCOVERABLE | ResourceFlags::ACTIVE,
    );
    state.set(true);

    let res = discover_one(&sched, &client, "core.light");
    assert!(res.secure());

    // The request is routed through the DTLS endpoints.
    let got = Rc::new(RefCell::new(None));
    let got_in = got.clone();
    client
        .request(
            &res,
            OicRequest::get(),
            Box::new(move |code, from, fields| {
                *got_in.borrow_mut() = Some((code, from, fields));
            }),
        )
        .unwrap();
    sched.settle(ms(1));

    let (code, from, fields) = got.borrow_mut().take().unwrap();
    assert_eq!(code, MsgCode::SuccessContent);
    assert_eq!(from.unwrap().port(), DEFAULT_DTLS_PORT);
    assert_eq!(fields, vec![Field::boolean("state", true)]);
}

#[test]
fn secure_resource_info_queries_use_dtls() {
    let sched = Rc::new(ManualScheduler::new());
    let net = LoopbackNetwork::new();
    let server_dtls = net.secure_endpoint(DEFAULT_DTLS_PORT);
    let server = OicServer::builder(sched.clone())
        .machine_id(MACHINE_ID)
        .device_name("test-device")
        .transport(net.endpoint(DEFAULT_UDP_PORT))
        .unicast_transport(net.endpoint(0))
        .secure_transport(server_dtls.clone())
        .bind()
        .unwrap();
    let client_dtls = net.secure_endpoint(0);
    let client = OicClient::with_transports(
        sched.clone(),
        net.endpoint(0),
        Some(client_dtls.clone()),
    )
    .unwrap();

    light_resource(
        &server,
        ResourceFlags::DISCOVERABLE | ResourceFlags::ACTIVE,
    );
    let res = discover_one(&sched, &client, "core.light");
    assert!(res.secure());

    let secure_pair = (
        client_dtls.local_addr().unwrap(),
        server_dtls.local_addr().unwrap(),
    );
    let before = net.delivered(secure_pair.0, secure_pair.1);

    // `/oic/d` of a secure resource's host goes through the DTLS endpoints.
    let info = Rc::new(RefCell::new(None));
    let info_in = info.clone();
    client
        .get_server_info(
            &res,
            Box::new(move |got| *info_in.borrow_mut() = got),
        )
        .unwrap();
    sched.settle(ms(1));

    let device = info.borrow_mut().take().expect("no device info");
    assert_eq!(device.name, "test-device");
    assert_eq!(device.device_id, MACHINE_ID.to_vec());
    let after_device = net.delivered(secure_pair.0, secure_pair.1);
    assert!(after_device > before);

    // Same for `/oic/p`.
    let info = Rc::new(RefCell::new(None));
    let info_in = info.clone();
    client
        .get_platform_info(
            &res,
            Box::new(move |got| *info_in.borrow_mut() = got),
        )
        .unwrap();
    sched.settle(ms(1));

    let platform = info.borrow_mut().take().expect("no platform info");
    assert_eq!(platform.platform_id, MACHINE_ID.to_vec());
    assert!(net.delivered(secure_pair.0, secure_pair.1) > after_device);
}

#[test]
fn unregistered_resource_disappears_from_discovery() {
    let (sched, _net, server, client) = setup();
    let (server_res, _state) = light_resource(
        &server,
        ResourceFlags::DISCOVERABLE | ResourceFlags::ACTIVE,
    );

    discover_one(&sched, &client, "core.light");
    server.unregister_resource(&server_res);

    let seen = Rc::new(RefCell::new(Vec::new()));
    let seen_in = seen.clone();
    client
        .find_resources(
            mcast(),
            "core.light",
            "",
            Box::new(move |res| {
                seen_in.borrow_mut().push(res.is_some());
                true
            }),
        )
        .unwrap();
    sched.settle(Duration::from_secs(40));
    assert_eq!(&*seen.borrow(), &[false]);
}
