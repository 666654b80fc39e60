mod common;

use common::*;
use service_proxy::{ProxyConfig, ProxyError, ServiceEndpoint, SubscriptionState};

#[test]
fn test_clones_share_one_proxy() {
    let transport = MockTransport::new();
    let proxy = proxy(&transport);
    let clone = proxy.clone();

    subscribe(&transport, &proxy, "uuid:sub-1");
    assert_eq!(clone.subscription_state(), SubscriptionState::Subscribed);
    assert_eq!(clone.delivery_path(), proxy.delivery_path());

    drop(proxy);
    assert!(transport.blocking_requests().is_empty());
    drop(clone);
    assert_eq!(transport.blocking_requests().len(), 1);
}

#[test]
fn test_proxies_on_one_transport_are_independent() {
    let transport = MockTransport::new();
    let a = proxy(&transport);
    let b = proxy(&transport);

    subscribe(&transport, &a, "uuid:sub-a");
    b.set_subscribed(true);
    transport.complete_last(subscribe_ok("uuid:sub-b"));

    assert_eq!(notify(&transport, &a, "uuid:sub-b", 0, b""), 412);
    assert_eq!(notify(&transport, &b, "uuid:sub-b", 0, b""), 200);
    assert_eq!(a.event_sequence(), 0);
    assert_eq!(b.event_sequence(), 1);
}

#[test]
fn test_endpoint_from_description() {
    let transport = MockTransport::new();
    let endpoint = ServiceEndpoint::from_description(
        "http://192.168.1.100:1400/xml/device_description.xml",
        RENDERING_CONTROL,
        "uuid:RINCON_1",
        Some("/MediaRenderer/RenderingControl/Control"),
        Some("/MediaRenderer/RenderingControl/Event"),
    )
    .unwrap();
    let proxy = proxy_with(&transport, endpoint, ProxyConfig::default());

    proxy.begin_action("GetVolume", &[], |_, _| {});
    proxy.set_subscribed(true);

    let requests = transport.requests();
    assert_eq!(requests[0].url, CONTROL_URL);
    assert_eq!(requests[1].url, EVENT_URL);
}

#[test]
fn test_custom_delivery_prefix() {
    let transport = MockTransport::new();
    let config = ProxyConfig {
        delivery_path_prefix: "/upnp/events/".to_string(),
        ..Default::default()
    };
    let proxy = proxy_with(&transport, endpoint(), config);
    assert!(proxy.delivery_path().starts_with("/upnp/events/"));

    let config = ProxyConfig {
        delivery_path_prefix: "events".to_string(),
        ..Default::default()
    };
    let result = service_proxy::ServiceProxy::new(
        endpoint(),
        transport.clone() as std::rc::Rc<dyn service_proxy::Transport>,
        config,
    );
    assert!(matches!(result, Err(ProxyError::InvalidConfig(_))));
}

#[test]
fn test_debug_output() {
    let transport = MockTransport::new();
    let proxy = proxy(&transport);
    let debug = format!("{proxy:?}");
    assert!(debug.contains("RenderingControl"));
    assert!(debug.contains("Unsubscribed"));
}
