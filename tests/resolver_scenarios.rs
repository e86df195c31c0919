//! End-to-end resolution scenarios against a scripted portal

mod common;

use std::time::Duration;

use common::*;
use stalker_relay::config::StreamMethod;
use stalker_relay::models::MacAuthContext;
use stalker_relay::portal::identity::{device_id, signature};
use stalker_relay::services::{AlertKind, Resolution, cache_key};

fn streaming(resolution: Resolution) -> stalker_relay::models::ResolvedStream {
    match resolution {
        Resolution::Streaming(stream) => stream,
        other => panic!("expected a stream, got {other:?}"),
    }
}

#[tokio::test]
async fn failing_mac_is_demoted_and_next_mac_serves() {
    let document = DocumentBuilder::default()
        .portal(portal("p1", &[MAC_A, MAC_B]), &["c1"])
        .build();
    let h = Harness::new(document, settings());
    h.api.script(MAC_A, MacBehavior::NoLink);

    let stream = streaming(h.resolver.resolve("p1", "c1", false).await.unwrap());

    assert_eq!(stream.mac, MAC_B);
    assert_eq!(stream.link, link_for("p1", MAC_B));
    assert_eq!(
        stream.relay_command,
        Some(vec!["relay".to_string(), "-i".to_string(), link_for("p1", MAC_B)])
    );
    assert_eq!(h.mac_order("p1").await, vec![MAC_B, MAC_A]);
    assert!(h.alerts.kinds().contains(&AlertKind::StreamCreationFailure));
    assert_eq!(h.limiter.access_count(&cache_key("p1", "c1")), 1);

    // Within the link TTL the second request never reaches the portal
    let calls_before = h.api.calls().len();
    let again = streaming(h.resolver.resolve("p1", "c1", false).await.unwrap());
    assert_eq!(again.link, stream.link);
    assert_eq!(h.api.calls().len(), calls_before);
    assert_eq!(h.mac_order("p1").await, vec![MAC_B, MAC_A]);
}

#[tokio::test]
async fn dead_portal_falls_back_to_group_sibling() {
    let document = DocumentBuilder::default()
        .portal(portal("p1", &[MAC_A]), &["c1"])
        .portal(portal("p2", &[MAC_B]), &["c2"])
        .group("News", &[("p1", "c1"), ("p2", "c2")])
        .build();
    let h = Harness::new(document, settings());
    h.api.script(MAC_A, MacBehavior::HandshakeFails);

    let stream = streaming(h.resolver.resolve("p1", "c1", false).await.unwrap());

    assert_eq!(stream.portal_id, "p2");
    assert_eq!(stream.channel_id, "c2");
    assert_eq!(stream.link, link_for("p2", MAC_B));
    assert!(h.cache.get(&cache_key("p2", "c2")).is_some());
    assert!(h.cache.get(&cache_key("p1", "c1")).is_none());

    let kinds = h.alerts.kinds();
    assert!(kinds.contains(&AlertKind::AuthenticationFailure));
    assert!(kinds.contains(&AlertKind::FallbackUsed));
}

#[tokio::test(start_paused = true)]
async fn hot_channel_without_siblings_reports_cooldown() {
    let document = DocumentBuilder::default()
        .portal(portal("p1", &[MAC_A]), &["c1"])
        .build();
    let h = Harness::new(document, settings());

    streaming(h.resolver.resolve("p1", "c1", false).await.unwrap());
    tokio::time::advance(Duration::from_secs(10)).await;

    let outcome = h.resolver.resolve("p1", "c1", false).await.unwrap();
    assert_eq!(outcome, Resolution::Cooldown { remaining_secs: 20 });

    // A web preview ignores the cooldown and gets the preview command
    let preview = streaming(h.resolver.resolve("p1", "c1", true).await.unwrap());
    assert_eq!(
        preview.relay_command,
        Some(vec!["preview".to_string(), "-i".to_string(), link_for("p1", MAC_A)])
    );
    assert_eq!(h.limiter.access_count(&cache_key("p1", "c1")), 1);
}

#[tokio::test(start_paused = true)]
async fn hot_channel_hands_over_to_cool_sibling() {
    let document = DocumentBuilder::default()
        .portal(portal("p1", &[MAC_A]), &["c1"])
        .portal(portal("p2", &[MAC_B]), &["c2"])
        .group("News", &[("p1", "c1"), ("p2", "c2")])
        .build();
    let h = Harness::new(document, settings());

    let first = streaming(h.resolver.resolve("p1", "c1", false).await.unwrap());
    assert_eq!(first.portal_id, "p1");
    tokio::time::advance(Duration::from_secs(10)).await;

    assert!(!h.alerts.kinds().contains(&AlertKind::FallbackUsed));

    let second = streaming(h.resolver.resolve("p1", "c1", false).await.unwrap());
    assert_eq!(second.portal_id, "p2");
    assert_eq!(second.channel_id, "c2");
    assert!(h.alerts.kinds().contains(&AlertKind::FallbackUsed));
}

#[tokio::test]
async fn single_attempt_when_rotation_is_not_exhaustive() {
    let document = DocumentBuilder::default()
        .portal(portal("p1", &[MAC_A, MAC_B]), &["c1"])
        .build();
    let mut relay = settings();
    relay.try_all_macs = false;
    let h = Harness::new(document, relay);
    h.api.script(MAC_A, MacBehavior::NoLink);

    let outcome = h.resolver.resolve("p1", "c1", false).await.unwrap();

    assert_eq!(outcome, Resolution::NoStreamsAvailable);
    assert_eq!(h.api.calls_for("create_link"), vec![format!("create_link:p1.test:{MAC_A}")]);
    assert_eq!(h.mac_order("p1").await, vec![MAC_B, MAC_A]);
    assert!(h.alerts.kinds().contains(&AlertKind::NoStreamsAvailable));
}

#[tokio::test]
async fn busy_mac_is_skipped_without_demotion() {
    let document = DocumentBuilder::default()
        .portal(portal("p1", &[MAC_A, MAC_B]), &["c1"])
        .build();
    let mut relay = settings();
    relay.try_all_macs = false;
    let h = Harness::new(document, relay);
    let _guard = h.pool.occupy("p1", MAC_A, "c9", "10.0.0.2", "Other");

    let stream = streaming(h.resolver.resolve("p1", "c1", false).await.unwrap());

    assert_eq!(stream.mac, MAC_B);
    assert_eq!(h.mac_order("p1").await, vec![MAC_A, MAC_B]);
    assert!(h.api.calls_for("handshake").iter().all(|c| !c.ends_with(MAC_A)));
}

#[tokio::test]
async fn fully_occupied_portal_reports_exhaustion() {
    let document = DocumentBuilder::default()
        .portal(portal("p1", &[MAC_A]), &["c1"])
        .build();
    let h = Harness::new(document, settings());
    let _guard = h.pool.occupy("p1", MAC_A, "c9", "10.0.0.2", "Other");

    let outcome = h.resolver.resolve("p1", "c1", false).await.unwrap();

    assert_eq!(outcome, Resolution::NoStreamsAvailable);
    assert!(h.api.calls().is_empty());
    assert!(h.alerts.kinds().contains(&AlertKind::ResourceExhausted));
}

#[tokio::test]
async fn group_never_retries_the_requested_channel() {
    let document = DocumentBuilder::default()
        .portal(portal("p1", &[MAC_A]), &["c1"])
        .group("Solo", &[("p1", "c1")])
        .build();
    let h = Harness::new(document, settings());
    h.api.script(MAC_A, MacBehavior::HandshakeFails);

    let outcome = h.resolver.resolve("p1", "c1", false).await.unwrap();

    assert_eq!(outcome, Resolution::NoStreamsAvailable);
    assert_eq!(h.api.calls_for("handshake").len(), 1);
}

#[tokio::test]
async fn rejected_probe_demotes_the_mac() {
    let document = DocumentBuilder::default()
        .portal(portal("p1", &[MAC_A, MAC_B]), &["c1"])
        .build();
    let h = Harness::new(document, settings());
    h.probe.reject(&link_for("p1", MAC_A));

    let stream = streaming(h.resolver.resolve("p1", "c1", false).await.unwrap());

    assert_eq!(stream.mac, MAC_B);
    assert_eq!(h.mac_order("p1").await, vec![MAC_B, MAC_A]);
    assert!(h.alerts.kinds().contains(&AlertKind::ProbeFailure));
    assert_eq!(h.probe.probed().len(), 2);
}

#[tokio::test]
async fn probing_can_be_disabled() {
    let document = DocumentBuilder::default()
        .portal(portal("p1", &[MAC_A]), &["c1"])
        .build();
    let mut relay = settings();
    relay.test_streams = false;
    let h = Harness::new(document, relay);
    h.probe.reject(&link_for("p1", MAC_A));

    let stream = streaming(h.resolver.resolve("p1", "c1", false).await.unwrap());

    assert_eq!(stream.mac, MAC_A);
    assert!(h.probe.probed().is_empty());
}

#[tokio::test]
async fn redirect_mode_carries_no_relay_command() {
    let document = DocumentBuilder::default()
        .portal(portal("p1", &[MAC_A]), &["c1"])
        .build();
    let mut relay = settings();
    relay.stream_method = StreamMethod::Redirect;
    let h = Harness::new(document, relay);

    let stream = streaming(h.resolver.resolve("p1", "c1", false).await.unwrap());

    assert_eq!(stream.relay_command, None);
    assert_eq!(stream.link, link_for("p1", MAC_A));
}

#[tokio::test]
async fn web_preview_does_not_walk_fallbacks() {
    let document = DocumentBuilder::default()
        .portal(portal("p1", &[MAC_A]), &["c1"])
        .portal(portal("p2", &[MAC_B]), &["c2"])
        .group("News", &[("p1", "c1"), ("p2", "c2")])
        .build();
    let h = Harness::new(document, settings());
    h.api.script(MAC_A, MacBehavior::HandshakeFails);

    let outcome = h.resolver.resolve("p1", "c1", true).await.unwrap();

    assert_eq!(outcome, Resolution::NoStreamsAvailable);
    assert!(h.api.calls().iter().all(|c| !c.contains("p2.test")));
}

#[tokio::test]
async fn disabled_portal_is_skipped_without_touching_macs() {
    let mut disabled = portal("p1", &[MAC_A, MAC_C]);
    disabled.enabled = false;
    let document = DocumentBuilder::default()
        .portal(disabled, &["c1"])
        .portal(portal("p2", &[MAC_B]), &["c2"])
        .group("News", &[("p1", "c1"), ("p2", "c2")])
        .build();
    let h = Harness::new(document, settings());

    let stream = streaming(h.resolver.resolve("p1", "c1", false).await.unwrap());

    assert_eq!(stream.portal_id, "p2");
    assert_eq!(h.mac_order("p1").await, vec![MAC_A, MAC_C]);
}

#[tokio::test]
async fn fresh_device_identity_is_saved() {
    let document = DocumentBuilder::default()
        .portal(portal("p1", &[MAC_A]), &["c1"])
        .build();
    let h = Harness::new(document, settings());

    streaming(h.resolver.resolve("p1", "c1", false).await.unwrap());

    let portals = h.portals().await;
    let auth = portals["p1"].mac(MAC_A).and_then(|m| m.auth.clone()).unwrap();
    assert_eq!(auth.device_id, device_id(MAC_A));
    assert_eq!(auth.device_id2, auth.device_id);
    assert_eq!(auth.signature.len(), 64);
}

#[tokio::test]
async fn saved_identity_is_re_signed_for_the_new_token() {
    let mut stale = portal("p1", &[MAC_A]);
    stale.macs[0].auth = Some(MacAuthContext::fresh(MAC_A, "stale-token", 1));
    let document = DocumentBuilder::default().portal(stale, &["c1"]).build();
    let h = Harness::new(document, settings());

    streaming(h.resolver.resolve("p1", "c1", false).await.unwrap());

    let requests = h.api.profile_requests();
    assert_eq!(requests.len(), 1);
    let (token, sent) = &requests[0];
    assert_eq!(token, &format!("token-{MAC_A}"));
    assert_ne!(sent.timestamp, 1);
    assert_eq!(sent.signature, signature(MAC_A, token, sent.timestamp));

    let portals = h.portals().await;
    let saved = portals["p1"].mac(MAC_A).and_then(|m| m.auth.clone()).unwrap();
    assert_eq!(&saved, sent);
}

#[tokio::test]
async fn unknown_channel_yields_no_streams() {
    let document = DocumentBuilder::default()
        .portal(portal("p1", &[MAC_A]), &["c1"])
        .build();
    let h = Harness::new(document, settings());

    let outcome = h.resolver.resolve("p1", "missing", false).await.unwrap();

    assert_eq!(outcome, Resolution::NoStreamsAvailable);
    assert!(h.api.calls().is_empty());
}
