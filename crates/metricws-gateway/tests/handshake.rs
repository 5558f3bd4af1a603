#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use axum::body::Body;
use axum::extract::Request;
use axum::http::{header, StatusCode};
use tokio_tungstenite::tungstenite::Message;

use metricws_gateway::transport::handshake::accept_key;
use metricws_gateway::transport::{HandshakeNegotiator, HandshakeState, Negotiated};

fn upgrade_request(version: &str, key: &str) -> Request {
    Request::builder()
        .uri("/ws")
        .header(header::CONNECTION, "keep-alive, Upgrade")
        .header(header::UPGRADE, "websocket")
        .header(header::SEC_WEBSOCKET_VERSION, version)
        .header(header::SEC_WEBSOCKET_KEY, key)
        .body(Body::empty())
        .unwrap()
}

fn rejected_status(n: Negotiated) -> (StatusCode, axum::http::HeaderMap) {
    match n {
        Negotiated::Rejected(resp) => (resp.status(), resp.headers().clone()),
        Negotiated::Switching { .. } => panic!("expected rejection"),
    }
}

#[test]
fn accept_key_matches_rfc_example() {
    assert_eq!(
        accept_key(b"dGhlIHNhbXBsZSBub25jZQ=="),
        "s3pPLMBiTxaQ9kYGzzhZRbK+xOo="
    );
}

#[test]
fn starts_in_init() {
    assert_eq!(HandshakeNegotiator::new().state(), HandshakeState::Init);
}

#[test]
fn missing_upgrade_headers_are_rejected() {
    let mut nego = HandshakeNegotiator::new();
    let mut req = Request::builder().uri("/ws").body(Body::empty()).unwrap();

    let (status, headers) = rejected_status(nego.negotiate(&mut req));
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(headers.get(header::CONNECTION).unwrap(), "close");
    assert_eq!(nego.state(), HandshakeState::Rejected);
}

#[test]
fn bad_key_is_rejected() {
    let mut nego = HandshakeNegotiator::new();
    let mut req = upgrade_request("13", "too-short");
    let (status, _) = rejected_status(nego.negotiate(&mut req));
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[test]
fn post_is_rejected() {
    let mut nego = HandshakeNegotiator::new();
    let mut req = upgrade_request("13", "dGhlIHNhbXBsZSBub25jZQ==");
    *req.method_mut() = axum::http::Method::POST;
    let (status, _) = rejected_status(nego.negotiate(&mut req));
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[test]
fn unsupported_version_advertises_13() {
    let mut nego = HandshakeNegotiator::new();
    let mut req = upgrade_request("8", "dGhlIHNhbXBsZSBub25jZQ==");

    let (status, headers) = rejected_status(nego.negotiate(&mut req));
    assert_eq!(status, StatusCode::UPGRADE_REQUIRED);
    assert_eq!(headers.get(header::SEC_WEBSOCKET_VERSION).unwrap(), "13");
    assert_eq!(nego.state(), HandshakeState::Rejected);
}

#[test]
fn request_without_upgradable_connection_is_rejected() {
    // valid headers, but not served by hyper so there is nothing to upgrade
    let mut nego = HandshakeNegotiator::new();
    let mut req = upgrade_request("13", "dGhlIHNhbXBsZSBub25jZQ==");
    let (status, _) = rejected_status(nego.negotiate(&mut req));
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[test]
fn frames_before_upgrade_are_refused() {
    let nego = HandshakeNegotiator::new();
    let err = nego.on_frame(&Message::Text("{}".into())).expect_err("must fail");
    assert_eq!(err.client_code().as_str(), "UNSUPPORTED");
}

#[test]
fn second_negotiation_is_refused() {
    let mut nego = HandshakeNegotiator::new();
    let mut req = upgrade_request("8", "dGhlIHNhbXBsZSBub25jZQ==");
    nego.negotiate(&mut req);
    let mut again = upgrade_request("13", "dGhlIHNhbXBsZSBub25jZQ==");
    let (status, _) = rejected_status(nego.negotiate(&mut again));
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
