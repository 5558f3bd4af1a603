//! Request envelope vector tests.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use metricws_core::protocol::{RequestEnvelope, RequestType};

mod vector_loader;
use vector_loader::load;

#[test]
fn request_vectors() {
    let files = [
        "req_ping.json",
        "req_sub_payload.json",
        "req_default_type.json",
        "req_xsub.json",
        "req_missing_op.json",
        "req_bad_id.json",
        "req_bad_type.json",
        "req_not_json.json",
    ];

    for f in files {
        let v = load(f);
        let res = RequestEnvelope::parse(&v.frame.text());

        if let Some(err) = v.expect_error {
            let failure = res.expect_err("expected parse failure");
            assert_eq!(failure.error.client_code().as_str(), err.code, "vector={}", v.description);
            assert_eq!(failure.rerid, err.rerid, "vector={}", v.description);
            assert_eq!(failure.op, err.op, "vector={}", v.description);
            assert!(failure.error.is_client_fault(), "vector={}", v.description);
            continue;
        }

        let env = res.expect("expected ok envelope");
        let ex = v.expect.expect("missing expect block");

        assert_eq!(env.id(), ex["id"].as_i64().unwrap(), "vector={}", v.description);
        assert_eq!(env.op(), ex["op"].as_str().unwrap(), "vector={}", v.description);
        assert_eq!(env.kind().code(), ex["type"].as_str().unwrap(), "vector={}", v.description);

        let payload: serde_json::Value = env.payload().unwrap();
        assert_eq!(payload, ex["payload"], "vector={}", v.description);
    }
}

#[test]
fn type_codes_are_stable() {
    for kind in [
        RequestType::Request,
        RequestType::MRequest,
        RequestType::Subscribe,
        RequestType::Unsubscribe,
    ] {
        assert_eq!(RequestType::from_code(kind.code()), Some(kind));
    }
    assert_eq!(RequestType::from_code("REQ"), None);
}

#[test]
fn typed_payload_errors_name_the_op() {
    let env = RequestEnvelope::parse(r#"{"id":9,"op":"range","payload":{"count":"many"}}"#).unwrap();

    #[derive(serde::Deserialize, Debug)]
    struct Range {
        #[allow(dead_code)]
        count: u32,
    }

    let err = env.payload::<Range>().unwrap_err();
    assert_eq!(err.client_code().as_str(), "BAD_REQUEST");
    assert!(err.to_string().contains("range"));
}

#[test]
fn client_side_encoding_parses_back() {
    let env = RequestEnvelope::new(5, "echo", RequestType::MRequest)
        .with_payload(&serde_json::json!([1, 2]))
        .unwrap();
    let back = RequestEnvelope::parse(&env.to_json_string()).unwrap();
    assert_eq!(back.id(), 5);
    assert_eq!(back.kind(), RequestType::MRequest);
    assert_eq!(back.raw_payload().unwrap().get(), "[1,2]");
}
