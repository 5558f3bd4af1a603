//! JSON test vector loader shared by the request/response tests.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]
#![allow(dead_code)]

use std::fs;

use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct TestVector {
    pub description: String,
    pub frame: FrameData,
    #[serde(default)]
    pub expect: Option<serde_json::Value>,
    #[serde(default)]
    pub expect_error: Option<ExpectError>,
}

#[derive(Debug, Deserialize)]
pub struct ExpectError {
    pub code: String,
    #[serde(default)]
    pub rerid: i64,
    #[serde(default)]
    pub op: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct FrameData {
    pub encoding: String,
    pub data: String,
}

impl FrameData {
    /// Text frame content. `raw` vectors carry the frame verbatim, `json`
    /// vectors carry it as an escaped JSON string so broken input can be
    /// expressed.
    pub fn text(&self) -> String {
        match self.encoding.as_str() {
            "raw" => self.data.clone(),
            "json" => serde_json::from_str(&self.data).expect("invalid json-escaped frame"),
            other => panic!("unsupported encoding: {other}"),
        }
    }
}

pub fn load(name: &str) -> TestVector {
    let s = fs::read_to_string(format!("tests/vectors/{name}")).unwrap();
    serde_json::from_str(&s).unwrap()
}
