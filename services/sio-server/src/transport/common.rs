//! Helpers shared by the HTTP polling transports: stripping the IE
//! XDomainRequest `data=` prefix, building the CORS preflight response, and
//! the small bits of percent/JSON unwrapping the JSONP transport needs.

use axum::http::{HeaderMap, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};

/// IE's XDomainRequest prefixes XHR POST bodies with `data=`; strip it if
/// present, otherwise return the body unchanged.
pub fn strip_ie_data_prefix(body: &str) -> &str {
    body.strip_prefix("data=").unwrap_or(body)
}

/// JSONP POST bodies are `d=<url-encoded JSON string>`, where the JSON
/// string itself contains the frame payload. Returns the decoded frame
/// payload, or an error if the body doesn't start with `d=` or isn't valid
/// JSON once decoded.
pub fn decode_jsonp_post_body(body: &str) -> Result<String, crate::error::ServerError> {
    let encoded = body.strip_prefix("d=").ok_or(crate::error::ServerError::MalformedJsonpBody)?;
    let decoded = percent_decode(encoded);
    let value: serde_json::Value =
        serde_json::from_str(&decoded).map_err(|_| crate::error::ServerError::MalformedJsonpBody)?;
    value.as_str().map(ToOwned::to_owned).ok_or(crate::error::ServerError::MalformedJsonpBody)
}

/// Minimal `application/x-www-form-urlencoded` percent-decoding: `+` is a
/// space, `%XX` is a byte. Good enough for the ASCII-heavy JSONP bodies
/// this transport receives; invalid escapes pass through unchanged.
pub fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b'%' if i + 2 < bytes.len() => {
                let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok();
                match hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                    Some(byte) => {
                        out.push(byte);
                        i += 3;
                    }
                    None => {
                        out.push(bytes[i]);
                        i += 1;
                    }
                }
            }
            other => {
                out.push(other);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Wraps a JSON-encoded string in the `io.j[<idx>](<json>);` JSONP
/// callback shell.
pub fn wrap_jsonp(index: &str, json: &str) -> String {
    format!("io.j[{index}]({json});")
}

/// Shared CORS preflight handler for the HTTP polling transports: echoes
/// `Origin`, allows credentials when a cookie is present, advertises the
/// three methods these transports use.
pub async fn cors_preflight(method: Method, headers: HeaderMap) -> Response {
    if method != Method::OPTIONS {
        return StatusCode::METHOD_NOT_ALLOWED.into_response();
    }

    let mut response = StatusCode::OK.into_response();
    let out = response.headers_mut();

    if let Some(origin) = headers.get(axum::http::header::ORIGIN) {
        out.insert(axum::http::header::ACCESS_CONTROL_ALLOW_ORIGIN, origin.clone());
    }
    if headers.contains_key(axum::http::header::COOKIE) {
        out.insert(
            axum::http::header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
            HeaderValue::from_static("true"),
        );
    }
    out.insert(
        axum::http::header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("POST, GET, OPTIONS"),
    );
    response
}
