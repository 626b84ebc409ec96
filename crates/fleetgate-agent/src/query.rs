// crates/fleetgate-agent/src/query.rs
// ============================================================================
// Module: Fleetgate Agent Query Parsing
// Description: Minimal percent-decoding query-string parser for RPC routes.
// Purpose: Pull `instance`/`file`/`deployment_id` out of a request URL
//          without a dedicated URL-parsing dependency.
// Dependencies: std
// ============================================================================

use std::collections::HashMap;

/// Splits a tiny_http request URL into its path and a decoded query map.
pub(crate) fn split_url(url: &str) -> (&str, HashMap<String, String>) {
    match url.split_once('?') {
        Some((path, query)) => (path, parse_query(query)),
        None => (url, HashMap::new()),
    }
}

/// Parses an `a=b&c=d` query string, percent-decoding keys and values.
fn parse_query(query: &str) -> HashMap<String, String> {
    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .filter_map(|pair| {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            Some((percent_decode(key), percent_decode(value)))
        })
        .collect()
}

/// Decodes `%XX` escapes and `+` as space; invalid escapes pass through
/// literally rather than failing the whole request.
fn percent_decode(input: &str) -> String {
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
                let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok().and_then(|hex| u8::from_str_radix(hex, 16).ok());
                match hex {
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
            byte => {
                out.push(byte);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}
