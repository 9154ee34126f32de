//! HTTP request sent to a bridge sensor.

use bytes::Bytes;

use crate::config::BridgeConfig;

/// User agent announced to bridges.
pub const USER_AGENT: &str = "enocean-gw/0.1";

/// Builds the request setting the status of the bridge's virtual sensor.
///
/// ```text
/// PUT /api/<key>/sensors/<id> HTTP/1.1
/// Host: <ip>
/// ...
///
/// {"state":{"status": <value>}}
/// ```
#[must_use]
pub fn build(bridge: &BridgeConfig, value: i32) -> Bytes {
    let body = format!("{{\"state\":{{\"status\": {value}}}}}");
    let request = format!(
        "PUT /api/{key}/sensors/{sensor} HTTP/1.1\r\n\
         Host: {host}\r\n\
         Accept: */*\r\n\
         User-Agent: {USER_AGENT}\r\n\
         Content-Type: application/json\r\n\
         Content-Length: {length}\r\n\
         Connection: close\r\n\
         \r\n\
         {body}",
        key = bridge.api_key,
        sensor = bridge.sensor_id,
        host = bridge.addr,
        length = body.len(),
    );
    Bytes::from(request)
}

/// Parses the status code from the start of an HTTP response.
#[must_use]
pub fn status_code(response: &[u8]) -> Option<u16> {
    let line = response.split(|&b| b == b'\r' || b == b'\n').next()?;
    let line = std::str::from_utf8(line).ok()?;
    let mut parts = line.split(' ');
    if !parts.next()?.starts_with("HTTP/") {
        return None;
    }
    parts.next()?.parse().ok()
}
