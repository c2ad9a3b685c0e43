//! Decode targets for panel responses.
//!
//! Only the fields that end up in gauges are modelled; everything else in
//! the payloads is ignored.

use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// The `{success, msg, obj}` envelope every panel endpoint answers with.
///
/// `obj` stays undecoded until `success` has been checked, since failed
/// calls often carry no payload at all.
#[derive(Debug, Deserialize)]
pub struct Envelope {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub msg: String,
    #[serde(default)]
    pub obj: Value,
}

/// Body of the login response. The session itself travels in a cookie.
#[derive(Debug, Deserialize)]
pub struct LoginResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub msg: String,
}

/// The onlines payload; only its length matters. `null` means nobody is online.
pub type OnlineUsers = Option<Vec<Value>>;

#[derive(Debug, Deserialize)]
pub struct ServerStatus {
    pub xray: XrayStatus,
    #[serde(rename = "appStats")]
    pub app_stats: AppStats,
}

#[derive(Debug, Deserialize)]
pub struct XrayStatus {
    #[serde(default)]
    pub version: String,
}

#[derive(Debug, Deserialize)]
pub struct AppStats {
    #[serde(default)]
    pub threads: u64,
    #[serde(default)]
    pub mem: u64,
    #[serde(default)]
    pub uptime: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Inbound {
    pub id: i64,
    #[serde(default)]
    pub remark: String,
    #[serde(default)]
    pub up: i64,
    #[serde(default)]
    pub down: i64,
    #[serde(rename = "clientStats", default, deserialize_with = "null_as_empty")]
    pub client_stats: Vec<ClientStat>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ClientStat {
    pub id: i64,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub up: i64,
    #[serde(default)]
    pub down: i64,
}

fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inbound_with_null_client_stats() {
        let json = r#"{"id": 4, "remark": "vless", "up": 10, "down": 20, "clientStats": null}"#;
        let inbound: Inbound = serde_json::from_str(json).unwrap();
        assert_eq!(inbound.id, 4);
        assert!(inbound.client_stats.is_empty());
    }

    #[test]
    fn test_server_status_ignores_unknown_fields() {
        let json = r#"{
            "cpu": 3.5,
            "xray": {"state": "running", "version": "1.8.4"},
            "appStats": {"threads": 12, "mem": 4096, "uptime": 360}
        }"#;
        let status: ServerStatus = serde_json::from_str(json).unwrap();
        assert_eq!(status.xray.version, "1.8.4");
        assert_eq!(status.app_stats.threads, 12);
        assert_eq!(status.app_stats.mem, 4096);
    }

    #[test]
    fn test_onlines_null_obj() {
        let envelope: Envelope =
            serde_json::from_str(r#"{"success": true, "msg": "", "obj": null}"#).unwrap();
        let onlines: OnlineUsers = serde_json::from_value(envelope.obj).unwrap();
        assert!(onlines.is_none());
    }
}
