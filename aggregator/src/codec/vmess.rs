use super::{ProxyRecord, Protocol, payload};
use crate::encoding::{decode_base64_lenient, encode_base64};
use serde::Serialize;
use serde_json::Value;

/// Fixed shape emitted on encode. Transport fields are pinned so that
/// re-encoded output does not depend on whatever extras the source carried.
#[derive(Serialize)]
struct VmessLink<'a> {
    v: &'static str,
    ps: &'a str,
    add: &'a str,
    port: u16,
    id: &'a str,
    sni: &'a str,
    tls: &'static str,
    net: &'static str,
    #[serde(rename = "type")]
    header_type: &'static str,
}

pub(super) fn parse(uri: &str) -> Option<ProxyRecord> {
    let decoded = decode_base64_lenient(payload(uri)?)?;
    let obj: Value = serde_json::from_str(&decoded).ok()?;

    let server = text_field(&obj, "add")?.to_lowercase();
    let port = port_field(&obj)?;
    let uuid = text_field(&obj, "id");
    let sni = text_field(&obj, "sni").or_else(|| text_field(&obj, "host"));
    let tls = match obj.get("tls") {
        Some(Value::Bool(flag)) => *flag,
        Some(Value::String(s)) => s.eq_ignore_ascii_case("tls"),
        _ => false,
    };
    let name = ["ps", "name", "tag"]
        .iter()
        .find_map(|key| text_field(&obj, key));

    Some(ProxyRecord {
        server,
        port,
        sni,
        name,
        protocol: Protocol::Vmess { uuid, tls },
    })
}

pub(super) fn encode(record: &ProxyRecord) -> String {
    let (uuid, tls) = match &record.protocol {
        Protocol::Vmess { uuid, tls } => (uuid.as_deref(), *tls),
        _ => (None, false),
    };

    let link = VmessLink {
        v: "2",
        ps: record.name.as_deref().unwrap_or(""),
        add: &record.server,
        port: record.port,
        id: uuid.unwrap_or(""),
        sni: record.sni.as_deref().unwrap_or(""),
        tls: if tls { "tls" } else { "" },
        net: "tcp",
        header_type: "none",
    };

    // Serializing a struct of strings and integers cannot fail.
    let json = serde_json::to_string(&link).unwrap_or_default();
    format!("vmess://{}", encode_base64(&json))
}

/// String value of a field, with numbers stringified. Empty strings count as
/// missing.
fn text_field(obj: &Value, key: &str) -> Option<String> {
    match obj.get(key)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Providers emit the port both as a number and as a string.
fn port_field(obj: &Value) -> Option<u16> {
    match obj.get("port")? {
        Value::Number(n) => n.as_u64().and_then(|p| u16::try_from(p).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
    .filter(|p| *p > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn link(obj: Value) -> String {
        format!("vmess://{}", encode_base64(&obj.to_string()))
    }

    #[test]
    fn test_parse_full() {
        let uri = link(json!({
            "add": "A.test", "port": 443, "id": "u", "sni": "a.test", "tls": "tls", "ps": "n",
            "net": "ws", "path": "/ignored"
        }));
        let record = parse(&uri).unwrap();

        assert_eq!(record.server, "a.test");
        assert_eq!(record.port, 443);
        assert_eq!(record.sni.as_deref(), Some("a.test"));
        assert_eq!(record.name.as_deref(), Some("n"));
        assert_eq!(
            record.protocol,
            Protocol::Vmess {
                uuid: Some("u".into()),
                tls: true
            }
        );
    }

    #[test]
    fn test_parse_fallback_fields() {
        let uri = link(json!({"add": "b.test", "port": "8443", "host": "cdn.test", "tag": "t", "tls": true}));
        let record = parse(&uri).unwrap();

        assert_eq!(record.port, 8443);
        assert_eq!(record.sni.as_deref(), Some("cdn.test"));
        assert_eq!(record.name.as_deref(), Some("t"));
        assert!(record.tls_enabled());
    }

    #[test]
    fn test_parse_rejects_missing_fields() {
        assert_eq!(parse("vmess://not-json"), None);
        assert_eq!(parse(&link(json!({"port": 443}))), None);
        assert_eq!(parse(&link(json!({"add": "a.test"}))), None);
        assert_eq!(parse(&link(json!({"add": "a.test", "port": 0}))), None);
        assert_eq!(parse(&link(json!({"add": "a.test", "port": 70000}))), None);
    }

    #[test]
    fn test_encode_pins_transport_fields() {
        let uri = link(json!({"add": "a.test", "port": 443, "id": "u", "net": "grpc", "type": "http"}));
        let encoded = encode(&parse(&uri).unwrap());

        let json = decode_base64_lenient(encoded.strip_prefix("vmess://").unwrap()).unwrap();
        let obj: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(obj["v"], "2");
        assert_eq!(obj["net"], "tcp");
        assert_eq!(obj["type"], "none");
        assert_eq!(obj["tls"], "");
        assert_eq!(obj["port"], 443);
    }

    #[test]
    fn test_roundtrip() {
        let uri = link(json!({"add": "a.test", "port": 443, "id": "u", "sni": "s.test", "tls": "tls", "ps": "node 1"}));
        let record = parse(&uri).unwrap();
        assert_eq!(parse(&encode(&record)), Some(record));
    }
}
