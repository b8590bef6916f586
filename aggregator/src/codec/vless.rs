use super::{Endpoint, ProxyRecord, Protocol, render_tail};
use crate::encoding::encode_component;

pub(super) fn parse(uri: &str) -> Option<ProxyRecord> {
    let endpoint = Endpoint::parse(uri)?;

    let tls = matches!(
        endpoint.query(&["security"]).as_deref(),
        Some("tls") | Some("reality")
    ) || endpoint.query(&["tls"]).as_deref() == Some("1");

    Some(ProxyRecord {
        sni: endpoint.query(&["sni", "host"]),
        name: endpoint.name(),
        protocol: Protocol::Vless {
            uuid: endpoint.userinfo(),
            tls,
        },
        server: endpoint.server,
        port: endpoint.port,
    })
}

pub(super) fn encode(record: &ProxyRecord) -> String {
    let (uuid, tls) = match &record.protocol {
        Protocol::Vless { uuid, tls } => (uuid.as_deref().unwrap_or(""), *tls),
        _ => ("", false),
    };

    let mut query = Vec::new();
    if let Some(sni) = record.sni.as_deref() {
        query.push(("sni", sni));
    }
    if tls {
        query.push(("security", "tls"));
    }

    format!(
        "vless://{}@{}",
        encode_component(uuid),
        render_tail(record, &query)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse() {
        let record =
            parse("vless://11111111-1111-1111-1111-111111111111@Example.com:443?sni=example.com&security=reality#vl%201")
                .unwrap();

        assert_eq!(record.server, "example.com");
        assert_eq!(record.port, 443);
        assert_eq!(record.sni.as_deref(), Some("example.com"));
        assert_eq!(record.name.as_deref(), Some("vl 1"));
        assert_eq!(
            record.protocol,
            Protocol::Vless {
                uuid: Some("11111111-1111-1111-1111-111111111111".into()),
                tls: true
            }
        );
    }

    #[test]
    fn test_tls_flags() {
        assert!(parse("vless://u@h.test:443?security=tls").unwrap().tls_enabled());
        assert!(parse("vless://u@h.test:443?tls=1").unwrap().tls_enabled());
        assert!(!parse("vless://u@h.test:443?security=none").unwrap().tls_enabled());
        assert!(!parse("vless://u@h.test:443").unwrap().tls_enabled());
    }

    #[test]
    fn test_host_param_as_sni_fallback() {
        let record = parse("vless://u@h.test:443?host=cdn.test").unwrap();
        assert_eq!(record.sni.as_deref(), Some("cdn.test"));
    }

    #[test]
    fn test_requires_host_and_port() {
        assert_eq!(parse("vless://missing"), None);
        assert_eq!(parse("vless://u@:443"), None);
    }

    #[test]
    fn test_encode() {
        let record = parse("vless://u@h.test:443?sni=s.test&security=reality&type=ws#my%20node").unwrap();
        assert_eq!(encode(&record), "vless://u@h.test:443?sni=s.test&security=tls#my%20node");
        assert_eq!(parse(&encode(&record)), Some(record));
    }
}
