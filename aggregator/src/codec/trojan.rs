use super::{Endpoint, ProxyRecord, Protocol, render_tail};
use crate::encoding::encode_component;

/// Trojan always runs over TLS, so no TLS flag is read from the query.
pub(super) fn parse(uri: &str) -> Option<ProxyRecord> {
    let endpoint = Endpoint::parse(uri)?;

    Some(ProxyRecord {
        sni: endpoint.query(&["sni", "host"]),
        name: endpoint.name(),
        protocol: Protocol::Trojan {
            password: endpoint.userinfo(),
        },
        server: endpoint.server,
        port: endpoint.port,
    })
}

pub(super) fn encode(record: &ProxyRecord) -> String {
    let password = match &record.protocol {
        Protocol::Trojan { password } => password.as_deref().unwrap_or(""),
        _ => "",
    };

    let query: Vec<_> = record.sni.as_deref().map(|sni| ("sni", sni)).into_iter().collect();

    format!(
        "trojan://{}@{}",
        encode_component(password),
        render_tail(record, &query)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse() {
        let record = parse("trojan://p%40ss@c.test:443?sni=c.test&security=none#n").unwrap();

        assert_eq!(record.server, "c.test");
        assert_eq!(record.sni.as_deref(), Some("c.test"));
        assert_eq!(record.credential(), "p@ss");
        // implied regardless of the query
        assert!(record.tls_enabled());
    }

    #[test]
    fn test_encode_roundtrip() {
        let record = parse("trojan://p%40ss@c.test:443?sni=c.test#t%201").unwrap();
        let encoded = encode(&record);

        assert_eq!(encoded, "trojan://p%40ss@c.test:443?sni=c.test#t%201");
        assert_eq!(parse(&encoded), Some(record));
    }

    #[test]
    fn test_missing_password_is_tolerated() {
        let record = parse("trojan://c.test:443").unwrap();
        assert_eq!(record.protocol, Protocol::Trojan { password: None });
    }
}
