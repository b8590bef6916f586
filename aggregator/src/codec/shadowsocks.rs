//! Shadowsocks links come in three shapes:
//!
//! 1. `ss://method:password@host:port#name`
//! 2. `ss://base64(method:password)@host:port#name`
//! 3. `ss://base64(method:password@host:port)#name`
//!
//! Anything after `?` on the host part (plugin options) is ignored.

use super::{ProxyRecord, Protocol, authority_host, non_empty, payload};
use crate::encoding::{decode_base64_lenient, decode_component, encode_base64, encode_component};

pub(super) fn parse(uri: &str) -> Option<ProxyRecord> {
    let raw = payload(uri)?;

    let (main, name) = match raw.split_once('#') {
        Some((main, fragment)) => (main, non_empty(decode_component(fragment))),
        None => (raw, None),
    };

    let (credentials, host_port) = match main.split_once('@') {
        Some((creds, host_port)) => (decode_credentials(creds), host_port.to_string()),
        None => {
            let blob = main.split('?').next().unwrap_or(main).trim_end_matches('/');
            let decoded = decode_base64_lenient(blob)?;
            let (creds, host_port) = decoded.rsplit_once('@')?;
            (creds.to_string(), host_port.to_string())
        }
    };

    let (server, port) = split_host_port(&host_port)?;
    let (method, password) = match credentials.split_once(':') {
        Some((method, password)) => (
            non_empty(method.to_string()),
            non_empty(password.to_string()),
        ),
        None => (None, None),
    };

    Some(ProxyRecord {
        server,
        port,
        sni: None,
        name,
        protocol: Protocol::Shadowsocks { method, password },
    })
}

/// Always emits form 2. Without a known method there is nothing meaningful to
/// put in the userinfo, so only `host:port` is written. Clients are expected
/// to reject that line.
pub(super) fn encode(record: &ProxyRecord) -> String {
    let (method, password) = match &record.protocol {
        Protocol::Shadowsocks { method, password } => (method.as_deref(), password.as_deref()),
        _ => (None, None),
    };

    let host_port = format!("{}:{}", authority_host(&record.server), record.port);
    let fragment = record
        .name
        .as_deref()
        .filter(|n| !n.is_empty())
        .map(|n| format!("#{}", encode_component(n)))
        .unwrap_or_default();

    match method {
        Some(method) => {
            let credentials = encode_base64(&format!("{method}:{}", password.unwrap_or("")));
            format!("ss://{credentials}@{host_port}{fragment}")
        }
        None => format!("ss://{host_port}{fragment}"),
    }
}

/// The userinfo part is either base64 of `method:password` or the plain
/// (possibly percent-encoded) pair.
fn decode_credentials(creds: &str) -> String {
    decode_base64_lenient(creds)
        .filter(|decoded| decoded.contains(':'))
        .unwrap_or_else(|| decode_component(creds))
}

/// Splits `host:port` or `[v6]:port`, dropping any query or trailing slash.
fn split_host_port(host_port: &str) -> Option<(String, u16)> {
    let host_port = host_port.split('?').next()?.trim_end_matches('/');

    let (host, port) = match host_port.strip_prefix('[') {
        Some(rest) => {
            let (host, after) = rest.split_once(']')?;
            (host, after.strip_prefix(':')?)
        }
        None => host_port.rsplit_once(':')?,
    };

    if host.is_empty() || port.is_empty() || !port.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    let port: u16 = port.parse().ok().filter(|p| *p > 0)?;
    Some((host.to_lowercase(), port))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn method_password(record: &ProxyRecord) -> (Option<&str>, Option<&str>) {
        match &record.protocol {
            Protocol::Shadowsocks { method, password } => (method.as_deref(), password.as_deref()),
            _ => panic!("not a shadowsocks record"),
        }
    }

    #[test]
    fn test_plain_credentials() {
        let record = parse("ss://aes-256-gcm:pass@D.test:443#n").unwrap();
        assert_eq!(record.server, "d.test");
        assert_eq!(record.port, 443);
        assert_eq!(record.name.as_deref(), Some("n"));
        assert_eq!(method_password(&record), (Some("aes-256-gcm"), Some("pass")));
    }

    #[test]
    fn test_base64_credentials_with_plugin() {
        let record = parse("ss://bWV0aG9kOnBhc3M=@e.test:8388?plugin=v2ray-plugin;tls#with-plugin").unwrap();
        assert_eq!(record.server, "e.test");
        assert_eq!(record.port, 8388);
        assert_eq!(record.name.as_deref(), Some("with-plugin"));
        assert_eq!(method_password(&record), (Some("method"), Some("pass")));
    }

    #[test]
    fn test_whole_blob_base64() {
        let blob = encode_base64("chacha20-ietf-poly1305:p@ss@f.test:8388");
        let record = parse(&format!("ss://{blob}#blob")).unwrap();
        assert_eq!(record.server, "f.test");
        assert_eq!(record.port, 8388);
        assert_eq!(method_password(&record), (Some("chacha20-ietf-poly1305"), Some("p@ss")));
    }

    #[test]
    fn test_ipv6_literal() {
        let record = parse("ss://bWV0aG9kOnBhc3M=@[2001:DB8::1]:8388/?plugin=x").unwrap();
        assert_eq!(record.server, "2001:db8::1");
        assert_eq!(record.port, 8388);
        assert_eq!(encode(&record), "ss://bWV0aG9kOnBhc3M=@[2001:db8::1]:8388");
    }

    #[test]
    fn test_invalid() {
        assert_eq!(parse("ss://"), None);
        assert_eq!(parse("ss://bWV0aG9kOnBhc3M=@e.test"), None);
        assert_eq!(parse("ss://bWV0aG9kOnBhc3M=@e.test:port"), None);
        assert_eq!(parse("ss://bWV0aG9kOnBhc3M=@:8388"), None);
        assert_eq!(parse("ss://bm8gYXQgc2lnbg=="), None);
    }

    #[test]
    fn test_encode_roundtrip() {
        let record = parse("ss://aes-128-gcm:secret@g.test:8388#my%20ss").unwrap();
        let encoded = encode(&record);
        assert_eq!(encoded, format!("ss://{}@g.test:8388#my%20ss", encode_base64("aes-128-gcm:secret")));
        assert_eq!(parse(&encoded), Some(record));
    }

    #[test]
    fn test_encode_without_method_degrades() {
        let record = parse("ss://nocolon@h.test:8388#n").unwrap();
        assert_eq!(method_password(&record), (None, None));
        assert_eq!(encode(&record), "ss://h.test:8388#n");
    }
}
