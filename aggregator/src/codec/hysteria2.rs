use super::{Endpoint, ProxyRecord, Protocol, render_tail};
use crate::encoding::encode_component;

/// Accepts `hysteria2://` and the `hy2://` alias. Unlike the other schemes a
/// password is mandatory.
pub(super) fn parse(uri: &str) -> Option<ProxyRecord> {
    let normalized = match uri.get(..6) {
        Some(prefix) if prefix.eq_ignore_ascii_case("hy2://") => format!("hysteria2://{}", &uri[6..]),
        _ => uri.to_string(),
    };

    let endpoint = Endpoint::parse(&normalized)?;
    let password = endpoint.userinfo()?;

    Some(ProxyRecord {
        sni: endpoint.query(&["sni"]),
        name: endpoint.name(),
        protocol: Protocol::Hysteria2 {
            password,
            obfs: endpoint.query(&["obfs"]),
            obfs_password: endpoint.query(&["obfs-password"]),
            insecure: endpoint.query(&["insecure"]).as_deref() == Some("1"),
            pin_sha256: endpoint.query(&["pinSHA256"]),
        },
        server: endpoint.server,
        port: endpoint.port,
    })
}

pub(super) fn encode(record: &ProxyRecord) -> String {
    let Protocol::Hysteria2 {
        password,
        obfs,
        obfs_password,
        insecure,
        pin_sha256,
    } = &record.protocol
    else {
        return format!("hysteria2://@{}", render_tail(record, &[]));
    };

    let mut query = Vec::new();
    if let Some(sni) = record.sni.as_deref() {
        query.push(("sni", sni));
    }
    if let Some(obfs) = obfs.as_deref() {
        query.push(("obfs", obfs));
    }
    if let Some(obfs_password) = obfs_password.as_deref() {
        query.push(("obfs-password", obfs_password));
    }
    if *insecure {
        query.push(("insecure", "1"));
    }
    if let Some(pin) = pin_sha256.as_deref() {
        query.push(("pinSHA256", pin));
    }

    format!(
        "hysteria2://{}@{}",
        encode_component(password),
        render_tail(record, &query)
    )
}
