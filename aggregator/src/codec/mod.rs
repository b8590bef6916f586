//! Parsing and re-encoding of proxy connection URIs.
//!
//! Every supported scheme has a `parse`/`encode` pair in its own module.
//! [`parse`] and [`encode`] are the only places that dispatch on the scheme.
//! A URI that is malformed or misses a mandatory field parses to `None`.

mod hysteria2;
mod shadowsocks;
mod trojan;
mod vless;
mod vmess;

use crate::encoding::{decode_component, encode_component};
use url::{Host, Url};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Scheme {
    Vmess,
    Vless,
    Trojan,
    Shadowsocks,
    Hysteria2,
}

impl Scheme {
    /// Every URI prefix accepted on input, aliases included.
    pub const PREFIXES: [&'static str; 6] = [
        "vmess://",
        "vless://",
        "trojan://",
        "ss://",
        "hysteria2://",
        "hy2://",
    ];

    fn from_tag(tag: &str) -> Option<Self> {
        match tag.to_ascii_lowercase().as_str() {
            "vmess" => Some(Scheme::Vmess),
            "vless" => Some(Scheme::Vless),
            "trojan" => Some(Scheme::Trojan),
            "ss" => Some(Scheme::Shadowsocks),
            "hysteria2" | "hy2" => Some(Scheme::Hysteria2),
            _ => None,
        }
    }
}

/// Scheme-specific part of a [`ProxyRecord`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Protocol {
    Vmess {
        uuid: Option<String>,
        tls: bool,
    },
    Vless {
        uuid: Option<String>,
        tls: bool,
    },
    Trojan {
        password: Option<String>,
    },
    Shadowsocks {
        method: Option<String>,
        password: Option<String>,
    },
    Hysteria2 {
        password: String,
        obfs: Option<String>,
        obfs_password: Option<String>,
        insecure: bool,
        pin_sha256: Option<String>,
    },
}

/// One proxy endpoint in canonical form.
///
/// `server` is lowercased and never bracketed, `port` is never zero. Both are
/// checked by the parsers, so an invalid record is never constructed from a URI.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProxyRecord {
    pub server: String,
    pub port: u16,
    pub sni: Option<String>,
    pub name: Option<String>,
    pub protocol: Protocol,
}

/// Identity of a record for deduplication purposes.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct DedupKey {
    server: String,
    port: u16,
    sni: String,
    credential: String,
}

impl ProxyRecord {
    pub fn scheme(&self) -> Scheme {
        match self.protocol {
            Protocol::Vmess { .. } => Scheme::Vmess,
            Protocol::Vless { .. } => Scheme::Vless,
            Protocol::Trojan { .. } => Scheme::Trojan,
            Protocol::Shadowsocks { .. } => Scheme::Shadowsocks,
            Protocol::Hysteria2 { .. } => Scheme::Hysteria2,
        }
    }

    pub fn tls_enabled(&self) -> bool {
        match &self.protocol {
            Protocol::Vmess { tls, .. } | Protocol::Vless { tls, .. } => *tls,
            Protocol::Trojan { .. } | Protocol::Hysteria2 { .. } => true,
            Protocol::Shadowsocks { .. } => false,
        }
    }

    /// The password if there is one, otherwise the uuid, otherwise "".
    pub fn credential(&self) -> &str {
        let (password, uuid) = match &self.protocol {
            Protocol::Vmess { uuid, .. } | Protocol::Vless { uuid, .. } => (None, uuid.as_deref()),
            Protocol::Trojan { password } | Protocol::Shadowsocks { password, .. } => {
                (password.as_deref(), None)
            }
            Protocol::Hysteria2 { password, .. } => (Some(password.as_str()), None),
        };

        password
            .filter(|p| !p.is_empty())
            .or(uuid.filter(|u| !u.is_empty()))
            .unwrap_or("")
    }

    pub fn dedup_key(&self) -> DedupKey {
        DedupKey {
            server: self.server.to_lowercase(),
            port: self.port,
            sni: self.sni.clone().unwrap_or_default(),
            credential: self.credential().to_string(),
        }
    }

    pub fn is_valid(&self) -> bool {
        !self.server.is_empty() && self.port > 0
    }
}

/// Parses one URI line. Unknown schemes and malformed URIs yield `None`.
pub fn parse(uri: &str) -> Option<ProxyRecord> {
    let (tag, _) = uri.split_once(':')?;
    let record = match Scheme::from_tag(tag)? {
        Scheme::Vmess => vmess::parse(uri),
        Scheme::Vless => vless::parse(uri),
        Scheme::Trojan => trojan::parse(uri),
        Scheme::Shadowsocks => shadowsocks::parse(uri),
        Scheme::Hysteria2 => hysteria2::parse(uri),
    }?;

    record.is_valid().then_some(record)
}

/// Renders a record back into its canonical URI form.
pub fn encode(record: &ProxyRecord) -> String {
    match record.scheme() {
        Scheme::Vmess => vmess::encode(record),
        Scheme::Vless => vless::encode(record),
        Scheme::Trojan => trojan::encode(record),
        Scheme::Shadowsocks => shadowsocks::encode(record),
        Scheme::Hysteria2 => hysteria2::encode(record),
    }
}

/// Label used for per-scheme statistics: the lowercased text before the first
/// `:` of a line, or "unknown".
pub fn scheme_label(line: &str) -> String {
    match line.split(':').next() {
        Some(tag) if !tag.is_empty() => tag.to_ascii_lowercase(),
        _ => "unknown".to_string(),
    }
}

/// Everything after `scheme://`.
fn payload(uri: &str) -> Option<&str> {
    uri.split_once("://").map(|(_, rest)| rest)
}

/// A URI of the form `scheme://userinfo@host:port?query#fragment`, with host
/// and port already validated.
struct Endpoint {
    url: Url,
    server: String,
    port: u16,
}

impl Endpoint {
    fn parse(uri: &str) -> Option<Self> {
        let url = Url::parse(uri).ok()?;
        let server = match url.host()? {
            Host::Domain(domain) => decode_component(domain).to_lowercase(),
            Host::Ipv4(addr) => addr.to_string(),
            Host::Ipv6(addr) => addr.to_string(),
        };
        let port = url.port().filter(|p| *p > 0)?;

        if server.is_empty() {
            return None;
        }

        Some(Endpoint { url, server, port })
    }

    /// Percent-decoded username, `None` when absent or empty.
    fn userinfo(&self) -> Option<String> {
        non_empty(decode_component(self.url.username()))
    }

    /// First non-empty value among `keys`, in order of preference.
    fn query(&self, keys: &[&str]) -> Option<String> {
        keys.iter().find_map(|key| {
            self.url
                .query_pairs()
                .find(|(k, _)| *k == **key)
                .and_then(|(_, v)| non_empty(v.into_owned()))
        })
    }

    fn name(&self) -> Option<String> {
        self.url
            .fragment()
            .and_then(|f| non_empty(decode_component(f)))
    }
}

fn non_empty(value: String) -> Option<String> {
    (!value.is_empty()).then_some(value)
}

/// Host as it must appear in a URI authority: IPv6 literals are bracketed.
fn authority_host(server: &str) -> String {
    if server.contains(':') {
        format!("[{server}]")
    } else {
        server.to_string()
    }
}

/// `host:port`, followed by `?query` and `#fragment` when present.
fn render_tail(record: &ProxyRecord, query: &[(&str, &str)]) -> String {
    let mut out = format!("{}:{}", authority_host(&record.server), record.port);

    if !query.is_empty() {
        let mut serializer = url::form_urlencoded::Serializer::new(String::new());
        for (key, value) in query {
            serializer.append_pair(key, value);
        }
        out.push('?');
        out.push_str(&serializer.finish());
    }

    if let Some(name) = record.name.as_deref().filter(|n| !n.is_empty()) {
        out.push('#');
        out.push_str(&encode_component(name));
    }

    out
}
