//! Storage endpoints (RSEs) and their access protocols.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::ids::RseId;
use super::pfn::{Pfn, PfnError};

/// VO used when an endpoint does not declare one (single-tenant deployments).
pub const DEFAULT_VO: &str = "def";

fn default_vo() -> String {
    DEFAULT_VO.to_string()
}

/// One way of reaching an endpoint's storage.
///
/// A PFN belongs to the endpoint only if scheme, hostname, port and path
/// prefix all agree with one of its protocols.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Protocol {
    pub scheme: String,

    /// `None` for host-less schemes such as `file`.
    #[serde(default)]
    pub hostname: Option<String>,

    /// `None` accepts the scheme's default (or any) port.
    #[serde(default)]
    pub port: Option<u16>,

    #[serde(default)]
    pub prefix: String,
}

impl Protocol {
    pub fn new(scheme: impl Into<String>) -> Self {
        Self {
            scheme: scheme.into(),
            hostname: None,
            port: None,
            prefix: String::new(),
        }
    }

    pub fn with_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = Some(hostname.into());
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Prefix as an absolute directory path: `/`, or `/a/b/`.
    fn prefix_dir(&self) -> String {
        let parts: Vec<&str> = self.prefix.split('/').filter(|p| !p.is_empty()).collect();
        if parts.is_empty() {
            "/".to_string()
        } else {
            format!("/{}/", parts.join("/"))
        }
    }

    /// `scheme://host:port/prefix/`
    pub fn base_uri(&self) -> String {
        let mut uri = format!("{}://", self.scheme);
        if let Some(host) = &self.hostname {
            uri.push_str(host);
            if let Some(port) = self.port {
                uri.push_str(&format!(":{port}"));
            }
        }
        uri.push_str(&self.prefix_dir());
        uri
    }

    /// PFN of a replica stored at `path`, relative to the prefix.
    pub fn pfn_for(&self, path: &str) -> Result<Pfn, PfnError> {
        Pfn::join(&self.base_uri(), path)
    }

    pub fn owns(&self, pfn: &Pfn) -> bool {
        if pfn.scheme() != self.scheme {
            return false;
        }
        let host = pfn.host().filter(|h| !h.is_empty());
        let host_matches = match (&self.hostname, host) {
            (Some(expected), Some(actual)) => expected.eq_ignore_ascii_case(actual),
            (None, None) => true,
            _ => false,
        };
        let port_matches = self.port.is_none_or(|p| pfn.port() == Some(p));
        host_matches && port_matches && pfn.path().starts_with(&self.prefix_dir())
    }
}

/// A storage endpoint as configured in the catalog.
///
/// Failure and exclusion state are not stored here; they live in
/// `app::exclusion::ExclusionTracker`, their only writer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rse {
    pub id: RseId,

    #[serde(default = "default_vo")]
    pub vo: String,

    /// Access protocols, highest priority first.
    #[serde(default)]
    pub protocols: Vec<Protocol>,

    /// Endpoint-level greedy deletion (ignores tombstone minimum age).
    #[serde(default)]
    pub greedy: bool,

    /// Free-form attributes matched by RSE expressions.
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

impl Rse {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: RseId::new(id),
            vo: default_vo(),
            protocols: Vec::new(),
            greedy: false,
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_vo(mut self, vo: impl Into<String>) -> Self {
        self.vo = vo.into();
        self
    }

    pub fn with_protocol(mut self, protocol: Protocol) -> Self {
        self.protocols.push(protocol);
        self
    }

    pub fn with_greedy(mut self, greedy: bool) -> Self {
        self.greedy = greedy;
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Attribute lookup including the built-in `rse` and `vo` keys.
    pub fn attribute(&self, key: &str) -> Option<&str> {
        match key {
            "rse" => Some(self.id.as_str()),
            "vo" => Some(self.vo.as_str()),
            _ => self.attributes.get(key).map(String::as_str),
        }
    }

    /// Highest-priority protocol for `scheme`.
    pub fn protocol(&self, scheme: &str) -> Option<&Protocol> {
        self.protocols.iter().find(|p| p.scheme == scheme)
    }

    pub fn supports_scheme(&self, scheme: &str) -> bool {
        self.protocol(scheme).is_some()
    }

    /// Check that `pfn` points into this endpoint's storage.
    pub fn check_pfn(&self, pfn: &Pfn) -> Result<(), PfnError> {
        let mut candidates = self.protocols.iter().filter(|p| p.scheme == pfn.scheme()).peekable();
        if candidates.peek().is_none() {
            return Err(PfnError::NoProtocol {
                rse: self.id.to_string(),
                scheme: pfn.scheme().to_string(),
            });
        }
        if candidates.any(|p| p.owns(pfn)) {
            Ok(())
        } else {
            Err(PfnError::Foreign {
                pfn: pfn.to_string(),
                rse: self.id.to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn builtin_attributes_shadow_free_form_ones() {
        let rse = Rse::new("CERN-PROD_DATADISK")
            .with_vo("atlas")
            .with_attribute("rse", "ignored")
            .with_attribute("tier", "0");

        assert_eq!(rse.attribute("rse"), Some("CERN-PROD_DATADISK"));
        assert_eq!(rse.attribute("vo"), Some("atlas"));
        assert_eq!(rse.attribute("tier"), Some("0"));
        assert_eq!(rse.attribute("missing"), None);
    }

    #[test]
    fn deserializes_with_defaults() {
        let rse: Rse = serde_json::from_str(r#"{ "id": "SITE_A" }"#).unwrap();
        assert_eq!(rse.vo, DEFAULT_VO);
        assert!(!rse.greedy);
        assert!(rse.protocols.is_empty());
    }

    #[test]
    fn protocols_deserialize_from_json() {
        let rse: Rse = serde_json::from_str(
            r#"{ "id": "SITE_A", "protocols": [
                { "scheme": "root", "hostname": "eos.example.org", "port": 1094, "prefix": "/eos/data" },
                { "scheme": "file", "prefix": "/data" }
            ] }"#,
        )
        .unwrap();
        assert!(rse.supports_scheme("root"));
        assert!(rse.supports_scheme("file"));
        assert!(!rse.supports_scheme("davs"));
        assert_eq!(rse.protocol("root").unwrap().port, Some(1094));
    }

    #[rstest]
    #[case::remote(Protocol::new("root").with_hostname("eos.example.org").with_port(1094).with_prefix("eos/data"), "root://eos.example.org:1094/eos/data/")]
    #[case::local(Protocol::new("file").with_prefix("/data/"), "file:///data/")]
    #[case::no_prefix(Protocol::new("mem").with_hostname("h"), "mem://h/")]
    fn base_uri_normalises_prefix(#[case] protocol: Protocol, #[case] expected: &str) {
        assert_eq!(protocol.base_uri(), expected);
    }

    #[test]
    fn pfn_for_joins_prefix_and_path() {
        let protocol = Protocol::new("file").with_prefix("//data//rse1");
        let pfn = protocol.pfn_for("user.alice/ab/cd/f.root").unwrap();
        assert_eq!(pfn.as_str(), "file:///data/rse1/user.alice/ab/cd/f.root");
        assert!(protocol.owns(&pfn));
    }

    #[rstest]
    #[case::same("root://eos.example.org:1094//eos/data/f", true)]
    #[case::host_case("root://EOS.example.org:1094/eos/data/f", true)]
    #[case::other_host("root://evil.example.org:1094/eos/data/f", false)]
    #[case::other_port("root://eos.example.org:2094/eos/data/f", false)]
    #[case::no_port("root://eos.example.org/eos/data/f", false)]
    #[case::outside_prefix("root://eos.example.org:1094/eos/database/f", false)]
    #[case::other_scheme("davs://eos.example.org:1094/eos/data/f", false)]
    fn ownership_needs_host_port_and_prefix(#[case] pfn: &str, #[case] owned: bool) {
        let protocol = Protocol::new("root")
            .with_hostname("eos.example.org")
            .with_port(1094)
            .with_prefix("/eos/data");
        assert_eq!(protocol.owns(&Pfn::parse(pfn).unwrap()), owned);
    }

    #[test]
    fn host_less_protocol_rejects_remote_files() {
        let protocol = Protocol::new("file").with_prefix("/data");
        assert!(protocol.owns(&Pfn::parse("file:///data/f").unwrap()));
        assert!(!protocol.owns(&Pfn::parse("file://nas.example.org/data/f").unwrap()));
    }

    #[test]
    fn check_pfn_distinguishes_missing_protocol_from_foreign_pfn() {
        let rse = Rse::new("SITE_A")
            .with_protocol(Protocol::new("root").with_hostname("a.example.org").with_prefix("/a"))
            .with_protocol(Protocol::new("root").with_hostname("b.example.org").with_prefix("/b"));

        assert!(rse.check_pfn(&Pfn::parse("root://b.example.org/b/f").unwrap()).is_ok());
        assert!(matches!(
            rse.check_pfn(&Pfn::parse("root://b.example.org/a/f").unwrap()),
            Err(PfnError::Foreign { .. })
        ));
        assert!(matches!(
            rse.check_pfn(&Pfn::parse("davs://a.example.org/a/f").unwrap()),
            Err(PfnError::NoProtocol { .. })
        ));
    }
}
