//! Physical file names.
//!
//! A PFN is the URI under which a replica is reachable on its endpoint,
//! e.g. `file:///data/rse1/user.alice/ab/cd/file.root` or
//! `root://eos.example.org:1094//eos/data/file.root`.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use url::Url;

/// PfnError is returned when a PFN cannot be parsed or resolved.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PfnError {
    #[error("invalid pfn '{pfn}': {reason}")]
    Invalid { pfn: String, reason: String },

    #[error("rse {rse} has no {scheme} protocol")]
    NoProtocol { rse: String, scheme: String },

    /// Hostname, port or prefix do not match the endpoint's protocol.
    #[error("pfn '{pfn}' does not belong to rse {rse}")]
    Foreign { pfn: String, rse: String },

    #[error("replica {replica} has neither a pfn nor a path")]
    Unaddressable { replica: String },
}

/// A parsed physical file name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Pfn {
    url: Url,
}

impl Pfn {
    pub fn parse(s: &str) -> Result<Self, PfnError> {
        let url = Url::parse(s).map_err(|e| PfnError::Invalid {
            pfn: s.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self { url })
    }

    /// Build a PFN from an endpoint prefix URI and a replica-relative path.
    ///
    /// The prefix path always ends up with exactly one leading and one
    /// trailing slash, however lazily it was configured.
    pub fn join(prefix: &str, relative: &str) -> Result<Self, PfnError> {
        let mut url = Url::parse(prefix).map_err(|e| PfnError::Invalid {
            pfn: prefix.to_string(),
            reason: e.to_string(),
        })?;

        let mut path = url.path().trim_matches('/').to_string();
        if !path.is_empty() {
            path.push('/');
        }
        let path = format!("/{path}{}", relative.trim_start_matches('/'));
        url.set_path(&path);
        Ok(Self { url })
    }

    pub fn scheme(&self) -> &str {
        self.url.scheme()
    }

    pub fn host(&self) -> Option<&str> {
        self.url.host_str()
    }

    /// Explicit port, or the scheme's well-known one.
    pub fn port(&self) -> Option<u16> {
        self.url.port_or_known_default()
    }

    /// Path component with duplicate slashes collapsed.
    pub fn path(&self) -> String {
        let mut out = String::with_capacity(self.url.path().len());
        let mut prev_slash = false;
        for c in self.url.path().chars() {
            if c == '/' && prev_slash {
                continue;
            }
            prev_slash = c == '/';
            out.push(c);
        }
        out
    }

    /// Local path of a `file://` PFN, percent-decoded. `None` for other
    /// schemes and for `file://` URLs naming a remote host.
    pub fn to_file_path(&self) -> Option<PathBuf> {
        if self.url.scheme() != "file" {
            return None;
        }
        self.url.to_file_path().ok()
    }

    pub fn as_str(&self) -> &str {
        self.url.as_str()
    }
}

impl fmt::Display for Pfn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.url.as_str().fmt(f)
    }
}

impl TryFrom<String> for Pfn {
    type Error = PfnError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Pfn::parse(&value)
    }
}

impl From<Pfn> for String {
    fn from(pfn: Pfn) -> Self {
        pfn.url.into()
    }
}
