//! Content and name paths: `/ipfs/<cid>/a/b`, `/ipns/<name>/a`, or a bare
//! `<cid>/a` which is read as an `/ipfs/` path.

use std::fmt;
use std::str::FromStr;

use crate::storage::HashUtils;
use crate::utils::{IpfsError, Result};

pub const IPFS_PREFIX: &str = "/ipfs/";
pub const IPNS_PREFIX: &str = "/ipns/";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Namespace {
    Ipfs,
    Ipns,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Path {
    namespace: Namespace,
    root: String,
    segments: Vec<String>,
}

impl Path {
    pub fn ipfs(cid: &str) -> Self {
        Self {
            namespace: Namespace::Ipfs,
            root: cid.to_string(),
            segments: Vec::new(),
        }
    }

    pub fn ipns(name: &str) -> Self {
        Self {
            namespace: Namespace::Ipns,
            root: name.to_string(),
            segments: Vec::new(),
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        let (namespace, rest) = if let Some(rest) = s.strip_prefix(IPFS_PREFIX) {
            (Namespace::Ipfs, rest)
        } else if let Some(rest) = s.strip_prefix(IPNS_PREFIX) {
            (Namespace::Ipns, rest)
        } else if s.starts_with('/') {
            return Err(IpfsError::InvalidPath(format!("unknown namespace in {}", s)));
        } else {
            (Namespace::Ipfs, s)
        };

        let mut parts = rest.split('/').filter(|p| !p.is_empty());
        let root = parts
            .next()
            .ok_or_else(|| IpfsError::InvalidPath(format!("missing root in {:?}", s)))?
            .to_string();
        let segments: Vec<String> = parts.map(str::to_string).collect();

        if namespace == Namespace::Ipfs && !HashUtils::is_address(&root) {
            return Err(IpfsError::InvalidPath(format!(
                "{} is not a content address",
                root
            )));
        }

        Ok(Self {
            namespace,
            root,
            segments,
        })
    }

    pub fn namespace(&self) -> Namespace {
        self.namespace
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn is_ipns(&self) -> bool {
        self.namespace == Namespace::Ipns
    }

    /// Appends the segments of `rest` after this path's own.
    pub fn join(&self, rest: &[String]) -> Self {
        let mut joined = self.clone();
        joined.segments.extend_from_slice(rest);
        joined
    }

    /// The path without the `/ipfs/` scheme, as handed back to facade callers.
    /// `/ipns/` paths keep their prefix so they are never mistaken for content.
    pub fn to_plain_string(&self) -> String {
        match self.namespace {
            Namespace::Ipfs => {
                let full = self.to_string();
                full[IPFS_PREFIX.len()..].to_string()
            }
            Namespace::Ipns => self.to_string(),
        }
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = match self.namespace {
            Namespace::Ipfs => IPFS_PREFIX,
            Namespace::Ipns => IPNS_PREFIX,
        };
        write!(f, "{}{}", prefix, self.root)?;
        for segment in &self.segments {
            write!(f, "/{}", segment)?;
        }
        Ok(())
    }
}

impl FromStr for Path {
    type Err = IpfsError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}
