//! Port-forward specifications.
//!
//! A forward is carried by a host descriptor and turned into one remote-shell
//! flag pair when a session or a multi-host command is started.

use std::fmt;

use serde::Serialize;

use crate::error::{HostsError, Result};

/// Direction of a port forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ForwardKind {
    /// `-L local:remote`
    Local,
    /// `-R local:remote`
    Remote,
    /// `-D local` (SOCKS)
    Dynamic,
}

impl ForwardKind {
    /// Remote-shell client flag for this kind.
    pub fn flag(self) -> &'static str {
        match self {
            ForwardKind::Local => "-L",
            ForwardKind::Remote => "-R",
            ForwardKind::Dynamic => "-D",
        }
    }

    /// Single-letter tag used in compact listings.
    pub fn tag(self) -> &'static str {
        match self {
            ForwardKind::Local => "L",
            ForwardKind::Remote => "R",
            ForwardKind::Dynamic => "D",
        }
    }
}

/// A single port-forward directive.
///
/// `remote_address` is `None` exactly when `kind` is [`ForwardKind::Dynamic`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PortForward {
    kind: ForwardKind,
    local_port: String,
    remote_address: Option<String>,
}

impl PortForward {
    /// A `LocalForward` to `remote`.
    pub fn local(local_port: impl Into<String>, remote: impl Into<String>) -> Self {
        Self {
            kind: ForwardKind::Local,
            local_port: local_port.into(),
            remote_address: Some(remote.into()),
        }
    }

    /// A `RemoteForward` to `remote`.
    pub fn remote(local_port: impl Into<String>, remote: impl Into<String>) -> Self {
        Self {
            kind: ForwardKind::Remote,
            local_port: local_port.into(),
            remote_address: Some(remote.into()),
        }
    }

    /// A `DynamicForward` (SOCKS proxy).
    pub fn dynamic(local_port: impl Into<String>) -> Self {
        Self {
            kind: ForwardKind::Dynamic,
            local_port: local_port.into(),
            remote_address: None,
        }
    }

    /// Parses the value of a `LocalForward`/`RemoteForward`/`DynamicForward`
    /// directive.
    pub fn parse(kind: ForwardKind, value: &str) -> Result<Self> {
        let mut parts = value.split_whitespace();
        let invalid = || HostsError::InvalidForward {
            directive: format!("{:?}Forward", kind),
            value: value.to_string(),
        };

        let local = parts.next().ok_or_else(invalid)?;
        match kind {
            ForwardKind::Dynamic => Ok(Self::dynamic(local)),
            ForwardKind::Local | ForwardKind::Remote => {
                let remote = parts.next().ok_or_else(invalid)?;
                Ok(Self {
                    kind,
                    local_port: local.to_string(),
                    remote_address: Some(remote.to_string()),
                })
            }
        }
    }

    pub fn kind(&self) -> ForwardKind {
        self.kind
    }

    pub fn local_port(&self) -> &str {
        &self.local_port
    }

    pub fn remote_address(&self) -> Option<&str> {
        self.remote_address.as_deref()
    }

    /// The flag pair this forward contributes to the argument vector.
    pub fn to_args(&self) -> [String; 2] {
        let value = match &self.remote_address {
            Some(remote) => format!("{}:{}", self.local_port, remote),
            None => self.local_port.clone(),
        };
        [self.kind.flag().to_string(), value]
    }
}

impl fmt::Display for PortForward {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.remote_address {
            Some(remote) => write!(f, "{}:{}→{}", self.kind.tag(), self.local_port, remote),
            None => write!(f, "{}:{}", self.kind.tag(), self.local_port),
        }
    }
}
