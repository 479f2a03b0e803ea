//! # sshtui Host Directory
//!
//! This crate provides the host inventory consumed by the sshtui session
//! manager: the ordered list of connectable hosts read from the OpenSSH
//! client configuration, together with their port-forward directives.
//!
//! ## Overview
//!
//! - **Host Descriptors**: alias, optional hostname/user/port and forwards
//! - **Config Parsing**: `~/.ssh/config` style `Host` blocks
//! - **Argument Construction**: the remote-shell client argument vector
//!   (`-L`/`-R`/`-D` flags, alias last, optional trailing command)
//!
//! The session core never mutates a descriptor; it only turns one into an
//! argument vector.
//!
//! ## Example Usage
//!
//! ```rust
//! use hosts::HostDirectory;
//!
//! let config = "
//! Host web
//!     HostName web.example.com
//!     LocalForward 8080 localhost:80
//! ";
//! let directory = HostDirectory::parse(config);
//! let web = directory.get("web").unwrap();
//! assert_eq!(web.ssh_args(), vec!["-L", "8080:localhost:80", "web"]);
//! ```
//!
//! ## Modules
//!
//! - [`directory`]: Config parsing and the ordered host list
//! - [`forward`]: Port-forward specifications
//! - [`error`]: Error types

pub mod directory;
pub mod error;
pub mod forward;

pub use directory::{default_ssh_config_path, HostDescriptor, HostDirectory};
pub use error::{HostsError, Result};
pub use forward::{ForwardKind, PortForward};
