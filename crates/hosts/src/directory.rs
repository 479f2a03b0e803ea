//! OpenSSH client configuration parsing.
//!
//! Produces the ordered, alias-unique list of hosts the session manager can
//! connect to. Only the handful of keywords the session manager needs are
//! interpreted; everything else is left to the remote-shell client, which
//! reads the same file when it is started with the alias.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::{HostsError, Result};
use crate::forward::{ForwardKind, PortForward};

/// A connectable host as described by one `Host` block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HostDescriptor {
    pub alias: String,
    pub hostname: Option<String>,
    pub user: Option<String>,
    pub port: Option<String>,
    pub forwards: Vec<PortForward>,
}

impl HostDescriptor {
    /// Creates a descriptor with only an alias.
    pub fn new(alias: impl Into<String>) -> Self {
        Self {
            alias: alias.into(),
            hostname: None,
            user: None,
            port: None,
            forwards: Vec::new(),
        }
    }

    /// Adds a forward, keeping list order.
    pub fn with_forward(mut self, forward: PortForward) -> Self {
        self.forwards.push(forward);
        self
    }

    /// Remote-shell client arguments for an interactive session.
    ///
    /// One flag pair per forward in list order, then the alias.
    pub fn ssh_args(&self) -> Vec<String> {
        let mut args: Vec<String> = self.forwards.iter().flat_map(|f| f.to_args()).collect();
        args.push(self.alias.clone());
        args
    }

    /// Remote-shell client arguments for a one-shot command.
    ///
    /// The command is passed as a single trailing positional argument.
    pub fn ssh_args_with_command(&self, command: &str) -> Vec<String> {
        let mut args = self.ssh_args();
        args.push(command.to_string());
        args
    }

    /// Compact forward listing such as ` [L:8080→web:80, D:1080]`.
    ///
    /// Empty when the host has no forwards.
    pub fn forward_summary(&self) -> String {
        if self.forwards.is_empty() {
            return String::new();
        }
        let parts: Vec<String> = self.forwards.iter().map(|f| f.to_string()).collect();
        format!(" [{}]", parts.join(", "))
    }
}

/// The ordered host list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostDirectory {
    hosts: Vec<HostDescriptor>,
}

/// Returns the default OpenSSH client config path (`~/.ssh/config`).
pub fn default_ssh_config_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".ssh")
        .join("config")
}

impl HostDirectory {
    /// Builds a directory from descriptors, dropping repeated aliases.
    pub fn from_hosts(hosts: Vec<HostDescriptor>) -> Self {
        let mut unique: Vec<HostDescriptor> = Vec::with_capacity(hosts.len());
        for host in hosts {
            if !unique.iter().any(|h| h.alias == host.alias) {
                unique.push(host);
            }
        }
        Self { hosts: unique }
    }

    /// Loads a config file.
    ///
    /// A missing file yields an empty directory.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(contents) => {
                let directory = Self::parse(&contents);
                tracing::debug!(
                    path = %path.display(),
                    hosts = directory.len(),
                    "Loaded ssh config"
                );
                Ok(directory)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "ssh config not found, no hosts");
                Ok(Self::default())
            }
            Err(source) => Err(HostsError::Read {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// Loads `~/.ssh/config`.
    pub fn load_default() -> Result<Self> {
        Self::load(default_ssh_config_path())
    }

    /// Parses config text.
    ///
    /// Each non-wildcard pattern of a `Host` line becomes its own host and
    /// receives the settings of the block. The first definition of an alias
    /// wins, as does the first value of a keyword.
    pub fn parse(text: &str) -> Self {
        let mut hosts: Vec<HostDescriptor> = Vec::new();
        // Indices into `hosts` that the current block's settings apply to.
        let mut block: Vec<usize> = Vec::new();

        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let Some((key, value)) = split_directive(line) else {
                continue;
            };

            if key == "host" {
                block.clear();
                for pattern in value.split_whitespace() {
                    if is_wildcard(pattern) || hosts.iter().any(|h| h.alias == pattern) {
                        continue;
                    }
                    hosts.push(HostDescriptor::new(pattern));
                    block.push(hosts.len() - 1);
                }
                continue;
            }

            if key == "match" {
                block.clear();
                continue;
            }

            for &idx in &block {
                apply_directive(&mut hosts[idx], &key, value);
            }
        }

        Self { hosts }
    }

    pub fn hosts(&self) -> &[HostDescriptor] {
        &self.hosts
    }

    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }

    /// Looks up a host by alias.
    pub fn get(&self, alias: &str) -> Option<&HostDescriptor> {
        self.hosts.iter().find(|h| h.alias == alias)
    }

    /// Looks up a host by its 1-based menu number.
    pub fn at(&self, number: usize) -> Option<&HostDescriptor> {
        number.checked_sub(1).and_then(|idx| self.hosts.get(idx))
    }

    /// Resolves aliases to descriptors, preserving the requested order.
    pub fn select(&self, aliases: &[String]) -> Result<Vec<HostDescriptor>> {
        aliases
            .iter()
            .map(|alias| {
                self.get(alias)
                    .cloned()
                    .ok_or_else(|| HostsError::UnknownHost(alias.clone()))
            })
            .collect()
    }
}

/// Splits `Key value` / `Key=value` into a lowercase key and its value.
fn split_directive(line: &str) -> Option<(String, &str)> {
    let idx = line.find(|c: char| c.is_whitespace() || c == '=')?;
    let (key, rest) = line.split_at(idx);
    let rest = rest.trim_start();
    let value = rest.strip_prefix('=').unwrap_or(rest).trim();
    if key.is_empty() || value.is_empty() {
        return None;
    }
    Some((key.to_ascii_lowercase(), value))
}

fn is_wildcard(pattern: &str) -> bool {
    pattern.contains('*') || pattern.contains('?') || pattern.starts_with('!')
}

fn apply_directive(host: &mut HostDescriptor, key: &str, value: &str) {
    let kind = match key {
        "hostname" => {
            host.hostname.get_or_insert_with(|| value.to_string());
            return;
        }
        "user" => {
            host.user.get_or_insert_with(|| value.to_string());
            return;
        }
        "port" => {
            host.port.get_or_insert_with(|| value.to_string());
            return;
        }
        "localforward" => ForwardKind::Local,
        "remoteforward" => ForwardKind::Remote,
        "dynamicforward" => ForwardKind::Dynamic,
        _ => return,
    };

    match PortForward::parse(kind, value) {
        Ok(forward) => host.forwards.push(forward),
        Err(e) => tracing::warn!(alias = %host.alias, error = %e, "Ignoring forward"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SAMPLE: &str = r#"
# global defaults
Host *
    ServerAliveInterval 30

Host web
    HostName web.example.com
    User deploy
    Port 2222
    LocalForward 8080 localhost:80
    DynamicForward 1080

Host db replica
    HostName=db.internal
    RemoteForward 9090 localhost:9000

Host *.corp
    User corp
"#;

    #[test]
    fn test_parse_sample() {
        let dir = HostDirectory::parse(SAMPLE);
        let aliases: Vec<_> = dir.hosts().iter().map(|h| h.alias.as_str()).collect();
        assert_eq!(aliases, vec!["web", "db", "replica"]);

        let web = dir.get("web").unwrap();
        assert_eq!(web.hostname.as_deref(), Some("web.example.com"));
        assert_eq!(web.user.as_deref(), Some("deploy"));
        assert_eq!(web.port.as_deref(), Some("2222"));
        assert_eq!(web.forwards.len(), 2);
        assert_eq!(web.forwards[0].kind(), ForwardKind::Local);
        assert_eq!(web.forwards[1].kind(), ForwardKind::Dynamic);
    }

    #[test]
    fn test_multi_pattern_block_shares_settings() {
        let dir = HostDirectory::parse(SAMPLE);
        let db = dir.get("db").unwrap();
        let replica = dir.get("replica").unwrap();
        assert_eq!(db.hostname.as_deref(), Some("db.internal"));
        assert_eq!(replica.hostname.as_deref(), Some("db.internal"));
        assert_eq!(db.forwards, replica.forwards);
    }

    #[test]
    fn test_settings_before_any_host_ignored() {
        let dir = HostDirectory::parse("User root\nHost a\n  Port 22\n");
        assert_eq!(dir.len(), 1);
        assert!(dir.get("a").unwrap().user.is_none());
    }

    #[test]
    fn test_duplicate_alias_first_wins() {
        let dir = HostDirectory::parse("Host a\n  HostName one\nHost a\n  HostName two\n");
        assert_eq!(dir.len(), 1);
        assert_eq!(dir.get("a").unwrap().hostname.as_deref(), Some("one"));
    }

    #[test]
    fn test_wildcard_block_does_not_leak_into_previous_host() {
        let dir = HostDirectory::parse("Host a\nHost *\n  User everyone\n");
        assert!(dir.get("a").unwrap().user.is_none());
    }

    #[test]
    fn test_keywords_case_insensitive() {
        let dir = HostDirectory::parse("HOST a\n  hostname example.org\n  LOCALFORWARD 1 b:2\n");
        let a = dir.get("a").unwrap();
        assert_eq!(a.hostname.as_deref(), Some("example.org"));
        assert_eq!(a.forwards.len(), 1);
    }

    #[test]
    fn test_malformed_forward_skipped() {
        let dir = HostDirectory::parse("Host a\n  LocalForward 8080\n  DynamicForward 1080\n");
        let a = dir.get("a").unwrap();
        assert_eq!(a.forwards, vec![PortForward::dynamic("1080")]);
    }

    #[test]
    fn test_ssh_args_order() {
        let host = HostDescriptor::new("web")
            .with_forward(PortForward::local("8080", "localhost:80"))
            .with_forward(PortForward::remote("9090", "localhost:9000"))
            .with_forward(PortForward::dynamic("1080"));
        assert_eq!(
            host.ssh_args(),
            vec!["-L", "8080:localhost:80", "-R", "9090:localhost:9000", "-D", "1080", "web"]
        );
    }

    #[test]
    fn test_ssh_args_with_command() {
        let host = HostDescriptor::new("web").with_forward(PortForward::dynamic("1080"));
        assert_eq!(
            host.ssh_args_with_command("uptime -p"),
            vec!["-D", "1080", "web", "uptime -p"]
        );
    }

    #[test]
    fn test_forward_summary() {
        assert_eq!(HostDescriptor::new("a").forward_summary(), "");
        let host = HostDescriptor::new("a")
            .with_forward(PortForward::local("8080", "web:80"))
            .with_forward(PortForward::dynamic("1080"));
        assert_eq!(host.forward_summary(), " [L:8080→web:80, D:1080]");
    }

    #[test]
    fn test_at_is_one_based() {
        let dir = HostDirectory::parse(SAMPLE);
        assert_eq!(dir.at(1).unwrap().alias, "web");
        assert_eq!(dir.at(3).unwrap().alias, "replica");
        assert!(dir.at(0).is_none());
        assert!(dir.at(4).is_none());
    }

    #[test]
    fn test_select_preserves_requested_order() {
        let dir = HostDirectory::parse(SAMPLE);
        let picked = dir
            .select(&["replica".to_string(), "web".to_string()])
            .unwrap();
        assert_eq!(picked[0].alias, "replica");
        assert_eq!(picked[1].alias, "web");
    }

    #[test]
    fn test_select_unknown_alias() {
        let dir = HostDirectory::parse(SAMPLE);
        let result = dir.select(&["nope".to_string()]);
        assert!(matches!(result, Err(HostsError::UnknownHost(a)) if a == "nope"));
    }

    #[test]
    fn test_from_hosts_dedupes() {
        let dir = HostDirectory::from_hosts(vec![
            HostDescriptor::new("a"),
            HostDescriptor::new("b"),
            HostDescriptor::new("a"),
        ]);
        assert_eq!(dir.len(), 2);
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let dir = HostDirectory::load(temp_dir.path().join("missing")).unwrap();
        assert!(dir.is_empty());
    }

    #[test]
    fn test_load_from_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config");
        fs::write(&path, SAMPLE).unwrap();

        let dir = HostDirectory::load(&path).unwrap();
        assert_eq!(dir.len(), 3);
    }

    #[test]
    fn test_load_directory_is_read_error() {
        let temp_dir = TempDir::new().unwrap();
        let result = HostDirectory::load(temp_dir.path());
        assert!(matches!(result, Err(HostsError::Read { .. })));
    }

    #[test]
    fn test_descriptor_serializes() {
        let host = HostDescriptor::new("a").with_forward(PortForward::dynamic("1080"));
        let json = serde_json::to_value(&host).unwrap();
        assert_eq!(json["alias"], "a");
        assert_eq!(json["forwards"][0]["kind"], "Dynamic");
    }
}
