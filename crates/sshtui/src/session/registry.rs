//! Session registry.
//!
//! Owns every live session, keyed by a monotonic ID and kept in insertion
//! order. All mutation goes through one reader/writer lock: listing and
//! lookup run concurrently with each other but never with create, exit
//! detection or removal.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use hosts::HostDescriptor;
use portable_pty::Child;
use tokio::sync::RwLock;

use super::pty::{
    pty_size, CommandSpec, NativePtySpawner, PtySpawner, Session, SessionError, SessionId,
};
use crate::config::{Config, DEFAULT_SCROLLBACK_LIMIT};

/// Settings applied to every session the registry creates.
#[derive(Debug, Clone)]
pub struct RegistrySettings {
    /// Remote-shell client program.
    pub program: String,
    /// Bounded wait for the pty to come up.
    pub connect_timeout: Duration,
    /// Scrollback ceiling per session.
    pub scrollback_limit: usize,
    /// How long a close waits for the process to exit.
    pub close_grace: Duration,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            program: "ssh".to_string(),
            connect_timeout: Duration::from_secs(10),
            scrollback_limit: DEFAULT_SCROLLBACK_LIMIT,
            close_grace: Duration::from_secs(5),
        }
    }
}

impl From<&Config> for RegistrySettings {
    fn from(config: &Config) -> Self {
        Self {
            program: config.ssh.program.clone(),
            connect_timeout: config.ssh.connect_timeout(),
            scrollback_limit: config.session.scrollback_limit,
            close_grace: config.session.close_grace(),
        }
    }
}

#[derive(Default)]
struct RegistryState {
    sessions: HashMap<SessionId, Arc<Session>>,
    order: Vec<SessionId>,
    next_id: SessionId,
}

impl RegistryState {
    fn ordered(&self) -> impl Iterator<Item = &Arc<Session>> {
        self.order.iter().filter_map(|id| self.sessions.get(id))
    }

    fn remove(&mut self, id: SessionId) -> Option<Arc<Session>> {
        self.order.retain(|&other| other != id);
        self.sessions.remove(&id)
    }
}

/// The set of sessions created during this process's lifetime.
pub struct SessionRegistry {
    state: Arc<RwLock<RegistryState>>,
    spawner: Arc<dyn PtySpawner>,
    settings: RegistrySettings,
}

impl SessionRegistry {
    pub fn new(spawner: Arc<dyn PtySpawner>, settings: RegistrySettings) -> Self {
        Self {
            state: Arc::new(RwLock::new(RegistryState {
                next_id: 1,
                ..Default::default()
            })),
            spawner,
            settings,
        }
    }

    /// Registry spawning real pseudo-terminals with settings from `config`.
    pub fn from_config(config: &Config) -> Self {
        Self::new(Arc::new(NativePtySpawner), RegistrySettings::from(config))
    }

    pub fn settings(&self) -> &RegistrySettings {
        &self.settings
    }

    /// Starts a remote-shell session to `host` with a `(rows, cols)` pty.
    ///
    /// On any failure, including the connect timeout, the registry is left
    /// unchanged and no process is left running.
    pub async fn create(
        &self,
        host: &HostDescriptor,
        size: (u16, u16),
    ) -> Result<Arc<Session>, SessionError> {
        let spec = CommandSpec::for_host(&self.settings.program, host);
        let spawner = Arc::clone(&self.spawner);
        let pty_size = pty_size(size.0, size.1);

        tracing::debug!(alias = %host.alias, args = ?spec.args, "Spawning remote shell");

        let mut handle = tokio::task::spawn_blocking(move || spawner.spawn(&spec, pty_size));

        let spawned = match tokio::time::timeout(self.settings.connect_timeout, &mut handle).await
        {
            Ok(Ok(result)) => result?,
            Ok(Err(join_error)) => {
                return Err(SessionError::ConnectionError {
                    alias: host.alias.clone(),
                    reason: join_error.to_string(),
                })
            }
            Err(_) => {
                // The spawn may still complete; make sure its child does not outlive us.
                let alias = host.alias.clone();
                tokio::spawn(async move {
                    if let Ok(Ok(mut late)) = handle.await {
                        tracing::warn!(
                            alias = %alias,
                            "Killing process that started after timeout"
                        );
                        let _ = late.child.kill();
                        let _ = late.child.wait();
                    }
                });
                tracing::warn!(
                    alias = %host.alias,
                    timeout_secs = self.settings.connect_timeout.as_secs(),
                    "Connection timed out"
                );
                return Err(SessionError::ConnectionTimeout {
                    alias: host.alias.clone(),
                    timeout: self.settings.connect_timeout,
                });
            }
        };

        let mut state = self.state.write().await;
        let id = state.next_id;

        let (session, child) =
            Session::start(id, host.clone(), spawned, self.settings.scrollback_limit)?;

        state.next_id += 1;
        state.sessions.insert(id, Arc::clone(&session));
        state.order.push(id);
        drop(state);

        self.monitor_exit(Arc::clone(&session), child);

        tracing::info!(session_id = id, alias = %host.alias, "Created new session");
        Ok(session)
    }

    /// Watches for process exit and flips the session to ended exactly once.
    fn monitor_exit(&self, session: Arc<Session>, mut child: Box<dyn Child + Send + Sync>) {
        let (tx, rx) = tokio::sync::oneshot::channel();
        let id = session.id();

        let spawned = std::thread::Builder::new()
            .name(format!("sshtui-wait-{}", id))
            .spawn(move || {
                let status = child.wait();
                let _ = tx.send(status);
            });

        if let Err(e) = spawned {
            tracing::error!(session_id = id, error = %e, "Failed to start exit monitor");
            return;
        }

        let state = Arc::clone(&self.state);
        tokio::spawn(async move {
            let status = rx.await;
            let _guard = state.write().await;
            if session.mark_ended() {
                match status {
                    Ok(Ok(status)) => tracing::info!(
                        session_id = id,
                        alias = %session.alias(),
                        exit_code = status.exit_code(),
                        "Session process exited"
                    ),
                    _ => tracing::info!(
                        session_id = id,
                        alias = %session.alias(),
                        "Session process exited"
                    ),
                }
            }
        });
    }

    /// Sessions paired with their 1-based position in insertion order.
    pub async fn list_ordered(&self) -> Vec<(usize, Arc<Session>)> {
        let state = self.state.read().await;
        state
            .ordered()
            .enumerate()
            .map(|(idx, session)| (idx + 1, Arc::clone(session)))
            .collect()
    }

    /// The session currently at 1-based `position`.
    pub async fn session_at(&self, position: usize) -> Result<Arc<Session>, SessionError> {
        let state = self.state.read().await;
        position
            .checked_sub(1)
            .and_then(|idx| state.order.get(idx))
            .and_then(|id| state.sessions.get(id))
            .cloned()
            .ok_or_else(|| {
                SessionError::InvalidAddressing(format!(
                    "Invalid session number: {} (have {})",
                    position,
                    state.order.len()
                ))
            })
    }

    /// Looks up a session by its stored ID.
    pub async fn get(&self, id: SessionId) -> Option<Arc<Session>> {
        self.state.read().await.sessions.get(&id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.order.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Closes the last session in insertion order that is still active.
    ///
    /// Returns the closed session, or `None` if no session is active.
    pub async fn close_active(&self) -> Option<Arc<Session>> {
        let session = {
            let mut state = self.state.write().await;
            let id = state
                .ordered()
                .filter(|s| s.is_active())
                .last()
                .map(|s| s.id())?;
            state.remove(id)?
        };

        // Terminate outside the lock: the exit monitor needs it.
        if let Err(e) = session.terminate(self.settings.close_grace).await {
            tracing::warn!(session_id = session.id(), error = %e, "Error closing session");
        }
        Some(session)
    }

    /// Terminates every session concurrently and empties the registry.
    ///
    /// Returns the number of sessions closed.
    pub async fn close_all(&self) -> usize {
        let sessions: Vec<Arc<Session>> = {
            let mut state = self.state.write().await;
            let sessions = state.ordered().cloned().collect();
            state.order.clear();
            state.sessions.clear();
            sessions
        };

        let count = sessions.len();
        let grace = self.settings.close_grace;
        let mut tasks = tokio::task::JoinSet::new();
        for session in sessions {
            tasks.spawn(async move {
                if let Err(e) = session.terminate(grace).await {
                    tracing::warn!(session_id = session.id(), error = %e, "Error closing session");
                }
            });
        }
        while tasks.join_next().await.is_some() {}

        if count > 0 {
            tracing::info!(count, "Closed all sessions");
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::pty::SpawnedPty;
    use portable_pty::PtySize;

    fn cat_registry() -> SessionRegistry {
        SessionRegistry::new(
            Arc::new(NativePtySpawner),
            RegistrySettings {
                program: "/bin/cat".to_string(),
                ..Default::default()
            },
        )
    }

    /// `/bin/cat -` reads stdin, so the alias doubles as its argument.
    fn cat_host() -> HostDescriptor {
        HostDescriptor::new("-")
    }

    struct FailingSpawner;

    impl PtySpawner for FailingSpawner {
        fn spawn(&self, spec: &CommandSpec, _size: PtySize) -> Result<SpawnedPty, SessionError> {
            Err(SessionError::ConnectionError {
                alias: spec.args.last().cloned().unwrap_or_default(),
                reason: "refused".to_string(),
            })
        }
    }

    #[tokio::test]
    async fn test_create_assigns_monotonic_ids() {
        let registry = cat_registry();
        let a = registry.create(&cat_host(), (24, 80)).await.unwrap();
        let b = registry.create(&cat_host(), (24, 80)).await.unwrap();
        assert_eq!(a.id(), 1);
        assert_eq!(b.id(), 2);
        assert_eq!(registry.len().await, 2);

        registry.close_all().await;
        let c = registry.create(&cat_host(), (24, 80)).await.unwrap();
        assert_eq!(c.id(), 3);
        registry.close_all().await;
    }

    #[tokio::test]
    async fn test_create_failure_leaves_registry_unchanged() {
        let registry = SessionRegistry::new(Arc::new(FailingSpawner), RegistrySettings::default());
        let result = registry.create(&HostDescriptor::new("web"), (24, 80)).await;
        assert!(matches!(result, Err(SessionError::ConnectionError { .. })));
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_session_at_out_of_range() {
        let registry = cat_registry();
        registry.create(&cat_host(), (24, 80)).await.unwrap();

        assert!(registry.session_at(1).await.is_ok());
        assert!(matches!(
            registry.session_at(0).await,
            Err(SessionError::InvalidAddressing(_))
        ));
        assert!(matches!(
            registry.session_at(2).await,
            Err(SessionError::InvalidAddressing(_))
        ));
        registry.close_all().await;
    }

    #[tokio::test]
    async fn test_close_active_on_empty_registry_is_noop() {
        let registry = cat_registry();
        assert!(registry.close_active().await.is_none());
    }

    #[tokio::test]
    async fn test_close_active_picks_last_active() {
        let registry = cat_registry();
        let first = registry.create(&cat_host(), (24, 80)).await.unwrap();
        let second = registry.create(&cat_host(), (24, 80)).await.unwrap();

        let closed = registry.close_active().await.unwrap();
        assert_eq!(closed.id(), second.id());
        assert!(!closed.is_active());

        let remaining = registry.list_ordered().await;
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].1.id(), first.id());
        registry.close_all().await;
    }

    #[tokio::test]
    async fn test_exit_monitor_marks_session_ended() {
        let registry = cat_registry();
        let session = registry.create(&cat_host(), (24, 80)).await.unwrap();

        // EOF on the pty's input ends cat.
        session.write_input(&[0x04]).unwrap();
        tokio::time::timeout(Duration::from_secs(5), session.wait_ended())
            .await
            .unwrap();

        assert!(!session.is_active());
        // Ended sessions stay listed until explicitly closed.
        assert_eq!(registry.len().await, 1);
        assert!(registry.close_active().await.is_none());
        assert_eq!(registry.close_all().await, 1);
        assert!(registry.is_empty().await);
    }
}
