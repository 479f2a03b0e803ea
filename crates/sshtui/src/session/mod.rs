//! Session management module.
//!
//! This module provides PTY-backed remote-shell sessions, the registry that
//! owns them, their bounded scrollback, and the attach/detach engine.

pub mod attach;
pub mod pty;
pub mod registry;
pub mod scrollback;

pub use attach::{attach, split_at_sentinel, AttachOptions, DetachReason, DETACH_SENTINEL};
pub use pty::{
    pty_size, CommandSpec, NativePtySpawner, OutputStream, PtySpawner, Session, SessionError,
    SessionId, SpawnedPty, PTY_READ_BUFFER_SIZE,
};
pub use registry::{RegistrySettings, SessionRegistry};
pub use scrollback::ScrollbackBuffer;
