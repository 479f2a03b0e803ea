//! Line-based operator interface.
//!
//! - [`menu`]: main screen and command loop
//! - [`select`]: host selection for multi-host commands
//! - [`forwards`]: port-forward overview
//! - [`pager`]: scrollback viewer with search

pub mod forwards;
pub mod menu;
pub mod pager;
pub mod select;

pub use menu::{Menu, MenuCommand};
pub use pager::{Pager, PagerCommand};
pub use select::{HostSelection, SelectCommand};
