//! Port-forward overview screen.

use std::sync::Arc;

use hosts::{ForwardKind, HostDirectory, PortForward};

use crate::console::{boxed, Console, CLEAR_SCREEN};
use crate::session::{Session, SessionRegistry};

fn describe(forward: &PortForward) -> String {
    let remote = forward.remote_address().unwrap_or_default();
    match forward.kind() {
        ForwardKind::Local => format!("Local:   {} → {}", forward.local_port(), remote),
        ForwardKind::Remote => format!("Remote:  {} → {}", forward.local_port(), remote),
        ForwardKind::Dynamic => format!("Dynamic: {} (SOCKS)", forward.local_port()),
    }
}

/// Renders configured forwards and the forwards carried by open sessions.
pub fn render_overview(directory: &HostDirectory, sessions: &[(usize, Arc<Session>)]) -> String {
    let mut screen = format!("{}{}\n\n", CLEAR_SCREEN, boxed(&["Port Forward Overview"]));

    screen.push_str("Configured Forwards:\n");
    let configured: Vec<_> = directory
        .hosts()
        .iter()
        .filter(|h| !h.forwards.is_empty())
        .collect();
    if configured.is_empty() {
        screen.push_str("  No port forwards configured\n");
    }
    for host in configured {
        screen.push_str(&format!("\n  {}:\n", host.alias));
        for forward in &host.forwards {
            screen.push_str(&format!("    {}\n", describe(forward)));
        }
    }

    screen.push_str("\n\nActive Session Forwards:\n");
    let forwarding: Vec<_> = sessions
        .iter()
        .filter(|(_, s)| !s.host().forwards.is_empty())
        .collect();
    if forwarding.is_empty() {
        screen.push_str("  No active forwards\n");
    }
    for (position, session) in forwarding {
        screen.push_str(&format!(
            "\n  Session [!{}] {} ({}):\n",
            position,
            session.alias(),
            session.status_label()
        ));
        for forward in &session.host().forwards {
            screen.push_str(&format!("    {}\n", forward));
        }
    }

    screen.push_str("\n\nPort forwards are configured in ~/.ssh/config:\n");
    screen.push_str("  LocalForward 8080 remote:80\n");
    screen.push_str("  RemoteForward 9090 localhost:80\n");
    screen.push_str("  DynamicForward 1080\n");
    screen.push_str("\nCommands:\n  q - Back to main menu\n\n> ");
    screen
}

/// Shows the overview until `q` or end of input.
pub async fn show_forwards(
    console: &Console,
    directory: &HostDirectory,
    registry: &SessionRegistry,
) {
    loop {
        let sessions = registry.list_ordered().await;
        console.print(&render_overview(directory, &sessions));
        match console.input.read_line().await {
            Some(input) if input.trim() == "q" => return,
            Some(_) => continue,
            None => return,
        }
    }
}
