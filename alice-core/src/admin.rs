//! Component G: Interrupt/Admin Handler.
//!
//! The operator-facing actions are decided here; the OS-signal plumbing that
//! *triggers* the menu (an async signal suspending the receive loop) lives in
//! the CLI front-end, which owns the terminal. This module only defines the
//! action set and the channel contract spec §9 calls "the portable
//! strategy": a message-passing channel from the signal handler into the
//! main loop, polled between frames (spec §4.G, §5).

use crossbeam::channel::{Receiver, Sender};

/// The five actions the operator menu presents (spec §4.G). Blank input maps
/// to `Cancel` by the CLI's menu-reading code, not here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminAction {
    PrintConfig,
    ReloadConfig,
    Reset,
    GracefulStop,
    Cancel,
}

impl AdminAction {
    /// Parses one line of operator input. Anything unrecognised is treated
    /// the same as blank input: cancel, not an error (spec §4.G).
    pub fn parse(line: &str) -> Self {
        match line.trim() {
            "p" | "print" => AdminAction::PrintConfig,
            "r" | "reload" => AdminAction::ReloadConfig,
            "x" | "reset" => AdminAction::Reset,
            "q" | "stop" | "quit" => AdminAction::GracefulStop,
            _ => AdminAction::Cancel,
        }
    }
}

/// Sending half the signal handler uses to hand an action to the main loop.
pub type AdminSender = Sender<AdminAction>;
/// Receiving half the main loop polls between frame reads (spec §5
/// "suspension points"). Never polled mid-handler.
pub type AdminReceiver = Receiver<AdminAction>;

/// Creates the channel pair described in spec §9's design note.
pub fn channel() -> (AdminSender, AdminReceiver) {
    crossbeam::channel::unbounded()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_line_is_cancel() {
        assert_eq!(AdminAction::parse(""), AdminAction::Cancel);
        assert_eq!(AdminAction::parse("   "), AdminAction::Cancel);
    }

    #[test]
    fn recognised_shortcuts_map_correctly() {
        assert_eq!(AdminAction::parse("p"), AdminAction::PrintConfig);
        assert_eq!(AdminAction::parse("reload"), AdminAction::ReloadConfig);
        assert_eq!(AdminAction::parse("x"), AdminAction::Reset);
        assert_eq!(AdminAction::parse("quit"), AdminAction::GracefulStop);
    }

    #[test]
    fn action_can_cross_a_channel() {
        let (tx, rx) = channel();
        tx.send(AdminAction::Reset).unwrap();
        assert_eq!(rx.recv().unwrap(), AdminAction::Reset);
    }
}
