//! Presentation seam between the console and the terminal.

use crate::codec::{self, ConfigForm};
use crate::models::User;
use std::io::Write;

/// Independent status lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Session,
    Search,
    Config,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Session => "session",
            Self::Search => "search",
            Self::Config => "config",
        }
    }
}

/// Input that should receive the operator's next line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Focus {
    Credential,
    Search,
}

/// The single per-row action: flip the admin flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowAction {
    pub label: &'static str,
    pub target: bool,
}

pub fn row_action(user: &User) -> RowAction {
    if user.is_admin {
        RowAction {
            label: "revoke admin",
            target: false,
        }
    } else {
        RowAction {
            label: "grant admin",
            target: true,
        }
    }
}

pub trait Presenter {
    /// Render the result table; an empty list shows the no-results placeholder.
    fn render_users(&mut self, users: &[User]);
    /// Drop the result table without showing the placeholder.
    fn clear_users(&mut self);
    fn render_config(&mut self, form: &ConfigForm);
    fn set_status(&mut self, channel: Channel, message: &str, is_error: bool);
    /// Wipe every transient view: rows, config form, status lines.
    fn clear(&mut self);
    fn focus(&mut self, field: Focus);
}

pub const NO_USERS_PLACEHOLDER: &str = "(no matching users)";

/// Plain-text presenter writing to any `Write` sink.
pub struct TerminalPresenter<W: Write> {
    out: W,
    focus: Focus,
}

impl<W: Write> TerminalPresenter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            focus: Focus::Credential,
        }
    }

    /// REPL prompt for the focused field.
    pub fn prompt(&self) -> &'static str {
        match self.focus {
            Focus::Credential => "token> ",
            Focus::Search => "admin> ",
        }
    }

    #[cfg(test)]
    pub fn into_inner(self) -> W {
        self.out
    }

    // write errors on the terminal are ignored
    fn line(&mut self, text: &str) {
        let _ = writeln!(self.out, "{}", text);
    }
}

impl<W: Write> Presenter for TerminalPresenter<W> {
    fn render_users(&mut self, users: &[User]) {
        if users.is_empty() {
            self.line(NO_USERS_PLACEHOLDER);
            return;
        }

        self.line(&format!(
            "{:>6}  {:<16} {:<12} {:<30} {:<5}  {}",
            "ID", "NAME", "STUDENT ID", "OPENID", "ADMIN", "ACTION"
        ));
        for user in users {
            let action = row_action(user);
            let row = format!(
                "{:>6}  {:<16} {:<12} {:<30} {:<5}  /toggle {} ({})",
                user.id,
                user.label(),
                user.student_id.as_deref().unwrap_or("-"),
                user.wechat_openid.as_deref().unwrap_or("-"),
                if user.is_admin { "yes" } else { "no" },
                user.id,
                action.label,
            );
            self.line(&row);
        }
    }

    fn clear_users(&mut self) {}

    fn render_config(&mut self, form: &ConfigForm) {
        self.line("Admin openids:");
        match codec::decode_openids(&form.admin_openids) {
            Some(ids) => {
                for id in ids {
                    self.line(&format!("  {}", id));
                }
            }
            None => self.line("  (none)"),
        }
        for (label, value) in [
            ("Rate limit max requests", &form.rate_limit_max_requests),
            ("Rate limit window seconds", &form.rate_limit_window_seconds),
        ] {
            let shown = if value.trim().is_empty() {
                "(unset: backend default)".to_string()
            } else {
                value.trim().to_string()
            };
            self.line(&format!("{}: {}", label, shown));
        }
    }

    fn set_status(&mut self, channel: Channel, message: &str, is_error: bool) {
        let text = if is_error {
            format!("[{}] Error: {}", channel.as_str(), message)
        } else {
            format!("[{}] {}", channel.as_str(), message)
        };
        self.line(&text);
    }

    fn clear(&mut self) {}

    fn focus(&mut self, field: Focus) {
        self.focus = field;
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// Keeps the latest state of every view element, like a DOM would.
    #[derive(Debug, Default)]
    pub struct RecordingPresenter {
        pub rows: Option<Vec<User>>,
        pub form: Option<ConfigForm>,
        pub statuses: Vec<(Channel, String, bool)>,
        pub focus: Option<Focus>,
        pub clears: usize,
    }

    impl RecordingPresenter {
        pub fn last_status(&self, channel: Channel) -> Option<(&str, bool)> {
            self.statuses
                .iter()
                .rev()
                .find(|(c, _, _)| *c == channel)
                .map(|(_, m, e)| (m.as_str(), *e))
        }

        pub fn count_status(&self, channel: Channel) -> usize {
            self.statuses.iter().filter(|(c, _, _)| *c == channel).count()
        }
    }

    impl Presenter for RecordingPresenter {
        fn render_users(&mut self, users: &[User]) {
            self.rows = Some(users.to_vec());
        }

        fn clear_users(&mut self) {
            self.rows = None;
        }

        fn render_config(&mut self, form: &ConfigForm) {
            self.form = Some(form.clone());
        }

        fn set_status(&mut self, channel: Channel, message: &str, is_error: bool) {
            self.statuses.push((channel, message.to_string(), is_error));
        }

        fn clear(&mut self) {
            self.rows = None;
            self.form = None;
            self.statuses.clear();
            self.clears += 1;
        }

        fn focus(&mut self, field: Focus) {
            self.focus = Some(field);
        }
    }
}
