//! Operator actions: binds each command to the session, the resource client
//! and the presenter, and reports every outcome on its status line.

use crate::api::{ResourceClient, SearchResults, Transport};
use crate::codec::{self, ConfigForm};
use crate::error::{ApiError, ApiResult};
use crate::models::User;
use crate::session::SessionState;
use crate::transcript::Transcript;
use crate::view::{row_action, Channel, Focus, Presenter};
use tracing::{debug, warn};

/// Editable field of the config form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormField {
    AdminOpenids,
    MaxRequests,
    WindowSeconds,
}

/// What is currently on screen. Reset on login, logout and forced logout.
#[derive(Debug, Default)]
struct ViewState {
    search_input: String,
    rows: Vec<User>,
    form: ConfigForm,
}

pub struct Console<T: Transport, P: Presenter> {
    client: ResourceClient<T>,
    presenter: P,
    audit: Option<Transcript>,
    view: ViewState,
    error_reported: bool,
}

impl<T: Transport, P: Presenter> Console<T, P> {
    pub fn new(client: ResourceClient<T>, presenter: P) -> Self {
        Self {
            client,
            presenter,
            audit: None,
            view: ViewState::default(),
            error_reported: false,
        }
    }

    pub fn with_audit(mut self, transcript: Transcript) -> Self {
        self.audit = Some(transcript);
        self
    }

    pub fn presenter(&self) -> &P {
        &self.presenter
    }

    #[cfg(test)]
    pub fn client(&self) -> &ResourceClient<T> {
        &self.client
    }

    pub fn state(&self) -> SessionState {
        self.client.session().state()
    }

    #[cfg(test)]
    pub fn form(&self) -> &ConfigForm {
        &self.view.form
    }

    /// Initial event: resume a restored session or ask for a token.
    pub fn startup(&mut self) {
        if self.client.session().is_logged_in() {
            self.enter_session("resumed session");
        } else {
            self.set_status(Channel::Session, "enter the admin token to log in", false);
            self.presenter.focus(Focus::Credential);
        }
    }

    pub fn login(&mut self, credential: &str) {
        if let Err(e) = self.client.session().login(credential) {
            self.set_status(Channel::Session, &e.to_string(), true);
            self.presenter.focus(Focus::Credential);
            return;
        }
        self.audit(|t| t.login());
        self.enter_session("logged in");
    }

    pub fn logout(&mut self) {
        if !self.client.session().logout() {
            self.set_status(Channel::Session, "not logged in", false);
            return;
        }
        self.audit(|t| t.logout());
        self.reset_view();
        self.set_status(Channel::Session, "logged out", false);
        self.presenter.focus(Focus::Credential);
    }

    pub fn search(&mut self, keyword: &str) {
        self.view.search_input = keyword.to_string();
        let result = self.client.search_users(keyword);
        if let Err(ApiError::EmptyKeyword) = result {
            self.view.rows.clear();
            self.presenter.clear_users();
        }
        self.show_search(result);
    }

    /// Repeat the last successful search, or the search input if none yet.
    pub fn refresh(&mut self) {
        let keyword = self
            .client
            .session()
            .last_query()
            .unwrap_or_else(|| self.view.search_input.clone());
        self.search(&keyword);
    }

    /// Re-render the current rows without a round trip.
    pub fn show_users(&mut self) {
        let rows = self.view.rows.clone();
        self.presenter.render_users(&rows);
    }

    /// Flip the admin flag of a row currently on screen, then refresh.
    pub fn toggle_admin(&mut self, user_id: i64) {
        let Some(user) = self.view.rows.iter().find(|u| u.id == user_id).cloned() else {
            self.set_status(
                Channel::Search,
                &format!("user {} is not in the current results", user_id),
                true,
            );
            return;
        };
        let action = row_action(&user);
        let name = user.label().to_string();

        let result = self.client.set_admin_flag(user_id, action.target);
        let ok = result.is_ok();
        self.audit(|t| t.admin_flag(user_id, action.target, ok));
        if let Err(e) = result {
            self.report(Channel::Search, e);
            return;
        }

        let verb = if action.target { "granted to" } else { "revoked from" };
        self.set_status(
            Channel::Search,
            &format!("admin {} {} (id {})", verb, name, user_id),
            false,
        );
        // rows are never patched locally; the refresh shows what the server holds
        self.refresh();
    }

    pub fn load_config(&mut self) {
        match self.client.get_config() {
            Ok(config) => {
                self.audit(|t| t.config_load(true));
                self.view.form = ConfigForm::from_config(&config);
                self.presenter.render_config(&self.view.form);
                self.set_status(Channel::Config, "config loaded", false);
            }
            Err(e) => {
                if !e.is_unauthorized() {
                    self.audit(|t| t.config_load(false));
                }
                self.report(Channel::Config, e);
            }
        }
    }

    pub fn show_config(&mut self) {
        self.presenter.render_config(&self.view.form);
    }

    pub fn edit_form(&mut self, field: FormField, text: &str) {
        let slot = match field {
            FormField::AdminOpenids => &mut self.view.form.admin_openids,
            FormField::MaxRequests => &mut self.view.form.rate_limit_max_requests,
            FormField::WindowSeconds => &mut self.view.form.rate_limit_window_seconds,
        };
        *slot = text.to_string();
    }

    /// Validate locally, write, then repopulate the form from the server's
    /// canonical copy.
    pub fn save_config(&mut self) {
        let payload = match codec::build_payload(&self.view.form) {
            Ok(payload) => payload,
            Err(e) => {
                let message = e.to_string();
                self.audit(|t| t.config_save(false, Some(&message)));
                self.set_status(Channel::Config, &message, true);
                return;
            }
        };

        match self.client.put_config(&payload) {
            Ok(canonical) => {
                self.audit(|t| t.config_save(true, None));
                self.view.form = ConfigForm::from_config(&canonical);
                self.presenter.render_config(&self.view.form);
                self.set_status(Channel::Config, "config saved", false);
            }
            Err(e) => {
                if !e.is_unauthorized() {
                    let message = e.to_string();
                    self.audit(|t| t.config_save(false, Some(&message)));
                }
                self.report(Channel::Config, e);
            }
        }
    }

    /// Report a message that did not come from an action, such as a usage hint.
    pub fn notice(&mut self, channel: Channel, message: &str, is_error: bool) {
        self.set_status(channel, message, is_error);
    }

    /// True if an error status was shown since the last call.
    pub fn take_error(&mut self) -> bool {
        std::mem::take(&mut self.error_reported)
    }

    pub fn session_summary(&self) -> String {
        let session = self.client.session();
        match session.last_query() {
            Some(q) => format!("{} (last search: {})", session.state().as_str(), q),
            None => session.state().as_str().to_string(),
        }
    }

    fn enter_session(&mut self, message: &str) {
        self.reset_view();
        self.set_status(Channel::Session, message, false);
        self.load_config();
        if self.client.session().is_logged_in() {
            self.presenter.focus(Focus::Search);
        }
    }

    fn show_search(&mut self, result: ApiResult<SearchResults>) {
        match result {
            Ok(results) => {
                if !self.client.is_current_search(results.seq) {
                    debug!(seq = results.seq, "dropping stale search response");
                    return;
                }
                self.audit(|t| t.search(&results.keyword, results.users.len()));
                self.presenter.render_users(&results.users);
                let status = match results.users.len() {
                    0 => "no matching users".to_string(),
                    1 => "1 user found".to_string(),
                    n => format!("{} users found", n),
                };
                self.set_status(Channel::Search, &status, false);
                self.view.rows = results.users;
            }
            Err(e) => self.report(Channel::Search, e),
        }
    }

    fn report(&mut self, channel: Channel, error: ApiError) {
        match error {
            ApiError::Unauthorized { forced_logout: true } => self.forced_logout(),
            // another call already performed the logout and showed the notice
            ApiError::Unauthorized {
                forced_logout: false,
            } => {}
            e => {
                if e.is_local() {
                    debug!(channel = channel.as_str(), error = %e, "rejected before sending");
                }
                self.set_status(channel, &e.to_string(), true);
            }
        }
    }

    fn forced_logout(&mut self) {
        self.audit(|t| t.auth_failure());
        self.reset_view();
        self.set_status(
            Channel::Session,
            &ApiError::Unauthorized {
                forced_logout: true,
            }
            .to_string(),
            true,
        );
        self.presenter.focus(Focus::Credential);
    }

    fn set_status(&mut self, channel: Channel, message: &str, is_error: bool) {
        self.error_reported |= is_error;
        self.presenter.set_status(channel, message, is_error);
    }

    fn reset_view(&mut self) {
        self.view = ViewState::default();
        self.presenter.clear();
    }

    fn audit(&mut self, record: impl FnOnce(&mut Transcript) -> anyhow::Result<()>) {
        if let Some(transcript) = self.audit.as_mut() {
            if let Err(e) = record(&mut *transcript) {
                warn!(path = %transcript.path.display(), error = %e, "audit write failed");
            }
        }
    }
}
