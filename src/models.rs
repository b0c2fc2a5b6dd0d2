use serde::{Deserialize, Serialize};

/// A user row as returned by `GET /users`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub student_id: Option<String>,
    #[serde(default)]
    pub wechat_openid: Option<String>,
    #[serde(default)]
    pub nickname: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub is_admin: bool,
}

impl User {
    /// Best human-readable label: display name, then real name, then nickname
    pub fn label(&self) -> &str {
        [&self.display_name, &self.name, &self.nickname]
            .into_iter()
            .flatten()
            .map(|s| s.as_str())
            .find(|s| !s.trim().is_empty())
            .unwrap_or("-")
    }
}

/// Runtime configuration resource (`GET/PUT /config`).
///
/// `None` means unset: the backend falls back to its built-in default.
/// Every field is always serialized, so an unset field is sent as `null`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct RemoteConfig {
    #[serde(default)]
    pub admin_openids: Option<Vec<String>>,
    #[serde(default)]
    pub rate_limit_max_requests: Option<i64>,
    #[serde(default)]
    pub rate_limit_window_seconds: Option<i64>,
}
