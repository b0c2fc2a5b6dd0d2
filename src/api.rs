//! Authenticated calls against the admin API and response classification.

use crate::error::{ApiError, ApiResult};
use crate::models::{RemoteConfig, User};
use crate::session::{SessionController, Ticket};
use anyhow::{anyhow, Result};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Put,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Put => "PUT",
        }
    }
}

/// One request as handed to the transport. `path` is relative to the
/// admin API prefix.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub token: String,
    pub body: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: String,
}

/// HTTP boundary. Any status code is a response; `Err` means the request
/// never produced one (connection refused, DNS, timeout).
pub trait Transport: Send + Sync {
    fn send(&self, request: &ApiRequest) -> Result<ApiResponse>;
}

pub struct HttpTransport {
    base_url: String,
    token_header: String,
    timeout: Option<Duration>,
    agent: ureq::Agent,
}

impl HttpTransport {
    pub fn new(base_url: &str, api_prefix: &str, token_header: &str, timeout_ms: Option<u64>) -> Self {
        let prefix = api_prefix.trim_matches('/');
        let base_url = base_url.trim_end_matches('/');
        Self {
            base_url: if prefix.is_empty() {
                base_url.to_string()
            } else {
                format!("{}/{}", base_url, prefix)
            },
            token_header: token_header.to_string(),
            timeout: timeout_ms.map(Duration::from_millis),
            agent: ureq::Agent::new(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.base_url
    }
}

impl Transport for HttpTransport {
    fn send(&self, request: &ApiRequest) -> Result<ApiResponse> {
        let url = format!("{}{}", self.base_url, request.path);

        let mut req = self
            .agent
            .request(request.method.as_str(), &url)
            .set(&self.token_header, &request.token);
        if let Some(timeout) = self.timeout {
            req = req.timeout(timeout);
        }
        for (key, value) in &request.query {
            req = req.query(key, value);
        }

        let resp = match &request.body {
            Some(body) => req
                .set("Content-Type", "application/json")
                .send_json(body.clone()),
            None => req.call(),
        };

        match resp {
            Ok(r) => {
                let status = r.status();
                let body = r.into_string()?;
                Ok(ApiResponse { status, body })
            }
            Err(ureq::Error::Status(code, resp)) => {
                let body = resp.into_string().unwrap_or_default();
                Ok(ApiResponse { status: code, body })
            }
            Err(e) => Err(anyhow!("{} {} failed: {}", request.method.as_str(), url, e)),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ClientOptions {
    pub max_keyword_chars: usize,
    pub discard_stale: bool,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            max_keyword_chars: 64,
            discard_stale: true,
        }
    }
}

/// A successful search. `seq` orders searches by issue time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchResults {
    pub seq: u64,
    pub keyword: String,
    pub users: Vec<User>,
}

pub struct ResourceClient<T: Transport> {
    transport: T,
    session: Arc<SessionController>,
    options: ClientOptions,
    search_seq: AtomicU64,
}

impl<T: Transport> ResourceClient<T> {
    pub fn new(transport: T, session: Arc<SessionController>, options: ClientOptions) -> Self {
        Self {
            transport,
            session,
            options,
            search_seq: AtomicU64::new(0),
        }
    }

    pub fn session(&self) -> &SessionController {
        &self.session
    }

    #[cfg(test)]
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// `GET /users?q=<keyword>`
    pub fn search_users(&self, keyword: &str) -> ApiResult<SearchResults> {
        let keyword = keyword.trim();
        if keyword.is_empty() {
            return Err(ApiError::EmptyKeyword);
        }
        if keyword.chars().count() > self.options.max_keyword_chars {
            return Err(ApiError::KeywordTooLong {
                max: self.options.max_keyword_chars,
            });
        }
        let ticket = self.session.ticket().ok_or(ApiError::NoCredential)?;

        let seq = self.search_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let body = self.execute(
            &ticket,
            ApiRequest {
                method: Method::Get,
                path: "/users".to_string(),
                query: vec![("q".to_string(), keyword.to_string())],
                token: ticket.token.clone(),
                body: None,
            },
        )?;

        let users = match serde_json::from_str::<Value>(&body) {
            Ok(Value::Array(items)) => serde_json::from_value(Value::Array(items))
                .map_err(|e| ApiError::InvalidResponse(format!("user list: {}", e)))?,
            // a non-list body renders as "no matching users"
            Ok(_) | Err(_) => Vec::new(),
        };

        if self.is_current_search(seq) {
            self.session.record_query(keyword);
        }
        debug!(seq, count = users.len(), "search completed");

        Ok(SearchResults {
            seq,
            keyword: keyword.to_string(),
            users,
        })
    }

    /// False when a newer search was issued after `seq` and stale
    /// responses are being discarded.
    pub fn is_current_search(&self, seq: u64) -> bool {
        !self.options.discard_stale || seq >= self.search_seq.load(Ordering::SeqCst)
    }

    /// `PUT /users/{id}/admin?is_admin=<bool>`. Sets the flag to exactly
    /// `is_admin`; the backend expects the value as a query parameter.
    pub fn set_admin_flag(&self, user_id: i64, is_admin: bool) -> ApiResult<()> {
        let ticket = self.session.ticket().ok_or(ApiError::NoCredential)?;
        self.execute(
            &ticket,
            ApiRequest {
                method: Method::Put,
                path: format!("/users/{}/admin", user_id),
                query: vec![("is_admin".to_string(), is_admin.to_string())],
                token: ticket.token.clone(),
                body: None,
            },
        )?;
        debug!(user_id, is_admin, "admin flag updated");
        Ok(())
    }

    /// `GET /config`
    pub fn get_config(&self) -> ApiResult<RemoteConfig> {
        let ticket = self.session.ticket().ok_or(ApiError::NoCredential)?;
        let body = self.execute(
            &ticket,
            ApiRequest {
                method: Method::Get,
                path: "/config".to_string(),
                query: Vec::new(),
                token: ticket.token.clone(),
                body: None,
            },
        )?;
        decode_config(&body)
    }

    /// `PUT /config`. Returns the server's canonical config after the write.
    pub fn put_config(&self, config: &RemoteConfig) -> ApiResult<RemoteConfig> {
        let ticket = self.session.ticket().ok_or(ApiError::NoCredential)?;
        let payload = serde_json::to_value(config)
            .map_err(|e| ApiError::InvalidResponse(format!("encoding config: {}", e)))?;
        let body = self.execute(
            &ticket,
            ApiRequest {
                method: Method::Put,
                path: "/config".to_string(),
                query: Vec::new(),
                token: ticket.token.clone(),
                body: Some(payload),
            },
        )?;
        decode_config(&body)
    }

    /// Send and classify. 401 ends the session that issued the request.
    fn execute(&self, ticket: &Ticket, request: ApiRequest) -> ApiResult<String> {
        debug!(method = request.method.as_str(), path = %request.path, "request");

        let response = self.transport.send(&request).map_err(|e| {
            warn!(path = %request.path, error = %e, "transport failure");
            ApiError::Transport(e.to_string())
        })?;

        match response.status {
            200..=299 => Ok(response.body),
            401 => {
                let forced_logout = self.session.auth_failure(ticket);
                warn!(path = %request.path, forced_logout, "token rejected");
                Err(ApiError::Unauthorized { forced_logout })
            }
            status => {
                warn!(path = %request.path, status, "request failed");
                Err(ApiError::from_status(status, &response.body))
            }
        }
    }
}

fn decode_config(body: &str) -> ApiResult<RemoteConfig> {
    serde_json::from_str(body).map_err(|e| ApiError::InvalidResponse(format!("config: {}", e)))
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use crate::session::SessionState;
    use crate::token_store::TokenStore;

    fn client(transport: FakeTransport) -> ResourceClient<FakeTransport> {
        ResourceClient::new(transport, logged_in_session(), ClientOptions::default())
    }

    const USERS: &str = r#"[
        {"id": 1, "name": "Zhang San", "student_id": "2023001", "wechat_openid": "o1", "is_admin": false},
        {"id": 2, "name": "Zhang Si", "student_id": "2023002", "wechat_openid": null, "is_admin": true}
    ]"#;

    #[test]
    fn test_search_sends_keyword_and_token() {
        let c = client(FakeTransport::new().reply(200, USERS));
        let results = c.search_users("  zhang ").unwrap();

        assert_eq!(results.keyword, "zhang");
        assert_eq!(results.users.len(), 2);
        assert_eq!(results.users[1].id, 2);
        assert!(results.users[1].is_admin);

        let sent = c.transport().sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].method, Method::Get);
        assert_eq!(sent[0].path, "/users");
        assert_eq!(sent[0].query, vec![("q".to_string(), "zhang".to_string())]);
        assert_eq!(sent[0].token, "tok-123");
        assert!(sent[0].body.is_none());

        assert_eq!(c.session().last_query().as_deref(), Some("zhang"));
    }

    #[test]
    fn test_blank_keyword_never_hits_network() {
        let c = client(FakeTransport::always(200, "[]"));
        for kw in ["", "   ", "\t\n"] {
            assert_eq!(c.search_users(kw), Err(ApiError::EmptyKeyword));
        }
        assert_eq!(c.transport().sent_count(), 0);
    }

    #[test]
    fn test_keyword_too_long() {
        let c = client(FakeTransport::always(200, "[]"));
        let long = "字".repeat(65);
        assert_eq!(
            c.search_users(&long),
            Err(ApiError::KeywordTooLong { max: 64 })
        );
        assert!(c.search_users(&"字".repeat(64)).is_ok());
        assert_eq!(c.transport().sent_count(), 1);
    }

    #[test]
    fn test_no_credential_short_circuits() {
        let session = Arc::new(SessionController::new(TokenStore::default()));
        let c = ResourceClient::new(
            FakeTransport::always(200, "{}"),
            session,
            ClientOptions::default(),
        );

        assert_eq!(c.search_users("li"), Err(ApiError::NoCredential));
        assert_eq!(c.set_admin_flag(1, true), Err(ApiError::NoCredential));
        assert_eq!(c.get_config(), Err(ApiError::NoCredential));
        assert_eq!(
            c.put_config(&RemoteConfig::default()),
            Err(ApiError::NoCredential)
        );
        assert_eq!(c.transport().sent_count(), 0);
    }

    #[test]
    fn test_non_list_search_body_is_empty() {
        let c = client(
            FakeTransport::new()
                .reply(200, r#"{"items": []}"#)
                .reply(200, "null")
                .reply(200, "[]"),
        );
        assert!(c.search_users("a").unwrap().users.is_empty());
        assert!(c.search_users("b").unwrap().users.is_empty());
        assert!(c.search_users("c").unwrap().users.is_empty());
    }

    #[test]
    fn test_malformed_user_is_invalid_response() {
        let c = client(FakeTransport::new().reply(200, r#"[{"name": "no id"}]"#));
        assert!(matches!(
            c.search_users("x"),
            Err(ApiError::InvalidResponse(_))
        ));
        assert!(c.session().last_query().is_none());
    }

    #[test]
    fn test_unauthorized_on_every_endpoint_logs_out() {
        type Call = fn(&ResourceClient<FakeTransport>) -> ApiResult<()>;
        let calls: [Call; 4] = [
            |c| c.search_users("zhang").map(|_| ()),
            |c| c.set_admin_flag(3, true),
            |c| c.get_config().map(|_| ()),
            |c| c.put_config(&RemoteConfig::default()).map(|_| ()),
        ];

        for call in calls {
            let c = client(FakeTransport::always(401, r#"{"detail":"Invalid admin panel token"}"#));
            c.session().record_query("zhang");

            assert_eq!(call(&c), Err(ApiError::Unauthorized { forced_logout: true }));
            assert_eq!(c.session().state(), SessionState::LoggedOut);
            assert!(c.session().ticket().is_none());
            assert!(c.session().last_query().is_none());
        }
    }

    #[test]
    fn test_concurrent_unauthorized_single_logout() {
        let c = client(FakeTransport::always(401, ""));
        let shared = &c;
        let results: Vec<ApiResult<RemoteConfig>> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..4)
                .map(|_| s.spawn(move || shared.get_config()))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let forced = results
            .iter()
            .filter(|r| matches!(r, Err(ApiError::Unauthorized { forced_logout: true })))
            .count();
        let total_unauthorized = results
            .iter()
            .filter(|r| matches!(r, Err(e) if e.is_unauthorized()))
            .count();
        let no_credential = results
            .iter()
            .filter(|r| matches!(r, Err(ApiError::NoCredential)))
            .count();

        // threads that start after the logout never reach the network
        assert_eq!(forced, 1);
        assert_eq!(total_unauthorized + no_credential, 4);
        assert_eq!(c.session().state(), SessionState::LoggedOut);
    }

    #[test]
    fn test_request_failed_and_transport() {
        let c = client(
            FakeTransport::new()
                .reply(404, r#"{"detail":"user not found"}"#)
                .reply(500, "Internal Server Error")
                .fail("connection refused"),
        );

        assert_eq!(
            c.set_admin_flag(99, true),
            Err(ApiError::RequestFailed {
                status: 404,
                message: "user not found".to_string()
            })
        );
        assert_eq!(
            c.get_config(),
            Err(ApiError::RequestFailed {
                status: 500,
                message: "server error (500)".to_string()
            })
        );
        assert_eq!(
            c.search_users("x"),
            Err(ApiError::Transport("connection refused".to_string()))
        );
        // none of these touch the session
        assert!(c.session().is_logged_in());
    }

    #[test]
    fn test_set_admin_flag_wire_format() {
        let c = client(FakeTransport::always(200, r#"{"id": 5, "is_admin": true}"#));
        c.set_admin_flag(5, true).unwrap();
        c.set_admin_flag(5, false).unwrap();

        let sent = c.transport().sent();
        assert_eq!(sent[0].method, Method::Put);
        assert_eq!(sent[0].path, "/users/5/admin");
        assert_eq!(sent[0].query, vec![("is_admin".into(), "true".into())]);
        assert!(sent[0].body.is_none());
        assert_eq!(sent[1].query, vec![("is_admin".into(), "false".into())]);
    }

    #[test]
    fn test_get_config_preserves_nulls() {
        let c = client(FakeTransport::new().reply(
            200,
            r#"{"admin_openids": null, "rate_limit_max_requests": 100, "rate_limit_window_seconds": null}"#,
        ));
        let config = c.get_config().unwrap();
        assert_eq!(config.admin_openids, None);
        assert_eq!(config.rate_limit_max_requests, Some(100));
        assert_eq!(config.rate_limit_window_seconds, None);
    }

    #[test]
    fn test_put_config_returns_canonical() {
        let c = client(FakeTransport::new().reply(
            200,
            r#"{"admin_openids": ["a"], "rate_limit_max_requests": 10, "rate_limit_window_seconds": 60}"#,
        ));
        let sent_config = RemoteConfig {
            admin_openids: Some(vec!["a".into()]),
            rate_limit_max_requests: Some(10),
            rate_limit_window_seconds: None,
        };
        let canonical = c.put_config(&sent_config).unwrap();
        assert_eq!(canonical.rate_limit_window_seconds, Some(60));

        let sent = c.transport().sent();
        assert_eq!(sent[0].method, Method::Put);
        assert_eq!(sent[0].path, "/config");
        assert_eq!(
            sent[0].body,
            Some(serde_json::json!({
                "admin_openids": ["a"],
                "rate_limit_max_requests": 10,
                "rate_limit_window_seconds": null
            }))
        );
    }

    #[test]
    fn test_stale_search_not_recorded() {
        let c = client(FakeTransport::always(200, "[]"));
        let first = c.search_users("old").unwrap();
        let second = c.search_users("new").unwrap();
        assert!(!c.is_current_search(first.seq));
        assert!(c.is_current_search(second.seq));
        assert_eq!(c.session().last_query().as_deref(), Some("new"));
    }

    #[test]
    fn test_stale_guard_disabled() {
        let c = ResourceClient::new(
            FakeTransport::always(200, "[]"),
            logged_in_session(),
            ClientOptions {
                discard_stale: false,
                ..ClientOptions::default()
            },
        );
        let first = c.search_users("old").unwrap();
        c.search_users("new").unwrap();
        assert!(c.is_current_search(first.seq));
    }

    #[test]
    fn test_http_transport_url() {
        let t = HttpTransport::new("http://localhost:8000/", "/api/admin/", "X-Admin-Token", None);
        assert_eq!(t.endpoint(), "http://localhost:8000/api/admin");

        let t = HttpTransport::new("http://localhost:8000", "/", "X-Admin-Token", None);
        assert_eq!(t.endpoint(), "http://localhost:8000");
    }

    /// Answer one HTTP request with `status` and `body`; the join handle
    /// yields the request line and headers as received.
    fn serve_once(status: &str, body: &'static str) -> (String, std::thread::JoinHandle<String>) {
        use std::io::{BufRead, BufReader, Write};

        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let status = status.to_string();
        let handle = std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            let mut head = String::new();
            loop {
                let mut line = String::new();
                reader.read_line(&mut line).unwrap();
                if line.is_empty() || line == "\r\n" {
                    break;
                }
                head.push_str(&line);
            }
            write!(
                stream,
                "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            )
            .unwrap();
            head
        });
        (url, handle)
    }

    #[test]
    fn test_http_transport_keeps_error_responses() {
        let (url, server) = serve_once("401 Unauthorized", r#"{"detail":"Invalid admin panel token"}"#);
        let t = HttpTransport::new(&url, "/api/admin", "X-Admin-Token", Some(5000));

        let response = t
            .send(&ApiRequest {
                method: Method::Get,
                path: "/users".to_string(),
                query: vec![("q".to_string(), "a b&c".to_string())],
                token: "tok".to_string(),
                body: None,
            })
            .unwrap();
        assert_eq!(response.status, 401);
        assert_eq!(response.body, r#"{"detail":"Invalid admin panel token"}"#);

        let head = server.join().unwrap().to_ascii_lowercase();
        assert!(head.starts_with("get /api/admin/users?q=a+b%26c http/1.1\r\n"), "{}", head);
        assert!(head.contains("\r\nx-admin-token: tok\r\n"), "{}", head);
    }

    #[test]
    fn test_http_unauthorized_ends_session() {
        let (url, server) = serve_once("401 Unauthorized", "{}");
        let c = ResourceClient::new(
            HttpTransport::new(&url, "/api/admin", "X-Admin-Token", Some(5000)),
            logged_in_session(),
            ClientOptions::default(),
        );

        assert_eq!(
            c.get_config(),
            Err(ApiError::Unauthorized { forced_logout: true })
        );
        assert_eq!(c.session().state(), SessionState::LoggedOut);
        server.join().unwrap();
    }

    #[test]
    fn test_http_connection_refused_is_transport_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        drop(listener);

        let c = ResourceClient::new(
            HttpTransport::new(&url, "/api/admin", "X-Admin-Token", Some(2000)),
            logged_in_session(),
            ClientOptions::default(),
        );
        assert!(matches!(c.get_config(), Err(ApiError::Transport(_))));
        assert!(c.session().is_logged_in());
    }
}
