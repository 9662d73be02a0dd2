//! # Hosting-Platform Collaborator
//!
//! Opening the pull request goes through the [`HostingPlatform`] trait so the
//! orchestrator can be exercised without a network. [`GitHub`] implements it
//! against the GitHub REST API with a blocking `reqwest` client; every request
//! is bounded by the client-level timeout.

use std::time::Duration;

use log::debug;
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::{ACCEPT, AUTHORIZATION};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::config::Token;
use crate::error::{Error, Result};

const API_VERSION_HEADER: &str = "X-GitHub-Api-Version";
const API_VERSION: &str = "2022-11-28";
const USER_AGENT: &str = concat!("manifest-sweep/", env!("CARGO_PKG_VERSION"));

/// Repository details the run needs before opening a pull request.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RepositoryMetadata {
    pub full_name: String,
    pub default_branch: String,
    #[serde(default)]
    pub archived: bool,
    pub html_url: String,
}

/// A pull request to open.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PullRequest {
    pub title: String,
    pub body: String,
    /// Branch with the change.
    pub head: String,
    /// Branch the change is merged into.
    pub base: String,
}

/// Operations against the platform hosting the repositories.
pub trait HostingPlatform {
    /// Verify the credential and return the account login.
    fn authenticate(&self) -> Result<String>;

    /// Fetch metadata for `owner/name`.
    fn repository(&self, full_name: &str) -> Result<RepositoryMetadata>;

    /// Open a pull request and return its web URL.
    fn create_pull_request(&self, full_name: &str, request: &PullRequest) -> Result<String>;
}

/// GitHub REST v3 client.
#[derive(Debug)]
pub struct GitHub {
    client: Client,
    api_url: String,
    token: Token,
}

#[derive(Deserialize)]
struct User {
    login: String,
}

#[derive(Deserialize)]
struct CreatedPullRequest {
    html_url: String,
}

#[derive(Deserialize, Default)]
struct ApiError {
    #[serde(default)]
    message: String,
    #[serde(default)]
    errors: Vec<ApiErrorDetail>,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    code: Option<String>,
}

impl GitHub {
    pub fn new(api_url: &str, token: Token, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self::with_client(client, api_url, token))
    }

    /// Use a preconfigured client (proxy or TLS settings).
    pub fn with_client(client: Client, api_url: &str, token: Token) -> Self {
        Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
            token,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.api_url, path.trim_start_matches('/'))
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header(AUTHORIZATION, format!("Bearer {}", self.token.expose()))
            .header(ACCEPT, "application/vnd.github+json")
            .header(API_VERSION_HEADER, API_VERSION)
    }

    fn send<T: DeserializeOwned>(&self, operation: &str, target: &str, request: RequestBuilder) -> Result<T> {
        let response = self
            .authorized(request)
            .send()
            .map_err(|e| Error::transport(operation, target, self.scrub(&e.to_string())))?;
        let status = response.status();
        debug!("{} {} -> {}", operation, target, status);

        if status.is_success() {
            return response
                .json::<T>()
                .map_err(|e| Error::transport(operation, target, format!("unexpected response: {}", e)));
        }
        let message = self.scrub(&error_message(status, response));
        if status == StatusCode::UNAUTHORIZED {
            return Err(Error::configuration(format!(
                "authentication with {} failed: {}",
                self.api_url, message
            )));
        }
        Err(Error::transport(operation, target, message))
    }

    fn scrub(&self, text: &str) -> String {
        crate::git::redact(text, Some(self.token.expose()))
    }
}

impl HostingPlatform for GitHub {
    fn authenticate(&self) -> Result<String> {
        let user: User = self.send("authenticate", &self.api_url, self.client.get(self.url("user")))?;
        Ok(user.login)
    }

    fn repository(&self, full_name: &str) -> Result<RepositoryMetadata> {
        let url = self.url(&format!("repos/{}", full_name));
        self.send("fetch repository", full_name, self.client.get(url))
    }

    fn create_pull_request(&self, full_name: &str, request: &PullRequest) -> Result<String> {
        let url = self.url(&format!("repos/{}/pulls", full_name));
        let created: CreatedPullRequest =
            self.send("open pull request", full_name, self.client.post(url).json(request))?;
        Ok(created.html_url)
    }
}

/// Human-readable message from a failed API response.
fn error_message(status: StatusCode, response: Response) -> String {
    let body = response.text().unwrap_or_default();
    let parsed: ApiError = serde_json::from_str(&body).unwrap_or_default();

    let mut message = format!("HTTP {}", status.as_u16());
    if !parsed.message.is_empty() {
        message.push_str(": ");
        message.push_str(&parsed.message);
    }
    let details: Vec<String> = parsed
        .errors
        .into_iter()
        .filter_map(|detail| detail.message.or(detail.code))
        .collect();
    if !details.is_empty() {
        message.push_str(" (");
        message.push_str(&details.join("; "));
        message.push(')');
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::{TcpListener, TcpStream};
    use std::thread::{self, JoinHandle};

    /// Serve a single canned response and hand back the raw request.
    fn serve_once(status: &str, body: &str) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let response = format!(
            "HTTP/1.1 {}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
            status,
            body.len(),
            body
        );
        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let request = read_request(&mut stream);
            stream.write_all(response.as_bytes()).unwrap();
            request
        });
        (url, handle)
    }

    fn read_request(stream: &mut TcpStream) -> String {
        let mut data = Vec::new();
        let mut buffer = [0u8; 4096];
        loop {
            let read = stream.read(&mut buffer).unwrap();
            if read == 0 {
                break;
            }
            data.extend_from_slice(&buffer[..read]);
            if let Some(end) = data.windows(4).position(|window| window == b"\r\n\r\n") {
                let head = String::from_utf8_lossy(&data[..end]).to_lowercase();
                let length = head
                    .lines()
                    .find_map(|line| line.strip_prefix("content-length:"))
                    .map(|value| value.trim().parse::<usize>().unwrap())
                    .unwrap_or(0);
                if data.len() >= end + 4 + length {
                    break;
                }
            }
        }
        String::from_utf8_lossy(&data).into_owned()
    }

    fn client(url: &str) -> GitHub {
        let client = Client::builder()
            .no_proxy()
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap();
        GitHub::with_client(client, url, Token::new("tok-123"))
    }

    #[test]
    fn test_authenticate_returns_login() {
        let (url, server) = serve_once("200 OK", r#"{"login":"sweep-bot","id":1}"#);
        let login = client(&url).authenticate().unwrap();
        assert_eq!(login, "sweep-bot");

        let request = server.join().unwrap();
        assert!(request.starts_with("GET /user "));
        assert!(request.to_lowercase().contains("authorization: bearer tok-123"));
        assert!(request.to_lowercase().contains("x-github-api-version: 2022-11-28"));
    }

    #[test]
    fn test_authenticate_failure_is_fatal() {
        let (url, server) = serve_once("401 Unauthorized", r#"{"message":"Bad credentials"}"#);
        let err = client(&url).authenticate().unwrap_err();
        server.join().unwrap();
        assert!(err.is_fatal());
        assert!(err.to_string().contains("Bad credentials"));
    }

    #[test]
    fn test_repository_metadata() {
        let body = r#"{"full_name":"acme/api","default_branch":"main","archived":false,"html_url":"https://github.com/acme/api","private":true}"#;
        let (url, server) = serve_once("200 OK", body);
        let metadata = client(&url).repository("acme/api").unwrap();
        assert_eq!(metadata.default_branch, "main");
        assert!(!metadata.archived);
        assert!(server.join().unwrap().starts_with("GET /repos/acme/api "));
    }

    #[test]
    fn test_create_pull_request() {
        let (url, server) = serve_once(
            "201 Created",
            r#"{"number":7,"html_url":"https://github.com/acme/api/pull/7"}"#,
        );
        let request = PullRequest {
            title: "Update applications.stack to cflinuxfs4".to_string(),
            body: "Setting `applications.stack: cflinuxfs4` via automation".to_string(),
            head: "update-manifest-20240101000000-abc123".to_string(),
            base: "main".to_string(),
        };
        let html_url = client(&url).create_pull_request("acme/api", &request).unwrap();
        assert_eq!(html_url, "https://github.com/acme/api/pull/7");

        let raw = server.join().unwrap();
        assert!(raw.starts_with("POST /repos/acme/api/pulls "));
        let body = &raw[raw.find("\r\n\r\n").unwrap() + 4..];
        let sent: serde_json::Value = serde_json::from_str(body).unwrap();
        assert_eq!(sent["head"], "update-manifest-20240101000000-abc123");
        assert_eq!(sent["base"], "main");
        assert_eq!(sent["title"], "Update applications.stack to cflinuxfs4");
    }

    #[test]
    fn test_validation_error_details() {
        let body = r#"{"message":"Validation Failed","errors":[{"resource":"PullRequest","code":"custom","message":"A pull request already exists for acme:branch."}]}"#;
        let (url, server) = serve_once("422 Unprocessable Entity", body);
        let request = PullRequest {
            title: "t".to_string(),
            body: "b".to_string(),
            head: "h".to_string(),
            base: "main".to_string(),
        };
        let err = client(&url).create_pull_request("acme/api", &request).unwrap_err();
        server.join().unwrap();
        assert!(!err.is_fatal());
        let message = err.to_string();
        assert!(message.contains("HTTP 422: Validation Failed"));
        assert!(message.contains("A pull request already exists"));
    }

    #[test]
    fn test_api_url_trailing_slash() {
        let github = GitHub::new(
            "https://ghe.example.com/api/v3/",
            Token::new("tok"),
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(github.url("user"), "https://ghe.example.com/api/v3/user");
    }
}
