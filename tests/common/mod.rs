//! Shared harness for router-level tests.

#![allow(dead_code)]

use std::{net::SocketAddr, path::Path, sync::Arc, time::Duration};

use async_trait::async_trait;
use axum::{
    Router,
    body::{Body, to_bytes},
    extract::ConnectInfo,
    http::{Request, Response, header},
};
use serde_json::{Value, json};
use tempfile::TempDir;
use tokio::sync::mpsc;

use gtfs_validator_api::{
    config::Config,
    error::AppError,
    routes,
    services::{
        api_key_service::ApiKeyHasher,
        notification_service::{MailError, Mailer, NotificationDispatcher, VerificationEmail},
        validation_service::{FeedValidator, ValidationOrchestrator},
    },
    state::AppState,
    store::InMemoryIdentityStore,
};

pub const BOUNDARY: &str = "gtfs-test-boundary";

/// Writes a fixed `report.json` and, optionally, `report.html`.
pub struct CannedValidator {
    pub write_html: bool,
}

#[async_trait]
impl FeedValidator for CannedValidator {
    async fn run(&self, input: &Path, output_dir: &Path) -> Result<(), AppError> {
        assert!(input.exists(), "feed must be on disk before validation");
        tokio::fs::write(output_dir.join("report.json"), sample_report().to_string()).await?;
        if self.write_html {
            tokio::fs::write(output_dir.join("report.html"), "<html>report</html>").await?;
        }
        Ok(())
    }
}

pub fn sample_report() -> Value {
    json!({
        "summary": { "validatorVersion": "test" },
        "notices": [
            { "code": "missing_required_file", "severity": "ERROR", "totalNotices": 1 },
            { "code": "unused_shape", "severity": "WARNING", "totalNotices": 3 }
        ]
    })
}

/// Forwards every email to the test.
pub struct RecordingMailer(pub mpsc::UnboundedSender<VerificationEmail>);

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, email: &VerificationEmail) -> Result<(), MailError> {
        let _ = self.0.send(email.clone());
        Ok(())
    }
}

/// Always refuses to deliver.
pub struct FailingMailer;

#[async_trait]
impl Mailer for FailingMailer {
    async fn send(&self, _email: &VerificationEmail) -> Result<(), MailError> {
        Err(MailError::Rejected {
            status: 503,
            body: "unavailable".into(),
        })
    }
}

pub struct TestApp {
    pub router: Router,
    pub store: Arc<InMemoryIdentityStore>,
    pub mail: mpsc::UnboundedReceiver<VerificationEmail>,
    pub workspace_root: TempDir,
}

pub fn test_config() -> Config {
    Config {
        base_url: "http://validator.test".to_string(),
        unauth_limit: "3/day".parse().unwrap(),
        auth_limit: "10/day".parse().unwrap(),
        ..Config::default()
    }
}

pub fn spawn_app(config: Config) -> TestApp {
    let (tx, rx) = mpsc::unbounded_channel();
    let mut app = spawn_app_with_mailer(config, Arc::new(RecordingMailer(tx)));
    app.mail = rx;
    app
}

pub fn spawn_app_with_mailer(config: Config, mailer: Arc<dyn Mailer>) -> TestApp {
    let store = Arc::new(InMemoryIdentityStore::new());
    let workspace_root = TempDir::new().unwrap();

    let validation = ValidationOrchestrator::new(
        Arc::new(CannedValidator { write_html: false }),
        config.max_feed_bytes,
        Duration::from_secs(config.download_timeout_secs),
    )
    .unwrap()
    .with_workspace_root(workspace_root.path());

    let hasher = ApiKeyHasher::new(argon2::Params::MIN_M_COST, 1).unwrap();
    let (notifications, _worker) =
        NotificationDispatcher::spawn(mailer, config.base_url.clone(), 16);

    let state = AppState::new(config, store.clone(), hasher, validation, notifications);

    let (_unused, mail) = mpsc::unbounded_channel();
    TestApp {
        router: routes::router(state),
        store,
        mail,
        workspace_root,
    }
}

impl TestApp {
    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        use tower::ServiceExt;
        self.router.clone().oneshot(request).await.unwrap()
    }

    /// Wait for the next queued verification email.
    pub async fn next_email(&mut self) -> VerificationEmail {
        tokio::time::timeout(Duration::from_secs(5), self.mail.recv())
            .await
            .expect("timed out waiting for email")
            .expect("mail channel closed")
    }

    /// Run the onboarding flow and return the plaintext API key.
    pub async fn onboard(&mut self, email: &str) -> String {
        let response = self.send(request_key_form(email)).await;
        assert_eq!(response.status(), 200);

        let token = token_from(&self.next_email().await);
        let response = self.send(verify_email(&token)).await;
        assert_eq!(response.status(), 200);

        json_body(response).await["api_key"].as_str().unwrap().to_string()
    }
}

pub fn token_from(email: &VerificationEmail) -> String {
    email
        .verify_url
        .split("token=")
        .nth(1)
        .expect("verification url carries a token")
        .to_string()
}

pub fn request_key_form(email: &str) -> Request<Body> {
    let body = format!("email={}", email.replace('@', "%40"));
    Request::post("/request-key")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(body))
        .unwrap()
}

pub fn request_key_json(email: &str) -> Request<Body> {
    Request::post("/request-key")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(json!({ "email": email }).to_string()))
        .unwrap()
}

pub fn verify_email(token: &str) -> Request<Body> {
    Request::get(format!("/verify-email?token={token}"))
        .body(Body::empty())
        .unwrap()
}

pub enum Part<'a> {
    File {
        file_name: &'a str,
        content_type: &'a str,
        bytes: &'a [u8],
    },
    Text {
        name: &'a str,
        value: &'a str,
    },
}

pub fn multipart_body(parts: &[Part<'_>]) -> Vec<u8> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        match part {
            Part::File {
                file_name,
                content_type,
                bytes,
            } => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\n\
                         Content-Type: {content_type}\r\n\r\n"
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(bytes);
            }
            Part::Text { name, value } => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}")
                        .as_bytes(),
                );
            }
        }
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

/// `POST /validate` from a fixed peer address.
pub fn validate_request(query: &str, parts: &[Part<'_>], peer: [u8; 4]) -> Request<Body> {
    let mut request = Request::post(format!("/validate{query}"))
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(multipart_body(parts)))
        .unwrap();
    request
        .extensions_mut()
        .insert(ConnectInfo(SocketAddr::from((peer, 40000))));
    request
}

pub fn zip_part() -> Part<'static> {
    Part::File {
        file_name: "feed.zip",
        content_type: "application/zip",
        bytes: b"PK\x03\x04 test feed",
    }
}

pub async fn json_body(response: Response<Body>) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

pub async fn text_body(response: Response<Body>) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}
