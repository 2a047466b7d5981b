//! Best-effort delivery of verification emails.
//!
//! # Process
//!
//! 1. The request handler calls [`NotificationDispatcher::schedule`]
//! 2. The message is pushed onto a bounded queue (never awaited)
//! 3. A background worker drains the queue through a [`Mailer`]
//!
//! # Error Handling
//!
//! A full queue or a failed delivery is logged and dropped. Nothing here can
//! fail the request that triggered the email.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::{config::MailCredentials, models::verification_token::VerificationToken};

pub const VERIFICATION_SUBJECT: &str = "Verify your email for GTFS Validator API";

/// A rendered verification email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationEmail {
    pub recipient: String,
    pub subject: String,
    pub verify_url: String,
    pub html_body: String,
}

impl VerificationEmail {
    /// `valid_hours` is the token lifetime quoted in the body.
    pub fn new(recipient: &str, base_url: &str, token: &str, valid_hours: i64) -> Self {
        let verify_url = verification_url(base_url, token);
        let lifetime = match valid_hours {
            1 => "1 hour".to_string(),
            hours => format!("{hours} hours"),
        };
        let html_body = format!(
            "<h2>Verify your email</h2>\n\
             <p>Click the link below to verify your email and receive your API key:</p>\n\
             <a href='{verify_url}'>{verify_url}</a>\n\
             <p>This link will expire in {lifetime}.</p>\n"
        );

        Self {
            recipient: recipient.to_string(),
            subject: VERIFICATION_SUBJECT.to_string(),
            verify_url,
            html_body,
        }
    }
}

/// Deterministic verification link. Tokens are URL-safe and need no escaping.
pub fn verification_url(base_url: &str, token: &str) -> String {
    format!("{}/verify-email?token={}", base_url.trim_end_matches('/'), token)
}

#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("mail request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("mail API rejected message with status {status}: {body}")]
    Rejected { status: u16, body: String },
}

/// Mail transport seam.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: &VerificationEmail) -> Result<(), MailError>;
}

/// Sends through a Mailjet-compatible HTTP send API.
///
/// # Request
///
/// `POST <api_url>` with basic auth and body:
///
/// ```json
/// {
///   "Messages": [{
///     "From": { "Email": "noreply@example.com" },
///     "To": [{ "Email": "user@example.com" }],
///     "Subject": "...",
///     "HTMLPart": "..."
///   }]
/// }
/// ```
#[derive(Debug, Clone)]
pub struct HttpMailer {
    client: reqwest::Client,
    api_url: String,
    credentials: MailCredentials,
}

impl HttpMailer {
    pub fn new(api_url: impl Into<String>, credentials: MailCredentials) -> Result<Self, MailError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            api_url: api_url.into(),
            credentials,
        })
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send(&self, email: &VerificationEmail) -> Result<(), MailError> {
        let payload = json!({
            "Messages": [{
                "From": { "Email": self.credentials.from },
                "To": [{ "Email": email.recipient }],
                "Subject": email.subject,
                "HTMLPart": email.html_body,
            }]
        });

        let response = self
            .client
            .post(&self.api_url)
            .basic_auth(&self.credentials.username, Some(&self.credentials.password))
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MailError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        Ok(())
    }
}

/// Logs the verification link instead of sending mail. Used for local runs
/// without mail credentials.
#[derive(Debug, Clone, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: &VerificationEmail) -> Result<(), MailError> {
        tracing::info!(
            recipient = %email.recipient,
            verify_url = %email.verify_url,
            "mail transport not configured, verification link logged"
        );
        Ok(())
    }
}

/// Handle to the notification queue.
#[derive(Debug, Clone)]
pub struct NotificationDispatcher {
    sender: mpsc::Sender<VerificationEmail>,
    base_url: String,
}

impl NotificationDispatcher {
    /// Start the delivery worker and return the queue handle.
    ///
    /// The worker stops once every dispatcher clone is dropped.
    pub fn spawn(
        mailer: Arc<dyn Mailer>,
        base_url: impl Into<String>,
        capacity: usize,
    ) -> (Self, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let worker = tokio::spawn(run_worker(receiver, mailer));

        (
            Self {
                sender,
                base_url: base_url.into(),
            },
            worker,
        )
    }

    /// Queue a verification email. Never fails the caller.
    pub fn schedule(&self, recipient: &str, token: &VerificationToken) {
        let valid_hours = (token.expires_at - token.created_at).num_hours();
        let email = VerificationEmail::new(recipient, &self.base_url, &token.token_value, valid_hours);

        if let Err(e) = self.sender.try_send(email) {
            tracing::error!(recipient, error = %e, "verification email dropped before delivery");
        }
    }
}

async fn run_worker(mut receiver: mpsc::Receiver<VerificationEmail>, mailer: Arc<dyn Mailer>) {
    while let Some(email) = receiver.recv().await {
        match mailer.send(&email).await {
            Ok(()) => tracing::info!(recipient = %email.recipient, "verification email sent"),
            Err(e) => {
                tracing::error!(recipient = %email.recipient, error = %e, "failed to send verification email")
            }
        }
    }
    tracing::debug!("notification worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct ChannelMailer(mpsc::UnboundedSender<VerificationEmail>);

    #[async_trait]
    impl Mailer for ChannelMailer {
        async fn send(&self, email: &VerificationEmail) -> Result<(), MailError> {
            let _ = self.0.send(email.clone());
            Ok(())
        }
    }

    fn credentials() -> MailCredentials {
        MailCredentials {
            username: "api-key".into(),
            password: "api-secret".into(),
            from: "noreply@example.com".into(),
        }
    }

    #[test]
    fn url_embeds_base_and_token() {
        assert_eq!(
            verification_url("https://gtfs.example.com/", "abc_123"),
            "https://gtfs.example.com/verify-email?token=abc_123"
        );
    }

    #[test]
    fn email_body_contains_link() {
        let email = VerificationEmail::new("a@example.com", "http://localhost:8080", "tok", 24);

        assert_eq!(email.subject, VERIFICATION_SUBJECT);
        assert!(email.html_body.contains("http://localhost:8080/verify-email?token=tok"));
        assert!(email.html_body.contains("expire in 24 hours"));
    }

    #[test]
    fn email_body_quotes_configured_lifetime() {
        let email = VerificationEmail::new("a@example.com", "http://localhost:8080", "tok", 72);
        assert!(email.html_body.contains("expire in 72 hours"));
        assert!(!email.html_body.contains("24 hours"));

        let email = VerificationEmail::new("a@example.com", "http://localhost:8080", "tok", 1);
        assert!(email.html_body.contains("expire in 1 hour."));
    }

    #[tokio::test]
    async fn worker_delivers_scheduled_email() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let (dispatcher, _worker) =
            NotificationDispatcher::spawn(Arc::new(ChannelMailer(tx)), "http://localhost:8080", 4);

        let token = VerificationToken::new("a@example.com", "tok".into(), chrono::Duration::hours(6));
        dispatcher.schedule("a@example.com", &token);

        let delivered = rx.recv().await.unwrap();
        assert_eq!(delivered.recipient, "a@example.com");
        assert_eq!(delivered.verify_url, "http://localhost:8080/verify-email?token=tok");
        assert!(delivered.html_body.contains("expire in 6 hours"));
    }

    #[tokio::test]
    async fn http_mailer_posts_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v3.1/send"))
            .and(header_exists("authorization"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let mailer = HttpMailer::new(format!("{}/v3.1/send", server.uri()), credentials()).unwrap();
        let email = VerificationEmail::new("a@example.com", "http://localhost:8080", "tok", 24);

        mailer.send(&email).await.unwrap();
    }

    #[tokio::test]
    async fn http_mailer_reports_rejection() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad credentials"))
            .mount(&server)
            .await;

        let mailer = HttpMailer::new(server.uri(), credentials()).unwrap();
        let email = VerificationEmail::new("a@example.com", "http://localhost:8080", "tok", 24);

        match mailer.send(&email).await {
            Err(MailError::Rejected { status, body }) => {
                assert_eq!(status, 401);
                assert_eq!(body, "bad credentials");
            }
            other => panic!("expected rejection, got {other:?}"),
        }
    }
}
