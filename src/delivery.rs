//! Delivery through the remote mail-sending API.

use async_trait::async_trait;
use serde::Serialize;

use crate::{
    config::Config,
    error::DeliveryError,
    message::{ContentType, ParsedMessage},
    outgoing,
};

/// Anything that can hand a parsed message to a remote service
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Send `message` using the bearer `token`.
    ///
    /// # Errors
    /// If the remote side does not accept the message
    async fn deliver(&self, message: &ParsedMessage, token: &str) -> Result<(), DeliveryError>;
}

#[derive(Debug, Serialize)]
struct SendMailRequest<'a> {
    message: OutgoingMessage<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct OutgoingMessage<'a> {
    subject: &'a str,
    body: ItemBody,
    to_recipients: [Recipient<'a>; 1],
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ItemBody {
    content_type: ContentType,
    content: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Recipient<'a> {
    email_address: EmailAddress<'a>,
}

#[derive(Debug, Serialize)]
struct EmailAddress<'a> {
    address: &'a str,
}

/// Build the single-recipient send request for `message`
fn send_mail_request(message: &ParsedMessage) -> SendMailRequest<'_> {
    let body = message.select_body();

    SendMailRequest {
        message: OutgoingMessage {
            subject: message.subject(),
            body: ItemBody {
                content_type: body.content_type,
                content: body.content,
            },
            to_recipients: [Recipient {
                email_address: EmailAddress {
                    address: message.to(),
                },
            }],
        },
    }
}

/// HTTP client shared by the credential provider and the mailer
///
/// # Errors
/// If the TLS backend cannot be initialised
pub fn http_client(config: &Config) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(config.http_timeout())
        .user_agent(concat!("mailrelay/", env!("CARGO_PKG_VERSION")))
        .build()
}

/// Mailer posting to the per-sender `sendMail` endpoint
#[derive(Debug, Clone)]
pub struct GraphMailer {
    http: reqwest::Client,
    endpoint: String,
}

impl GraphMailer {
    #[must_use]
    pub fn new(config: &Config, http: reqwest::Client) -> Self {
        Self {
            http,
            endpoint: config.send_mail_url(),
        }
    }
}

#[async_trait]
impl Mailer for GraphMailer {
    async fn deliver(&self, message: &ParsedMessage, token: &str) -> Result<(), DeliveryError> {
        let request = send_mail_request(message);

        outgoing!(
            level = DEBUG,
            "Sending '{}' to {} via {}",
            request.message.subject,
            request.message.to_recipients[0].email_address.address,
            self.endpoint
        );

        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(token)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DeliveryError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    #[test]
    fn test_payload_shape() {
        let message = ParsedMessage::parse(
            b"To: someone@example.com\r\nSubject: Quarterly\r\n\r\nNumbers attached",
        )
        .unwrap();

        let payload = serde_json::to_value(send_mail_request(&message)).unwrap();

        assert_eq!(
            payload,
            json!({
                "message": {
                    "subject": "Quarterly",
                    "body": { "contentType": "Text", "content": "Numbers attached" },
                    "toRecipients": [ { "emailAddress": { "address": "someone@example.com" } } ]
                }
            })
        );
    }

    #[test]
    fn test_payload_defaults_missing_headers() {
        let message = ParsedMessage::parse(b"X-Mailer: test\r\n\r\nbody").unwrap();
        let payload = serde_json::to_value(send_mail_request(&message)).unwrap();

        assert_eq!(payload["message"]["subject"], "");
        assert_eq!(
            payload["message"]["toRecipients"][0]["emailAddress"]["address"],
            ""
        );
    }
}
