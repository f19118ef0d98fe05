//! Parsed view of a queued message.

use std::borrow::Cow;

use mailparse::{MailHeaderMap, ParsedMail};
use serde::Serialize;

use crate::error::Result;

/// Charset assumed when a part does not declare one
const DEFAULT_CHARSET: &str = "utf-8";

/// One MIME part, with its transfer encoding already removed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BodyPart {
    /// Lowercased MIME type, e.g. `text/html`
    pub content_type: String,
    pub charset: String,
    pub raw: Vec<u8>,
}

impl BodyPart {
    /// Decode the part's bytes using its charset.
    ///
    /// Unknown charsets fall back to UTF-8; invalid sequences are replaced
    /// rather than failing the whole message.
    #[must_use]
    pub fn text(&self) -> String {
        match charset::Charset::for_label(self.charset.as_bytes()) {
            Some(charset) => charset.decode_without_bom_handling(&self.raw).0.into_owned(),
            None => String::from_utf8_lossy(&self.raw).into_owned(),
        }
    }
}

/// Message headers plus every MIME part in depth-first order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedMessage {
    pub headers: Vec<(String, String)>,
    pub multipart: bool,
    pub parts: Vec<BodyPart>,
}

/// Body content type flag understood by the mail API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ContentType {
    #[serde(rename = "HTML")]
    Html,
    #[serde(rename = "Text")]
    Text,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Body {
    pub content_type: ContentType,
    pub content: String,
}

impl ParsedMessage {
    /// Parse a raw RFC 5322 message.
    ///
    /// # Errors
    /// If the message structure cannot be parsed
    pub fn parse(raw: &[u8]) -> Result<Self> {
        let mail = mailparse::parse_mail(raw)?;

        let headers = mail
            .headers
            .iter()
            .map(|h| (h.get_key(), h.get_value()))
            .collect();

        let multipart = !mail.subparts.is_empty() || mail.ctype.mimetype.starts_with("multipart/");

        let mut parts = Vec::new();
        collect_parts(&mail, &mut parts)?;

        Ok(Self {
            headers,
            multipart,
            parts,
        })
    }

    /// First value of a header, matched case-insensitively
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Subject, empty if absent
    #[must_use]
    pub fn subject(&self) -> &str {
        self.header("Subject").unwrap_or_default()
    }

    /// Recipient, empty if absent
    #[must_use]
    pub fn to(&self) -> &str {
        self.header("To").unwrap_or_default()
    }

    /// Pick the body to send.
    ///
    /// An HTML part wins wherever it appears. Otherwise the first non-empty
    /// plain text part is used. A single-part message is sent as text as is.
    #[must_use]
    pub fn select_body(&self) -> Body {
        if !self.multipart {
            return Body {
                content_type: ContentType::Text,
                content: self.parts.first().map(BodyPart::text).unwrap_or_default(),
            };
        }

        let mut content = String::new();
        for part in &self.parts {
            match part.content_type.as_str() {
                "text/html" => {
                    return Body {
                        content_type: ContentType::Html,
                        content: part.text(),
                    };
                }
                "text/plain" if content.is_empty() => content = part.text(),
                _ => {}
            }
        }

        Body {
            content_type: ContentType::Text,
            content,
        }
    }
}

fn collect_parts(mail: &ParsedMail<'_>, parts: &mut Vec<BodyPart>) -> Result<()> {
    let charset = mail
        .ctype
        .params
        .get("charset")
        .map_or(Cow::Borrowed(DEFAULT_CHARSET), |c| Cow::Owned(c.to_ascii_lowercase()));

    parts.push(BodyPart {
        content_type: mail.ctype.mimetype.to_ascii_lowercase(),
        charset: charset.into_owned(),
        raw: if mail.subparts.is_empty() {
            mail.get_body_raw()?
        } else {
            Vec::new()
        },
    });

    for sub in &mail.subparts {
        collect_parts(sub, parts)?;
    }

    Ok(())
}

/// The `To` header of a raw message, for log lines
#[must_use]
pub fn recipient_of(raw: &[u8]) -> Option<String> {
    mailparse::parse_headers(raw)
        .ok()
        .and_then(|(headers, _)| headers.get_first_value("To"))
}
