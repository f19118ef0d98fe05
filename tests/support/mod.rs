//! Shared helpers for the integration tests

#![allow(dead_code)] // Not every test binary uses every helper

pub mod mock_http;

use std::path::Path;

use mailrelay::Config;

pub use mock_http::{MockHttpServer, RecordedRequest};

/// A plain-text message addressed to `to`
pub fn text_message(to: &str, subject: &str, body: &str) -> Vec<u8> {
    format!(
        "From: app@example.com\r\nTo: {to}\r\nSubject: {subject}\r\nContent-Type: text/plain; charset=utf-8\r\n\r\n{body}"
    )
    .into_bytes()
}

/// A multipart/alternative message with the HTML part after the plain one
pub fn alternative_message(to: &str, subject: &str) -> Vec<u8> {
    format!(
        "From: app@example.com\r\n\
         To: {to}\r\n\
         Subject: {subject}\r\n\
         MIME-Version: 1.0\r\n\
         Content-Type: multipart/alternative; boundary=\"sep\"\r\n\
         \r\n\
         --sep\r\n\
         Content-Type: text/plain; charset=utf-8\r\n\
         \r\n\
         plain version\r\n\
         --sep\r\n\
         Content-Type: text/html; charset=utf-8\r\n\
         \r\n\
         <p>html version</p>\r\n\
         --sep--\r\n"
    )
    .into_bytes()
}

/// A fully populated worker config rooted in `dir`, talking to `base_url`
/// for both the identity provider and the mail API
pub fn test_config(dir: &Path, base_url: &str) -> Config {
    Config {
        tenant_id: "tenant".to_string(),
        client_id: "client".to_string(),
        client_secret: "secret".to_string(),
        sender: "noreply@example.com".to_string(),
        queue_dir: dir.join("queue"),
        log_dir: dir.join("log"),
        authority_host: base_url.to_string(),
        graph_endpoint: base_url.to_string(),
        poll_interval_secs: 1,
        http_timeout_secs: 5,
        lock_file: dir.join("worker.pid"),
        token_cache: dir.join("token_cache.json"),
        ..Config::default()
    }
}
