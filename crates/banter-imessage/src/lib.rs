// SPDX-FileCopyrightText: 2026 Banter Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Outbound delivery through the Messages application via `osascript`.
//!
//! Replies go out on the same service the inbound message arrived on
//! (iMessage stays iMessage, SMS stays SMS). Acknowledgement events render
//! as a plain message; terminal replies send their text first and then
//! each attachment as a file.

use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};

use banter_core::types::{DispatchEvent, MessageService, OutboundReply};
use banter_core::{BanterError, TransportSender};

/// Escape a string for inclusion in an AppleScript double-quoted literal.
fn applescript_escape(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Build the AppleScript that sends `payload` to `recipient` on `service`.
///
/// `payload` is either an escaped text literal or a `POSIX file` clause;
/// the caller decides which.
fn build_script(recipient: &str, service: MessageService, payload: &str) -> String {
    let service_type = match service {
        MessageService::IMessage => "iMessage",
        MessageService::Sms => "SMS",
    };
    format!(
        "tell application \"Messages\"\n\
         set targetService to 1st account whose service type = {service_type}\n\
         set targetBuddy to participant \"{}\" of targetService\n\
         send {payload} to targetBuddy\n\
         end tell",
        applescript_escape(recipient)
    )
}

fn text_payload(text: &str) -> String {
    format!("\"{}\"", applescript_escape(text))
}

fn file_payload(path: &Path) -> String {
    format!("POSIX file \"{}\"", applescript_escape(&path.display().to_string()))
}

/// Transport sender backed by the local Messages application.
#[derive(Debug, Default)]
pub struct IMessageSender;

impl IMessageSender {
    pub fn new() -> Self {
        Self
    }

    async fn run_script(&self, script: String) -> Result<(), BanterError> {
        let output = Command::new("osascript")
            .arg("-e")
            .arg(&script)
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| BanterError::Transport {
                message: "failed to run osascript".to_string(),
                source: Some(Box::new(e)),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(BanterError::Transport {
                message: format!("osascript failed: {stderr}"),
                source: None,
            });
        }
        Ok(())
    }

    async fn send_reply(&self, reply: &OutboundReply) -> Result<(), BanterError> {
        if !reply.text.trim().is_empty() {
            let script = build_script(
                &reply.recipient,
                reply.service,
                &text_payload(&reply.text),
            );
            self.run_script(script).await?;
        }

        for attachment in &reply.attachments {
            if !attachment.exists() {
                warn!(path = %attachment.display(), "skipping missing outbound attachment");
                continue;
            }
            let script =
                build_script(&reply.recipient, reply.service, &file_payload(attachment));
            self.run_script(script).await?;
        }

        debug!(
            recipient = %reply.recipient,
            service = %reply.service,
            attachments = reply.attachments.len(),
            "reply delivered"
        );
        Ok(())
    }
}

#[async_trait]
impl TransportSender for IMessageSender {
    async fn deliver(&self, event: DispatchEvent) -> Result<(), BanterError> {
        match event {
            DispatchEvent::Acknowledgement(reply) => {
                // Acknowledgements are best rendered as a short plain message;
                // attachments never accompany them.
                if reply.text.trim().is_empty() {
                    return Ok(());
                }
                let script =
                    build_script(&reply.recipient, reply.service, &text_payload(&reply.text));
                self.run_script(script).await
            }
            DispatchEvent::Reply(reply) => self.send_reply(&reply).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn escape_handles_quotes_and_backslashes() {
        assert_eq!(applescript_escape(r#"say "hi""#), r#"say \"hi\""#);
        assert_eq!(applescript_escape(r"a\b"), r"a\\b");
    }

    #[test]
    fn script_selects_imessage_service() {
        let script = build_script(
            "+15551234567",
            MessageService::IMessage,
            &text_payload("hello"),
        );
        assert!(script.contains("service type = iMessage"));
        assert!(script.contains("participant \"+15551234567\""));
        assert!(script.contains("send \"hello\""));
    }

    #[test]
    fn script_selects_sms_service() {
        let script = build_script("+15551234567", MessageService::Sms, &text_payload("hi"));
        assert!(script.contains("service type = SMS"));
    }

    #[test]
    fn file_payload_uses_posix_file() {
        let payload = file_payload(&PathBuf::from("/tmp/out.png"));
        assert_eq!(payload, "POSIX file \"/tmp/out.png\"");
    }
}
