// Slack Web API transport (chat.postMessage)

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::{SLACK_POST_MESSAGE_URL, SLACK_TIMEOUT_SECONDS};
use crate::error::{CollectorError, Result};
use super::MessageTransport;

#[derive(Debug, Serialize)]
struct PostMessage<'a> {
    channel: &'a str,
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct SlackReply {
    ok: bool,
    error: Option<String>,
}

/// Bot-token authenticated Slack client.
pub struct SlackClient {
    token: String,
    url: String,
    agent: ureq::Agent,
}

impl SlackClient {
    pub fn new(token: impl Into<String>) -> Self {
        Self::with_url(token, SLACK_POST_MESSAGE_URL)
    }

    pub fn with_url(token: impl Into<String>, url: impl Into<String>) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(SLACK_TIMEOUT_SECONDS))
            .build();
        Self {
            token: token.into(),
            url: url.into(),
            agent,
        }
    }
}

impl MessageTransport for SlackClient {
    fn post_message(&self, channel: &str, text: &str) -> Result<()> {
        let body = serde_json::to_string(&PostMessage { channel, text })?;

        let response = self
            .agent
            .post(&self.url)
            .set("Authorization", &format!("Bearer {}", self.token))
            .set("Content-Type", "application/json; charset=utf-8")
            .send_string(&body)
            .map_err(|e| CollectorError::Notification(format!("Slack request failed: {}", e)))?;

        let reply = response.into_string()?;
        check_reply(&reply)
    }
}

/// Slack answers HTTP 200 even on failure; the `ok` field is authoritative.
fn check_reply(body: &str) -> Result<()> {
    let reply: SlackReply = serde_json::from_str(body)?;
    if reply.ok {
        Ok(())
    } else {
        Err(CollectorError::Notification(
            reply.error.unwrap_or_else(|| "unknown Slack error".to_string()),
        ))
    }
}
