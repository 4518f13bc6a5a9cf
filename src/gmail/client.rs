use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::time::Duration;

use super::types::*;
use crate::rules::actions::MailboxClient;

/// Gmail allows at most 500 ids per list page.
const MAX_PAGE_SIZE: u32 = 500;

pub struct GmailClient {
    api_url: String,
    user_id: String,
    auth: String,
    agent: ureq::Agent,
}

#[derive(Debug)]
pub enum GmailError {
    Http(String),
    Parse(String),
    Api(String),
}

impl std::fmt::Display for GmailError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GmailError::Http(e) => write!(f, "HTTP error: {}", e),
            GmailError::Parse(e) => write!(f, "Parse error: {}", e),
            GmailError::Api(e) => write!(f, "API error: {}", e),
        }
    }
}

fn truncate_str(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

impl GmailClient {
    pub fn new(api_url: &str, user_id: &str, access_token: &str) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(60))
            .build();
        GmailClient {
            api_url: api_url.trim_end_matches('/').to_string(),
            user_id: user_id.to_string(),
            auth: format!("Bearer {}", access_token),
            agent,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/users/{}/{}", self.api_url, self.user_id, path)
    }

    fn send(&self, request: ureq::Request, body: Option<&Value>) -> Result<String, GmailError> {
        let url = request.url().to_string();
        log_debug!("[Gmail] {} {}", request.method(), url);

        let result = match body {
            Some(body) => request.set("Authorization", &self.auth).send_json(body),
            None => request.set("Authorization", &self.auth).call(),
        };

        match result {
            Ok(resp) => {
                let text = resp
                    .into_string()
                    .map_err(|e| GmailError::Parse(format!("Failed to read response: {}", e)))?;
                log_debug!(
                    "[Gmail] Response body ({} bytes): {}",
                    text.len(),
                    truncate_str(&text, 500)
                );
                Ok(text)
            }
            Err(ureq::Error::Status(code, resp)) => {
                let body = resp.into_string().unwrap_or_default();
                log_error!("[Gmail] HTTP error {} from {}: {}", code, url, body);

                if code == 401 {
                    return Err(GmailError::Http(
                        "Authentication failed (401 Unauthorized)".to_string(),
                    ));
                }

                Err(GmailError::Api(format!(
                    "HTTP {} error: {}",
                    code,
                    if body.is_empty() {
                        "(empty response)".to_string()
                    } else {
                        truncate_str(&body, 200).to_string()
                    }
                )))
            }
            Err(e) => {
                log_error!("[Gmail] Connection error: {}", e);
                Err(GmailError::Http(e.to_string()))
            }
        }
    }

    fn parse<T: DeserializeOwned>(text: &str) -> Result<T, GmailError> {
        serde_json::from_str(text).map_err(|e| {
            GmailError::Parse(format!(
                "{}. Response was: {}",
                e,
                truncate_str(text, 500)
            ))
        })
    }

    /// Ids of messages carrying `label`, newest first, following page tokens
    /// until `max_results` ids have been collected.
    pub fn list_message_ids(&self, label: &str, max_results: u32) -> Result<Vec<String>, GmailError> {
        log_info!(
            "[Gmail] Listing up to {} message(s) with label {}",
            max_results,
            label
        );

        let mut ids = Vec::new();
        let mut page_token: Option<String> = None;

        while (ids.len() as u32) < max_results {
            let remaining = (max_results - ids.len() as u32).min(MAX_PAGE_SIZE);
            let mut request = self
                .agent
                .get(&self.url("messages"))
                .query("labelIds", label)
                .query("maxResults", &remaining.to_string());
            if let Some(ref token) = page_token {
                request = request.query("pageToken", token);
            }

            let text = self.send(request, None)?;
            let page: MessageListResponse = Self::parse(&text)?;
            ids.extend(page.messages.into_iter().map(|m| m.id));

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        ids.truncate(max_results as usize);
        log_info!("[Gmail] Listed {} message id(s)", ids.len());
        Ok(ids)
    }

    pub fn get_message(&self, id: &str) -> Result<Message, GmailError> {
        let request = self
            .agent
            .get(&self.url(&format!("messages/{}", id)))
            .query("format", "full");
        let text = self.send(request, None)?;
        Self::parse(&text)
    }

    pub fn list_labels(&self) -> Result<Vec<Label>, GmailError> {
        let text = self.send(self.agent.get(&self.url("labels")), None)?;
        let response: LabelListResponse = Self::parse(&text)?;
        log_debug!("[Gmail] labels.list returned {} label(s)", response.labels.len());
        Ok(response.labels)
    }

    pub fn create_label(&self, name: &str) -> Result<Label, GmailError> {
        log_info!("[Gmail] Creating label: {}", name);
        let body = json!({
            "name": name,
            "labelListVisibility": "labelShow",
            "messageListVisibility": "show"
        });
        let text = self.send(self.agent.post(&self.url("labels")), Some(&body))?;
        Self::parse(&text)
    }

    pub fn modify_message(
        &self,
        id: &str,
        add_label_ids: &[String],
        remove_label_ids: &[String],
    ) -> Result<(), GmailError> {
        log_info!(
            "[Gmail] Modifying message {}: add {:?}, remove {:?}",
            id,
            add_label_ids,
            remove_label_ids
        );
        let body = json!({
            "addLabelIds": add_label_ids,
            "removeLabelIds": remove_label_ids
        });
        let request = self.agent.post(&self.url(&format!("messages/{}/modify", id)));
        self.send(request, Some(&body))?;
        Ok(())
    }
}

impl MailboxClient for GmailClient {
    fn label_map(&self) -> Result<HashMap<String, String>, String> {
        let labels = self.list_labels().map_err(|e| e.to_string())?;
        Ok(labels.into_iter().map(|l| (l.name, l.id)).collect())
    }

    fn ensure_label(&self, name: &str) -> Result<String, String> {
        let labels = self.list_labels().map_err(|e| e.to_string())?;
        if let Some(label) = labels.into_iter().find(|l| l.name == name) {
            return Ok(label.id);
        }
        self.create_label(name)
            .map(|l| l.id)
            .map_err(|e| e.to_string())
    }

    fn modify_labels(&self, message_id: &str, add: &[String], remove: &[String]) -> Result<(), String> {
        self.modify_message(message_id, add, remove)
            .map_err(|e| e.to_string())
    }
}
