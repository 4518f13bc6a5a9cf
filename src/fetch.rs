use base64::Engine;
use chrono::{DateTime, Utc};

use crate::gmail::client::GmailClient;
use crate::gmail::types::{Message, MessagePart};
use crate::record::{EmailRecord, INBOX_LABEL, UNREAD_LABEL};
use crate::store::Store;

/// Pull up to `max_results` inbox messages from the provider and upsert them
/// into the store in one transaction. Returns how many were fetched.
pub fn fetch_and_store(
    client: &GmailClient,
    store: &Store,
    max_results: u32,
) -> Result<usize, String> {
    let ids = client
        .list_message_ids(INBOX_LABEL, max_results)
        .map_err(|e| format!("failed to list messages: {}", e))?;

    let now = Utc::now();
    let mut records = Vec::with_capacity(ids.len());
    for id in &ids {
        let message = client
            .get_message(id)
            .map_err(|e| format!("failed to fetch message {}: {}", id, e))?;
        records.push(record_from_message(&message, now));
    }

    store
        .put_records(&records)
        .map_err(|e| format!("failed to store messages: {}", e))?;
    log_info!("[Fetch] Stored {} message(s) in {}", records.len(), store.path().display());
    Ok(records.len())
}

/// Build a record from a full provider message. `fetched_at` stands in for
/// the received time when the Date header is missing or unparseable.
pub fn record_from_message(message: &Message, fetched_at: DateTime<Utc>) -> EmailRecord {
    let header = |name: &str| message.header(name).unwrap_or_default().to_string();

    let received_at = match message.header("Date") {
        Some(raw) => parse_date(raw).unwrap_or_else(|| {
            log_warn!(
                "[Fetch] Message {} has unparseable Date '{}', using fetch time",
                message.id,
                raw
            );
            fetched_at
        }),
        None => fetched_at,
    };

    EmailRecord {
        id: message.id.clone(),
        thread_id: message.thread_id.clone(),
        from: header("From"),
        to: header("To"),
        subject: header("Subject"),
        snippet: message.snippet.clone(),
        body: message
            .payload
            .as_ref()
            .and_then(plain_text_body)
            .unwrap_or_default(),
        received_at,
        is_read: !message.label_ids.iter().any(|l| l == UNREAD_LABEL),
        label_ids: message.label_ids.iter().cloned().collect(),
    }
}

fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    // Some senders append a zone comment, e.g. "+0000 (UTC)".
    let trimmed = match raw.find(" (") {
        Some(idx) => &raw[..idx],
        None => raw,
    };
    DateTime::parse_from_rfc2822(trimmed.trim())
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// First `text/plain` part in depth-first order, decoded.
fn plain_text_body(part: &MessagePart) -> Option<String> {
    if part.mime_type.eq_ignore_ascii_case("text/plain") {
        if let Some(text) = part
            .body
            .as_ref()
            .and_then(|b| b.data.as_deref())
            .and_then(decode_body)
        {
            return Some(text);
        }
    }
    part.parts.iter().find_map(plain_text_body)
}

fn decode_body(data: &str) -> Option<String> {
    let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(data.trim_end_matches('='))
        .ok()?;
    Some(String::from_utf8_lossy(&bytes).into_owned())
}
