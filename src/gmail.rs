use async_trait::async_trait;
use google_gmail1::Gmail;
use hyper::client::HttpConnector;
use hyper_rustls::HttpsConnector;

use crate::error::MailboxError;
use crate::mailbox::Mailbox;
use crate::models::{Label, Message};

#[derive(Clone)]
pub struct GmailClient {
    hub: Gmail<HttpsConnector<HttpConnector>>,
}

impl GmailClient {
    pub fn new(hub: Gmail<HttpsConnector<HttpConnector>>) -> Self {
        Self { hub }
    }
}

fn provider_error(context: &str, err: google_gmail1::Error) -> MailboxError {
    MailboxError::Provider(format!("{}: {}", context, err))
}

/// True when the API response is Gmail's duplicate-label-name conflict.
fn is_conflict(err: &google_gmail1::Error) -> bool {
    match err {
        google_gmail1::Error::BadRequest(value) => {
            value.pointer("/error/code").and_then(|code| code.as_i64()) == Some(409)
        }
        google_gmail1::Error::Failure(response) => {
            response.status() == hyper::StatusCode::CONFLICT
        }
        _ => false,
    }
}

#[async_trait]
impl Mailbox for GmailClient {
    async fn create_label(&self, name: &str) -> Result<Label, MailboxError> {
        let req = google_gmail1::api::Label {
            name: Some(name.to_string()),
            label_list_visibility: Some("labelShow".to_string()),
            message_list_visibility: Some("show".to_string()),
            ..Default::default()
        };

        match self.hub.users().labels_create(req, "me").doit().await {
            Ok((_, label)) => Ok(Label {
                id: label.id.unwrap_or_default(),
                name: label.name.unwrap_or_default(),
            }),
            Err(err) if is_conflict(&err) => Err(MailboxError::LabelConflict(name.to_string())),
            Err(err) => Err(provider_error("Failed to create label", err)),
        }
    }

    async fn list_labels(&self) -> Result<Vec<Label>, MailboxError> {
        let (_, label_list) = self
            .hub
            .users()
            .labels_list("me")
            .doit()
            .await
            .map_err(|e| provider_error("Failed to list labels", e))?;

        let labels = label_list
            .labels
            .unwrap_or_default()
            .into_iter()
            .map(|l| Label {
                id: l.id.unwrap_or_default(),
                name: l.name.unwrap_or_default(),
            })
            .collect();

        Ok(labels)
    }

    async fn list_unread(&self) -> Result<Vec<String>, MailboxError> {
        let (_, message_list) = self
            .hub
            .users()
            .messages_list("me")
            .add_label_ids("INBOX")
            .q("is:unread")
            .doit()
            .await
            .map_err(|e| provider_error("Failed to list unread messages", e))?;

        let ids = message_list
            .messages
            .unwrap_or_default()
            .into_iter()
            .filter_map(|m| m.id)
            .collect();

        Ok(ids)
    }

    async fn get_message(&self, id: &str) -> Result<Message, MailboxError> {
        let (_, msg) = self
            .hub
            .users()
            .messages_get("me", id)
            .format("full")
            .doit()
            .await
            .map_err(|e| provider_error(&format!("Failed to get message {}", id), e))?;

        Ok(convert_message(msg))
    }

    async fn send_message(&self, raw: &str) -> Result<(), MailboxError> {
        use std::io::Cursor;
        let cursor = Cursor::new(raw.as_bytes().to_vec());

        self.hub
            .users()
            .messages_send(google_gmail1::api::Message::default(), "me")
            .upload(cursor, "message/rfc822".parse().unwrap())
            .await
            .map_err(|e| provider_error("Failed to send message", e))?;

        Ok(())
    }

    async fn modify_labels(
        &self,
        id: &str,
        add: Vec<String>,
        remove: Vec<String>,
    ) -> Result<(), MailboxError> {
        let req = google_gmail1::api::ModifyMessageRequest {
            add_label_ids: Some(add),
            remove_label_ids: Some(remove),
        };

        self.hub
            .users()
            .messages_modify(req, "me", id)
            .doit()
            .await
            .map_err(|e| provider_error(&format!("Failed to modify labels on {}", id), e))?;

        Ok(())
    }
}

/// Flatten the full-format API message into the fields the responder reads.
fn convert_message(msg: google_gmail1::api::Message) -> Message {
    let mut from = None;
    let mut subject = None;
    let mut in_reply_to = None;

    if let Some(payload) = &msg.payload {
        if let Some(headers) = &payload.headers {
            for header in headers {
                match header.name.as_deref() {
                    Some("From") => from = header.value.clone(),
                    Some("Subject") => subject = header.value.clone(),
                    Some("In-Reply-To") => in_reply_to = header.value.clone(),
                    _ => {}
                }
            }
        }
    }

    let mut body_plain = None;
    if let Some(payload) = &msg.payload {
        body_plain = extract_text_body(payload, "text/plain");
    }

    let label_ids = msg.label_ids.unwrap_or_default();

    Message {
        id: msg.id.unwrap_or_default(),
        thread_id: msg.thread_id.unwrap_or_default(),
        from_address: from,
        subject,
        in_reply_to,
        body_plain,
        is_read: !label_ids.contains(&"UNREAD".to_string()),
        label_ids,
    }
}

/// Walk the MIME part tree and collect the decoded text of every part with
/// the given mime type, concatenated in order.
fn extract_text_body(part: &google_gmail1::api::MessagePart, mime_type: &str) -> Option<String> {
    if part.mime_type.as_deref() == Some(mime_type) {
        if let Some(data) = part.body.as_ref().and_then(|b| b.data.as_ref()) {
            return decode_body_data(data);
        }
    }

    let joined: String = part
        .parts
        .as_deref()
        .unwrap_or_default()
        .iter()
        .filter_map(|p| extract_text_body(p, mime_type))
        .collect();
    (!joined.is_empty()).then_some(joined)
}

/// Gmail serves body data base64url-encoded, but padding and alphabet vary
/// between endpoints, and some payloads arrive already decoded.
fn decode_body_data(data: &[u8]) -> Option<String> {
    use base64::{Engine as _, engine::general_purpose};

    let text = String::from_utf8_lossy(data);
    let trimmed = text.trim();
    let decoded = general_purpose::URL_SAFE_NO_PAD
        .decode(trimmed)
        .or_else(|_| general_purpose::URL_SAFE.decode(trimmed))
        .or_else(|_| general_purpose::STANDARD_NO_PAD.decode(trimmed))
        .or_else(|_| general_purpose::STANDARD.decode(trimmed));

    match decoded {
        Ok(bytes) => String::from_utf8(bytes).ok(),
        Err(_) => Some(text.into_owned()),
    }
}
