use crate::error::ResponderError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Label {
    pub id: String,
    pub name: String,
}

/// A fetched message, flattened to the fields the responder reads.
#[derive(Debug, Clone, Default)]
pub struct Message {
    pub id: String,
    pub thread_id: String,
    pub from_address: Option<String>,
    pub subject: Option<String>,
    pub in_reply_to: Option<String>,
    pub body_plain: Option<String>,
    pub label_ids: Vec<String>,
    pub is_read: bool,
}

/// An outgoing reply, built per message and discarded once sent.
#[derive(Debug, Clone)]
pub struct ReplyDraft {
    pub to: String,
    pub subject: String,
    pub body: String,
}

impl ReplyDraft {
    /// Build the reply for `message`: recipient is the original sender,
    /// subject is the original subject behind a "Re: " prefix. Fails when
    /// the From or Subject header is missing.
    pub fn for_message(message: &Message, body: &str) -> Result<Self, ResponderError> {
        let to = message
            .from_address
            .clone()
            .ok_or_else(|| ResponderError::MissingHeader {
                id: message.id.clone(),
                header: "From",
            })?;
        let subject = message
            .subject
            .clone()
            .ok_or_else(|| ResponderError::MissingHeader {
                id: message.id.clone(),
                header: "Subject",
            })?;
        Ok(Self {
            to,
            subject: format!("Re: {}", subject),
            body: body.to_string(),
        })
    }

    /// Render the draft as an RFC 822 message for Gmail's raw upload.
    pub fn to_rfc822(&self) -> String {
        format!(
            "To: {}\r\nSubject: {}\r\nContent-Type: text/plain; charset=\"UTF-8\"\r\nContent-Transfer-Encoding: 7bit\r\n\r\n{}\r\n",
            self.to, self.subject, self.body
        )
    }
}
