//! Backend-agnostic mailbox trait: the provider operations the responder
//! loop needs, behind one async interface so tests can substitute a
//! recording fake for the real Gmail client.

use async_trait::async_trait;

use crate::error::MailboxError;
use crate::models::{Label, Message};

#[async_trait]
pub trait Mailbox: Send + Sync {
    /// Create a label, failing with [`MailboxError::LabelConflict`] when the
    /// name is already taken.
    async fn create_label(&self, name: &str) -> Result<Label, MailboxError>;

    /// List every label in the account.
    async fn list_labels(&self) -> Result<Vec<Label>, MailboxError>;

    /// List ids of unread inbox messages. Empty when there is no new mail.
    async fn list_unread(&self) -> Result<Vec<String>, MailboxError>;

    /// Fetch one message in full.
    async fn get_message(&self, id: &str) -> Result<Message, MailboxError>;

    /// Send a raw RFC 822 message.
    async fn send_message(&self, raw: &str) -> Result<(), MailboxError>;

    /// Add and remove labels on a message.
    async fn modify_labels(
        &self,
        id: &str,
        add: Vec<String>,
        remove: Vec<String>,
    ) -> Result<(), MailboxError>;
}
