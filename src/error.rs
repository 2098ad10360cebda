//! Error types for the responder.

use thiserror::Error;

/// Failures surfaced by a mailbox backend.
#[derive(Debug, Error)]
pub enum MailboxError {
    /// The provider refused a label create because the name is taken.
    #[error("label '{0}' already exists")]
    LabelConflict(String),

    /// Any other provider-side failure (network, auth, permission).
    #[error("provider call failed: {0}")]
    Provider(String),
}

/// Top-level responder errors.
#[derive(Debug, Error)]
pub enum ResponderError {
    /// The provider signalled a name conflict, yet the label listing has no
    /// entry with that name. The account state is inconsistent; nothing the
    /// responder can do will fix it.
    #[error("label '{name}' reported as existing, but absent from the label list")]
    LabelConflictUnresolved { name: String },

    /// A fetched message lacks a header the reply needs.
    #[error("message {id} has no '{header}' header")]
    MissingHeader { id: String, header: &'static str },

    #[error(transparent)]
    Mailbox(#[from] MailboxError),
}
