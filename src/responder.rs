//! The responder loop: label resolution, the poll cycle, and scheduling.

use std::time::Duration;

use rand::Rng;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::{MailboxError, ResponderError};
use crate::mailbox::Mailbox;
use crate::models::{Message, ReplyDraft};

/// Gmail's well-known inbox label id.
const INBOX_LABEL_ID: &str = "INBOX";

/// Resolve the responder label to its id, creating it when absent.
///
/// On the provider's duplicate-name conflict the label already exists, so
/// the id is recovered from a full listing instead (exact, case-sensitive
/// name match). A conflict with no matching entry in the listing means the
/// provider's conflict signal and the account state disagree; that is
/// surfaced, not retried. Call once per process lifetime.
pub async fn resolve_label(mailbox: &dyn Mailbox, name: &str) -> Result<String, ResponderError> {
    match mailbox.create_label(name).await {
        Ok(label) => {
            info!(id = %label.id, name, "created responder label");
            Ok(label.id)
        }
        Err(MailboxError::LabelConflict(_)) => {
            let labels = mailbox.list_labels().await?;
            labels
                .into_iter()
                .find(|label| label.name == name)
                .map(|label| label.id)
                .ok_or_else(|| ResponderError::LabelConflictUnresolved {
                    name: name.to_string(),
                })
        }
        Err(err) => Err(err.into()),
    }
}

/// Whether a message's thread still awaits an answer, approximated by the
/// absence of an In-Reply-To header. A reply from anyone, ours included,
/// suppresses further responses.
pub fn needs_reply(message: &Message) -> bool {
    message.in_reply_to.is_none()
}

/// Send the templated reply for `message`, then move the original out of the
/// inbox under the responder label.
///
/// The label mutation only happens once the send has succeeded. If the
/// mutation itself fails the reply is already out and the message stays
/// unread in the inbox, so a later tick may answer it a second time.
pub async fn send_reply(
    mailbox: &dyn Mailbox,
    message: &Message,
    label_id: &str,
    body: &str,
) -> Result<(), ResponderError> {
    let draft = ReplyDraft::for_message(message, body)?;
    mailbox.send_message(&draft.to_rfc822()).await?;
    mailbox
        .modify_labels(
            &message.id,
            vec![label_id.to_string()],
            vec![INBOX_LABEL_ID.to_string()],
        )
        .await?;
    Ok(())
}

/// One poll cycle: list unread inbox messages, then strictly in sequence
/// fetch, classify, and answer each thread that has not been replied to.
pub async fn run_tick(
    mailbox: &dyn Mailbox,
    label_id: &str,
    reply_body: &str,
) -> Result<(), ResponderError> {
    let ids = mailbox.list_unread().await?;
    if ids.is_empty() {
        debug!("no unread messages");
        return Ok(());
    }

    info!(count = ids.len(), "processing unread messages");
    for id in ids {
        let message = mailbox.get_message(&id).await?;
        if !needs_reply(&message) {
            debug!(id = %message.id, "thread already answered, skipping");
            continue;
        }
        match send_reply(mailbox, &message, label_id, reply_body).await {
            Ok(()) => info!(id = %message.id, "auto-reply sent"),
            // A message with no From or Subject can never be answered; skip
            // it and keep going instead of blocking the rest of the tick.
            Err(err @ ResponderError::MissingHeader { .. }) => {
                warn!(%err, "skipping malformed message");
            }
            Err(err) => return Err(err),
        }
    }
    Ok(())
}

/// Delay before the next tick, redrawn uniformly at random every time.
pub fn next_delay<R: Rng>(rng: &mut R, config: &Config) -> Duration {
    Duration::from_secs(rng.gen_range(config.poll_min_secs..=config.poll_max_secs))
}

/// Drive the poll cycle forever. A failed tick is logged and the next one is
/// armed on the usual random delay; ticks never overlap because the delay is
/// only drawn after the previous tick has fully settled.
pub async fn run(mailbox: &dyn Mailbox, label_id: &str, config: &Config) {
    loop {
        if let Err(err) = run_tick(mailbox, label_id, &config.reply_body).await {
            error!(%err, "poll cycle failed");
        }
        let delay = next_delay(&mut rand::thread_rng(), config);
        debug!(secs = delay.as_secs(), "next poll scheduled");
        tokio::time::sleep(delay).await;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::models::Label;

    /// Provider calls in the order the responder issued them.
    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        CreateLabel(String),
        ListLabels,
        ListUnread,
        GetMessage(String),
        Send(String),
        Modify {
            id: String,
            add: Vec<String>,
            remove: Vec<String>,
        },
    }

    #[derive(Default)]
    struct MockMailbox {
        labels: Mutex<Vec<Label>>,
        messages: Vec<Message>,
        // Conflict even though the listing will not contain the name.
        force_conflict: bool,
        fail_get: bool,
        fail_send: bool,
        fail_modify: bool,
        calls: Mutex<Vec<Call>>,
    }

    impl MockMailbox {
        fn with_messages(messages: Vec<Message>) -> Self {
            Self {
                messages,
                ..Default::default()
            }
        }

        fn record(&self, call: Call) {
            self.calls.lock().unwrap().push(call);
        }

        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }

        fn provider_down() -> MailboxError {
            MailboxError::Provider("connection reset".to_string())
        }
    }

    #[async_trait::async_trait]
    impl Mailbox for MockMailbox {
        async fn create_label(&self, name: &str) -> Result<Label, MailboxError> {
            self.record(Call::CreateLabel(name.to_string()));
            let mut labels = self.labels.lock().unwrap();
            if self.force_conflict || labels.iter().any(|l| l.name == name) {
                return Err(MailboxError::LabelConflict(name.to_string()));
            }
            let label = Label {
                id: format!("L{}", labels.len() + 1),
                name: name.to_string(),
            };
            labels.push(label.clone());
            Ok(label)
        }

        async fn list_labels(&self) -> Result<Vec<Label>, MailboxError> {
            self.record(Call::ListLabels);
            Ok(self.labels.lock().unwrap().clone())
        }

        async fn list_unread(&self) -> Result<Vec<String>, MailboxError> {
            self.record(Call::ListUnread);
            Ok(self.messages.iter().map(|m| m.id.clone()).collect())
        }

        async fn get_message(&self, id: &str) -> Result<Message, MailboxError> {
            self.record(Call::GetMessage(id.to_string()));
            if self.fail_get {
                return Err(Self::provider_down());
            }
            self.messages
                .iter()
                .find(|m| m.id == id)
                .cloned()
                .ok_or_else(Self::provider_down)
        }

        async fn send_message(&self, raw: &str) -> Result<(), MailboxError> {
            self.record(Call::Send(raw.to_string()));
            if self.fail_send {
                return Err(Self::provider_down());
            }
            Ok(())
        }

        async fn modify_labels(
            &self,
            id: &str,
            add: Vec<String>,
            remove: Vec<String>,
        ) -> Result<(), MailboxError> {
            self.record(Call::Modify {
                id: id.to_string(),
                add,
                remove,
            });
            if self.fail_modify {
                return Err(Self::provider_down());
            }
            Ok(())
        }
    }

    fn unanswered(id: &str, from: &str, subject: &str) -> Message {
        Message {
            id: id.to_string(),
            from_address: Some(from.to_string()),
            subject: Some(subject.to_string()),
            ..Default::default()
        }
    }

    fn answered(id: &str) -> Message {
        Message {
            in_reply_to: Some("<earlier@example.com>".to_string()),
            ..unanswered(id, "bob@example.com", "Old thread")
        }
    }

    // ── Label resolution ────────────────────────────────────────────

    #[tokio::test]
    async fn resolve_creates_label_when_absent() {
        let mailbox = MockMailbox::default();
        let id = resolve_label(&mailbox, "Vacation Responder").await.unwrap();
        assert_eq!(id, "L1");
        assert_eq!(
            mailbox.calls(),
            vec![Call::CreateLabel("Vacation Responder".to_string())]
        );
    }

    #[tokio::test]
    async fn resolve_is_idempotent_across_restart() {
        let mailbox = MockMailbox::default();
        let first = resolve_label(&mailbox, "Vacation Responder").await.unwrap();
        // Second resolution simulates a process restart against the same
        // account: the create now conflicts and the list path must recover
        // the identical id.
        let second = resolve_label(&mailbox, "Vacation Responder").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(
            mailbox.calls()[1..],
            [
                Call::CreateLabel("Vacation Responder".to_string()),
                Call::ListLabels,
            ]
        );
    }

    #[tokio::test]
    async fn resolve_conflict_reuses_existing_id() {
        let mailbox = MockMailbox::default();
        mailbox.labels.lock().unwrap().push(Label {
            id: "L123".to_string(),
            name: "Vacation Responder".to_string(),
        });
        let id = resolve_label(&mailbox, "Vacation Responder").await.unwrap();
        assert_eq!(id, "L123");
    }

    #[tokio::test]
    async fn resolve_conflict_without_listed_label_is_surfaced() {
        let mailbox = MockMailbox {
            force_conflict: true,
            ..Default::default()
        };
        let err = resolve_label(&mailbox, "Vacation Responder")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ResponderError::LabelConflictUnresolved { .. }
        ));
    }

    // ── Classification ──────────────────────────────────────────────

    #[test]
    fn fresh_thread_needs_reply() {
        assert!(needs_reply(&unanswered("a", "alice@example.com", "Hi")));
    }

    #[test]
    fn answered_thread_needs_no_reply() {
        assert!(!needs_reply(&answered("b")));
    }

    // ── Poll cycle ──────────────────────────────────────────────────

    #[tokio::test]
    async fn empty_inbox_tick_makes_no_further_calls() {
        let mailbox = MockMailbox::default();
        run_tick(&mailbox, "L1", "away").await.unwrap();
        assert_eq!(mailbox.calls(), vec![Call::ListUnread]);
    }

    #[tokio::test]
    async fn tick_answers_only_the_unanswered_message() {
        let mailbox = MockMailbox::with_messages(vec![
            unanswered("a", "alice@example.com", "Hi there"),
            answered("b"),
        ]);
        run_tick(&mailbox, "L9", "away").await.unwrap();

        let calls = mailbox.calls();
        assert_eq!(calls[0], Call::ListUnread);
        assert_eq!(calls[1], Call::GetMessage("a".to_string()));

        // Exactly one send, addressed to A's sender, before exactly one
        // relabel of A; B is fetched but otherwise untouched.
        let sends: Vec<_> = calls
            .iter()
            .filter_map(|c| match c {
                Call::Send(raw) => Some(raw.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(sends.len(), 1);
        assert!(sends[0].starts_with("To: alice@example.com\r\n"));
        assert!(sends[0].contains("Subject: Re: Hi there\r\n"));

        let send_pos = calls.iter().position(|c| matches!(c, Call::Send(_))).unwrap();
        let modify_pos = calls
            .iter()
            .position(|c| matches!(c, Call::Modify { .. }))
            .unwrap();
        assert!(send_pos < modify_pos);
        assert_eq!(
            calls[modify_pos],
            Call::Modify {
                id: "a".to_string(),
                add: vec!["L9".to_string()],
                remove: vec!["INBOX".to_string()],
            }
        );

        assert_eq!(calls.last(), Some(&Call::GetMessage("b".to_string())));
        assert_eq!(calls.len(), 5);
    }

    #[tokio::test]
    async fn send_failure_prevents_relabel_and_aborts_tick() {
        let mailbox = MockMailbox {
            fail_send: true,
            ..MockMailbox::with_messages(vec![
                unanswered("a", "alice@example.com", "Hi"),
                unanswered("b", "bob@example.com", "Hello"),
            ])
        };
        let err = run_tick(&mailbox, "L1", "away").await.unwrap_err();
        assert!(matches!(err, ResponderError::Mailbox(_)));

        let calls = mailbox.calls();
        assert!(calls.iter().any(|c| matches!(c, Call::Send(_))));
        assert!(!calls.iter().any(|c| matches!(c, Call::Modify { .. })));
        // The second message is never reached.
        assert!(!calls.contains(&Call::GetMessage("b".to_string())));
    }

    #[tokio::test]
    async fn relabel_failure_after_send_is_surfaced() {
        let mailbox = MockMailbox {
            fail_modify: true,
            ..MockMailbox::with_messages(vec![unanswered("a", "alice@example.com", "Hi")])
        };
        let err = run_tick(&mailbox, "L1", "away").await.unwrap_err();
        assert!(matches!(err, ResponderError::Mailbox(_)));
        // The reply did go out; only the relabel failed.
        assert!(mailbox.calls().iter().any(|c| matches!(c, Call::Send(_))));
    }

    #[tokio::test]
    async fn fetch_failure_aborts_tick_without_sending() {
        let mailbox = MockMailbox {
            fail_get: true,
            ..MockMailbox::with_messages(vec![unanswered("a", "alice@example.com", "Hi")])
        };
        let err = run_tick(&mailbox, "L1", "away").await.unwrap_err();
        assert!(matches!(err, ResponderError::Mailbox(_)));
        assert!(!mailbox.calls().iter().any(|c| matches!(c, Call::Send(_))));
    }

    #[tokio::test]
    async fn message_without_from_is_skipped_and_tick_continues() {
        let mut headless = unanswered("a", "alice@example.com", "Hi");
        headless.from_address = None;
        let mailbox = MockMailbox::with_messages(vec![
            headless,
            unanswered("b", "bob@example.com", "Hello"),
        ]);
        run_tick(&mailbox, "L1", "away").await.unwrap();

        let calls = mailbox.calls();
        let sends: Vec<_> = calls
            .iter()
            .filter(|c| matches!(c, Call::Send(_)))
            .collect();
        assert_eq!(sends.len(), 1);
        assert!(calls.contains(&Call::Modify {
            id: "b".to_string(),
            add: vec!["L1".to_string()],
            remove: vec!["INBOX".to_string()],
        }));
        assert!(!calls.iter().any(|c| matches!(c, Call::Modify { id, .. } if id == "a")));
    }

    // ── Scheduling ──────────────────────────────────────────────────

    #[test]
    fn delays_stay_in_bounds_and_vary() {
        let config = Config::default();
        let mut rng = rand::thread_rng();
        let draws: Vec<u64> = (0..200)
            .map(|_| next_delay(&mut rng, &config).as_secs())
            .collect();
        assert!(draws.iter().all(|&s| (45..=120).contains(&s)));
        let first = draws[0];
        assert!(draws.iter().any(|&s| s != first));
    }
}
