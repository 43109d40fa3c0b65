use std::collections::HashSet;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::snapkeep::database::Database;
use crate::snapkeep::error::Result;

const CONVERSATIONS_BUFFER_SIZE: usize = 64;

/// One captured notification message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageEntity {
    pub id: i64,
    pub client_package: Option<String>,
    /// Capture timestamp in epoch milliseconds.
    pub time: i64,
    pub sender_name: String,
    pub content: String,
}

/// One distinct message sender, with the most recent message as a preview.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    pub name: String,
    pub latest_time: i64,
    pub latest_content: String,
}

/// Outcome of the notification capture path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureResult {
    /// The message was stored under the returned rowid.
    Stored(i64),
    /// An identical (`time`, `sender`, `content`) triple already exists;
    /// nothing was written. Not an error.
    Duplicate,
    /// The sender is blacklisted; the message was dropped before reaching
    /// the store.
    Blacklisted,
}

/// Result of subscribing to the conversation list: the current snapshot
/// plus a receiver that delivers the refreshed list after every mutation.
/// Dropping the receiver is the only teardown required.
pub struct ConversationSubscription {
    pub conversations: Vec<Conversation>,
    pub updates: broadcast::Receiver<Vec<Conversation>>,
}

/// Relational store of captured notification messages.
///
/// Writes serialize through the database's insert-or-ignore semantics, so
/// the (`time`, `sender`, `content`) uniqueness invariant holds under
/// concurrent capture attempts.
pub struct MessageStore {
    database: Arc<Database>,
    changed: broadcast::Sender<Vec<Conversation>>,
    blacklist: RwLock<HashSet<String>>,
}

impl MessageStore {
    pub fn new(database: Arc<Database>) -> Self {
        let (changed, _) = broadcast::channel(CONVERSATIONS_BUFFER_SIZE);
        Self {
            database,
            changed,
            blacklist: RwLock::new(HashSet::new()),
        }
    }

    /// Capture entry point used by the notification-listening collaborator.
    /// Applies the sender blacklist before the store is touched.
    pub async fn capture(
        &self,
        sender_name: &str,
        content: &str,
        client_package: Option<&str>,
        time: i64,
    ) -> Result<CaptureResult> {
        if self.is_blacklisted(sender_name) {
            tracing::debug!(
                target: "snapkeep::messages",
                "Dropping message from blacklisted sender: {}",
                sender_name
            );
            return Ok(CaptureResult::Blacklisted);
        }

        let message = MessageEntity {
            id: 0,
            client_package: client_package.map(str::to_string),
            time,
            sender_name: sender_name.to_string(),
            content: content.to_string(),
        };
        match self.insert(&message).await? {
            0 => Ok(CaptureResult::Duplicate),
            id => Ok(CaptureResult::Stored(id)),
        }
    }

    /// Inserts a message; duplicate triples are ignored and report id 0.
    pub async fn insert(&self, message: &MessageEntity) -> Result<i64> {
        let id = message.insert(&self.database).await?;
        if id != 0 {
            self.notify_changed().await;
        }
        Ok(id)
    }

    pub async fn list_conversations(&self) -> Result<Vec<Conversation>> {
        Ok(Conversation::find_all(&self.database).await?)
    }

    /// Current conversations plus a live update stream.
    pub async fn subscribe_conversations(&self) -> Result<ConversationSubscription> {
        let updates = self.changed.subscribe();
        let conversations = self.list_conversations().await?;
        Ok(ConversationSubscription {
            conversations,
            updates,
        })
    }

    pub async fn list_messages(&self, sender_name: &str) -> Result<Vec<MessageEntity>> {
        Ok(MessageEntity::find_by_sender(sender_name, &self.database).await?)
    }

    pub async fn remove_message(&self, message: &MessageEntity) -> Result<()> {
        if message.delete(&self.database).await? > 0 {
            self.notify_changed().await;
        }
        Ok(())
    }

    pub async fn remove_messages(&self, messages: &[MessageEntity]) -> Result<()> {
        if MessageEntity::delete_many(messages, &self.database).await? > 0 {
            self.notify_changed().await;
        }
        Ok(())
    }

    /// Deletes every message of the given senders in one atomic statement.
    pub async fn delete_conversations(&self, sender_names: &[String]) -> Result<()> {
        if MessageEntity::delete_by_senders(sender_names, &self.database).await? > 0 {
            self.notify_changed().await;
        }
        Ok(())
    }

    pub async fn clear_messages(&self) -> Result<()> {
        if MessageEntity::delete_all(&self.database).await? > 0 {
            self.notify_changed().await;
        }
        Ok(())
    }

    pub fn is_blacklisted(&self, sender_name: &str) -> bool {
        self.blacklist
            .read()
            .expect("blacklist lock poisoned")
            .contains(sender_name)
    }

    pub fn blacklisted_senders(&self) -> HashSet<String> {
        self.blacklist
            .read()
            .expect("blacklist lock poisoned")
            .clone()
    }

    /// Replaces the blacklist wholesale; the embedder's preference layer
    /// owns the durable copy and pushes it in here.
    pub fn set_blacklisted_senders(&self, senders: HashSet<String>) {
        *self.blacklist.write().expect("blacklist lock poisoned") = senders;
    }

    pub fn blacklist_sender(&self, sender_name: &str) {
        self.blacklist
            .write()
            .expect("blacklist lock poisoned")
            .insert(sender_name.to_string());
    }

    async fn notify_changed(&self) {
        if self.changed.receiver_count() == 0 {
            return;
        }
        match self.list_conversations().await {
            Ok(conversations) => {
                let _ = self.changed.send(conversations);
            }
            Err(e) => {
                tracing::warn!(
                    target: "snapkeep::messages",
                    "Failed to refresh conversations for subscribers: {}",
                    e
                );
            }
        }
    }
}
