use anyhow::{Context, Result};
use serde::Deserialize;

use crate::models::{Conversation, ConversationId, Message, MessageId, UserId};

/// Event name announcing a message posted to the conversation
pub const NEW_MESSAGE_EVENT: &str = "new-message";

/// Event name announcing that messages were read by the other party
pub const MESSAGES_UPDATE_EVENT: &str = "messages-update";

/// Name of the real-time channel carrying events for one conversation
pub fn channel_for(conversation_id: ConversationId) -> String {
    format!("conversation-{}", conversation_id)
}

/// Events delivered on a conversation channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketEvent {
    /// A message was posted; `sender_id` identifies who posted it
    NewMessage {
        message: Message,
        sender_id: Option<UserId>,
    },

    /// The listed messages are now read
    MessagesUpdate { ids: Vec<MessageId> },
}

#[derive(Debug, Deserialize)]
struct NewMessagePayload {
    #[serde(flatten)]
    message: Message,
    #[serde(default)]
    sender_id: Option<UserId>,
}

#[derive(Debug, Deserialize)]
struct MessagesUpdatePayload {
    #[serde(default)]
    conversation_messaged_ids: Vec<MessageId>,
}

impl SocketEvent {
    pub fn name(&self) -> &'static str {
        match self {
            SocketEvent::NewMessage { .. } => NEW_MESSAGE_EVENT,
            SocketEvent::MessagesUpdate { .. } => MESSAGES_UPDATE_EVENT,
        }
    }

    /// Decode an event frame. Unknown event names yield `None`.
    pub fn decode(event: &str, data: &str) -> Result<Option<Self>> {
        match event {
            NEW_MESSAGE_EVENT => {
                let payload: NewMessagePayload =
                    serde_json::from_str(data).context("Failed to parse new-message payload")?;
                let sender_id = payload.sender_id.or(payload.message.sender_id());
                Ok(Some(SocketEvent::NewMessage {
                    message: payload.message,
                    sender_id,
                }))
            }
            MESSAGES_UPDATE_EVENT => {
                let payload: MessagesUpdatePayload = serde_json::from_str(data)
                    .context("Failed to parse messages-update payload")?;
                Ok(Some(SocketEvent::MessagesUpdate {
                    ids: payload.conversation_messaged_ids,
                }))
            }
            _ => Ok(None),
        }
    }
}

/// Results reported back to the conversation container by background tasks
/// and by the channel subscription.
#[derive(Debug)]
pub enum Update {
    /// Event received on the subscribed channel
    Socket(SocketEvent),

    /// A page of history finished loading
    PageLoaded {
        page: u32,
        result: Result<Vec<Message>>,
    },

    /// Server copy of an incoming message after it was marked read
    MessageMarkedRead(Message),

    /// Conversation refetched after a mutation
    ConversationFetched(Result<Conversation>),

    /// Outcome of a confirmed request status change
    StatusChangeFinished(Result<()>),

    /// Outcome of a confirmed listing approval
    ListingApproveFinished(Result<()>),
}

/// Terminal events fed to the UI loop
#[derive(Debug, Clone)]
pub enum TuiEvent {
    /// Key press event
    Key(crossterm::event::KeyEvent),

    /// Paste event
    Paste(String),

    /// Terminal resize
    Resize(u16, u16),
}

impl TuiEvent {
    pub fn from_crossterm(event: crossterm::event::Event) -> Option<Self> {
        match event {
            crossterm::event::Event::Key(key) => Some(TuiEvent::Key(key)),
            crossterm::event::Event::Paste(text) => Some(TuiEvent::Paste(text)),
            crossterm::event::Event::Resize(width, height) => Some(TuiEvent::Resize(width, height)),
            _ => None,
        }
    }
}
