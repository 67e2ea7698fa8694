//! Terminal conversation room for booking requests.
//!
//! Renders a conversation's messages, keeps them live over a real-time
//! channel, pages older history in, and drives the request status and
//! listing approval flows.

pub mod api;
pub mod config;
pub mod events;
pub mod logging;
pub mod models;
pub mod routes;
pub mod socket;
pub mod ui;

pub use api::{ConversationApi, HttpConversationApi};
pub use config::Config;
pub use events::{SocketEvent, Update, channel_for};
pub use models::{Contract, Conversation, CurrentUser, Message, RequestStatus};
pub use socket::{LocalSocket, RealtimeSocket, Subscription, WsSocket};
pub use ui::conversation::{ContainerAction, ContainerOptions, ConversationContainer};
