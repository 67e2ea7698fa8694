//! Conversation room components

pub mod composer;
pub mod container;
pub mod header;
pub mod history;
pub mod message;
pub mod prompts;
pub mod status;

pub use composer::{ComposerResult, ConversationComposer, FocusHandle};
pub use container::{ContainerAction, ContainerOptions, ConversationContainer, Focus};
pub use header::{ConversationHeaderPanel, HeaderAction, HeaderControl};
pub use history::{HistoryView, MessageHistory};
pub use message::MessageView;
pub use prompts::{Prompt, PromptAnswer, TermsView};
pub use status::RequestDetailsModal;
