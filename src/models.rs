//! Records exchanged with the conversation API.
//!
//! The API is allowed to send partially populated records (a message without
//! its sender, a sender without an avatar). Every nested field is therefore
//! optional and the accessors below substitute defaults at the read site.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumIter, EnumString, IntoEnumIterator, IntoStaticStr};

pub type MessageId = u64;
pub type UserId = u64;
pub type ConversationId = u64;
pub type RequestId = u64;

/// `conversationable_type` value of conversations attached to a booking request.
pub const REQUEST_ENTITY: &str = "Request";

/// Avatar image references
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Avatar {
    #[serde(default)]
    pub medium: Option<String>,
    #[serde(default)]
    pub thumb: Option<String>,
}

/// Author of a message
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sender {
    #[serde(default)]
    pub id: Option<UserId>,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub avatar: Option<Avatar>,
}

/// A single chat message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    #[serde(default)]
    pub sender: Option<Sender>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub is_read: bool,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl Message {
    pub fn sender_id(&self) -> Option<UserId> {
        self.sender.as_ref().and_then(|sender| sender.id)
    }

    pub fn sender_name(&self) -> Option<&str> {
        self.sender.as_ref()?.full_name.as_deref()
    }

    pub fn avatar_path(&self) -> Option<&str> {
        self.sender.as_ref()?.avatar.as_ref()?.medium.as_deref()
    }

    pub fn body(&self) -> &str {
        self.body.as_deref().unwrap_or("")
    }

    /// Element id used to anchor the message in the rendered list
    pub fn element_id(&self) -> String {
        format!("message-{}", self.id)
    }
}

/// The user viewing the conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentUser {
    pub id: UserId,
    #[serde(default)]
    pub full_name: Option<String>,
}

/// Lifecycle of a booking request
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    EnumString,
    EnumIter,
    AsRefStr,
    IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    Accepted,
    Declined,
    Canceled,
    Completed,
    #[serde(other)]
    Unknown,
}

impl RequestStatus {
    pub fn display_name(self) -> &'static str {
        match self {
            RequestStatus::Pending => "Pending",
            RequestStatus::Accepted => "Accepted",
            RequestStatus::Declined => "Declined",
            RequestStatus::Canceled => "Canceled",
            RequestStatus::Completed => "Completed",
            RequestStatus::Unknown => "Unknown",
        }
    }

    /// Label of the control that moves a request into this status
    pub fn action_label(self) -> &'static str {
        match self {
            RequestStatus::Pending => "Reopen",
            RequestStatus::Accepted => "Accept",
            RequestStatus::Declined => "Decline",
            RequestStatus::Canceled => "Cancel request",
            RequestStatus::Completed => "Mark completed",
            RequestStatus::Unknown => "",
        }
    }

    /// Wire value sent to the status endpoint
    pub fn as_param(self) -> &'static str {
        self.into()
    }

    /// Statuses a request may be moved to from this one
    pub fn transitions(self, allow_cancel: bool) -> Vec<RequestStatus> {
        RequestStatus::iter()
            .filter(|next| match (self, *next) {
                (RequestStatus::Pending, RequestStatus::Accepted)
                | (RequestStatus::Pending, RequestStatus::Declined)
                | (RequestStatus::Accepted, RequestStatus::Completed) => true,
                (RequestStatus::Pending | RequestStatus::Accepted, RequestStatus::Canceled) => {
                    allow_cancel
                }
                _ => false,
            })
            .collect()
    }
}

/// The entity a conversation is attached to. Only requests are modelled in
/// detail; other kinds keep just their id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationableRecord {
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub status: Option<RequestStatus>,
    #[serde(default)]
    pub check_in: Option<NaiveDate>,
    #[serde(default)]
    pub check_out: Option<NaiveDate>,
    #[serde(default)]
    pub guests: Option<u32>,
    #[serde(default)]
    pub listing_title: Option<String>,
    #[serde(default)]
    pub listing_awaiting_approval: bool,
}

/// A conversation between the parties of a booking
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: ConversationId,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub conversationable_type: Option<String>,
    #[serde(default)]
    pub conversationable: Option<ConversationableRecord>,
    /// Price agreement of the booking, when one exists
    #[serde(default)]
    pub contract: Option<Contract>,
}

impl Conversation {
    pub fn is_request(&self) -> bool {
        self.conversationable_type.as_deref() == Some(REQUEST_ENTITY)
    }

    pub fn request_id(&self) -> Option<RequestId> {
        self.conversationable.as_ref()?.id
    }

    pub fn request_status(&self) -> Option<RequestStatus> {
        if !self.is_request() {
            return None;
        }
        self.conversationable.as_ref()?.status
    }

    pub fn awaits_listing_approval(&self) -> bool {
        self.conversationable
            .as_ref()
            .map(|record| record.listing_awaiting_approval)
            .unwrap_or(false)
    }

    pub fn title(&self) -> &str {
        self.title.as_deref().unwrap_or("Conversation")
    }
}

/// Price agreement shown in the details modal
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Contract {
    #[serde(default)]
    pub total_price: Option<f64>,
    #[serde(default)]
    pub currency: Option<String>,
}

impl Contract {
    pub fn formatted_total(&self) -> Option<String> {
        let total = self.total_price?;
        let currency = self.currency.as_deref().unwrap_or("USD");
        Some(format!("{:.2} {}", total, currency))
    }
}
