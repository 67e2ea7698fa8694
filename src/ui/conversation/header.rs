//! Conversation header with request controls

use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Widget},
};

use crate::models::{Conversation, RequestStatus};
use crate::routes;

/// A control the user can activate in the header or the details modal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderControl {
    ChangeStatus(RequestStatus),
    ApproveListing,
    ShowDetails,
    Close,
}

impl HeaderControl {
    pub fn label(&self) -> &'static str {
        match self {
            HeaderControl::ChangeStatus(status) => status.action_label(),
            HeaderControl::ApproveListing => "Approve listing",
            HeaderControl::ShowDetails => "Show Details",
            HeaderControl::Close => "✕",
        }
    }
}

/// What activating a control asks the owner to do
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderAction {
    RequestStatusChange(RequestStatus),
    ApproveListing,
    ToggleDetails,
    /// Leave the room for the given route
    Navigate(String),
}

/// Status and approval controls for a conversation's request
pub fn status_controls(conversation: &Conversation, allow_request_cancel: bool) -> Vec<HeaderControl> {
    let mut controls: Vec<HeaderControl> = conversation
        .request_status()
        .map(|status| status.transitions(allow_request_cancel))
        .unwrap_or_default()
        .into_iter()
        .map(HeaderControl::ChangeStatus)
        .collect();

    if conversation.awaits_listing_approval() {
        controls.push(HeaderControl::ApproveListing);
    }
    controls
}

/// Header above the message list. Holds no state; the owner tracks which
/// control is selected and reacts to the returned `HeaderAction`.
pub struct ConversationHeaderPanel<'a> {
    conversation: &'a Conversation,
    selected: Option<usize>,
    has_focus: bool,
}

impl<'a> ConversationHeaderPanel<'a> {
    pub fn new(conversation: &'a Conversation) -> Self {
        Self {
            conversation,
            selected: None,
            has_focus: false,
        }
    }

    pub fn selected(mut self, selected: Option<usize>) -> Self {
        self.selected = selected;
        self
    }

    pub fn focused(mut self, has_focus: bool) -> Self {
        self.has_focus = has_focus;
        self
    }

    /// Controls in display order. Cancelling is never offered here.
    pub fn controls(&self) -> Vec<HeaderControl> {
        let mut controls = status_controls(self.conversation, false);
        controls.push(HeaderControl::ShowDetails);
        controls.push(HeaderControl::Close);
        controls
    }

    /// Action for the control at `index`
    pub fn activate(&self, index: usize) -> Option<HeaderAction> {
        self.controls().get(index).map(|control| control_action(*control))
    }
}

/// Map a control to the action it requests
pub fn control_action(control: HeaderControl) -> HeaderAction {
    match control {
        HeaderControl::ChangeStatus(status) => HeaderAction::RequestStatusChange(status),
        HeaderControl::ApproveListing => HeaderAction::ApproveListing,
        HeaderControl::ShowDetails => HeaderAction::ToggleDetails,
        HeaderControl::Close => HeaderAction::Navigate(routes::conversations_path().to_string()),
    }
}

/// Render controls as a row of buttons, highlighting the selected one
pub fn control_spans(controls: &[HeaderControl], selected: Option<usize>) -> Vec<Span<'static>> {
    let mut spans = Vec::new();
    for (index, control) in controls.iter().enumerate() {
        let style = if selected == Some(index) {
            Style::default()
                .fg(Color::Black)
                .bg(Color::Cyan)
                .add_modifier(Modifier::BOLD)
        } else {
            match control {
                HeaderControl::ChangeStatus(RequestStatus::Declined)
                | HeaderControl::ChangeStatus(RequestStatus::Canceled) => {
                    Style::default().fg(Color::Red)
                }
                HeaderControl::ChangeStatus(_) | HeaderControl::ApproveListing => {
                    Style::default().fg(Color::Green)
                }
                _ => Style::default().fg(Color::Gray),
            }
        };
        spans.push(Span::styled(format!("[ {} ]", control.label()), style));
        spans.push(Span::raw(" "));
    }
    spans
}

impl Widget for ConversationHeaderPanel<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let block = Block::default()
            .borders(Borders::ALL)
            .title(format!("💬 {}", self.conversation.title()))
            .style(if self.has_focus {
                Style::default().fg(Color::Green)
            } else {
                Style::default().fg(Color::Gray)
            });

        let inner_area = block.inner(area);
        block.render(area, buf);

        let mut spans = Vec::new();
        if let Some(status) = self.conversation.request_status() {
            spans.push(Span::styled(
                format!("{}  ", status.display_name()),
                Style::default().fg(Color::Yellow),
            ));
        }
        spans.extend(control_spans(&self.controls(), self.selected));

        Paragraph::new(Line::from(spans)).render(inner_area, buf);
    }
}
