//! Confirmation and notice prompts shown over the conversation

use crossterm::event::{KeyCode, KeyEvent, KeyEventKind};
use ratatui::{
    buffer::Buffer,
    layout::{Alignment, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph, Widget, Wrap},
};

use crate::models::RequestStatus;

const CHAT_TERMS: &str = "Keep all communication and payments on the platform. \
Do not share phone numbers, e-mail addresses or external links before a booking is confirmed. \
Messages may be reviewed to keep the community safe. \
Be respectful: harassment or discrimination leads to account suspension.";

/// Prompts of the status-change and listing-approval flows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Prompt {
    ConfirmStatusChange(RequestStatus),
    StatusChanged,
    StatusChangeFailed,
    ConfirmListingApprove,
    ListingApproved,
    ListingApproveFailed,
}

/// How the user closed a prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptAnswer {
    Confirmed,
    Dismissed,
}

impl Prompt {
    pub fn is_confirmation(&self) -> bool {
        matches!(self, Prompt::ConfirmStatusChange(_) | Prompt::ConfirmListingApprove)
    }

    pub fn title(&self) -> &'static str {
        match self {
            Prompt::ConfirmStatusChange(_) => "Change request status?",
            Prompt::StatusChanged => "Status changed",
            Prompt::StatusChangeFailed => "Status not changed",
            Prompt::ConfirmListingApprove => "Approve listing?",
            Prompt::ListingApproved => "Listing approved",
            Prompt::ListingApproveFailed => "Listing not approved",
        }
    }

    pub fn body(&self) -> String {
        match self {
            Prompt::ConfirmStatusChange(status) => format!(
                "The request will be marked as {}. This cannot be undone.",
                status.display_name().to_lowercase()
            ),
            Prompt::StatusChanged => "The request status was updated.".to_string(),
            Prompt::StatusChangeFailed => {
                "Something went wrong while changing the status. Please try again.".to_string()
            }
            Prompt::ConfirmListingApprove => {
                "The listing will be approved for this request.".to_string()
            }
            Prompt::ListingApproved => "The listing was approved.".to_string(),
            Prompt::ListingApproveFailed => {
                "Something went wrong while approving the listing. Please try again.".to_string()
            }
        }
    }

    fn is_failure(&self) -> bool {
        matches!(self, Prompt::StatusChangeFailed | Prompt::ListingApproveFailed)
    }

    /// Interpret a key while this prompt is open
    pub fn answer(&self, key: KeyEvent) -> Option<PromptAnswer> {
        if key.kind != KeyEventKind::Press {
            return None;
        }
        match key.code {
            KeyCode::Char('y') | KeyCode::Char('Y') if self.is_confirmation() => {
                Some(PromptAnswer::Confirmed)
            }
            KeyCode::Enter if self.is_confirmation() => Some(PromptAnswer::Confirmed),
            KeyCode::Enter | KeyCode::Esc => Some(PromptAnswer::Dismissed),
            KeyCode::Char('n') | KeyCode::Char('N') if self.is_confirmation() => {
                Some(PromptAnswer::Dismissed)
            }
            _ => None,
        }
    }
}

/// Area of a popup centred in `area`
pub fn centered_rect(percent_x: u16, height: u16, area: Rect) -> Rect {
    let width = ((area.width as u32 * percent_x as u32 / 100) as u16)
        .max(20)
        .min(area.width);
    let height = height.min(area.height);
    Rect {
        x: area.x + (area.width - width) / 2,
        y: area.y + (area.height - height) / 2,
        width,
        height,
    }
}

impl Widget for Prompt {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let popup = centered_rect(50, 7, area);
        Clear.render(popup, buf);

        let border = if self.is_failure() { Color::Red } else { Color::Cyan };
        let block = Block::default()
            .borders(Borders::ALL)
            .title(self.title())
            .style(Style::default().fg(border));

        let hint = if self.is_confirmation() {
            "[y] Confirm   [n] Cancel"
        } else {
            "[Enter] OK"
        };

        let lines = vec![
            Line::from(self.body()),
            Line::from(""),
            Line::from(vec![Span::styled(
                hint,
                Style::default().add_modifier(Modifier::BOLD),
            )])
            .alignment(Alignment::Center),
        ];

        Paragraph::new(lines)
            .block(block)
            .wrap(Wrap { trim: true })
            .render(popup, buf);
    }
}

/// Chat rules shown from the composer's info action
pub struct TermsView;

impl Widget for TermsView {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let popup = centered_rect(60, 10, area);
        Clear.render(popup, buf);

        let block = Block::default()
            .borders(Borders::ALL)
            .title("Chat terms · Esc to close")
            .style(Style::default().fg(Color::Blue));

        Paragraph::new(CHAT_TERMS)
            .block(block)
            .wrap(Wrap { trim: true })
            .render(popup, buf);
    }
}
