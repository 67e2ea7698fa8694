//! Request details shown in the details modal

use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph, Widget, Wrap},
};

use crate::models::{Contract, Conversation};
use crate::ui::conversation::header::{HeaderControl, control_spans, status_controls};
use crate::ui::conversation::prompts::centered_rect;

/// "Your request" modal body
pub struct RequestDetailsModal<'a> {
    conversation: &'a Conversation,
    selected: Option<usize>,
}

impl<'a> RequestDetailsModal<'a> {
    pub fn new(conversation: &'a Conversation) -> Self {
        Self {
            conversation,
            selected: None,
        }
    }

    pub fn selected(mut self, selected: Option<usize>) -> Self {
        self.selected = selected;
        self
    }

    /// Controls offered in the modal; unlike the header, cancelling is allowed
    pub fn controls(&self) -> Vec<HeaderControl> {
        status_controls(self.conversation, true)
    }

    pub fn detail_lines(&self) -> Vec<Line<'static>> {
        let label = Style::default().fg(Color::Gray);
        let mut lines = vec![Line::from(vec![Span::styled(
            "Your request",
            Style::default().add_modifier(Modifier::BOLD),
        )])];

        let record = self.conversation.conversationable.clone().unwrap_or_default();

        if let Some(title) = record.listing_title {
            lines.push(Line::from(vec![
                Span::styled("Listing:  ", label),
                Span::raw(title),
            ]));
        }
        if let Some(status) = self.conversation.request_status() {
            lines.push(Line::from(vec![
                Span::styled("Status:   ", label),
                Span::styled(status.display_name(), Style::default().fg(Color::Yellow)),
            ]));
        }
        if let (Some(check_in), Some(check_out)) = (record.check_in, record.check_out) {
            let nights = (check_out - check_in).num_days();
            lines.push(Line::from(vec![
                Span::styled("Stay:     ", label),
                Span::raw(format!(
                    "{} → {} ({} nights)",
                    check_in.format("%b %d, %Y"),
                    check_out.format("%b %d, %Y"),
                    nights
                )),
            ]));
        }
        if let Some(guests) = record.guests {
            lines.push(Line::from(vec![
                Span::styled("Guests:   ", label),
                Span::raw(guests.to_string()),
            ]));
        }
        let contract = self.conversation.contract.as_ref();
        if let Some(total) = contract.and_then(Contract::formatted_total) {
            lines.push(Line::from(vec![
                Span::styled("Total:    ", label),
                Span::raw(total),
            ]));
        }

        lines
    }
}

impl Widget for RequestDetailsModal<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let popup = centered_rect(70, 14, area);
        Clear.render(popup, buf);

        let block = Block::default()
            .borders(Borders::ALL)
            .title("Details · Esc to close")
            .style(Style::default().fg(Color::White));

        let mut lines = self.detail_lines();
        let controls = self.controls();
        if !controls.is_empty() {
            lines.push(Line::from(""));
            lines.push(Line::from(control_spans(&controls, self.selected)));
        }

        Paragraph::new(lines)
            .block(block)
            .wrap(Wrap { trim: false })
            .render(popup, buf);
    }
}
