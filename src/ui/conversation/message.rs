//! Single chat message bubble

use chrono::{DateTime, Local, Utc};
use ratatui::{
    layout::Alignment,
    style::{Color, Modifier, Style},
    text::{Line, Span},
};

use crate::models::{CurrentUser, Message};
use crate::ui::wrap_text;

pub const SEEN_COLOR: Color = Color::Rgb(0x0C, 0x96, 0x96);
pub const DELIVERED_COLOR: Color = Color::Rgb(0x72, 0x72, 0x72);

/// Renders one message as seen by `viewer`.
///
/// Messages sent by the viewer are mirrored to the right, labelled "You" and
/// carry a Seen/Delivered indicator.
#[derive(Clone, Copy)]
pub struct MessageView<'a> {
    viewer: &'a CurrentUser,
    message: &'a Message,
    show_timestamp: bool,
}

impl<'a> MessageView<'a> {
    pub fn new(viewer: &'a CurrentUser, message: &'a Message) -> Self {
        Self {
            viewer,
            message,
            show_timestamp: true,
        }
    }

    pub fn show_timestamp(mut self, show: bool) -> Self {
        self.show_timestamp = show;
        self
    }

    pub fn is_own(&self) -> bool {
        self.message.sender_id() == Some(self.viewer.id)
    }

    /// Name shown above the body; "You" for the viewer's own messages
    pub fn display_name(&self) -> Option<&'a str> {
        if self.is_own() {
            Some("You")
        } else {
            self.message.sender_name()
        }
    }

    /// Read indicator, only for the viewer's own messages
    pub fn status_label(&self) -> Option<&'static str> {
        if !self.is_own() {
            return None;
        }
        Some(if self.message.is_read { "Seen" } else { "Delivered" })
    }

    pub fn status_color(&self) -> Color {
        if self.message.is_read {
            SEEN_COLOR
        } else {
            DELIVERED_COLOR
        }
    }

    /// Avatar reference, or the sender's initials when there is none
    pub fn avatar_label(&self) -> String {
        if let Some(path) = self.message.avatar_path() {
            return path.to_string();
        }
        let initials: String = self
            .message
            .sender_name()
            .unwrap_or("")
            .split_whitespace()
            .filter_map(|part| part.chars().next())
            .take(2)
            .collect();
        if initials.is_empty() {
            "?".to_string()
        } else {
            initials.to_uppercase()
        }
    }

    /// "HH:MM" for today, "Mon DD, HH:MM" otherwise
    pub fn timestamp_label(&self, now: DateTime<Local>) -> String {
        let Some(created_at) = self.message.created_at else {
            return String::new();
        };
        format_message_time(created_at, now)
    }

    pub fn lines(&self, width: u16) -> Vec<Line<'static>> {
        let own = self.is_own();
        let alignment = if own { Alignment::Right } else { Alignment::Left };

        let name = Span::styled(
            self.display_name().unwrap_or("").to_string(),
            Style::default().add_modifier(Modifier::BOLD),
        );
        let avatar = Span::styled(
            format!("[{}]", self.avatar_label()),
            Style::default().fg(Color::Cyan),
        );
        let date = if self.show_timestamp {
            Span::styled(
                self.timestamp_label(Local::now()),
                Style::default().fg(Color::DarkGray),
            )
        } else {
            Span::raw("")
        };

        let header = if own {
            vec![date, Span::raw("  "), name, Span::raw(" "), avatar]
        } else {
            vec![avatar, Span::raw(" "), name, Span::raw("  "), date]
        };

        let mut lines = vec![Line::from(header).alignment(alignment)];

        let body_width = width.saturating_sub(4) as usize;
        for text in wrap_text(self.message.body(), body_width) {
            lines.push(Line::from(vec![Span::raw(text)]).alignment(alignment));
        }

        if let Some(status) = self.status_label() {
            lines.push(
                Line::from(vec![Span::styled(
                    status,
                    Style::default().fg(self.status_color()),
                )])
                .alignment(Alignment::Right),
            );
        }

        lines
    }

}

/// Format a message time relative to `now`
pub fn format_message_time(created_at: DateTime<Utc>, now: DateTime<Local>) -> String {
    let local = created_at.with_timezone(&Local);
    if local.date_naive() == now.date_naive() {
        local.format("%H:%M").to_string()
    } else {
        local.format("%b %d, %H:%M").to_string()
    }
}
