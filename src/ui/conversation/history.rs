//! Conversation history: message storage, paging and display

use anyhow::Result;
use ratatui::{
    buffer::Buffer,
    layout::{Alignment, Rect},
    style::{Color, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Widget},
};
use std::cell::Cell;
use std::collections::HashSet;
use tracing::{debug, warn};

use crate::models::{CurrentUser, Message, MessageId};
use crate::ui::conversation::message::MessageView;

/// First page requested from the API
pub const FIRST_PAGE: u32 = 1;

/// Messages of one conversation.
///
/// Stored newest first: live messages are pushed to the front, older pages
/// are appended to the back. Reversing yields chronological order without
/// any sorting.
#[derive(Debug)]
pub struct MessageHistory {
    messages: Vec<Message>,
    loading: bool,
    fetch_in_flight: bool,
    next_page: u32,
    scroll_offset: usize,
    max_scroll: Cell<usize>,
}

impl Default for MessageHistory {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageHistory {
    pub fn new() -> Self {
        Self {
            messages: Vec::new(),
            loading: true,
            fetch_in_flight: false,
            next_page: FIRST_PAGE,
            scroll_offset: 0,
            max_scroll: Cell::new(0),
        }
    }

    /// Whether more pages may exist
    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn is_fetching(&self) -> bool {
        self.fetch_in_flight
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Messages in display order, oldest first
    pub fn chronological(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter().rev()
    }

    /// Add a live message as the newest one. The scroll position is kept,
    /// so a reader of older history is not pulled to the bottom.
    pub fn receive(&mut self, message: Message) {
        self.messages.insert(0, message);
    }

    /// Claim the next page to fetch, if paging is still open and idle
    pub fn begin_fetch(&mut self) -> Option<u32> {
        if !self.loading || self.fetch_in_flight {
            return None;
        }
        self.fetch_in_flight = true;
        Some(self.next_page)
    }

    /// Apply a page result. A full page keeps paging open; a short page or
    /// an error closes it for good.
    pub fn apply_page(&mut self, page: u32, result: Result<Vec<Message>>, page_size: usize) {
        self.fetch_in_flight = false;
        match result {
            Ok(messages) => {
                debug!("[History] page {} returned {} messages", page, messages.len());
                self.loading = messages.len() == page_size;
                self.messages.extend(messages);
                self.next_page = page + 1;
            }
            Err(e) => {
                warn!("[History] page {} failed, paging stopped: {:#}", page, e);
                self.loading = false;
            }
        }
    }

    /// Flip the read flag of every listed message, keeping order
    pub fn mark_read(&mut self, ids: &[MessageId]) -> usize {
        let ids: HashSet<MessageId> = ids.iter().copied().collect();
        let mut changed = 0;
        for message in self.messages.iter_mut().filter(|m| ids.contains(&m.id)) {
            if !message.is_read {
                changed += 1;
            }
            message.is_read = true;
        }
        changed
    }

    /// Scroll towards older messages. Returns true when the top is reached,
    /// which is where the next page should be requested.
    pub fn scroll_up(&mut self, lines: usize) -> bool {
        let max = self.max_scroll.get();
        self.scroll_offset = (self.scroll_offset + lines).min(max);
        self.scroll_offset >= max
    }

    pub fn scroll_down(&mut self, lines: usize) {
        self.scroll_offset = self.scroll_offset.saturating_sub(lines);
    }

    /// Lines scrolled up from the bottom
    pub fn scroll_offset(&self) -> usize {
        self.scroll_offset
    }

    pub fn scroll_to_bottom(&mut self) {
        self.scroll_offset = 0;
    }

    /// Forget everything, as on unmount
    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

/// Renders a `MessageHistory` for a viewer
pub struct HistoryView<'a> {
    history: &'a MessageHistory,
    viewer: &'a CurrentUser,
    show_timestamps: bool,
}

impl<'a> HistoryView<'a> {
    pub fn new(history: &'a MessageHistory, viewer: &'a CurrentUser) -> Self {
        Self {
            history,
            viewer,
            show_timestamps: true,
        }
    }

    pub fn show_timestamps(mut self, show: bool) -> Self {
        self.show_timestamps = show;
        self
    }

    fn all_lines(&self, width: u16) -> Vec<Line<'static>> {
        let mut all_lines: Vec<Line<'static>> = Vec::new();

        if self.history.loading {
            all_lines.push(
                Line::from(vec![Span::styled(
                    "Loading earlier messages…",
                    Style::default().fg(Color::Yellow),
                )])
                .alignment(Alignment::Center),
            );
        } else if self.history.is_empty() {
            all_lines.push(
                Line::from(vec![Span::styled(
                    "No messages yet. Say hello!",
                    Style::default().fg(Color::Gray),
                )])
                .alignment(Alignment::Center),
            );
        }

        for message in self.history.chronological() {
            let view = MessageView::new(self.viewer, message).show_timestamp(self.show_timestamps);
            all_lines.extend(view.lines(width));
            // spacing between messages
            all_lines.push(Line::from(""));
        }
        all_lines
    }
}

impl Widget for HistoryView<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let block = Block::default().borders(Borders::ALL);
        let inner_area = block.inner(area);
        block.render(area, buf);

        let all_lines = self.all_lines(inner_area.width);

        // Determine the range of lines to display from the bottom
        let height = inner_area.height as usize;
        let total = all_lines.len();
        let max_scroll = total.saturating_sub(height);
        self.history.max_scroll.set(max_scroll);

        let offset = self.history.scroll_offset.min(max_scroll);
        let end = total - offset;
        let start = end.saturating_sub(height);
        let visible: Vec<Line<'static>> = all_lines[start..end].to_vec();

        Paragraph::new(visible).render(inner_area, buf);
    }
}
