use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Widget},
};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Result returned when the user interacts with the composer
#[derive(Debug, PartialEq)]
pub enum ComposerResult {
    /// Non-empty text to send; the composer is already cleared
    Submitted(String),
    /// The info action was pressed
    ShowTerms,
    None,
}

/// State for the text area within the composer
#[derive(Debug, Clone, Default)]
pub struct TextAreaState {
    pub content: String,
    /// Byte offset, always on a char boundary
    pub cursor_position: usize,
}

/// Focus held by the owner of a mounted composer. Dropping it releases focus.
#[derive(Debug)]
pub struct FocusHandle {
    flag: Arc<AtomicBool>,
}

impl Drop for FocusHandle {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

/// Message composer below the history
#[derive(Debug)]
pub struct ConversationComposer {
    state: TextAreaState,
    placeholder: String,
    focus: Arc<AtomicBool>,
    max_rows: u16,
}

impl ConversationComposer {
    pub fn new(placeholder: impl Into<String>, max_rows: u16) -> Self {
        Self {
            state: TextAreaState::default(),
            placeholder: placeholder.into(),
            focus: Arc::new(AtomicBool::new(false)),
            max_rows: max_rows.max(1),
        }
    }

    /// Take keyboard focus until the returned handle is dropped
    pub fn acquire_focus(&self) -> FocusHandle {
        self.focus.store(true, Ordering::SeqCst);
        FocusHandle {
            flag: self.focus.clone(),
        }
    }

    pub fn has_focus(&self) -> bool {
        self.focus.load(Ordering::SeqCst)
    }

    /// Handle key input
    pub fn handle_key(&mut self, key: KeyEvent) -> ComposerResult {
        if key.kind != KeyEventKind::Press {
            return ComposerResult::None;
        }

        match key.code {
            KeyCode::Enter => {
                if key.modifiers.contains(KeyModifiers::SHIFT) {
                    self.insert_char('\n');
                } else {
                    return self.submit();
                }
            }
            KeyCode::F(1) => return ComposerResult::ShowTerms,
            KeyCode::Char(c) => {
                self.insert_char(c);
            }
            KeyCode::Backspace => {
                if let Some(previous) = self.previous_boundary() {
                    self.state.content.remove(previous);
                    self.state.cursor_position = previous;
                }
            }
            KeyCode::Delete => {
                if self.state.cursor_position < self.state.content.len() {
                    self.state.content.remove(self.state.cursor_position);
                }
            }
            KeyCode::Left => {
                if let Some(previous) = self.previous_boundary() {
                    self.state.cursor_position = previous;
                }
            }
            KeyCode::Right => {
                if let Some(next) = self.next_boundary() {
                    self.state.cursor_position = next;
                }
            }
            KeyCode::Home => {
                self.state.cursor_position = 0;
            }
            KeyCode::End => {
                self.state.cursor_position = self.state.content.len();
            }
            _ => {}
        }

        ComposerResult::None
    }

    /// Send the current text. Blank text is left untouched.
    pub fn submit(&mut self) -> ComposerResult {
        if self.state.content.trim().is_empty() {
            return ComposerResult::None;
        }
        let content = std::mem::take(&mut self.state.content);
        self.state.cursor_position = 0;
        ComposerResult::Submitted(content)
    }

    /// Insert pasted text at the cursor
    pub fn paste(&mut self, text: &str) {
        self.state.content.insert_str(self.state.cursor_position, text);
        self.state.cursor_position += text.len();
    }

    /// Replace the whole text, as an input change event does
    pub fn set_content(&mut self, content: impl Into<String>) {
        self.state.content = content.into();
        self.state.cursor_position = self.state.content.len();
    }

    pub fn content(&self) -> &str {
        &self.state.content
    }

    pub fn clear(&mut self) {
        self.state = TextAreaState::default();
    }

    /// Visible text rows, growing with content up to the configured maximum
    pub fn rows(&self) -> u16 {
        let lines = self.state.content.split('\n').count() as u16;
        lines.clamp(1, self.max_rows)
    }

    /// Total height including borders
    pub fn height(&self) -> u16 {
        self.rows() + 2
    }

    fn insert_char(&mut self, c: char) {
        self.state.content.insert(self.state.cursor_position, c);
        self.state.cursor_position += c.len_utf8();
    }

    fn previous_boundary(&self) -> Option<usize> {
        self.state.content[..self.state.cursor_position]
            .char_indices()
            .next_back()
            .map(|(index, _)| index)
    }

    fn next_boundary(&self) -> Option<usize> {
        self.state.content[self.state.cursor_position..]
            .chars()
            .next()
            .map(|c| self.state.cursor_position + c.len_utf8())
    }
}

impl Widget for &ConversationComposer {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let has_focus = self.has_focus();
        let block = Block::default()
            .borders(Borders::ALL)
            .title("Message · Enter send · Shift+Enter newline · F1 terms")
            .style(if has_focus {
                Style::default().fg(Color::Green)
            } else {
                Style::default().fg(Color::Gray)
            });

        let inner_area = block.inner(area);
        block.render(area, buf);

        if self.state.content.is_empty() {
            let placeholder_line = Line::from(vec![Span::styled(
                self.placeholder.as_str(),
                Style::default().fg(Color::DarkGray),
            )]);
            buf.set_line(inner_area.x, inner_area.y, &placeholder_line, inner_area.width);
            return;
        }

        let mut content = self.state.content.clone();
        if has_focus {
            content.insert(self.state.cursor_position.min(content.len()), '▌');
        }

        // Keep the line holding the cursor visible
        let lines: Vec<&str> = content.split('\n').collect();
        let cursor_line = self.state.content[..self.state.cursor_position]
            .matches('\n')
            .count();
        let height = inner_area.height as usize;
        let start = (cursor_line + 1).saturating_sub(height);

        for (i, line_text) in lines.iter().skip(start).take(height).enumerate() {
            let line = Line::from(vec![Span::raw(*line_text)]);
            buf.set_line(inner_area.x, inner_area.y + i as u16, &line, inner_area.width);
        }
    }
}
