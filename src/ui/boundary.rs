//! Isolation of render-time panics.
//!
//! A component tree is drawn into a scratch buffer; if drawing panics, the
//! boundary keeps the host terminal intact and shows a fallback instead.

use ratatui::{
    buffer::Buffer,
    layout::{Alignment, Rect},
    style::{Color, Style},
    text::Line,
    widgets::{Block, Borders, Paragraph, Widget, Wrap},
};
use std::any::Any;
use std::cell::RefCell;
use std::panic::{self, AssertUnwindSafe};
use tracing::error;

#[derive(Debug, Default)]
pub struct ErrorBoundary {
    failure: RefCell<Option<String>>,
}

impl ErrorBoundary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Message of the panic that tripped the boundary, if any
    pub fn failure(&self) -> Option<String> {
        self.failure.borrow().clone()
    }

    pub fn has_failed(&self) -> bool {
        self.failure.borrow().is_some()
    }

    /// Allow the wrapped tree to render again
    pub fn reset(&self) {
        self.failure.borrow_mut().take();
    }

    /// Draw through `draw`, falling back once it has panicked
    pub fn render<F>(&self, area: Rect, buf: &mut Buffer, draw: F)
    where
        F: FnOnce(Rect, &mut Buffer),
    {
        if !self.has_failed() {
            let mut scratch = Buffer::empty(area);
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| draw(area, &mut scratch)));
            match outcome {
                Ok(()) => {
                    buf.merge(&scratch);
                    return;
                }
                Err(payload) => {
                    let message = panic_message(payload.as_ref());
                    error!("[Boundary] render failed: {}", message);
                    *self.failure.borrow_mut() = Some(message);
                }
            }
        }
        self.render_fallback(area, buf);
    }

    fn render_fallback(&self, area: Rect, buf: &mut Buffer) {
        let detail = self.failure().unwrap_or_default();
        let lines = vec![
            Line::from("Something went wrong while showing this conversation."),
            Line::from(""),
            Line::from(detail),
            Line::from(""),
            Line::from("Press Ctrl+C to leave."),
        ];
        Paragraph::new(lines)
            .alignment(Alignment::Center)
            .wrap(Wrap { trim: true })
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .title("Error")
                    .style(Style::default().fg(Color::Red)),
            )
            .render(area, buf);
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown error".to_string()
    }
}
