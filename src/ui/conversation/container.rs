//! The conversation room: owns all client-side state of one conversation.

use anyhow::{Context, Result, bail};
use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use ratatui::{
    buffer::Buffer,
    layout::{Constraint, Direction, Layout, Rect},
    widgets::Widget,
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::api::ConversationApi;
use crate::config::Config;
use crate::events::{
    MESSAGES_UPDATE_EVENT, NEW_MESSAGE_EVENT, SocketEvent, TuiEvent, Update, channel_for,
};
use crate::models::{Conversation, CurrentUser, Message, RequestStatus};
use crate::socket::RealtimeSocket;
use crate::ui::ErrorBoundary;
use crate::ui::conversation::composer::{ComposerResult, ConversationComposer, FocusHandle};
use crate::ui::conversation::header::{ConversationHeaderPanel, HeaderAction, control_action};
use crate::ui::conversation::history::{HistoryView, MessageHistory};
use crate::ui::conversation::prompts::{Prompt, PromptAnswer, TermsView};
use crate::ui::conversation::status::RequestDetailsModal;

const SCROLL_STEP: usize = 5;

/// Actions the host must carry out for the container
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContainerAction {
    None,
    /// Leave the room for another route
    Navigate(String),
    Exit,
}

/// Which part of the room receives keys
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Focus {
    Composer,
    Header,
}

/// Tunables taken from configuration
#[derive(Debug, Clone)]
pub struct ContainerOptions {
    pub page_size: usize,
    pub show_timestamps: bool,
    pub composer_max_rows: u16,
}

impl Default for ContainerOptions {
    fn default() -> Self {
        Self {
            page_size: 25,
            show_timestamps: true,
            composer_max_rows: 4,
        }
    }
}

impl From<&Config> for ContainerOptions {
    fn from(config: &Config) -> Self {
        Self {
            page_size: config.page_size,
            show_timestamps: config.ui.show_timestamps,
            composer_max_rows: config.ui.composer_max_rows,
        }
    }
}

/// Resources held while mounted
struct Mounted {
    channel: String,
    forwarder: JoinHandle<()>,
    /// Held while the composer has keyboard focus
    composer_focus: Option<FocusHandle>,
}

/// Manages one conversation: history paging, live events, the composer,
/// request controls and modals.
pub struct ConversationContainer {
    current_user: CurrentUser,
    conversation: Conversation,
    history: MessageHistory,
    composer: ConversationComposer,
    details_open: bool,
    terms_open: bool,
    prompt: Option<Prompt>,
    focus: Focus,
    header_selection: usize,
    details_selection: usize,
    options: ContainerOptions,
    api: Arc<dyn ConversationApi>,
    socket: Arc<dyn RealtimeSocket>,
    updates_tx: mpsc::UnboundedSender<Update>,
    updates_rx: mpsc::UnboundedReceiver<Update>,
    mounted: Option<Mounted>,
    boundary: ErrorBoundary,
}

impl ConversationContainer {
    pub fn new(
        current_user: CurrentUser,
        conversation: Conversation,
        api: Arc<dyn ConversationApi>,
        socket: Arc<dyn RealtimeSocket>,
        options: ContainerOptions,
    ) -> Self {
        let (updates_tx, updates_rx) = mpsc::unbounded_channel();
        let composer = ConversationComposer::new("Type here...", options.composer_max_rows);

        Self {
            current_user,
            conversation,
            history: MessageHistory::new(),
            composer,
            details_open: false,
            terms_open: false,
            prompt: None,
            focus: Focus::Composer,
            header_selection: 0,
            details_selection: 0,
            options,
            api,
            socket,
            updates_tx,
            updates_rx,
            mounted: None,
            boundary: ErrorBoundary::new(),
        }
    }

    /// Subscribe to the conversation channel, focus the composer and load
    /// the first page.
    ///
    /// The channel is chosen once, here. If a refetch later returns another
    /// conversation id the subscription is not moved.
    pub async fn mount(&mut self) -> Result<()> {
        if self.mounted.is_some() {
            warn!("[Room] conversation {} is already mounted", self.conversation.id);
            return Ok(());
        }

        let channel = channel_for(self.conversation.id);
        let mut subscription = self
            .socket
            .subscribe(&channel)
            .await
            .with_context(|| format!("Failed to subscribe to {}", channel))?;
        self.socket.bind(&channel, NEW_MESSAGE_EVENT);
        self.socket.bind(&channel, MESSAGES_UPDATE_EVENT);

        let tx = self.updates_tx.clone();
        let forwarder = tokio::spawn(async move {
            while let Some(event) = subscription.recv().await {
                if tx.send(Update::Socket(event)).is_err() {
                    break;
                }
            }
        });

        info!("[Room] mounted conversation {} on {}", self.conversation.id, channel);
        self.mounted = Some(Mounted {
            channel,
            forwarder,
            composer_focus: None,
        });
        self.set_focus(Focus::Composer);

        self.load_more();
        Ok(())
    }

    /// Unsubscribe and drop all view state. Requests still in flight are not
    /// cancelled; their results are discarded.
    pub async fn unmount(&mut self) -> Result<()> {
        let Some(mounted) = self.mounted.take() else {
            return Ok(());
        };
        mounted.forwarder.abort();

        let (updates_tx, updates_rx) = mpsc::unbounded_channel();
        self.updates_tx = updates_tx;
        self.updates_rx = updates_rx;

        self.history.reset();
        self.composer.clear();
        self.details_open = false;
        self.terms_open = false;
        self.prompt = None;
        self.set_focus(Focus::Composer);
        self.header_selection = 0;
        self.details_selection = 0;

        info!("[Room] unmounted conversation {}", self.conversation.id);
        self.socket
            .unsubscribe(&mounted.channel)
            .await
            .with_context(|| format!("Failed to unsubscribe from {}", mounted.channel))
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted.is_some()
    }

    /// Channel the container listens on while mounted
    pub fn channel(&self) -> Option<&str> {
        self.mounted.as_ref().map(|mounted| mounted.channel.as_str())
    }

    /// Request the next history page if paging is open and idle
    pub fn load_more(&mut self) -> bool {
        let Some(page) = self.history.begin_fetch() else {
            return false;
        };

        let api = self.api.clone();
        let tx = self.updates_tx.clone();
        let conversation_id = self.conversation.id;
        debug!("[Room] fetching page {} of conversation {}", page, conversation_id);
        tokio::spawn(async move {
            let result = api.get_messages(conversation_id, page).await;
            let _ = tx.send(Update::PageLoaded { page, result });
        });
        true
    }

    /// Replace the composer text, as typing does
    pub fn set_input(&mut self, text: impl Into<String>) {
        self.composer.set_content(text);
    }

    pub fn input(&self) -> &str {
        self.composer.content()
    }

    /// Send the composer text. The composer is cleared before the request
    /// goes out and is not restored if it fails.
    pub fn send_message(&mut self) -> bool {
        match self.composer.submit() {
            ComposerResult::Submitted(text) => {
                self.dispatch_send(text);
                true
            }
            _ => false,
        }
    }

    fn dispatch_send(&mut self, text: String) {
        let api = self.api.clone();
        let conversation_id = self.conversation.id;
        tokio::spawn(async move {
            if let Err(e) = api.send_message(conversation_id, &text).await {
                error!("[Room] sending to conversation {} failed: {:#}", conversation_id, e);
            }
        });
    }

    /// Apply one update to the current state
    pub fn handle_update(&mut self, update: Update) {
        match update {
            Update::Socket(SocketEvent::NewMessage { message, sender_id }) => {
                self.receive_new_message(message, sender_id);
            }
            Update::Socket(SocketEvent::MessagesUpdate { ids }) => {
                let changed = self.history.mark_read(&ids);
                debug!("[Room] {} of {} messages marked read", changed, ids.len());
            }
            Update::PageLoaded { page, result } => {
                self.history.apply_page(page, result, self.options.page_size);
            }
            Update::MessageMarkedRead(message) => {
                self.history.receive(message);
            }
            Update::ConversationFetched(Ok(conversation)) => {
                if conversation.id != self.conversation.id {
                    warn!(
                        "[Room] conversation changed from {} to {}; still subscribed to {:?}",
                        self.conversation.id,
                        conversation.id,
                        self.channel()
                    );
                }
                self.conversation = conversation;
                self.clamp_selections();
            }
            Update::ConversationFetched(Err(e)) => {
                warn!("[Room] refreshing conversation failed: {:#}", e);
            }
            Update::StatusChangeFinished(result) => match result {
                Ok(()) => {
                    self.prompt = Some(Prompt::StatusChanged);
                    self.fetch_conversation();
                }
                Err(e) => {
                    warn!("[Room] status change failed: {:#}", e);
                    self.prompt = Some(Prompt::StatusChangeFailed);
                }
            },
            Update::ListingApproveFinished(result) => match result {
                Ok(()) => {
                    self.prompt = Some(Prompt::ListingApproved);
                    self.fetch_conversation();
                }
                Err(e) => {
                    warn!("[Room] listing approval failed: {:#}", e);
                    self.prompt = Some(Prompt::ListingApproveFailed);
                }
            },
        }
    }

    /// Own messages are added as received. Anyone else's message is marked
    /// read first and the server copy is added instead.
    fn receive_new_message(&mut self, message: Message, sender_id: Option<u64>) {
        if sender_id == Some(self.current_user.id) {
            self.history.receive(message);
            return;
        }

        let api = self.api.clone();
        let tx = self.updates_tx.clone();
        let conversation_id = self.conversation.id;
        tokio::spawn(async move {
            match api.mark_message_as_read(conversation_id, message.id).await {
                Ok(updated) => {
                    let _ = tx.send(Update::MessageMarkedRead(updated));
                }
                Err(e) => warn!("[Room] marking message {} read failed: {:#}", message.id, e),
            }
        });
    }

    /// Apply every update that has already arrived
    pub fn process_updates(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(update) = self.updates_rx.try_recv() {
            self.handle_update(update);
            applied += 1;
        }
        applied
    }

    /// Wait for the next update and apply it
    pub async fn next_update(&mut self) -> bool {
        match self.updates_rx.recv().await {
            Some(update) => {
                self.handle_update(update);
                true
            }
            None => false,
        }
    }

    /// Refetch the conversation and replace it wholesale
    pub fn fetch_conversation(&mut self) {
        let api = self.api.clone();
        let tx = self.updates_tx.clone();
        let conversation = self.conversation.clone();
        tokio::spawn(async move {
            let result = api.fetch_conversation(&conversation).await;
            let _ = tx.send(Update::ConversationFetched(result));
        });
    }

    /// Ask for confirmation before changing the request status
    pub fn request_status_change(&mut self, status: RequestStatus) {
        self.prompt = Some(Prompt::ConfirmStatusChange(status));
    }

    /// Ask for confirmation before approving the listing
    pub fn request_listing_approval(&mut self) {
        self.prompt = Some(Prompt::ConfirmListingApprove);
    }

    /// Close the open prompt. Confirming starts the mutation it asked about.
    ///
    /// Changing the status of a conversation not attached to a request is a
    /// caller bug and is returned as an error instead of a failure prompt.
    pub fn answer_prompt(&mut self, answer: PromptAnswer) -> Result<()> {
        let Some(prompt) = self.prompt.take() else {
            return Ok(());
        };

        match (prompt, answer) {
            (Prompt::ConfirmStatusChange(status), PromptAnswer::Confirmed) => {
                self.change_request_status(status)
            }
            (Prompt::ConfirmListingApprove, PromptAnswer::Confirmed) => {
                self.approve_listing();
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Send the status change for the attached request
    pub fn change_request_status(&mut self, status: RequestStatus) -> Result<()> {
        if !self.conversation.is_request() {
            bail!("Only changes status on Request entity");
        }
        let request_id = self
            .conversation
            .request_id()
            .context("Request conversation has no request id")?;

        info!("[Room] changing request {} to {}", request_id, status.as_param());
        let api = self.api.clone();
        let tx = self.updates_tx.clone();
        tokio::spawn(async move {
            let result = api.change_request_status(request_id, status).await;
            let _ = tx.send(Update::StatusChangeFinished(result));
        });
        Ok(())
    }

    /// Send the listing approval
    pub fn approve_listing(&mut self) {
        let api = self.api.clone();
        let tx = self.updates_tx.clone();
        let conversation = self.conversation.clone();
        tokio::spawn(async move {
            let result = api.approve_listing(&conversation).await;
            let _ = tx.send(Update::ListingApproveFinished(result));
        });
    }

    pub fn toggle_details(&mut self) {
        self.details_open = !self.details_open;
        self.details_selection = 0;
    }

    pub fn toggle_terms(&mut self) {
        self.terms_open = !self.terms_open;
    }

    pub fn current_user(&self) -> &CurrentUser {
        &self.current_user
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn history(&self) -> &MessageHistory {
        &self.history
    }

    /// Messages in display order
    pub fn messages(&self) -> Vec<&Message> {
        self.history.chronological().collect()
    }

    pub fn is_loading(&self) -> bool {
        self.history.is_loading()
    }

    pub fn details_open(&self) -> bool {
        self.details_open
    }

    pub fn terms_open(&self) -> bool {
        self.terms_open
    }

    pub fn prompt(&self) -> Option<Prompt> {
        self.prompt
    }

    pub fn focus(&self) -> Focus {
        self.focus
    }

    /// Whether the composer currently holds keyboard focus
    pub fn composer_has_focus(&self) -> bool {
        self.composer.has_focus()
    }

    /// Move keyboard focus. The composer's focus handle is only held while
    /// mounted and focused.
    fn set_focus(&mut self, focus: Focus) {
        self.focus = focus;
        let Some(mounted) = self.mounted.as_mut() else {
            return;
        };
        match focus {
            Focus::Composer => {
                if mounted.composer_focus.is_none() {
                    mounted.composer_focus = Some(self.composer.acquire_focus());
                }
            }
            Focus::Header => mounted.composer_focus = None,
        }
    }

    fn modal_open(&self) -> bool {
        self.prompt.is_some() || self.details_open || self.terms_open
    }

    fn header(&self) -> ConversationHeaderPanel<'_> {
        ConversationHeaderPanel::new(&self.conversation)
            .selected((self.focus == Focus::Header).then_some(self.header_selection))
            .focused(self.focus == Focus::Header)
    }

    fn details(&self) -> RequestDetailsModal<'_> {
        RequestDetailsModal::new(&self.conversation)
            .selected(Some(self.details_selection))
    }

    fn clamp_selections(&mut self) {
        let header_len = self.header().controls().len();
        self.header_selection = self.header_selection.min(header_len.saturating_sub(1));
        let details_len = self.details().controls().len();
        self.details_selection = self.details_selection.min(details_len.saturating_sub(1));
    }

    fn apply_header_action(&mut self, action: HeaderAction) -> ContainerAction {
        match action {
            HeaderAction::RequestStatusChange(status) => self.request_status_change(status),
            HeaderAction::ApproveListing => self.request_listing_approval(),
            HeaderAction::ToggleDetails => self.toggle_details(),
            HeaderAction::Navigate(path) => return ContainerAction::Navigate(path),
        }
        ContainerAction::None
    }

    /// Route a key to the topmost layer: prompt, terms, details, then the room
    pub fn handle_key(&mut self, key: KeyEvent) -> Result<ContainerAction> {
        if key.kind != KeyEventKind::Press {
            return Ok(ContainerAction::None);
        }
        if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
            return Ok(ContainerAction::Exit);
        }

        if let Some(prompt) = self.prompt {
            if let Some(answer) = prompt.answer(key) {
                self.answer_prompt(answer)?;
            }
            return Ok(ContainerAction::None);
        }

        if self.terms_open {
            if matches!(key.code, KeyCode::Esc | KeyCode::Enter | KeyCode::F(1)) {
                self.toggle_terms();
            }
            return Ok(ContainerAction::None);
        }

        if self.details_open {
            let controls = self.details().controls();
            match key.code {
                KeyCode::Esc => self.toggle_details(),
                KeyCode::Left => self.details_selection = self.details_selection.saturating_sub(1),
                KeyCode::Right if self.details_selection + 1 < controls.len() => {
                    self.details_selection += 1;
                }
                KeyCode::Enter => {
                    if let Some(control) = controls.get(self.details_selection) {
                        return Ok(self.apply_header_action(control_action(*control)));
                    }
                }
                _ => {}
            }
            return Ok(ContainerAction::None);
        }

        match key.code {
            KeyCode::Tab => {
                let next = match self.focus {
                    Focus::Composer => Focus::Header,
                    Focus::Header => Focus::Composer,
                };
                self.set_focus(next);
                return Ok(ContainerAction::None);
            }
            KeyCode::PageUp => {
                if self.history.scroll_up(SCROLL_STEP) {
                    self.load_more();
                }
                return Ok(ContainerAction::None);
            }
            KeyCode::PageDown => {
                self.history.scroll_down(SCROLL_STEP);
                return Ok(ContainerAction::None);
            }
            _ => {}
        }

        match self.focus {
            Focus::Header => {
                let len = self.header().controls().len();
                match key.code {
                    KeyCode::Left => {
                        self.header_selection = self.header_selection.saturating_sub(1);
                    }
                    KeyCode::Right if self.header_selection + 1 < len => {
                        self.header_selection += 1;
                    }
                    KeyCode::Enter => {
                        let action = self.header().activate(self.header_selection);
                        if let Some(action) = action {
                            return Ok(self.apply_header_action(action));
                        }
                    }
                    KeyCode::Esc => self.set_focus(Focus::Composer),
                    _ => {}
                }
            }
            Focus::Composer => match self.composer.handle_key(key) {
                ComposerResult::Submitted(text) => {
                    self.dispatch_send(text);
                    self.history.scroll_to_bottom();
                }
                ComposerResult::ShowTerms => self.toggle_terms(),
                ComposerResult::None => {}
            },
        }

        Ok(ContainerAction::None)
    }

    /// Dispatch one terminal event
    pub fn handle_event(&mut self, event: TuiEvent) -> Result<ContainerAction> {
        match event {
            TuiEvent::Key(key) => self.handle_key(key),
            TuiEvent::Paste(text) => {
                self.handle_paste(&text);
                Ok(ContainerAction::None)
            }
            // the next draw picks up the new size
            TuiEvent::Resize(_, _) => Ok(ContainerAction::None),
        }
    }

    /// Insert pasted text into the composer. Ignored while the header has
    /// focus or any modal is open.
    pub fn handle_paste(&mut self, text: &str) {
        if self.focus == Focus::Composer && !self.modal_open() {
            self.composer.paste(text);
        }
    }

    /// Render the whole room behind an error boundary
    pub fn render(&self, area: Rect, buf: &mut Buffer) {
        self.boundary.render(area, buf, |area, buf| self.draw(area, buf));
    }

    fn draw(&self, area: Rect, buf: &mut Buffer) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3),                      // Header
                Constraint::Min(5),                         // History
                Constraint::Length(self.composer.height()), // Composer
            ])
            .split(area);

        self.header().render(chunks[0], buf);
        HistoryView::new(&self.history, &self.current_user)
            .show_timestamps(self.options.show_timestamps)
            .render(chunks[1], buf);
        (&self.composer).render(chunks[2], buf);

        if self.details_open {
            self.details().render(area, buf);
        }
        if self.terms_open {
            TermsView.render(area, buf);
        }
        if let Some(prompt) = self.prompt {
            prompt.render(area, buf);
        }
    }
}

impl Drop for ConversationContainer {
    fn drop(&mut self) {
        if let Some(mounted) = self.mounted.take() {
            mounted.forwarder.abort();
        }
    }
}
