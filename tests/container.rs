use anyhow::{Result, anyhow};
use async_trait::async_trait;
use convo_room::events::{SocketEvent, TuiEvent, channel_for};
use convo_room::models::{
    Contract, Conversation, ConversationableRecord, CurrentUser, Message, RequestStatus, Sender,
};
use convo_room::socket::LocalSocket;
use convo_room::ui::conversation::{ContainerAction, ContainerOptions, Focus, Prompt, PromptAnswer};
use convo_room::{ConversationApi, ConversationContainer};
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use ratatui::buffer::Buffer;
use ratatui::layout::Rect;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

const ME: u64 = 1;
const HOST: u64 = 2;
const PAGE_SIZE: usize = 25;

#[derive(Debug, Clone, PartialEq)]
enum Call {
    Fetch(u64),
    GetMessages(u64, u32),
    MarkRead(u64, u64),
    Send(u64, String),
    ChangeStatus(u64, RequestStatus),
    Approve(u64),
}

#[derive(Default)]
struct MockApi {
    calls: Mutex<Vec<Call>>,
    pages: Mutex<HashMap<u32, Vec<Message>>>,
    failing_pages: bool,
    failing_writes: bool,
    refreshed: Mutex<Option<Conversation>>,
}

impl MockApi {
    fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn with_page(self, page: u32, messages: Vec<Message>) -> Self {
        self.pages.lock().unwrap().insert(page, messages);
        self
    }
}

#[async_trait]
impl ConversationApi for MockApi {
    async fn fetch_conversation(&self, conversation: &Conversation) -> Result<Conversation> {
        self.record(Call::Fetch(conversation.id));
        Ok(self
            .refreshed
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_else(|| conversation.clone()))
    }

    async fn get_messages(&self, conversation_id: u64, page: u32) -> Result<Vec<Message>> {
        self.record(Call::GetMessages(conversation_id, page));
        if self.failing_pages {
            return Err(anyhow!("network down"));
        }
        Ok(self.pages.lock().unwrap().get(&page).cloned().unwrap_or_default())
    }

    async fn mark_message_as_read(&self, conversation_id: u64, message_id: u64) -> Result<Message> {
        self.record(Call::MarkRead(conversation_id, message_id));
        let mut message = message(message_id, HOST);
        message.body = Some("server copy".to_string());
        message.is_read = true;
        Ok(message)
    }

    async fn send_message(&self, conversation_id: u64, text: &str) -> Result<Option<Message>> {
        self.record(Call::Send(conversation_id, text.to_string()));
        if self.failing_writes {
            return Err(anyhow!("send rejected"));
        }
        Ok(None)
    }

    async fn change_request_status(&self, request_id: u64, status: RequestStatus) -> Result<()> {
        self.record(Call::ChangeStatus(request_id, status));
        if self.failing_writes {
            return Err(anyhow!("status rejected"));
        }
        Ok(())
    }

    async fn approve_listing(&self, conversation: &Conversation) -> Result<()> {
        self.record(Call::Approve(conversation.id));
        if self.failing_writes {
            return Err(anyhow!("approval rejected"));
        }
        Ok(())
    }
}

fn message(id: u64, sender: u64) -> Message {
    Message {
        id,
        sender: Some(Sender {
            id: Some(sender),
            full_name: Some(if sender == ME { "Me" } else { "Host" }.to_string()),
            avatar: None,
        }),
        body: Some(format!("message {}", id)),
        is_read: false,
        created_at: None,
    }
}

/// A page newest first, as the API returns it
fn page(ids: std::ops::RangeInclusive<u64>) -> Vec<Message> {
    ids.rev().map(|id| message(id, HOST)).collect()
}

fn request_conversation(status: RequestStatus) -> Conversation {
    Conversation {
        id: 10,
        title: Some("Stay in Lisbon".to_string()),
        conversationable_type: Some("Request".to_string()),
        conversationable: Some(ConversationableRecord {
            id: Some(77),
            status: Some(status),
            listing_awaiting_approval: true,
            ..ConversationableRecord::default()
        }),
        contract: Some(Contract {
            total_price: Some(300.0),
            currency: Some("EUR".to_string()),
        }),
    }
}

fn listing_conversation() -> Conversation {
    Conversation {
        id: 11,
        title: None,
        conversationable_type: Some("Listing".to_string()),
        conversationable: Some(ConversationableRecord {
            id: Some(5),
            ..ConversationableRecord::default()
        }),
        contract: None,
    }
}

fn container(
    api: &Arc<MockApi>,
    socket: &Arc<LocalSocket>,
    conversation: Conversation,
) -> ConversationContainer {
    ConversationContainer::new(
        CurrentUser {
            id: ME,
            full_name: Some("Me".to_string()),
        },
        conversation,
        api.clone(),
        socket.clone(),
        ContainerOptions::default(),
    )
}

async fn mounted(api: &Arc<MockApi>, socket: &Arc<LocalSocket>) -> ConversationContainer {
    let mut room = container(api, socket, request_conversation(RequestStatus::Pending));
    room.mount().await.unwrap();
    assert!(room.next_update().await, "first page should arrive");
    room
}

async fn wait_for_calls(api: &MockApi, count: usize) {
    for _ in 0..100 {
        if api.calls().len() >= count {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("expected {} calls, saw {:?}", count, api.calls());
}

fn key(code: KeyCode) -> KeyEvent {
    KeyEvent::new(code, KeyModifiers::NONE)
}

/// Render the room and return the screen text, one row per line
fn screen(room: &ConversationContainer, width: u16, height: u16) -> String {
    let area = Rect::new(0, 0, width, height);
    let mut buf = Buffer::empty(area);
    room.render(area, &mut buf);
    (0..area.height)
        .map(|y| {
            (0..area.width)
                .map(|x| buf.get(x, y).symbol().to_string())
                .collect::<String>()
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn ids(room: &ConversationContainer) -> Vec<u64> {
    room.messages().iter().map(|m| m.id).collect()
}

#[tokio::test]
async fn mount_subscribes_and_loads_first_page() {
    let api = Arc::new(MockApi::default().with_page(1, page(1..=3)));
    let socket = Arc::new(LocalSocket::new());
    let room = mounted(&api, &socket).await;

    assert!(socket.is_subscribed(&channel_for(10)));
    assert_eq!(room.channel(), Some("conversation-10"));
    assert_eq!(api.calls(), vec![Call::GetMessages(10, 1)]);
    assert_eq!(ids(&room), vec![1, 2, 3]);
    assert!(!room.is_loading());
}

#[tokio::test]
async fn full_page_keeps_loading_and_next_page_follows() {
    let api = Arc::new(
        MockApi::default()
            .with_page(1, page(26..=50))
            .with_page(2, page(1..=25)),
    );
    let socket = Arc::new(LocalSocket::new());
    let mut room = mounted(&api, &socket).await;
    assert!(room.is_loading());

    assert!(room.load_more());
    assert!(!room.load_more(), "one fetch at a time");
    assert!(room.next_update().await);

    assert_eq!(room.messages().len(), 2 * PAGE_SIZE);
    assert_eq!(room.messages()[0].id, 1);
    assert_eq!(room.messages()[49].id, 50);
    assert!(room.is_loading());
}

#[tokio::test]
async fn failed_page_stops_paging() {
    let api = Arc::new(MockApi {
        failing_pages: true,
        ..MockApi::default()
    });
    let socket = Arc::new(LocalSocket::new());
    let mut room = mounted(&api, &socket).await;

    assert!(!room.is_loading());
    assert!(!room.load_more());
    assert_eq!(api.calls().len(), 1);
}

#[tokio::test]
async fn message_from_other_party_is_marked_read_first() {
    let api = Arc::new(MockApi::default().with_page(1, page(1..=2)));
    let socket = Arc::new(LocalSocket::new());
    let mut room = mounted(&api, &socket).await;

    let raw = message(3, HOST);
    assert!(socket.publish(
        &channel_for(10),
        SocketEvent::NewMessage {
            message: raw,
            sender_id: Some(HOST),
        },
    ));
    assert!(room.next_update().await);
    assert!(room.next_update().await);

    assert!(api.calls().contains(&Call::MarkRead(10, 3)));
    let newest = *room.messages().last().unwrap();
    assert_eq!(newest.id, 3);
    assert_eq!(newest.body(), "server copy");
    assert!(newest.is_read);
}

#[tokio::test]
async fn own_echo_is_added_without_api_call() {
    let api = Arc::new(MockApi::default());
    let socket = Arc::new(LocalSocket::new());
    let mut room = mounted(&api, &socket).await;

    socket.publish(
        &channel_for(10),
        SocketEvent::NewMessage {
            message: message(8, ME),
            sender_id: Some(ME),
        },
    );
    assert!(room.next_update().await);

    assert_eq!(ids(&room), vec![8]);
    assert_eq!(api.calls(), vec![Call::GetMessages(10, 1)]);
}

#[tokio::test]
async fn messages_update_marks_listed_messages_in_place() {
    let api = Arc::new(MockApi::default().with_page(1, page(4..=8)));
    let socket = Arc::new(LocalSocket::new());
    let mut room = mounted(&api, &socket).await;

    socket.publish(&channel_for(10), SocketEvent::MessagesUpdate { ids: vec![5, 7] });
    assert!(room.next_update().await);

    let state: Vec<(u64, bool)> = room.messages().iter().map(|m| (m.id, m.is_read)).collect();
    assert_eq!(
        state,
        vec![(4, false), (5, true), (6, false), (7, true), (8, false)]
    );
}

#[tokio::test]
async fn blank_input_is_not_sent() {
    let api = Arc::new(MockApi::default());
    let socket = Arc::new(LocalSocket::new());
    let mut room = mounted(&api, &socket).await;

    room.set_input("   ");
    assert!(!room.send_message());
    assert_eq!(room.input(), "   ");

    room.set_input("");
    assert!(!room.send_message());
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(api.calls(), vec![Call::GetMessages(10, 1)]);
}

#[tokio::test]
async fn sending_clears_input_even_when_request_fails() {
    let api = Arc::new(MockApi {
        failing_writes: true,
        ..MockApi::default()
    });
    let socket = Arc::new(LocalSocket::new());
    let mut room = mounted(&api, &socket).await;

    room.set_input("Is parking included?");
    assert!(room.send_message());
    assert_eq!(room.input(), "");

    wait_for_calls(&api, 2).await;
    assert_eq!(api.calls()[1], Call::Send(10, "Is parking included?".to_string()));
    room.process_updates();
    assert_eq!(room.input(), "");
    assert!(room.messages().is_empty());
}

#[tokio::test]
async fn enter_in_composer_sends() {
    let api = Arc::new(MockApi::default());
    let socket = Arc::new(LocalSocket::new());
    let mut room = mounted(&api, &socket).await;

    for c in "hi".chars() {
        room.handle_key(key(KeyCode::Char(c))).unwrap();
    }
    assert_eq!(room.handle_key(key(KeyCode::Enter)).unwrap(), ContainerAction::None);
    assert_eq!(room.input(), "");
    wait_for_calls(&api, 2).await;
    assert_eq!(api.calls()[1], Call::Send(10, "hi".to_string()));
}

#[tokio::test]
async fn status_change_on_non_request_fails_without_api_call() {
    let api = Arc::new(MockApi::default());
    let socket = Arc::new(LocalSocket::new());
    let mut room = container(&api, &socket, listing_conversation());

    room.request_status_change(RequestStatus::Accepted);
    let result = room.answer_prompt(PromptAnswer::Confirmed);

    assert!(result.is_err());
    assert!(room.change_request_status(RequestStatus::Declined).is_err());
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(api.calls().is_empty());
}

#[tokio::test]
async fn confirmed_status_change_shows_success_and_refetches() {
    let api = Arc::new(MockApi::default());
    *api.refreshed.lock().unwrap() = Some(request_conversation(RequestStatus::Accepted));
    let socket = Arc::new(LocalSocket::new());
    let mut room = mounted(&api, &socket).await;

    room.request_status_change(RequestStatus::Accepted);
    assert_eq!(
        room.prompt(),
        Some(Prompt::ConfirmStatusChange(RequestStatus::Accepted))
    );
    room.answer_prompt(PromptAnswer::Confirmed).unwrap();
    assert_eq!(room.prompt(), None);

    assert!(room.next_update().await);
    assert_eq!(room.prompt(), Some(Prompt::StatusChanged));
    assert!(room.next_update().await);

    assert!(api.calls().contains(&Call::ChangeStatus(77, RequestStatus::Accepted)));
    assert!(api.calls().contains(&Call::Fetch(10)));
    assert_eq!(
        room.conversation().request_status(),
        Some(RequestStatus::Accepted)
    );
}

#[tokio::test]
async fn failed_status_change_shows_failure_and_keeps_state() {
    let api = Arc::new(MockApi {
        failing_writes: true,
        ..MockApi::default()
    });
    let socket = Arc::new(LocalSocket::new());
    let mut room = mounted(&api, &socket).await;

    room.request_status_change(RequestStatus::Declined);
    room.answer_prompt(PromptAnswer::Confirmed).unwrap();
    assert!(room.next_update().await);

    assert_eq!(room.prompt(), Some(Prompt::StatusChangeFailed));
    assert_eq!(
        room.conversation().request_status(),
        Some(RequestStatus::Pending)
    );
    assert!(!api.calls().iter().any(|call| matches!(call, Call::Fetch(_))));
}

#[tokio::test]
async fn dismissed_confirmation_does_nothing() {
    let api = Arc::new(MockApi::default());
    let socket = Arc::new(LocalSocket::new());
    let mut room = mounted(&api, &socket).await;

    room.request_status_change(RequestStatus::Accepted);
    room.handle_key(key(KeyCode::Char('n'))).unwrap();

    assert_eq!(room.prompt(), None);
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(api.calls(), vec![Call::GetMessages(10, 1)]);
}

#[tokio::test]
async fn listing_approval_flow() {
    let api = Arc::new(MockApi::default());
    let socket = Arc::new(LocalSocket::new());
    let mut room = mounted(&api, &socket).await;

    room.request_listing_approval();
    room.handle_key(key(KeyCode::Char('y'))).unwrap();
    assert!(room.next_update().await);
    assert_eq!(room.prompt(), Some(Prompt::ListingApproved));
    assert!(room.next_update().await);
    assert!(api.calls().contains(&Call::Approve(10)));
    assert!(api.calls().contains(&Call::Fetch(10)));

    room.handle_key(key(KeyCode::Enter)).unwrap();
    assert_eq!(room.prompt(), None);
}

#[tokio::test]
async fn header_controls_drive_prompts_and_navigation() {
    let api = Arc::new(MockApi::default());
    let socket = Arc::new(LocalSocket::new());
    let mut room = mounted(&api, &socket).await;

    room.handle_key(key(KeyCode::Tab)).unwrap();
    assert_eq!(room.focus(), Focus::Header);

    // Accept, Decline, Approve listing, Show Details, Close
    room.handle_key(key(KeyCode::Enter)).unwrap();
    assert_eq!(
        room.prompt(),
        Some(Prompt::ConfirmStatusChange(RequestStatus::Accepted))
    );
    room.handle_key(key(KeyCode::Esc)).unwrap();

    for _ in 0..3 {
        room.handle_key(key(KeyCode::Right)).unwrap();
    }
    room.handle_key(key(KeyCode::Enter)).unwrap();
    assert!(room.details_open());
    room.handle_key(key(KeyCode::Esc)).unwrap();
    assert!(!room.details_open());

    room.handle_key(key(KeyCode::Right)).unwrap();
    assert_eq!(
        room.handle_key(key(KeyCode::Enter)).unwrap(),
        ContainerAction::Navigate("/v2/conversations".to_string())
    );
}

#[tokio::test]
async fn modals_toggle_independently() {
    let api = Arc::new(MockApi::default());
    let socket = Arc::new(LocalSocket::new());
    let mut room = mounted(&api, &socket).await;

    room.toggle_details();
    room.toggle_terms();
    assert!(room.details_open());
    assert!(room.terms_open());

    room.toggle_details();
    assert!(!room.details_open());
    assert!(room.terms_open());

    room.handle_key(key(KeyCode::Esc)).unwrap();
    assert!(!room.terms_open());
    room.handle_key(key(KeyCode::F(1))).unwrap();
    assert!(room.terms_open());
}

#[tokio::test]
async fn unmount_unsubscribes_and_resets_view_state() {
    let api = Arc::new(MockApi::default().with_page(1, page(1..=2)));
    let socket = Arc::new(LocalSocket::new());
    let mut room = mounted(&api, &socket).await;
    room.set_input("draft");
    room.toggle_details();

    room.unmount().await.unwrap();

    assert!(!room.is_mounted());
    assert!(!socket.is_subscribed(&channel_for(10)));
    assert!(!socket.publish(&channel_for(10), SocketEvent::MessagesUpdate { ids: vec![1] }));
    assert!(room.messages().is_empty());
    assert_eq!(room.input(), "");
    assert!(!room.details_open());
    assert!(room.is_loading());
}

#[tokio::test]
async fn renders_own_and_other_messages() {
    let mut messages = page(1..=1);
    messages.insert(0, message(2, ME));
    let api = Arc::new(MockApi::default().with_page(1, messages));
    let socket = Arc::new(LocalSocket::new());
    let room = mounted(&api, &socket).await;

    let text = screen(&room, 60, 20);
    assert!(text.contains("You"));
    assert!(text.contains("Host"));
    assert!(text.contains("Delivered"));
    assert!(text.contains("Stay in Lisbon"));
    assert!(text.contains("Type here..."));
}

#[tokio::test]
async fn page_up_at_the_top_requests_the_next_page() {
    let api = Arc::new(
        MockApi::default()
            .with_page(1, page(26..=50))
            .with_page(2, page(1..=25)),
    );
    let socket = Arc::new(LocalSocket::new());
    let mut room = mounted(&api, &socket).await;
    // lay the history out so its scroll range is known
    screen(&room, 60, 20);

    room.handle_key(key(KeyCode::PageUp)).unwrap();
    assert!(!room.history().is_fetching(), "not at the top yet");

    for _ in 0..40 {
        if room.history().is_fetching() {
            break;
        }
        room.handle_key(key(KeyCode::PageUp)).unwrap();
    }
    assert!(room.history().is_fetching());
    assert!(room.next_update().await);

    assert!(api.calls().contains(&Call::GetMessages(10, 2)));
    assert_eq!(room.messages().len(), 2 * PAGE_SIZE);
}

#[tokio::test]
async fn refetch_with_another_id_keeps_the_original_subscription() {
    let api = Arc::new(MockApi::default());
    let mut moved = request_conversation(RequestStatus::Pending);
    moved.id = 99;
    *api.refreshed.lock().unwrap() = Some(moved);
    let socket = Arc::new(LocalSocket::new());
    let mut room = mounted(&api, &socket).await;

    room.fetch_conversation();
    assert!(room.next_update().await);

    assert_eq!(room.conversation().id, 99);
    assert_eq!(room.channel(), Some("conversation-10"));
    assert!(socket.is_subscribed(&channel_for(10)));
    assert!(!socket.is_subscribed(&channel_for(99)));

    assert!(socket.publish(&channel_for(10), SocketEvent::MessagesUpdate { ids: vec![] }));
    assert!(room.next_update().await);
}

#[tokio::test]
async fn composer_focus_follows_tab_and_ends_with_unmount() {
    let api = Arc::new(MockApi::default());
    let socket = Arc::new(LocalSocket::new());
    let mut room = container(&api, &socket, request_conversation(RequestStatus::Pending));
    assert!(!room.composer_has_focus());

    room.mount().await.unwrap();
    assert!(room.next_update().await);
    assert!(room.composer_has_focus());
    room.set_input("draft");
    assert!(screen(&room, 60, 20).contains("draft▌"));

    room.handle_key(key(KeyCode::Tab)).unwrap();
    assert_eq!(room.focus(), Focus::Header);
    assert!(!room.composer_has_focus());
    let text = screen(&room, 60, 20);
    assert!(text.contains("draft"));
    assert!(!text.contains("draft▌"));

    room.handle_key(key(KeyCode::Tab)).unwrap();
    assert!(room.composer_has_focus());

    room.unmount().await.unwrap();
    assert!(!room.composer_has_focus());
}

#[tokio::test]
async fn paste_is_ignored_while_a_modal_is_open() {
    let api = Arc::new(MockApi::default());
    let socket = Arc::new(LocalSocket::new());
    let mut room = mounted(&api, &socket).await;

    room.toggle_details();
    room.handle_event(TuiEvent::Paste("x".to_string())).unwrap();
    assert_eq!(room.input(), "");
    room.toggle_details();

    room.toggle_terms();
    room.handle_event(TuiEvent::Paste("x".to_string())).unwrap();
    assert_eq!(room.input(), "");
    room.toggle_terms();

    room.handle_event(TuiEvent::Paste("hello".to_string())).unwrap();
    assert_eq!(room.input(), "hello");
    assert_eq!(
        room.handle_event(TuiEvent::Resize(80, 24)).unwrap(),
        ContainerAction::None
    );

    room.handle_event(TuiEvent::Key(key(KeyCode::Tab))).unwrap();
    room.handle_event(TuiEvent::Paste(" there".to_string())).unwrap();
    assert_eq!(room.input(), "hello");
}

#[tokio::test]
async fn details_show_the_contract_total_and_follow_refetch() {
    let api = Arc::new(MockApi::default());
    let mut refreshed = request_conversation(RequestStatus::Accepted);
    refreshed.contract = Some(Contract {
        total_price: Some(350.0),
        currency: Some("EUR".to_string()),
    });
    *api.refreshed.lock().unwrap() = Some(refreshed);
    let socket = Arc::new(LocalSocket::new());
    let mut room = mounted(&api, &socket).await;

    room.toggle_details();
    assert!(screen(&room, 80, 24).contains("300.00 EUR"));

    room.fetch_conversation();
    assert!(room.next_update().await);
    assert!(screen(&room, 80, 24).contains("350.00 EUR"));
}
