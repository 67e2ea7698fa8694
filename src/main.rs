use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use convo_room::config::Config;
use convo_room::events::TuiEvent;
use convo_room::logging::{DEFAULT_FILTER, init_logging};
use convo_room::models::Conversation;
use convo_room::socket::{LocalSocket, RealtimeSocket, WsSocket};
use convo_room::{
    ContainerAction, ContainerOptions, ConversationApi, ConversationContainer, HttpConversationApi,
};
use crossterm::event::{DisableBracketedPaste, EnableBracketedPaste, EventStream};
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use futures::StreamExt;
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use std::io::{self, Stdout};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "convo")]
#[command(version)]
#[command(about = "Chat about a booking request from the terminal", long_about = None)]
struct Cli {
    /// Log filter, overridden by RUST_LOG
    #[arg(long, global = true, default_value = DEFAULT_FILTER)]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Open a conversation room
    Show {
        conversation_id: u64,
        /// Do not connect to the real-time service
        #[arg(long)]
        offline: bool,
    },
    /// Print the configuration, writing defaults first with --init
    Config {
        #[arg(long)]
        init: bool,
    },
}

type Tui = Terminal<CrosstermBackend<Stdout>>;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load()?;

    match cli.command {
        Commands::Config { init } => {
            if init && !config.config_path().exists() {
                config.save()?;
                println!("📝 Wrote {}", config.config_path().display());
            }
            println!("{}", toml::to_string_pretty(&config).context("Failed to serialize config")?);
            Ok(())
        }
        Commands::Show {
            conversation_id,
            offline,
        } => {
            init_logging(&config.log_path(), &cli.log_level)?;
            std::panic::set_hook(Box::new(|info| error!("panic: {}", info)));

            match run_room(config, conversation_id, offline).await? {
                ContainerAction::Navigate(path) => println!("➡️  {}", path),
                ContainerAction::Exit | ContainerAction::None => {}
            }
            Ok(())
        }
    }
}

async fn run_room(config: Config, conversation_id: u64, offline: bool) -> Result<ContainerAction> {
    let api: Arc<dyn ConversationApi> = Arc::new(HttpConversationApi::new(&config)?);
    let socket: Arc<dyn RealtimeSocket> = if offline {
        Arc::new(LocalSocket::new())
    } else {
        Arc::new(WsSocket::connect(&config.socket_url).await?)
    };

    let stub = Conversation {
        id: conversation_id,
        title: None,
        conversationable_type: None,
        conversationable: None,
        contract: None,
    };
    let conversation = api
        .fetch_conversation(&stub)
        .await
        .with_context(|| format!("Failed to load conversation {}", conversation_id))?;

    let mut container = ConversationContainer::new(
        config.user.clone(),
        conversation,
        api,
        socket,
        ContainerOptions::from(&config),
    );
    container.mount().await?;

    let mut terminal = setup_terminal()?;
    // interval() rejects a zero period
    let tick = Duration::from_millis(config.ui.tick_millis.max(1));
    let outcome = event_loop(&mut terminal, &mut container, tick).await;
    restore_terminal(&mut terminal)?;

    if let Err(e) = container.unmount().await {
        error!("Unmount failed: {:#}", e);
    }
    info!("Left conversation {}", conversation_id);
    outcome
}

/// Draw on every tick or terminal event. Background results are applied
/// before each draw.
async fn event_loop(
    terminal: &mut Tui,
    container: &mut ConversationContainer,
    tick: Duration,
) -> Result<ContainerAction> {
    let mut events = EventStream::new();
    let mut ticker = tokio::time::interval(tick);

    loop {
        container.process_updates();
        terminal.draw(|frame| {
            let area = frame.size();
            container.render(area, frame.buffer_mut());
        })?;

        tokio::select! {
            _ = ticker.tick() => {}
            event = events.next() => {
                let Some(event) = event else {
                    return Ok(ContainerAction::Exit);
                };
                let event = event.context("Failed to read terminal event")?;
                if let Some(tui_event) = TuiEvent::from_crossterm(event) {
                    match container.handle_event(tui_event)? {
                        ContainerAction::None => {}
                        action => return Ok(action),
                    }
                }
            }
        }
    }
}

fn setup_terminal() -> Result<Tui> {
    enable_raw_mode().context("Failed to enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableBracketedPaste)
        .context("Failed to enter alternate screen")?;
    Terminal::new(CrosstermBackend::new(stdout)).context("Failed to create terminal")
}

fn restore_terminal(terminal: &mut Tui) -> Result<()> {
    disable_raw_mode().context("Failed to disable raw mode")?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen, DisableBracketedPaste)
        .context("Failed to leave alternate screen")?;
    terminal.show_cursor().context("Failed to show cursor")?;
    Ok(())
}
