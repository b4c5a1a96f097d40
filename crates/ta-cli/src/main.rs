//! trip-assist: interactive terminal front end for the chat core
//!
//! A thin REPL over `ta-core`: free text goes to the conversation
//! controller, slash commands manage sessions. All conversation state
//! lives in the core; this layer only renders it.

use nu_ansi_term::{Color, Style};
use reedline::{
    ColumnarMenu, Completer, DefaultHinter, Emacs, KeyCode, KeyModifiers, Keybindings,
    MenuBuilder, Prompt, Reedline, ReedlineEvent, ReedlineMenu, Signal, Suggestion,
};
use std::io::Write;
use std::path::Path;
use std::time::Duration;
use ta_core::{
    ChatConfig, ConversationController, DestructiveAction, Message, MessageKind, Role,
    SessionStore,
};
use tracing_subscriber::EnvFilter;

const CONFIG_PATH: &str = "trip-assist.toml";

/// Available commands for autocomplete display
const COMMANDS: &[(&str, &str)] = &[
    ("/help", "Show available commands"),
    ("/new", "Start a new chat session"),
    ("/sessions", "List sessions"),
    ("/load", "Switch to a session: /load <number>"),
    ("/delete", "Delete a session: /delete <number>"),
    ("/clear", "Delete every session"),
    ("/context", "Show the extracted trip context"),
    ("/history", "Reprint the conversation"),
    ("/exit", "Quit"),
];

/// Command completer for reedline
#[derive(Clone)]
struct CommandCompleter {
    commands: Vec<(&'static str, &'static str)>,
}

impl CommandCompleter {
    fn new() -> Self {
        Self {
            commands: COMMANDS.to_vec(),
        }
    }
}

impl Completer for CommandCompleter {
    fn complete(&mut self, line: &str, pos: usize) -> Vec<Suggestion> {
        if !line.starts_with('/') {
            return Vec::new();
        }

        self.commands
            .iter()
            .filter(|(cmd, _)| cmd.starts_with(line))
            .map(|(cmd, desc)| Suggestion {
                value: cmd.to_string(),
                description: Some(desc.to_string()),
                extra: None,
                span: reedline::Span::new(0, pos),
                append_whitespace: true,
                style: None,
            })
            .collect()
    }
}

/// Custom prompt with colored styling
struct ColoredPrompt {
    style: Style,
}

impl ColoredPrompt {
    fn new() -> Self {
        Self {
            style: Color::Cyan.bold(),
        }
    }
}

impl Prompt for ColoredPrompt {
    fn render_prompt_left(&self) -> std::borrow::Cow<'_, str> {
        std::borrow::Cow::Owned(self.style.paint("> ").to_string())
    }

    fn render_prompt_right(&self) -> std::borrow::Cow<'_, str> {
        std::borrow::Cow::Borrowed("")
    }

    fn render_prompt_indicator(
        &self,
        _prompt_mode: reedline::PromptEditMode,
    ) -> std::borrow::Cow<'_, str> {
        std::borrow::Cow::Borrowed("")
    }

    fn render_prompt_multiline_indicator(&self) -> std::borrow::Cow<'_, str> {
        std::borrow::Cow::Borrowed("")
    }

    fn render_prompt_history_search_indicator(
        &self,
        _history_search: reedline::PromptHistorySearch,
    ) -> std::borrow::Cow<'_, str> {
        std::borrow::Cow::Borrowed("")
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("warn".parse()?))
        .init();

    let config = if Path::new(CONFIG_PATH).exists() {
        ChatConfig::load(CONFIG_PATH)?
    } else {
        ChatConfig::default()
    };

    tracing::info!("starting trip-assist");

    let mut controller = ConversationController::new(config.clone()).on_confirm(confirm_prompt);
    if let Some(db_path) = &config.db_path {
        tracing::info!(db_path = %db_path, "using durable session storage");
        controller = controller.with_store(SessionStore::open(db_path)?)?;
    }

    print_welcome();
    controller.open().await?;

    // how many messages of the active session are already on screen
    let mut printed = 0usize;
    // welcome message is delayed; give it a beat before the first render
    tokio::time::sleep(Duration::from_millis(config.welcome_delay_ms + 150)).await;
    drain_messages(&controller, &mut printed).await;

    let mut line_editor = build_line_editor();
    let prompt = ColoredPrompt::new();

    loop {
        let signal = line_editor.read_line(&prompt);

        match signal {
            Ok(Signal::Success(line)) => {
                let input = line.trim();
                if input.is_empty() {
                    continue;
                }
                if input.starts_with('/') {
                    if handle_command(input, &controller, &mut printed).await? {
                        break;
                    }
                    continue;
                }

                match controller.send_message(input).await {
                    Ok(()) => {
                        printed += 1; // the user's own message needs no echo
                        println!("{}", Color::DarkGray.paint("assistant is typing…"));
                        drain_messages(&controller, &mut printed).await;
                    }
                    Err(e) => eprintln!("{}", Color::Red.paint(format!("error: {e}"))),
                }
            }
            Ok(Signal::CtrlC) => {
                println!("^C");
                continue;
            }
            Ok(Signal::CtrlD) => break,
            Err(err) => {
                eprintln!("error: {err}");
                break;
            }
        }
    }

    controller.close().await;
    println!("Bye! Safe travels.");
    Ok(())
}

fn build_line_editor() -> Reedline {
    let mut keybindings = Keybindings::new();
    keybindings.add_binding(
        KeyModifiers::NONE,
        KeyCode::Tab,
        ReedlineEvent::Edit(vec![reedline::EditCommand::Complete]),
    );
    keybindings.add_binding(KeyModifiers::NONE, KeyCode::Enter, ReedlineEvent::Submit);
    keybindings.add_binding(KeyModifiers::NONE, KeyCode::Esc, ReedlineEvent::Esc);
    keybindings.add_binding(
        KeyModifiers::CONTROL,
        KeyCode::Char('c'),
        ReedlineEvent::CtrlC,
    );
    keybindings.add_binding(
        KeyModifiers::CONTROL,
        KeyCode::Char('d'),
        ReedlineEvent::CtrlD,
    );
    // Trigger completion on '/' key
    keybindings.add_binding(
        KeyModifiers::NONE,
        KeyCode::Char('/'),
        ReedlineEvent::Edit(vec![reedline::EditCommand::Complete]),
    );

    let menu = Box::new(
        ColumnarMenu::default()
            .with_name("command_menu")
            .with_columns(1)
            .with_column_width(Some(40))
            .with_only_buffer_difference(false),
    );

    let hinter = DefaultHinter::default().with_style(Style::new().dimmed());

    Reedline::create()
        .with_completer(Box::new(CommandCompleter::new()))
        .with_menu(ReedlineMenu::EngineCompleter(menu))
        .with_hinter(Box::new(hinter))
        .with_edit_mode(Box::new(Emacs::new(keybindings)))
}

/// Handle a slash command; returns true when the loop should exit
async fn handle_command(
    input: &str,
    controller: &ConversationController,
    printed: &mut usize,
) -> anyhow::Result<bool> {
    let mut parts = input.split_whitespace();
    let command = parts.next().unwrap_or("");
    let argument = parts.next();

    match command {
        "/help" => {
            for (cmd, desc) in COMMANDS {
                println!("  {:<12} {}", cmd, desc);
            }
        }
        "/exit" | "/quit" => return Ok(true),
        "/new" => match controller.start_new_session().await {
            Ok(()) => {
                *printed = 0;
                println!("{}", Color::DarkGray.paint("started a new chat"));
                tokio::time::sleep(Duration::from_millis(600)).await;
                drain_messages(controller, printed).await;
            }
            Err(e) => eprintln!("{}", Color::Red.paint(format!("error: {e}"))),
        },
        "/sessions" => {
            let sessions = controller.sessions().await;
            if sessions.is_empty() {
                println!("no sessions");
            }
            let active_id = controller.snapshot().await.map(|s| s.id);
            for (i, session) in sessions.iter().enumerate() {
                let marker = if Some(&session.id) == active_id.as_ref() {
                    "*"
                } else {
                    " "
                };
                let title = session.title.as_deref().unwrap_or("(empty chat)");
                println!(
                    "{marker} {}. {title} ({} messages)",
                    i + 1,
                    session.message_count()
                );
            }
        }
        "/load" => match session_id_by_number(controller, argument).await {
            Some(id) => match controller.load_session(&id).await {
                Ok(()) => {
                    *printed = 0;
                    drain_messages(controller, printed).await;
                }
                Err(e) => eprintln!("{}", Color::Red.paint(format!("error: {e}"))),
            },
            None => println!("usage: /load <number> (see /sessions)"),
        },
        "/delete" => match session_id_by_number(controller, argument).await {
            Some(id) => {
                let was_active = controller.snapshot().await.map(|s| s.id) == Some(id.clone());
                match controller.delete_session(&id).await {
                    Ok(()) => {
                        if was_active && controller.snapshot().await.is_none() {
                            println!("active session deleted; use /new or /load");
                        }
                    }
                    Err(e) => eprintln!("{}", Color::Red.paint(format!("error: {e}"))),
                }
            }
            None => println!("usage: /delete <number> (see /sessions)"),
        },
        "/clear" => {
            controller.clear_all().await?;
            if controller.sessions().await.is_empty() {
                // cleared and reinitialized with a fresh session
                controller.open().await?;
                *printed = 0;
                tokio::time::sleep(Duration::from_millis(600)).await;
                drain_messages(controller, printed).await;
            }
        }
        "/context" => match controller.context().await {
            Some(context) => {
                let destination = context.destination.as_deref().unwrap_or("-");
                println!("destination : {destination}");
                match (context.start_date, context.end_date) {
                    (Some(start), Some(end)) => {
                        println!("dates       : {start} ~ {end} ({} nights)", (end - start).num_days());
                    }
                    _ => println!("dates       : -"),
                }
                println!(
                    "party       : {} adult(s), {} child(ren), {} infant(s)",
                    context.party.adults, context.party.children, context.party.infants
                );
                if context.preferences.is_empty() {
                    println!("preferences : -");
                } else {
                    println!("preferences : {}", context.preferences.join(", "));
                }
            }
            None => println!("no active session"),
        },
        "/history" => {
            *printed = 0;
            drain_messages(controller, printed).await;
        }
        _ => println!("unknown command; /help lists the available ones"),
    }
    Ok(false)
}

async fn session_id_by_number(
    controller: &ConversationController,
    argument: Option<&str>,
) -> Option<String> {
    let number: usize = argument?.parse().ok()?;
    let sessions = controller.sessions().await;
    sessions.get(number.checked_sub(1)?).map(|s| s.id.clone())
}

/// Wait for the typing indicator to settle, then print messages that have
/// not been rendered yet
async fn drain_messages(controller: &ConversationController, printed: &mut usize) {
    for _ in 0..600 {
        if !controller.is_typing() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    if let Some(session) = controller.snapshot().await {
        for message in session.messages.iter().skip(*printed) {
            print_message(message);
        }
        *printed = session.messages.len();
    }
}

fn print_message(message: &Message) {
    match message.role {
        Role::User => {
            println!("{} {}", Color::Green.bold().paint("you:"), message.content);
        }
        Role::Assistant => {
            println!(
                "{} {}",
                Color::Cyan.bold().paint("assistant:"),
                message.content
            );
            if message.kind == MessageKind::Estimate {
                if let Some(preview) = &message.estimate {
                    println!("  {}", Color::Yellow.paint(preview.summary()));
                    if !preview.preferences.is_empty() {
                        println!(
                            "  {}",
                            Color::Yellow.paint(format!("focus: {}", preview.preferences.join(", ")))
                        );
                    }
                }
            }
        }
    }
}

fn confirm_prompt(action: DestructiveAction) -> bool {
    let question = match action {
        DestructiveAction::DeleteSession => "Delete this session?",
        DestructiveAction::ClearAll => "Delete ALL sessions?",
        DestructiveAction::NewSession => "Leave the current chat and start a new one?",
    };
    print!("{question} (y/N) ");
    let _ = std::io::stdout().flush();
    let mut answer = String::new();
    if std::io::stdin().read_line(&mut answer).is_err() {
        return false;
    }
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}

fn print_welcome() {
    println!(
        "{}",
        Color::Cyan.bold().paint("trip-assist — travel planning chat")
    );
    println!("type /help for commands, Ctrl+D to quit\n");
}
