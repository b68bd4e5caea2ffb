use super::credentials::FileCredentialStore;
use super::session::{ ChatSession, SessionSnapshot, SubmitOutcome, TurnPhase };
use super::transport::HttpRelayTransport;
use crate::cli::ChatArgs;
use crate::models::chat::Role;
use log::info;
use std::error::Error;
use std::io::Write;
use std::sync::Arc;
use tokio::io::{ AsyncBufReadExt, BufReader };

#[derive(Debug, PartialEq, Eq)]
enum Input<'a> {
    SetKey(&'a str),
    Logout,
    Quit,
    Message(&'a str),
    Empty,
}

fn parse_input(line: &str) -> Input<'_> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Input::Empty;
    }
    match trimmed.split_once(char::is_whitespace) {
        Some(("/key", key)) => Input::SetKey(key.trim()),
        _ =>
            match trimmed {
                "/key" => Input::SetKey(""),
                "/logout" => Input::Logout,
                "/quit" | "/exit" => Input::Quit,
                _ => Input::Message(line),
            }
    }
}

/// Prints the part of the streaming reply not yet on screen and returns the
/// new printed length. Error entries are left to the banner.
fn echo_reply(snapshot: &SessionSnapshot, printed: usize) -> usize {
    if !matches!(snapshot.phase, TurnPhase::Streaming | TurnPhase::Idle) {
        return printed;
    }
    let Some(last) = snapshot.conversation.last() else {
        return printed;
    };
    if last.role != Role::Assistant || last.content.len() <= printed {
        return printed;
    }
    match last.content.get(printed..) {
        Some(fresh) => {
            print!("{}", fresh);
            let _ = std::io::stdout().flush();
            last.content.len()
        }
        None => printed,
    }
}

pub async fn run_chat(args: ChatArgs) -> Result<(), Box<dyn Error + Send + Sync>> {
    let transport = Arc::new(HttpRelayTransport::new(&args.relay_url)?);
    info!("Chatting through relay at {}", transport.endpoint());
    let store = Arc::new(FileCredentialStore::new(&args.credentials_path));
    let session = ChatSession::new(transport, store)?;

    println!("Agri Help. Type a question, /key <api key>, /logout or /quit.");
    if !session.snapshot().has_api_key() {
        println!("No API key stored yet. Set one with /key <api key>.");
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("You> ");
        let _ = std::io::stdout().flush();
        let Some(line) = lines.next_line().await? else {
            break;
        };

        match parse_input(&line) {
            Input::Empty => {}
            Input::Quit => {
                break;
            }
            Input::Logout => {
                session.logout()?;
                println!("API key cleared.");
            }
            Input::SetKey(key) => {
                if session.set_api_key(key)? {
                    println!("API key saved. Conversation cleared.");
                } else {
                    println!("Usage: /key <api key>");
                }
            }
            Input::Message(text) => {
                if !session.snapshot().has_api_key() {
                    println!("Set an API key first with /key <api key>.");
                    continue;
                }
                session.set_input(text);
                run_turn(&session).await;
            }
        }
    }

    println!("Goodbye!");
    Ok(())
}

async fn run_turn(session: &ChatSession) {
    let mut updates = session.subscribe();
    let submit = session.submit();
    tokio::pin!(submit);

    println!("Agri Help>");
    let mut printed = 0;
    let outcome = loop {
        tokio::select! {
            outcome = &mut submit => break outcome,
            changed = updates.changed() => {
                if changed.is_err() {
                    break (&mut submit).await;
                }
                let snapshot = updates.borrow_and_update().clone();
                printed = echo_reply(&snapshot, printed);
            }
        }
    };
    echo_reply(&session.snapshot(), printed);

    match outcome {
        SubmitOutcome::Completed(_) => println!(),
        SubmitOutcome::Failed(message) => println!("\n[error] {}", message),
        SubmitOutcome::Ignored => println!("(nothing sent)"),
    }
}
