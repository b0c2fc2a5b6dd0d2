use crate::api::{HttpTransport, Transport};
use crate::console::{Console, FormField};
use crate::session::SessionState;
use crate::view::{Channel, Presenter, TerminalPresenter};
use anyhow::{anyhow, Result};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::io::Stdout;

pub type TerminalConsole = Console<HttpTransport, TerminalPresenter<Stdout>>;

/// Line that ends a multi-line openid block.
const BLOCK_END: &str = ".";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Continue,
    Exit,
}

/// Run each command line in order against one session, then exit.
///
/// Fails when any command, or the initial config load, reported an error.
pub fn run_once<T: Transport, P: Presenter>(
    console: &mut Console<T, P>,
    commands: &[String],
) -> Result<()> {
    console.startup();
    let mut failed = usize::from(console.take_error());
    let mut no_block = |_: &str| -> Result<Vec<String>> {
        Err(anyhow!(
            "multi-line input needs the interactive console; pass openids inline"
        ))
    };
    for line in commands {
        let outcome = dispatch(console, line.trim(), &mut no_block);
        if console.take_error() {
            failed += 1;
        }
        if outcome == Outcome::Exit {
            break;
        }
    }

    if failed > 0 {
        return Err(anyhow!("{} command(s) reported an error", failed));
    }
    Ok(())
}

pub fn run_repl(console: &mut TerminalConsole) -> Result<()> {
    let mut rl = DefaultEditor::new()?;

    println!("adminctl - type /help for commands, /exit to quit");
    console.startup();

    loop {
        let prompt = console.presenter().prompt();
        match rl.readline(prompt) {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                // never keep the token in history
                if !line.starts_with("/login") && console.state() == SessionState::LoggedIn {
                    rl.add_history_entry(line)?;
                }

                let before = console.state();
                let mut block = |hint: &str| read_block(&mut rl, hint);
                let outcome = dispatch(console, line, &mut block);
                if session_ended(before, console.state()) {
                    rl.clear_history()?;
                }
                if outcome == Outcome::Exit {
                    break;
                }
            }
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => break,
            Err(e) => {
                eprintln!("Input error: {}", e);
                break;
            }
        }
    }

    Ok(())
}

/// History belongs to one session; drop it on logout and forced logout.
fn session_ended(before: SessionState, after: SessionState) -> bool {
    before == SessionState::LoggedIn && after == SessionState::LoggedOut
}

fn read_block(rl: &mut DefaultEditor, hint: &str) -> Result<Vec<String>> {
    println!("{} (finish with a line containing only '{}')", hint, BLOCK_END);
    let mut lines = Vec::new();
    loop {
        let line = rl.readline("| ")?;
        if line.trim() == BLOCK_END {
            return Ok(lines);
        }
        lines.push(line);
    }
}

/// Execute one operator line. Lines without a leading slash log in while
/// logged out and search while logged in.
pub fn dispatch<T: Transport, P: Presenter>(
    console: &mut Console<T, P>,
    line: &str,
    read_block: &mut dyn FnMut(&str) -> Result<Vec<String>>,
) -> Outcome {
    if !line.starts_with('/') {
        if console.state() == SessionState::LoggedIn {
            console.search(line);
        } else {
            console.login(line);
        }
        return Outcome::Continue;
    }

    let (cmd, rest) = match line.split_once(char::is_whitespace) {
        Some((cmd, rest)) => (cmd, rest.trim()),
        None => (line, ""),
    };

    match cmd {
        "/exit" | "/quit" => return Outcome::Exit,
        "/help" => print_help(),
        "/login" => console.login(rest),
        "/logout" => console.logout(),
        "/session" => {
            let summary = console.session_summary();
            console.notice(Channel::Session, &summary, false);
        }
        "/search" => console.search(rest),
        "/refresh" => console.refresh(),
        "/users" => console.show_users(),
        "/toggle" => match rest.parse::<i64>() {
            Ok(id) => console.toggle_admin(id),
            Err(_) => console.notice(Channel::Search, "usage: /toggle <user-id>", true),
        },
        "/config" => handle_config_command(console, rest, read_block),
        _ => console.notice(
            Channel::Session,
            &format!("unknown command: {} (try /help)", cmd),
            true,
        ),
    }
    Outcome::Continue
}

fn handle_config_command<T: Transport, P: Presenter>(
    console: &mut Console<T, P>,
    args: &str,
    read_block: &mut dyn FnMut(&str) -> Result<Vec<String>>,
) {
    let (sub, rest) = match args.split_once(char::is_whitespace) {
        Some((sub, rest)) => (sub, rest.trim()),
        None => (args, ""),
    };

    match sub {
        "" | "load" => console.load_config(),
        "show" => console.show_config(),
        "save" => console.save_config(),
        "max" => console.edit_form(FormField::MaxRequests, rest),
        "window" => console.edit_form(FormField::WindowSeconds, rest),
        "openids" => {
            let lines = if rest.is_empty() {
                read_block("Enter admin openids, one per line")
            } else {
                shell_words::split(rest).map_err(|e| anyhow!("invalid openid list: {}", e))
            };
            match lines {
                Ok(lines) => console.edit_form(FormField::AdminOpenids, &lines.join("\n")),
                Err(e) => console.notice(Channel::Config, &e.to_string(), true),
            }
        }
        _ => console.notice(
            Channel::Config,
            "usage: /config [load|show|save|openids [ids...]|max <n>|window <n>]",
            true,
        ),
    }
}

fn print_help() {
    println!("Session:");
    println!("  /login <token>          - log in with the admin panel token");
    println!("  /logout                 - end the session");
    println!("  /session                - show session state");
    println!("Users:");
    println!("  /search <keyword>       - search by name, student id, openid or id");
    println!("  /refresh                - repeat the last search");
    println!("  /users                  - show the current results again");
    println!("  /toggle <user-id>       - grant or revoke admin for a listed user");
    println!("Config:");
    println!("  /config [load]          - fetch the runtime config");
    println!("  /config show            - show the edited form");
    println!("  /config openids [ids..] - replace the admin openid allow-list");
    println!("  /config max <n>         - rate limit max requests (empty = unset)");
    println!("  /config window <n>      - rate limit window seconds (empty = unset)");
    println!("  /config save            - validate and save the form");
    println!("  /help, /exit");
}
