//! Skiff CLI entry point.
//!
//! A line-oriented client for exercising the synchronization engine against
//! a live server: connects, tails the selected room, and forwards typed
//! lines as messages. `/join <room-id>`, `/older`, `/read`, and `/quit` are
//! the only commands.

// Chat lines are the UI here.
#![allow(clippy::print_stdout)]

use clap::Parser;
use skiff_client::{
    ClientConfig, RestRoomDirectory, RoomDirectory, SessionCommand, SessionUpdate, StaticToken,
    SyncSession, fetch_current_user,
};
use skiff_core::TimelineMutation;
use skiff_proto::{Room, RoomId};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

/// Skiff headless chat client
#[derive(Parser, Debug)]
#[command(name = "skiff")]
#[command(about = "Headless client for the Skiff synchronization engine")]
#[command(version)]
struct Args {
    /// Base URL of the REST boundary
    #[arg(long, default_value = "http://localhost:8000/api")]
    api: String,

    /// URL of the socket endpoint
    #[arg(long, default_value = "ws://localhost:8000/ws")]
    socket: String,

    /// Bearer token for the authenticated user
    #[arg(long, env = "SKIFF_TOKEN")]
    token: String,

    /// Room to enter on startup (defaults to the first listed room)
    #[arg(long)]
    room: Option<i64>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config = ClientConfig {
        api_base: args.api,
        socket_url: args.socket,
        ..ClientConfig::default()
    };
    let config_shared = Arc::new(config.clone());

    let tokens = StaticToken::new(args.token);
    let http = reqwest::Client::new();

    let me = fetch_current_user(&http, &config, tokens.as_ref()).await?;
    tracing::info!(user = %me.username, "authenticated");

    let directory = RestRoomDirectory::new(http, config_shared, tokens.clone());
    let rooms = directory.list_rooms().await?;
    if rooms.is_empty() {
        tracing::error!("no rooms to join; create one first");
        return Ok(());
    }

    let initial = match args.room {
        Some(id) => rooms.iter().find(|r| r.id == RoomId(id)).cloned(),
        None => rooms.first().cloned(),
    };
    let Some(initial) = initial else {
        tracing::error!("requested room not found");
        return Ok(());
    };

    let mut handle = SyncSession::spawn(config, tokens, directory, me);
    let mut active = initial.id;
    handle.commands.send(SessionCommand::SelectRoom { room: initial }).await?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            update = handle.updates.recv() => match update {
                Some(update) => render(update),
                None => break,
            },

            line = lines.next_line() => {
                let Ok(Some(line)) = line else { break };
                let line = line.trim().to_owned();
                if line.is_empty() {
                    continue;
                }

                match parse_command(&line, &rooms) {
                    Input::Quit => break,
                    Input::Select(room) => {
                        active = room.id;
                        handle.commands.send(SessionCommand::SelectRoom { room }).await?;
                    },
                    Input::LoadOlder => {
                        handle.commands.send(SessionCommand::LoadOlder { room_id: active }).await?;
                    },
                    Input::MarkRead => {
                        handle.commands.send(SessionCommand::MarkRead { room_id: active }).await?;
                    },
                    Input::Say(content) => {
                        handle.commands
                            .send(SessionCommand::SendMessage { room_id: active, content })
                            .await?;
                    },
                    Input::Unknown(command) => {
                        tracing::warn!(%command, "unknown command");
                    },
                }
            },
        }
    }

    let _ = handle.commands.send(SessionCommand::Shutdown).await;
    Ok(())
}

enum Input {
    Quit,
    Select(Room),
    LoadOlder,
    MarkRead,
    Say(String),
    Unknown(String),
}

fn parse_command(line: &str, rooms: &[Room]) -> Input {
    if !line.starts_with('/') {
        return Input::Say(line.to_owned());
    }

    let mut parts = line.splitn(2, ' ');
    let command = parts.next().unwrap_or_default();
    let argument = parts.next().unwrap_or_default().trim();

    match command {
        "/quit" => Input::Quit,
        "/older" => Input::LoadOlder,
        "/read" => Input::MarkRead,
        "/join" => match argument.parse::<i64>() {
            Ok(id) => match rooms.iter().find(|r| r.id == RoomId(id)) {
                Some(room) => Input::Select(room.clone()),
                None => Input::Unknown(format!("no such room: {id}")),
            },
            Err(_) => Input::Unknown(line.to_owned()),
        },
        other => Input::Unknown(other.to_owned()),
    }
}

fn render(update: SessionUpdate) {
    match update {
        SessionUpdate::Connection(state) => {
            tracing::info!(?state, "connection");
        },

        SessionUpdate::TimelineChanged { room_id, mutation, snapshot } => match mutation {
            TimelineMutation::InitialLoaded | TimelineMutation::ContextLoaded { .. } => {
                println!("--- room {room_id}: {} messages ---", snapshot.messages.len());
                for message in snapshot.messages.iter() {
                    print_message(message);
                    if snapshot.unread_anchor == Some(message.id) {
                        println!("--- unread ---");
                    }
                }
            },
            TimelineMutation::LiveAppended => {
                if let Some(message) = snapshot.messages.last() {
                    print_message(message);
                }
            },
            TimelineMutation::OlderPrepended { added, .. } => {
                println!("--- loaded {added} older messages ---");
            },
            TimelineMutation::NewerAppended { added } => {
                println!("--- loaded {added} newer messages ---");
            },
            TimelineMutation::LiveBuffered { .. } | TimelineMutation::Noop => {},
        },

        SessionUpdate::NewMessagesAvailable { room_id, buffered } => {
            println!("--- {buffered} new messages in room {room_id} (jump to latest) ---");
        },

        SessionUpdate::Presence { room_id, online } => {
            let names: Vec<&str> = online.iter().map(|u| u.username.as_str()).collect();
            println!("--- room {room_id} online: {} ---", names.join(", "));
        },

        SessionUpdate::Typing { room_id, users } => {
            if !users.is_empty() {
                let names: Vec<&str> = users.iter().map(|u| u.username.as_str()).collect();
                println!("--- room {room_id}: {} typing ---", names.join(", "));
            }
        },

        SessionUpdate::Unread { room_id, unread } => {
            tracing::debug!(room = %room_id, unread, "unread counter");
        },

        SessionUpdate::InitialLoadFailed { room_id, error } => {
            tracing::error!(room = %room_id, %error, "initial load failed; /join again to retry");
        },

        SessionUpdate::ServerNotice { message } => {
            tracing::warn!(%message, "server notice");
        },
    }
}

fn print_message(message: &skiff_proto::Message) {
    println!("[{}] {}: {}", message.created_at, message.username, message.content);
}
