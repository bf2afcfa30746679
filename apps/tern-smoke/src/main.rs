//! End-to-end smoke run of the sync engine against the in-memory backend.
//!
//! Seeds three days of history, activates a channel, backfills to the start
//! of history (one page via a scroll trigger, the rest via explicit
//! requests), then overlays live create/edit/delete events and prints the
//! resulting snapshots.

use std::{env, process, sync::Arc, time::Duration};

use chrono::{TimeDelta, Utc};
use tokio::time::timeout;
use tracing_subscriber::EnvFilter;

use sync_core::{
    EventStream, LiveEvent, Message, MessageBlock, MessagePayload, ScrollMetrics, SyncCommand,
    SyncEvent, ViewSnapshot,
};
use sync_runtime::{SyncConfig, spawn_runtime};
use sync_transport::InMemoryChatServer;

const CHANNEL: &str = "general";
const EVENT_WAIT: Duration = Duration::from_secs(5);
const DEFAULT_FILTER: &str = "info,sync_runtime=debug";
const AUTHORS: [&str; 3] = ["alice", "bob", "carol"];

#[tokio::main]
async fn main() {
    init_tracing();

    let config = match SyncConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("invalid configuration: {err}");
            process::exit(1);
        }
    };

    let server = Arc::new(InMemoryChatServer::new());
    seed_demo_history(&server);

    let handle = spawn_runtime(server.clone(), config);
    let mut events = handle.subscribe();
    let mut feed_events = handle.subscribe();

    send(&handle, SyncCommand::ActivateChannel {
        channel_id: CHANNEL.to_owned(),
    })
    .await;

    let initial = settled_snapshot(&mut events).await;
    print_snapshot("initial page", &initial);

    // One backfill through the scroll path, the rest through explicit
    // requests.
    send(&handle, SyncCommand::ScrollChanged {
        metrics: ScrollMetrics {
            scroll_top: 0.0,
            viewport_height: 600.0,
            content_height: 2_400.0,
        },
    })
    .await;
    let mut snapshot = settled_snapshot(&mut events).await;
    print_snapshot("after scroll-triggered backfill", &snapshot);

    while !snapshot.end_of_history {
        send(&handle, SyncCommand::RequestOlder).await;
        snapshot = settled_snapshot(&mut events).await;
        print_snapshot("after backfill", &snapshot);
    }

    wait_feed_connected(&mut feed_events).await;

    let edited_id = overlay_live_events(&server, &snapshot);
    let final_snapshot = loop {
        let candidate = settled_snapshot(&mut events).await;
        let edited_applied = candidate.blocks.iter().any(|block| {
            matches!(
                block,
                MessageBlock::Message { message } if message.id == edited_id && message.edited
            )
        });
        let tombstone_applied = candidate.blocks.iter().any(|block| {
            matches!(
                block,
                MessageBlock::Message { message } if message.deleted
            )
        });
        let created_applied = candidate.blocks.iter().any(|block| {
            matches!(
                block,
                MessageBlock::Message { message } if message.author == "dora"
            )
        });
        if edited_applied && tombstone_applied && created_applied {
            break candidate;
        }
    };
    print_snapshot("after live overlay", &final_snapshot);

    println!(
        "smoke run complete: {} blocks, end_of_history={}",
        final_snapshot.blocks.len(),
        final_snapshot.end_of_history
    );
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| {
            env::var("TERN_LOG")
                .ok()
                .filter(|value| !value.trim().is_empty())
                .map(EnvFilter::try_new)
                .unwrap_or_else(|| EnvFilter::try_new(DEFAULT_FILTER))
        })
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let _ = tracing_subscriber::fmt()
        .with_target(true)
        .with_env_filter(filter)
        .try_init();
}

fn seed_demo_history(server: &InMemoryChatServer) {
    let start = Utc::now() - TimeDelta::days(2);
    let mut messages = Vec::new();
    for day in 0..3_i64 {
        for slot in 0..12_i64 {
            let sent_at = start + TimeDelta::days(day) + TimeDelta::minutes(slot * 7);
            let author = AUTHORS[(day + slot) as usize % AUTHORS.len()];
            messages.push(InMemoryChatServer::new_message(
                CHANNEL,
                author,
                format!("message {} of day {}", slot + 1, day + 1),
                sent_at,
            ));
        }
    }
    server.seed_channel(CHANNEL, messages);
}

/// Push a created, an updated and a deleted event; returns the edited ID.
fn overlay_live_events(server: &InMemoryChatServer, snapshot: &ViewSnapshot) -> String {
    let mut newest = None;
    let mut oldest = None;
    for block in &snapshot.blocks {
        if let MessageBlock::Message { message } = block {
            if oldest.is_none() {
                oldest = Some(message.clone());
            }
            newest = Some(message.clone());
        }
    }
    let (Some(mut newest), Some(oldest)) = (newest, oldest) else {
        eprintln!("history is empty; nothing to overlay");
        process::exit(1);
    };

    server.push_live(LiveEvent::MessageCreated {
        message: InMemoryChatServer::new_message(CHANNEL, "dora", "just joined the party", Utc::now()),
    });

    let edited_id = newest.id.clone();
    newest.payload = MessagePayload::Text {
        body: "message (edited live)".to_owned(),
    };
    newest.edited = true;
    newest.revision += 1;
    server.push_live(LiveEvent::MessageUpdated { message: newest });

    server.push_live(LiveEvent::MessageDeleted {
        channel_id: CHANNEL.to_owned(),
        message_id: oldest.id,
        revision: u64::MAX,
    });

    edited_id
}

async fn send(handle: &sync_runtime::SyncHandle, command: SyncCommand) {
    if let Err(err) = handle.send(command).await {
        eprintln!("runtime unavailable: {err}");
        process::exit(1);
    }
}

async fn next_event(events: &mut EventStream) -> SyncEvent {
    match timeout(EVENT_WAIT, events.recv()).await {
        Ok(Ok(event)) => event,
        Ok(Err(err)) => {
            eprintln!("event stream closed: {err}");
            process::exit(1);
        }
        Err(_) => {
            eprintln!("timed out waiting for sync events");
            process::exit(1);
        }
    }
}

async fn settled_snapshot(events: &mut EventStream) -> ViewSnapshot {
    loop {
        if let SyncEvent::ViewUpdated { snapshot } = next_event(events).await
            && !snapshot.is_loading()
        {
            return snapshot;
        }
    }
}

async fn wait_feed_connected(events: &mut EventStream) {
    loop {
        if let SyncEvent::FeedStatus(status) = next_event(events).await
            && status.connected
        {
            return;
        }
    }
}

fn print_snapshot(label: &str, snapshot: &ViewSnapshot) {
    println!("== {label} ==");
    for block in &snapshot.blocks {
        match block {
            MessageBlock::DateDivider { date } => println!("  ---- {date} ----"),
            MessageBlock::Message { message } => println!("  {}", format_message(message)),
        }
    }
    println!(
        "  ({} blocks, end_of_history={})",
        snapshot.blocks.len(),
        snapshot.end_of_history
    );
}

fn format_message(message: &Message) -> String {
    if message.deleted {
        return format!(
            "[{}] {}: <deleted>",
            message.sent_at.format("%H:%M"),
            message.author
        );
    }

    let body = match &message.payload {
        MessagePayload::Text { body } => body.clone(),
        MessagePayload::Image { url, .. } => format!("<image {url}>"),
        MessagePayload::File { file_name, .. } => format!("<file {file_name}>"),
        MessagePayload::Poll { question, .. } => format!("<poll: {question}>"),
        MessagePayload::System { note } => format!("<system: {note}>"),
    };
    let marker = if message.edited { " (edited)" } else { "" };
    format!(
        "[{}] {}: {}{marker}",
        message.sent_at.format("%H:%M"),
        message.author,
        body
    )
}
