use std::path::Path;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use realtime_client::config::WatchConfig;
use realtime_client::models::{
    MessageNotification, MessageRecord, PresenceNotice, RoomAck, ServerError, TicketSummary,
    TypingSignal,
};
use realtime_client::{EventName, RealtimeSession};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file; env vars may also be set externally
    if dotenvy::dotenv().is_err() {
        let env_path = Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
        let _ = dotenvy::from_path(env_path);
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = WatchConfig::from_env();
    let Some(token) = config.token.clone() else {
        anyhow::bail!("HELPDESK_TOKEN env var is required");
    };

    tracing::info!(
        gateway_url = %config.session.gateway_url,
        ticket_id = ?config.ticket_id,
        "desk-watch configured"
    );

    let session = RealtimeSession::websocket(config.session.clone(), move || Some(token.clone()));
    register_listeners(&session, config.ticket_id);

    session.connect();
    if let Some(ticket_id) = config.ticket_id {
        session.join_room(ticket_id);
    }

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");
    session.shutdown().await;
    Ok(())
}

fn register_listeners(session: &RealtimeSession, watched: Option<i64>) {
    session.on(EventName::CONNECTION_STATE_CHANGED, |payload| {
        tracing::info!(state = %payload["state"], attempt = %payload["attempt"], "connectivity");
        Ok(())
    });
    session.on(EventName::CONNECTION_FAILED, |payload| {
        tracing::error!(reason = %payload["reason"], "{}", payload["message"]);
        Ok(())
    });

    session.on_payload(EventName::NEW_TICKET, |ticket: TicketSummary| {
        tracing::info!(ticket_id = ticket.id, title = %ticket.title, "new ticket");
        Ok(())
    });
    session.on_payload(EventName::TICKET_UPDATED, |ticket: TicketSummary| {
        tracing::info!(ticket_id = ticket.id, status = ?ticket.status, "ticket updated");
        Ok(())
    });

    // Frames are not filtered by room; skip anything for other tickets.
    session.on_payload(EventName::NEW_MESSAGE, move |msg: MessageRecord| {
        if watched.is_some_and(|id| id != msg.ticket_id) {
            return Ok(());
        }
        tracing::info!(
            ticket_id = msg.ticket_id,
            author = %msg.author.name,
            internal = msg.is_internal,
            sent_at = ?msg.sent_at(),
            "{}",
            msg.content
        );
        Ok(())
    });
    session.on_payload(EventName::MESSAGE_NOTIFICATION, move |note: MessageNotification| {
        if watched != Some(note.ticket_id) {
            tracing::info!(ticket_id = note.ticket_id, internal = note.is_internal, "message elsewhere");
        }
        Ok(())
    });
    session.on_payload(EventName::USER_TYPING, |signal: TypingSignal| {
        tracing::debug!(
            ticket_id = signal.ticket_id,
            user = signal.display_name().unwrap_or("?"),
            typing = signal.is_typing,
            "typing"
        );
        Ok(())
    });
    for event in [EventName::JOINED_ROOM, EventName::LEFT_ROOM] {
        session.on_payload(event, move |ack: RoomAck| {
            tracing::info!(ticket_id = ack.ticket_id, room = ?ack.room, "{event}");
            Ok(())
        });
    }
    for event in [EventName::USER_JOINED, EventName::USER_LEFT] {
        session.on_payload(event, move |notice: PresenceNotice| {
            tracing::info!(ticket_id = notice.ticket_id, user = %notice.user.name, "{event}");
            Ok(())
        });
    }
    session.on_payload(EventName::SERVER_ERROR, |err: ServerError| {
        tracing::warn!(detail = %err.message, "server error");
        Ok(())
    });
}
