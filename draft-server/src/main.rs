//! Entry point of the draft server: one process directs one game. It loads
//! the game configuration and boosters from the config service, then serves
//! the WebSocket endpoint the players connect to, with a static file fallback
//! for the web client.

mod config;
mod director;
mod resources;
mod round_ticker;
mod session;

use axum::Router;
use axum::extract::{State, WebSocketUpgrade};
use axum::http::{HeaderMap, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use clap::Parser;
use protocol::MAX_MESSAGE_SIZE;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tower_http::services::{ServeDir, ServeFile};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::director::{DirectorHandle, GameDirector};
use crate::resources::DraftResources;
use crate::session::SessionHandle;

#[derive(Parser)]
#[command(about = "Server-side director for one booster draft")]
struct Args {
    /// The port the server will open a socket server on.
    #[arg(long, default_value_t = 8000)]
    port: u16,
    /// Four byte url safe hex string identifying the game to direct.
    #[arg(long = "gameId")]
    game_id: String,
    /// Let stalling players keep their full pack instead of autopicking for
    /// them when the round timer runs out.
    #[arg(long)]
    no_server_force_pick: bool,
}

/// Everything the connection handler needs.
struct AppState {
    director: DirectorHandle,
    game_id: String,
    /// Source of session ids and wire generations.
    connection_seq: AtomicU64,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("{}=debug", env!("CARGO_CRATE_NAME")).into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_file(true)
                .with_line_number(true)
                .with_target(true),
        )
        .init();

    let args = Args::parse();
    let api = config::api_base_from_env();
    let client = reqwest::Client::new();

    let options = match config::fetch_general_options(&client, &api, &args.game_id).await {
        Ok(options) => options,
        Err(err) => {
            tracing::error!(game = %args.game_id, error = %err, "cannot get game options");
            std::process::exit(1);
        }
    };
    tracing::info!(
        game = %args.game_id,
        title = %options.game_title,
        private = options.private_game,
        players = options.total_players,
        "loaded game options"
    );
    let resources = match DraftResources::load(&client, &api, &options).await {
        Ok(resources) => resources,
        Err(err) => {
            tracing::error!(game = %args.game_id, error = %err, "cannot load game resources");
            std::process::exit(1);
        }
    };

    let (director, handle) = GameDirector::new(
        options,
        args.game_id.clone(),
        resources,
        !args.no_server_force_pick,
    );
    let mut director_task = tokio::spawn(director.run());

    let state = Arc::new(AppState {
        director: handle,
        game_id: args.game_id,
        connection_seq: AtomicU64::new(0),
    });

    let app = Router::new()
        .route("/ws", get(websocket_handler))
        .with_state(state)
        .fallback_service(
            ServeDir::new("webroot").not_found_service(ServeFile::new("webroot/index.html")),
        );

    let listener = match tokio::net::TcpListener::bind(("0.0.0.0", args.port)).await {
        Ok(listener) => listener,
        Err(err) => {
            tracing::error!(port = args.port, error = %err, "cannot bind listener");
            std::process::exit(1);
        }
    };
    tracing::info!(port = args.port, "listening");

    tokio::spawn(async move {
        if let Err(err) = axum::serve(listener, app).await {
            tracing::error!(error = %err, "http server failed");
            std::process::exit(1);
        }
    });

    let code = tokio::select! {
        finished = &mut director_task => finished.unwrap_or(1),
        _ = tokio::signal::ctrl_c() => 0,
    };
    std::process::exit(code);
}

/// Upgrades the connection to a WebSocket and hands the session over to the
/// director. A valid draft cookie re-attaches the wire to its old client id;
/// everyone else gets a fresh id, returned in the cookie on the response.
async fn websocket_handler(
    ws: WebSocketUpgrade,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> Response {
    let seq = state.connection_seq.fetch_add(1, Ordering::Relaxed);
    let id = match session::draft_cookie(&headers)
        .filter(|id| id.starts_with(&format!("{}_", state.game_id)))
    {
        Some(resumed) => {
            // Keep the id counter ahead of resumed ids so fresh ones cannot
            // collide with a seat handed back by cookie.
            if let Some(past) = resumed
                .rsplit('_')
                .next()
                .and_then(|raw| raw.parse::<u64>().ok())
            {
                state.connection_seq.fetch_max(past + 1, Ordering::Relaxed);
            }
            resumed
        }
        None => format!("{}_{seq}", state.game_id),
    };

    let (handle, outbox, done) = SessionHandle::create(id.clone(), seq);
    state.director.add_client(handle).await;

    let director = state.director.clone();
    let session_id = id.clone();
    let mut response = ws
        .max_message_size(MAX_MESSAGE_SIZE)
        .on_upgrade(move |socket| session::run(socket, director, session_id, seq, outbox, done))
        .into_response();
    if let Some(cookie) = session::draft_cookie_header(&id) {
        response.headers_mut().append(header::SET_COOKIE, cookie);
    }
    response
}
