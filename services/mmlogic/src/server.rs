//! HTTP and WebSocket transport
//!
//! Unary calls are JSON `POST` endpoints under `/v1`. Player pools stream
//! over a WebSocket: the client sends one `PlayerPool` text frame and gets
//! one text frame per page back, followed by a close frame.

use crate::api::MmlogicApi;
use crate::engine::PageSink;
use crate::error::{ApiError, EngineError, SinkError};
use anyhow::Context;
use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use mmlogic_protocol::{IgnoreListQuery, MatchObject, PlayerPool, Profile, RpcResult, Timestamp};
use serde::Serialize;
use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, info, warn};
use warp::http::StatusCode;
use warp::ws::{Message, WebSocket};
use warp::{Filter, Rejection, Reply};

const MAX_BODY_BYTES: u64 = 4 * 1024 * 1024;

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

fn status_for(err: &ApiError) -> StatusCode {
    match err {
        ApiError::BadRequest(_) | ApiError::ProfileDecode { .. } => StatusCode::BAD_REQUEST,
        ApiError::UnknownIgnoreList(_) => StatusCode::NOT_FOUND,
        ApiError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        ApiError::Cancelled => StatusCode::REQUEST_TIMEOUT,
        ApiError::Engine(EngineError::FilterTooLarge { .. }) => StatusCode::UNPROCESSABLE_ENTITY,
        ApiError::Engine(EngineError::Store { source, .. }) if source.is_connection_error() => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        ApiError::Engine(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn json_reply<T: Serialize>(result: Result<T, ApiError>) -> warp::reply::WithStatus<warp::reply::Json> {
    match result {
        Ok(body) => warp::reply::with_status(warp::reply::json(&body), StatusCode::OK),
        Err(e) => warp::reply::with_status(
            warp::reply::json(&ErrorBody { error: e.to_string() }),
            status_for(&e),
        ),
    }
}

fn with_api(api: Arc<MmlogicApi>) -> impl Filter<Extract = (Arc<MmlogicApi>,), Error = Infallible> + Clone {
    warp::any().map(move || Arc::clone(&api))
}

/// Every route the service exposes
pub fn routes(api: Arc<MmlogicApi>) -> impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone {
    let health = warp::path("health")
        .and(warp::path::end())
        .and(warp::get())
        .map(|| warp::reply::with_status("OK", StatusCode::OK));

    let status = warp::path("status")
        .and(warp::path::end())
        .and(warp::get())
        .and(with_api(Arc::clone(&api)))
        .map(|api: Arc<MmlogicApi>| warp::reply::json(&api.status()));

    let get_profile = warp::path!("v1" / "profiles" / "get")
        .and(warp::post())
        .and(with_api(Arc::clone(&api)))
        .and(warp::body::content_length_limit(MAX_BODY_BYTES))
        .and(warp::body::json())
        .and_then(|api: Arc<MmlogicApi>, request: Profile| async move {
            Ok::<_, Infallible>(json_reply(api.get_profile(&request.id).await))
        });

    let create_proposal = warp::path!("v1" / "proposals")
        .and(warp::post())
        .and(with_api(Arc::clone(&api)))
        .and(warp::body::content_length_limit(MAX_BODY_BYTES))
        .and(warp::body::json())
        .and_then(|api: Arc<MmlogicApi>, proposal: MatchObject| async move {
            let reply = match api.create_proposal(&proposal).await {
                Ok(result) => warp::reply::with_status(warp::reply::json(&result), StatusCode::OK),
                Err(e) => warp::reply::with_status(
                    warp::reply::json(&RpcResult::failed(&e)),
                    status_for(&e),
                ),
            };
            Ok::<_, Infallible>(reply)
        });

    let list_ignored = warp::path!("v1" / "ignorelists" / "list")
        .and(warp::post())
        .and(with_api(Arc::clone(&api)))
        .and(warp::body::json())
        .and_then(|api: Arc<MmlogicApi>, older_than: Timestamp| async move {
            Ok::<_, Infallible>(json_reply(api.list_ignored_players(older_than).await))
        });

    let all_ignored = warp::path!("v1" / "ignorelists" / "all")
        .and(warp::post())
        .and(with_api(Arc::clone(&api)))
        .and(warp::body::json())
        .and_then(|api: Arc<MmlogicApi>, query: IgnoreListQuery| async move {
            Ok::<_, Infallible>(json_reply(api.get_all_ignored_players(query).await))
        });

    let player_pool = warp::path!("v1" / "player_pool")
        .and(warp::ws())
        .and(with_api(api))
        .map(|ws: warp::ws::Ws, api: Arc<MmlogicApi>| {
            ws.on_upgrade(move |socket| serve_player_pool(api, socket))
        });

    health
        .or(status)
        .or(get_profile)
        .or(create_proposal)
        .or(list_ignored)
        .or(all_ignored)
        .or(player_pool)
        .recover(handle_rejection)
}

async fn handle_rejection(err: Rejection) -> Result<impl Reply, Infallible> {
    let (status, message) = if err.is_not_found() {
        (StatusCode::NOT_FOUND, "Not found".to_string())
    } else if let Some(e) = err.find::<warp::filters::body::BodyDeserializeError>() {
        (StatusCode::BAD_REQUEST, format!("Invalid request body: {}", e))
    } else if err.find::<warp::reject::PayloadTooLarge>().is_some() {
        (StatusCode::PAYLOAD_TOO_LARGE, "Request body too large".to_string())
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        (StatusCode::METHOD_NOT_ALLOWED, "Method not allowed".to_string())
    } else {
        warn!("Unhandled rejection: {:?}", err);
        (StatusCode::INTERNAL_SERVER_ERROR, "Internal error".to_string())
    };
    Ok(warp::reply::with_status(
        warp::reply::json(&ErrorBody { error: message }),
        status,
    ))
}

/// Pages written straight to the client socket
struct WebSocketSink<'a> {
    inner: &'a mut SplitSink<WebSocket, Message>,
}

#[async_trait]
impl<'a> PageSink for WebSocketSink<'a> {
    async fn send_page(&mut self, page: PlayerPool) -> Result<(), SinkError> {
        let text = serde_json::to_string(&page).map_err(|e| SinkError::new(e.to_string()))?;
        self.inner
            .send(Message::text(text))
            .await
            .map_err(|e| SinkError::new(e.to_string()))
    }
}

async fn serve_player_pool(api: Arc<MmlogicApi>, socket: WebSocket) {
    let (mut ws_sender, mut ws_receiver) = socket.split();

    let pool = match read_request(&mut ws_receiver).await {
        Ok(pool) => pool,
        Err(e) => {
            warn!(error = %e, "Rejected player pool request");
            send_error_and_close(&mut ws_sender, &e).await;
            return;
        }
    };
    let pool_id = pool.id.clone();
    info!(pool_id = %pool_id, "Player pool stream opened");

    let mut sink = WebSocketSink {
        inner: &mut ws_sender,
    };
    let outcome = tokio::select! {
        result = api.get_player_pool(pool, &mut sink) => result,
        _ = client_gone(&mut ws_receiver) => Err(ApiError::Cancelled),
    };

    match outcome {
        Ok(summary) => {
            debug!(pool_id = %pool_id, pages = summary.pages, players = summary.players, "Player pool stream complete");
            let _ = ws_sender.send(Message::close()).await;
        }
        Err(ApiError::Cancelled) => {
            info!(pool_id = %pool_id, "Client disconnected, player pool request cancelled");
        }
        Err(e) => {
            warn!(pool_id = %pool_id, error = %e, "Player pool stream failed");
            send_error_and_close(&mut ws_sender, &e).await;
        }
    }
}

async fn read_request(ws_receiver: &mut SplitStream<WebSocket>) -> Result<PlayerPool, ApiError> {
    while let Some(frame) = ws_receiver.next().await {
        let message = frame.map_err(|e| ApiError::BadRequest(e.to_string()))?;
        if message.is_close() {
            break;
        }
        if let Ok(text) = message.to_str() {
            return serde_json::from_str(text)
                .map_err(|e| ApiError::BadRequest(format!("invalid player pool: {}", e)));
        }
        if message.is_binary() {
            return serde_json::from_slice(message.as_bytes())
                .map_err(|e| ApiError::BadRequest(format!("invalid player pool: {}", e)));
        }
    }
    Err(ApiError::Cancelled)
}

/// Resolves once the client closes the socket or the connection drops
async fn client_gone(ws_receiver: &mut SplitStream<WebSocket>) {
    while let Some(frame) = ws_receiver.next().await {
        match frame {
            Ok(message) if message.is_close() => return,
            Ok(_) => continue,
            Err(_) => return,
        }
    }
}

async fn send_error_and_close(ws_sender: &mut SplitSink<WebSocket, Message>, err: &ApiError) {
    if matches!(err, ApiError::Cancelled) {
        return;
    }
    if let Ok(body) = serde_json::to_string(&ErrorBody { error: err.to_string() }) {
        let _ = ws_sender.send(Message::text(body)).await;
    }
    let _ = ws_sender.send(Message::close()).await;
}

/// HTTP server bound to the configured address
pub struct MmlogicServer {
    api: Arc<MmlogicApi>,
    address: SocketAddr,
}

impl MmlogicServer {
    pub fn new(api: Arc<MmlogicApi>) -> anyhow::Result<Self> {
        let listen = api.config().listen_address();
        let address: SocketAddr = listen
            .parse()
            .with_context(|| format!("Invalid bind address: {}", listen))?;
        Ok(Self { api, address })
    }

    pub fn address(&self) -> SocketAddr {
        self.address
    }

    /// Serve until `shutdown` resolves, then close the store pool
    pub async fn run(self, shutdown: impl Future<Output = ()> + Send + 'static) -> anyhow::Result<()> {
        let (bound, server) = warp::serve(routes(Arc::clone(&self.api)))
            .try_bind_with_graceful_shutdown(self.address, shutdown)?;
        info!(address = %bound, "Matchmaking logic API listening");

        server.await;
        self.api.shutdown();
        info!("Matchmaking logic API stopped");
        Ok(())
    }
}
