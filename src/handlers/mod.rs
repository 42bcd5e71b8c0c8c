//! Request handlers for different server endpoints

pub mod websocket;

use warp::Filter;

use crate::constants::WS_PATH;
use crate::core::gateway::SharedGateway;

// Re-export the websocket handler
pub use websocket::handle_ws_client;

const BANNER: &str = "rusty-whisper relay is running";

/// All HTTP routes served by the relay
pub fn routes(
    gateway: SharedGateway,
) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    let max_frame = gateway.config().max_frame_bytes;
    let with_gateway = warp::any().map(move || gateway.clone());

    let ws_route = warp::path(WS_PATH)
        .and(warp::path::end())
        .and(warp::ws())
        .and(with_gateway)
        .map(move |ws: warp::ws::Ws, gateway: SharedGateway| {
            ws.max_message_size(max_frame)
                .max_frame_size(max_frame)
                .on_upgrade(move |socket| handle_ws_client(socket, gateway))
        });

    let health_route = warp::path("health")
        .and(warp::path::end())
        .and(warp::get())
        .map(|| "OK");

    let root_route = warp::path::end().and(warp::get()).map(|| BANNER);

    ws_route.or(health_route).or(root_route)
}
