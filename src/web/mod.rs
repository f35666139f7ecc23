mod handlers;
mod routes;
mod signaling_ws;
mod stream_ws;

pub use routes::create_router;
pub use signaling_ws::signaling_ws_handler;
pub use stream_ws::stream_ws_handler;
