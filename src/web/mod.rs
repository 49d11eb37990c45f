// MeshTail - web/mod.rs
//
// HTTP surface of the live view: the viewer page and the polling,
// node-listing and stream-control endpoints. Handlers are thin adapters
// over `app::view::LiveView`; no state lives here.

pub mod routes;

pub use routes::{router, serve, WebState};
