// MeshTail - app/mod.rs
//
// Application layer: the live-view context, log capture, peer forwarding
// and the inbound/announce loops.
// Dependencies: core layer, platform transport trait.
// Must NOT depend on: web.

pub mod forwarder;
pub mod node;
pub mod recorder;
pub mod view;
