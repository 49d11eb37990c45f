// MeshTail - platform/mod.rs
//
// Platform abstraction layer: config files and directories, and the
// network transport the mesh frames travel over.
// Dependencies: util, core model/wire types, directories, tokio.
// Must NOT depend on: app, web.

pub mod config;
pub mod transport;
