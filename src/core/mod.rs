// MeshTail - core/mod.rs
//
// Core domain layer: line history, cursor protocol, node registry,
// stream selection and the mesh wire format.
// Dependencies: util layer, standard library, `bytes` for the codec.
// Must NOT depend on: app, platform, web, or any runtime crate.

pub mod model;
pub mod registry;
pub mod ring;
pub mod selector;
pub mod snapshot;
pub mod wire;
