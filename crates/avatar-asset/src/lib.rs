//! Asset data for avatar composition.
//!
//! This library provides the data side of the avatar engine: the avatar
//! configuration and part catalog, skeletons and animation clips as they come
//! out of an importer, the bone-name dictionaries used for retargeting, and a
//! glTF loader producing [`scene::ImportedScene`] values. Nothing in here owns
//! runtime state; the engine crate drives loading and playback.
pub mod animation;
pub mod bone_map;
pub mod catalog;
pub mod config;
pub mod index;
/// Scene loaders for supported formats
pub mod loader;
pub mod mesh;
pub mod node;
pub mod scene;
pub mod skeleton;
