//! Avatar composition and animation retargeting.
//!
//! The engine loads independently authored part assets, each with its own
//! skeleton, retargets one shared animation clip onto every skeleton and keeps
//! the resulting instances playing in lockstep. Parts can be hot-swapped, and
//! a gender change reloads the whole avatar behind a staging buffer so that
//! old and new parts are never visible together.
//!
//! The host creates an [`controller::AvatarController`] together with its
//! [`controller::AvatarDriver`], spawns the driver on a tokio runtime and
//! talks to it through the controller handle.
pub mod animation;
pub mod config;
pub mod controller;
pub mod error;
pub mod part;
pub mod retarget;
pub mod slot;
pub mod source;
pub mod staging;

pub use avatar_asset as asset;
