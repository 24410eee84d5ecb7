//! Core protocol types for wirecall.
//!
//! This crate provides the wire-level building blocks shared by the client
//! (`wirecall-client`) and server (`wirecall-server`) crates:
//!
//! - [`error`]: the [`RpcError`] type used across the framework
//! - [`frame`]: length-prefixed frame reading and writing
//! - [`message`]: the [`Request`] and [`Response`] wire records
//! - [`serialize`]: payload codecs and the [`SerializerRegistry`]

mod error;
mod frame;
mod message;
mod serialize;

pub use error::*;
pub use frame::*;
pub use message::*;
pub use serialize::*;
