//! Wire layer: newline framing plus the textual request/reply grammar.

pub mod codec;
pub mod protocol;

pub use codec::LineCodec;
pub use protocol::{DecodeError, IdRequest, Reply, Request};
