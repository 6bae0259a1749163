//! Schema-agnostic protobuf wire decoding.
//!
//! [`ByteCursor`] reads primitives off a borrowed buffer and
//! [`walk_message`] iterates the fields of one message. Message-specific
//! knowledge (which field number means what) lives with the callers.

mod cursor;
mod error;
mod walker;

pub use cursor::{ByteCursor, Tag, WireType};
pub use error::DecodeError;
pub use walker::walk_message;
