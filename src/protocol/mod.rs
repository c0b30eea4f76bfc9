//! Protocol module - wire primitives and the message catalog.
//!
//! This module implements the binary protocol spoken over stdio:
//! - Big endian `u32`, length-prefixed data and success bytes
//! - The fixed catalog of message kinds and their body layouts

mod message;
mod wire_format;

pub use message::{FormatTextBody, Message, MessageBody, MessageKind};
pub use wire_format::{
    put_success_bytes, put_u32, put_variable_data, MessageReader, MessageWriter,
    DEFAULT_MAX_DATA_SIZE, SUCCESS_BYTES, U32_SIZE,
};
