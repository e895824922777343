//! Per-consumer frame reading with overrun detection

pub mod cursor;
pub mod reader;

pub use cursor::ReadCursor;
pub use reader::{FrameRead, FrameReader, FrameView};
