//! Byte movement between the archive producer and a destination.

pub mod pipe;
pub mod progress;

pub use pipe::{pipe, PipeReader, PipeWriter};
pub use progress::Progress;
