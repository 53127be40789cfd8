//! Shared vocabulary for the modgate dispatch pipeline.
//!
//! - **[`platform`]** -- [`Platform`], the closed set of target platforms a
//!   gateway can serve.
//! - **[`operation`]** -- [`OperationKind`], which selects the worker kind
//!   (execute or disassemble) and its route segment.
//! - **[`frame`]** -- the worker wire framing: an incremental base64
//!   [`FrameEncoder`] on the gateway side and the matching [`FrameDecoder`]
//!   on the worker side.
//! - **[`error`]** -- [`FrameError`] and [`ParseError`].
//!
//! Everything here is plain data and synchronous code so that both the async
//! services and the single-threaded worker process can depend on it.

pub mod error;
pub mod frame;
pub mod operation;
pub mod platform;

pub use error::{FrameError, ParseError, Result};
pub use frame::{FrameDecoder, FrameEncoder, decode_frame, encode_frame, read_frame};
pub use operation::OperationKind;
pub use platform::Platform;
