//! Coprocessor offload plumbing.
//!
//! The host talks to the coprocessor through a [`Session`] that exchanges
//! fixed-shape [`Message`]s over a [`Link`]. Data crosses in a
//! [`SharedMemory`] pool whose regions are handed back and forth with
//! explicit begin/end calls. [`EmulatedLink`] runs the coprocessor firmware
//! on a background thread so the whole path runs without hardware.

pub mod firmware;
pub mod memory;
pub mod protocol;
pub mod session;

pub use firmware::EmulatedLink;
pub use memory::{Owner, SharedBuffer, SharedMemory};
pub use protocol::{Message, Opcode, Status};
pub use session::{Link, Session, SessionState};
