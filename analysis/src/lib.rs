//! Replay files and the movement statistics derived from them.
//!
//! Everything in here is synchronous and free of I/O, the backend runs it on
//! blocking worker threads.

pub mod codec;
pub mod replay;
pub mod stats;

pub use codec::{decode, encode, magic_from_tag, DecodeError, EncodeError};
pub use replay::{Replay, ReplayHeader, RunFrame};
pub use stats::{aggregate, AggregateError, ZoneCrossing};
