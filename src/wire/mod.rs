//! Wire format shared by host and guest.
//!
//! ```text
//! frame := length (u32, little-endian) payload (length bytes)
//! length == 0  => heartbeat, no payload follows
//! ```
//!
//! Both sides of a deployment must agree on the byte order; it is fixed here
//! and never negotiated.

mod frame;

pub use frame::{read_frame, write_frame, write_heartbeat, Decoded, MAX_PAYLOAD_SIZE};

#[cfg(test)]
pub use frame::{encode, heartbeat};
