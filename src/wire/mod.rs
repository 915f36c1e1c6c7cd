//! Wire format shared by submitting clients and the mesh entry node.
//!
//! The framer is independent of the tracing pipeline; the only thing it
//! shares with the correlator is the [`CorrelationId`](crate::ids::CorrelationId).

pub mod client;
mod frame;

pub use client::{submit, ClientError, SubmitResponse};
pub use frame::{
    encode, read_frame, write_frame, FrameLimits, FramingError, RequestFrame, FIXED_HEADER_LEN,
    WIRE_VERSION,
};
