//! Runtime primitives shared by the server's per-client threads: a
//! drop-oldest audio ring, a shutdown-aware packet FIFO, and a
//! duplicate-suppressing video double buffer.
//!
//! None of this is specific to conferencing; it's the plumbing that lets
//! four independently-clocked threads per client (receive, render,
//! audio-render, send) hand data to each other without a full message
//! queue's overhead or blocking semantics.

pub mod double_buffer;
pub mod fifo;
pub mod ring;

pub use double_buffer::DoubleBuffer;
pub use fifo::Fifo;
pub use ring::Ring;
