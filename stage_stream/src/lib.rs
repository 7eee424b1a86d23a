//! # Stage Stream Library
//!
//! Real-time streaming core for the piezo stage: a deadline-driven sampler
//! feeds a lock-free single-producer/single-consumer ring; a batch publisher
//! drains the ring onto the position topic; a dispatcher executes operator
//! commands from the command topic and answers each with exactly one result
//! message.
//!
//! ## Data Flow
//!
//! ```text
//! controllers -> Sampler -> SampleRing -> Publisher -> bus (QoS 0)
//! bus -> CommandFifo -> Dispatcher -> controllers
//!                                  -> bus results (QoS 1)
//! ```
//!
//! ## Threads
//!
//! Three long-lived threads plus the bus event loop: the sampler runs with
//! elevated priority on a pinned core where the host permits it; publisher
//! and dispatcher run at normal priority. All of them share one read-mostly
//! [`status::SharedState`] of atomics.

pub mod bus;
pub mod dispatcher;
pub mod publisher;
pub mod ring;
pub mod sampler;
pub mod status;
