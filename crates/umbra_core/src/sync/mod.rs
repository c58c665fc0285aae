//! # Frame Pipelining
//!
//! ## The Problem
//!
//! ```text
//! Frame N:    host flushes mirror buffers, device reads them
//! Frame N+1:  host flushes again while frame N may still be executing
//!
//! Releasing frame N's staging buffers now: USE-AFTER-FREE on the device
//! ```
//!
//! ## The Solution: Generations
//!
//! Every transient resource is parked on the generation that recorded it.
//! A generation is only reused after its fence has signalled, so anything
//! parked on it is provably idle when released.

mod frame_ring;

pub use frame_ring::{FrameRing, Generation, GenerationState, ReleaseCallback};
