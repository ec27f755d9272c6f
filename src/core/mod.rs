//! Conversion core: the orchestrator that picks a write path, the block
//! streaming engine, progress/cancellation plumbing, and the background job
//! that runs a conversion off the caller's thread.
pub mod engine;
pub mod job;
pub mod orchestrator;
pub mod params;
pub mod progress;
pub mod tiles;
pub mod transform;
