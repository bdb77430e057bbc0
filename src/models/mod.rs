//! Core data models for the course media pipeline.
//!
//! These types carry no persistence of their own: asset metadata is handed
//! back to the course-persistence collaborator in the upload response, and
//! the only durable state this service owns is the files on disk.

pub mod asset;
pub mod job;
