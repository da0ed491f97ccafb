//! Cylinder calibration, readings, and the shared reading store.
//!
//! This module holds the only mutable state shared between workers: the
//! latest [`Reading`] derived from the scale, kept in a [`ReadingStore`].

pub mod data;
pub mod profile;
pub mod store;

// Re-export commonly used items
pub use data::Reading;
pub use profile::CylinderProfile;
pub use store::ReadingStore;
