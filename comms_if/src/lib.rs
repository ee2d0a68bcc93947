//! # Communications interface crate.
//!
//! Provides all common communications interfaces between the operator station and the vehicle.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Drive command definition and its text wire format
pub mod cmd;

/// Network module
pub mod net;
