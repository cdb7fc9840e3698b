//! Common utilities and types shared across Rendezvous components.

#![warn(clippy::pedantic)]

/// Module for identifier newtypes
pub mod types;

/// Module for the injectable wall clock
pub mod clock;
