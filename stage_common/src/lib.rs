//! Stage Common Library
//!
//! Shared types for the piezo stage streaming service: the logical axis
//! model, the position sample record, the command grammar, the bus wire
//! formats, and configuration loading.
//!
//! # Module Structure
//!
//! - [`axis`] - Logical axis identifiers and valid-mask bits
//! - [`sample`] - The fixed-size position sample record
//! - [`command`] - Typed command grammar for the command topic
//! - [`wire`] - Position line and result message wire formats
//! - [`config`] - TOML configuration loading and validation
//! - [`consts`] - Topics, rate bounds, batch and ring defaults

pub mod axis;
pub mod command;
pub mod config;
pub mod consts;
pub mod sample;
pub mod wire;
