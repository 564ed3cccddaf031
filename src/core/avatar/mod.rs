//! Talking-avatar session control.
//!
//! The avatar stream is rendered client-side; the server consumes it as a
//! handful of control operations plus speaking-state signals relayed from
//! the renderer.

pub mod base;
pub mod heygen;

pub use base::{AvatarControl, AvatarError};
pub use heygen::{HeygenAvatar, HeygenConfig, HeygenSession};
