//! macOS capture support

pub mod permissions;
