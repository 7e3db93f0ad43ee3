//! More-or-less general-purpose utility functions.

pub mod math;
pub mod namers;
pub mod relpath;
