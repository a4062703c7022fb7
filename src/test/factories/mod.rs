//! Factory methods for test modules.

pub mod game;
