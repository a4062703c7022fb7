//! Builders for modules used across unit and integration tests.

pub mod factories;
