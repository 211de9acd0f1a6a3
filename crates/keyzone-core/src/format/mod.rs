//! Readers for keyboard layout files.

pub mod drawio;
