pub mod bundle;
pub mod changeset;
pub mod commands;
pub mod config;
pub mod error;
pub mod manifest;
pub mod sweep;
pub mod transient;

#[cfg(test)]
pub(crate) mod testutil;
