pub mod archive;
pub mod checksum;
pub mod cleanup;
pub mod commands;
pub mod download;
pub mod error;
pub mod formula;
pub mod http;
pub mod install;
pub mod platform;
pub mod runtime;
