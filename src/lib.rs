pub mod record;
pub mod buffer;
pub mod backoff;
pub mod error;
pub mod client;
pub mod config;
pub mod env;
pub mod events;
pub mod template;
pub mod connection;
mod flusher;
pub mod writer;
pub mod transform;
pub mod layer;
pub mod backend;

#[cfg(feature = "elasticsearch")]
pub mod elasticsearch;

pub mod init;
pub mod noop_client;

#[cfg(test)]
mod test_support;
