pub mod api_client;
pub mod chat_stream;
pub mod config;
pub mod credentials;
pub mod engine;
pub mod error;
pub mod helper;
pub mod memory;
pub mod message;
pub mod multichat;
pub mod persona;
pub mod prompts;
pub mod provider;
pub mod session;
pub mod snapshot;
pub mod translate;
pub mod usage;
