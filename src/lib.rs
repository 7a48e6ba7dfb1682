//! aiterm is a command-line chat client for the OpenAI and Gemini APIs.
//!
//! The crate is organized around a small set of collaborating layers:
//! - [`core`] owns provider adapters, the request/response engine, history
//!   translation between provider shapes, and the single-session and
//!   multichat turn coordinators.
//! - [`commands`] parses the slash commands typed into the interactive loops.
//! - [`cli`] parses arguments, loads configuration and credentials, and runs
//!   the interactive loops and one-shot subcommands.
//! - [`api`] defines wire payloads for model listing and image generation.
//! - [`utils`] holds transcripts, log rotation, redaction and input helpers.
//!
//! Runtime entrypoints live in the binary crate (`src/main.rs`) and route
//! through [`crate::cli::main`].

pub mod api;
pub mod cli;
pub mod commands;
pub mod core;
pub mod utils;
