// Chat Loadbench - Library root

pub mod bench;
pub mod config;
pub mod error;
pub mod invoker;
pub mod prompts;
pub mod streaming;
pub mod transcript;
