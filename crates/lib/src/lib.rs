//! Haven core library: auth, chat sessions, streamed replies, history, the document/RAG
//! console, and the tool consoles used by the CLI.

pub mod api;
pub mod auth;
pub mod chat;
pub mod config;
pub mod history;
pub mod init;
pub mod message;
pub mod rag;
pub mod session;
pub mod stream;
pub mod tools;
