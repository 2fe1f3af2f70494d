pub mod cmd;
pub mod config;
pub mod consumer;
pub mod formatter;
pub mod input;
pub mod kafka;
pub mod message;
pub mod position;
pub mod producer;
pub mod request;
