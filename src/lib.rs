pub mod agent;
pub mod chat;
pub mod cli;
pub mod config;
pub mod error;
pub mod exec;
pub mod llm;
pub mod memory;
pub mod orchestration;
pub mod safety;
pub mod storage;
pub mod workspace;
