pub mod app;
pub mod batch;
pub mod config;
pub mod event;
pub mod export;
pub mod extractor;
pub mod filter;
pub mod llm;
pub mod pipeline;
pub mod remote;
pub mod state;
pub mod validation;
