pub mod app;
pub mod catalog;
pub mod config;
pub mod domain;
pub mod error;
pub mod export;
pub mod grid;
pub mod output;
pub mod pipeline;
pub mod state;
pub mod store;
pub mod tui;
pub mod upload;
