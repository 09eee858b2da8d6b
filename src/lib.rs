pub mod app;
pub mod archive;
pub mod codepage;
pub mod config;
pub mod domain;
pub mod endpoints;
pub mod error;
pub mod filter;
pub mod fs_util;
pub mod gcis;
pub mod output;
pub mod query;
pub mod store;
pub mod table;
