pub mod audit;
pub mod config;
pub mod document;
pub mod error;
pub mod identity;
pub mod service;
pub mod storage;
pub mod store;
