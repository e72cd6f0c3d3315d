//! Storage module for persistent data storage
//!
//! Provides SQLite-based persistence for the local vector store.

mod database;

pub use database::RecordDb;
