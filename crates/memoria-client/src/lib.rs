//! Rust client for the Memoria ingress API.

pub mod client;
pub mod error;
pub mod models;

pub use client::{MemoriaClient, MemoriaClientBuilder};
pub use error::{ClientError, Result};
