pub mod client;

#[cfg(test)]
pub mod fake;


pub use client::{ApiClient, ApiError, TodoApi};
