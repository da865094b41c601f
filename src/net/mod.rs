//! HTTP networking: shared client, DNS cache

pub mod client;
pub mod dns;

pub use client::{HttpClient, HttpResponse};
