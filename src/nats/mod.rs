//! NATS connectivity for outbound notifications

mod client;

pub use client::NatsClient;
