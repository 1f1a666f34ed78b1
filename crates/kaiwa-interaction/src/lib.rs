//! Remote service adapters.

pub mod gemini_client;

pub use gemini_client::GeminiClient;
