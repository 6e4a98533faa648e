//! Responder implementations for forgeloop.
//!
//! Every responder implements `forgeloop_core::Responder`. The only network
//! adapter speaks the OpenAI chat completions protocol, which covers hosted
//! and local model servers alike.

pub mod openai_compat;

pub use openai_compat::OpenAiCompatResponder;
