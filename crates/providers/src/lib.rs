//! LLM provider implementations for llmagent.
//!
//! All providers implement the `llmagent_core::Provider` trait.
//! `build_from_config` assembles the provider used by a run.

pub mod cache;
pub mod openai_compat;
pub mod router;

pub use cache::CachedProvider;
pub use openai_compat::OpenAiCompatProvider;
pub use router::build_from_config;
