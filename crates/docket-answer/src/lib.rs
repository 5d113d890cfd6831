//! Answer assembly for docket.
//!
//! [`AnswerService`] retrieves contexts, then either hands a prompt to a
//! [`Generator`](docket_core::Generator) or, when none is configured or it
//! fails, builds an extractive answer with the [`Assembler`].

pub mod assembler;
pub mod generator;
pub mod service;

pub use assembler::{Assembler, AssemblerConfig};
pub use generator::OpenAiGenerator;
pub use service::{AnswerService, AskRequest, GenerationSettings};
