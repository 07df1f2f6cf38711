//! Thin facade over an external tensor-graph runtime.
//!
//! The rest of the workspace never touches `ort` directly -- every crate
//! goes through [`RuntimeSession`], [`DynTensor`] and [`ElementType`] so the
//! underlying runtime stays swappable in principle, even though only one
//! backend is wired up today.

pub mod dtype;
pub mod error;
pub mod provider;
pub mod session;
pub mod tensor;

pub use dtype::{ElementBuffer, ElementType};
pub use error::RuntimeError;
pub use provider::{ExecutionProvider, ProviderPreferences};
pub use session::RuntimeSession;
pub use tensor::{Dimension, DynTensor, NodeInfo};
