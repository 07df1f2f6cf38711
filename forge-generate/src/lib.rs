//! KV-cache state machine, LM step driver, sampling pipeline and
//! conversation session -- the token-streaming generation core.

pub mod error;
pub mod family;
pub mod kv_map;
pub mod kv_state;
pub mod metrics;
pub mod model;
pub mod sampling;
pub mod session;
pub mod step;

pub use error::ForgeError;
pub use family::ModelFamily;
pub use kv_map::{KvTensorMap, ModelSlotNames};
pub use kv_state::KvState;
pub use metrics::Metrics;
pub use model::Model;
pub use sampling::{SamplingConfig, TokenId};
pub use session::{ConversationSession, Generation};
pub use step::{StepDriver, StepLogits};
