use std::collections::HashMap;

use forge_runtime::{DynTensor, NodeInfo, RuntimeError};

/// The narrow view of a loaded encoder model the host needs -- mirrors
/// `forge_generate::model::Model`, duplicated here rather than shared so
/// `forge-encode` does not depend on the generation crate for an unrelated
/// concern.
pub trait EncoderModel {
    fn find_input(&self, name: &str) -> Option<&NodeInfo>;
    fn find_output(&self, name: &str) -> Option<&NodeInfo>;
    fn run(
        &self,
        inputs: Vec<(String, DynTensor)>,
        want_outputs: &[&str],
    ) -> Result<HashMap<String, DynTensor>, RuntimeError>;
}

impl EncoderModel for forge_runtime::RuntimeSession {
    fn find_input(&self, name: &str) -> Option<&NodeInfo> {
        forge_runtime::RuntimeSession::find_input(self, name)
    }
    fn find_output(&self, name: &str) -> Option<&NodeInfo> {
        forge_runtime::RuntimeSession::find_output(self, name)
    }
    fn run(
        &self,
        inputs: Vec<(String, DynTensor)>,
        want_outputs: &[&str],
    ) -> Result<HashMap<String, DynTensor>, RuntimeError> {
        forge_runtime::RuntimeSession::run(self, inputs, want_outputs)
    }
}
