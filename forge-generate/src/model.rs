//! The narrow view of a loaded causal LM that the step driver needs.
//!
//! Mirrors the `Model` trait referenced by the teacher's
//! `rten-generate/src/generator.rs` (`model.find_node`, `model.node_info`,
//! `model.run`). Defining it as a trait rather than binding directly to
//! `forge_runtime::RuntimeSession` lets tests substitute a `FakeModel` in
//! place of a real `ort` session, exactly as the teacher's own test module
//! does.

use std::collections::HashMap;

use forge_runtime::{DynTensor, NodeInfo, RuntimeError};

pub trait Model {
    fn inputs(&self) -> &[NodeInfo];
    fn outputs(&self) -> &[NodeInfo];

    fn find_input(&self, name: &str) -> Option<&NodeInfo> {
        self.inputs().iter().find(|n| n.name == name)
    }

    fn find_output(&self, name: &str) -> Option<&NodeInfo> {
        self.outputs().iter().find(|n| n.name == name)
    }

    fn run(
        &self,
        inputs: Vec<(String, DynTensor)>,
        want_outputs: &[&str],
    ) -> Result<HashMap<String, DynTensor>, RuntimeError>;
}

impl Model for forge_runtime::RuntimeSession {
    fn inputs(&self) -> &[NodeInfo] {
        forge_runtime::RuntimeSession::inputs(self)
    }

    fn outputs(&self) -> &[NodeInfo] {
        forge_runtime::RuntimeSession::outputs(self)
    }

    fn run(
        &self,
        inputs: Vec<(String, DynTensor)>,
        want_outputs: &[&str],
    ) -> Result<HashMap<String, DynTensor>, RuntimeError> {
        forge_runtime::RuntimeSession::run(self, inputs, want_outputs)
    }
}
