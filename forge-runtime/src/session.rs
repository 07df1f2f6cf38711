use std::collections::HashMap;
use std::path::Path;

use ort::session::Session as OrtSession;
use ort::value::{Tensor as OrtTensor, Value as OrtValue, ValueType};
use tracing::instrument;

use crate::dtype::{ElementBuffer, ElementType};
use crate::error::RuntimeError;
use crate::provider::{ExecutionProvider, ProviderPreferences};
use crate::tensor::{Dimension, DynTensor, NodeInfo};

fn to_ort_dtype(dtype: ElementType) -> &'static str {
    match dtype {
        ElementType::Fp32 => "tensor(float)",
        ElementType::Fp16 => "tensor(float16)",
        ElementType::Bf16 => "tensor(bfloat16)",
        ElementType::Int64 => "tensor(int64)",
    }
}

fn element_type_from_value_type(vt: &ValueType) -> ElementType {
    // `ort` exposes the concrete tensor element type via `ValueType::Tensor`;
    // anything we don't model explicitly is treated as fp32, the most common
    // logits/hidden-state dtype.
    match vt {
        ValueType::Tensor { ty, .. } => match ty.to_string().as_str() {
            "Float16" => ElementType::Fp16,
            "Bfloat16" => ElementType::Bf16,
            "Int64" => ElementType::Int64,
            _ => ElementType::Fp32,
        },
        _ => ElementType::Fp32,
    }
}

fn shape_from_value_type(vt: &ValueType) -> Vec<Dimension> {
    match vt {
        ValueType::Tensor { dimensions, .. } => dimensions
            .iter()
            .map(|d| {
                if *d < 0 {
                    Dimension::Symbolic
                } else {
                    Dimension::Fixed(*d as usize)
                }
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// A loaded tensor-graph session: the facade's entry point.
///
/// Wraps an `ort::session::Session`. Construction tries each requested
/// execution provider in order and keeps the first one the runtime build
/// accepts, falling back further down the list on
/// [`RuntimeError::ProviderUnsupported`]-shaped failures from `ort` itself.
pub struct RuntimeSession {
    session: OrtSession,
    inputs: Vec<NodeInfo>,
    outputs: Vec<NodeInfo>,
}

impl RuntimeSession {
    #[instrument(skip(providers), fields(path = %model_path.as_ref().display()))]
    pub fn create(
        model_path: impl AsRef<Path>,
        providers: &ProviderPreferences,
    ) -> Result<Self, RuntimeError> {
        let path = model_path.as_ref();
        if !path.exists() {
            return Err(RuntimeError::ModelNotFound(path.display().to_string()));
        }

        let mut builder = OrtSession::builder()?;
        let mut accepted = Vec::new();
        for provider in &providers.0 {
            if register_provider(&mut builder, *provider).is_ok() {
                accepted.push(provider.name().to_string());
            }
        }
        if accepted.is_empty() {
            return Err(RuntimeError::ProviderUnsupported(
                providers.0.iter().map(|p| p.name().to_string()).collect(),
            ));
        }

        let session = builder.commit_from_file(path)?;

        let inputs = session
            .inputs
            .iter()
            .map(|input| NodeInfo {
                name: input.name.clone(),
                dtype: element_type_from_value_type(&input.input_type),
                shape: shape_from_value_type(&input.input_type),
            })
            .collect();
        let outputs = session
            .outputs
            .iter()
            .map(|output| NodeInfo {
                name: output.name.clone(),
                dtype: element_type_from_value_type(&output.output_type),
                shape: shape_from_value_type(&output.output_type),
            })
            .collect();

        Ok(RuntimeSession {
            session,
            inputs,
            outputs,
        })
    }

    pub fn inputs(&self) -> &[NodeInfo] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[NodeInfo] {
        &self.outputs
    }

    pub fn find_input(&self, name: &str) -> Option<&NodeInfo> {
        self.inputs.iter().find(|n| n.name == name)
    }

    pub fn find_output(&self, name: &str) -> Option<&NodeInfo> {
        self.outputs.iter().find(|n| n.name == name)
    }

    /// Bind named inputs, run synchronously, and read back every output
    /// named in `want_outputs`. The facade retains no ownership of any
    /// tensor once this call returns.
    #[instrument(skip(self, inputs))]
    pub fn run(
        &self,
        inputs: Vec<(String, DynTensor)>,
        want_outputs: &[&str],
    ) -> Result<HashMap<String, DynTensor>, RuntimeError> {
        let mut ort_inputs: Vec<(String, OrtValue)> = Vec::with_capacity(inputs.len());
        for (name, tensor) in inputs {
            ort_inputs.push((name, to_ort_value(tensor)?));
        }

        let outputs = self
            .session
            .run(ort_inputs)
            .map_err(|e| RuntimeError::Internal(e.to_string()))?;

        let mut result = HashMap::with_capacity(want_outputs.len());
        for &name in want_outputs {
            let value = outputs
                .get(name)
                .ok_or_else(|| RuntimeError::ShapeMismatch(format!("missing output {name}")))?;
            result.insert(name.to_string(), from_ort_value(value)?);
        }
        Ok(result)
    }
}

fn register_provider(builder: &mut ort::session::builder::SessionBuilder, provider: ExecutionProvider) -> Result<(), ort::Error> {
    use ort::execution_providers::*;
    match provider {
        ExecutionProvider::Cpu => Ok(()),
        ExecutionProvider::Cuda => builder.append_execution_providers([CUDAExecutionProvider::default().build()]),
        ExecutionProvider::Rocm => builder.append_execution_providers([ROCmExecutionProvider::default().build()]),
        ExecutionProvider::DirectMl => builder.append_execution_providers([DirectMLExecutionProvider::default().build()]),
        ExecutionProvider::OpenVino => builder.append_execution_providers([OpenVINOExecutionProvider::default().build()]),
        ExecutionProvider::CoreMl => builder.append_execution_providers([CoreMLExecutionProvider::default().build()]),
        ExecutionProvider::MiGraphX => builder.append_execution_providers([MIGraphXExecutionProvider::default().build()]),
        ExecutionProvider::TensorRt => builder.append_execution_providers([TensorRTExecutionProvider::default().build()]),
        ExecutionProvider::Nnapi => builder.append_execution_providers([NNAPIExecutionProvider::default().build()]),
        ExecutionProvider::OneDnn => builder.append_execution_providers([OneDNNExecutionProvider::default().build()]),
    }
}

fn to_ort_value(tensor: DynTensor) -> Result<OrtValue, RuntimeError> {
    let shape: Vec<i64> = tensor.shape.iter().map(|&d| d as i64).collect();
    let value = match tensor.data {
        ElementBuffer::Fp32(data) => OrtTensor::from_array((shape, data))?.into_dyn(),
        ElementBuffer::Fp16(data) => OrtTensor::from_array((shape, data))?.into_dyn(),
        ElementBuffer::Bf16(data) => OrtTensor::from_array((shape, data))?.into_dyn(),
        ElementBuffer::Int64(data) => OrtTensor::from_array((shape, data))?.into_dyn(),
    };
    Ok(value)
}

fn from_ort_value(value: &OrtValue) -> Result<DynTensor, RuntimeError> {
    let dtype = match value.dtype() {
        ort::value::ValueType::Tensor { ty, .. } => ty,
        _ => return Err(RuntimeError::ShapeMismatch("non-tensor output".into())),
    };
    match dtype.to_string().as_str() {
        "Float16" => {
            let (shape, data) = value.try_extract_tensor::<half::f16>()?;
            Ok(DynTensor::new(
                shape.iter().map(|&d| d as usize).collect(),
                ElementBuffer::Fp16(data.to_vec()),
            ))
        }
        "Bfloat16" => {
            let (shape, data) = value.try_extract_tensor::<half::bf16>()?;
            Ok(DynTensor::new(
                shape.iter().map(|&d| d as usize).collect(),
                ElementBuffer::Bf16(data.to_vec()),
            ))
        }
        "Int64" => {
            let (shape, data) = value.try_extract_tensor::<i64>()?;
            Ok(DynTensor::new(
                shape.iter().map(|&d| d as usize).collect(),
                ElementBuffer::Int64(data.to_vec()),
            ))
        }
        _ => {
            let (shape, data) = value.try_extract_tensor::<f32>()?;
            Ok(DynTensor::new(
                shape.iter().map(|&d| d as usize).collect(),
                ElementBuffer::Fp32(data.to_vec()),
            ))
        }
    }
}

#[allow(dead_code)]
fn dtype_name(dtype: ElementType) -> &'static str {
    to_ort_dtype(dtype)
}
