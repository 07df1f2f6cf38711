//! Execution-provider preferences for tensor-graph session construction.

/// An execution provider the caller would like the runtime to try, in
/// preference order. Unsupported providers are not a construction-time
/// error by themselves -- [`crate::session::RuntimeSession::create`] falls
/// through to the next preference and only fails if none apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExecutionProvider {
    Cpu,
    Cuda,
    Rocm,
    DirectMl,
    OpenVino,
    CoreMl,
    MiGraphX,
    TensorRt,
    Nnapi,
    OneDnn,
}

impl ExecutionProvider {
    pub fn name(self) -> &'static str {
        match self {
            ExecutionProvider::Cpu => "CPUExecutionProvider",
            ExecutionProvider::Cuda => "CUDAExecutionProvider",
            ExecutionProvider::Rocm => "ROCMExecutionProvider",
            ExecutionProvider::DirectMl => "DmlExecutionProvider",
            ExecutionProvider::OpenVino => "OpenVINOExecutionProvider",
            ExecutionProvider::CoreMl => "CoreMLExecutionProvider",
            ExecutionProvider::MiGraphX => "MIGraphXExecutionProvider",
            ExecutionProvider::TensorRt => "TensorrtExecutionProvider",
            ExecutionProvider::Nnapi => "NnapiExecutionProvider",
            ExecutionProvider::OneDnn => "DnnlExecutionProvider",
        }
    }
}

/// A preference-ordered set of execution providers. The first entry that the
/// underlying runtime build supports is used; [`ExecutionProvider::Cpu`]
/// should usually terminate the list as a universal fallback.
#[derive(Debug, Clone)]
pub struct ProviderPreferences(pub Vec<ExecutionProvider>);

impl Default for ProviderPreferences {
    fn default() -> Self {
        ProviderPreferences(vec![ExecutionProvider::Cpu])
    }
}

impl ProviderPreferences {
    pub fn new(providers: impl IntoIterator<Item = ExecutionProvider>) -> Self {
        ProviderPreferences(providers.into_iter().collect())
    }
}
