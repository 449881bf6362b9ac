//! Runtime capability probe and backend selection

use super::BackendKind;
use serde::{Deserialize, Serialize};

/// Scoring engines compiled into this build
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RuntimeCapabilities {
    /// Native autoencoder engine (`neural` feature)
    pub neural: bool,
    /// Tensor-graph autoencoder engine (`tensor-graph` feature)
    pub tensor_graph: bool,
}

impl RuntimeCapabilities {
    /// Capabilities of the running binary
    pub fn probe() -> Self {
        Self {
            neural: cfg!(feature = "neural"),
            tensor_graph: cfg!(feature = "tensor-graph"),
        }
    }

    /// No optional engine available
    pub fn none() -> Self {
        Self::default()
    }

    pub fn with_neural(mut self, available: bool) -> Self {
        self.neural = available;
        self
    }

    pub fn with_tensor_graph(mut self, available: bool) -> Self {
        self.tensor_graph = available;
        self
    }
}

/// Pick the windowed backend for a capability set
///
/// Neural engine first, then the tensor-graph engine, then the linear
/// reconstructor which is always available.
pub fn select_backend(capabilities: &RuntimeCapabilities) -> BackendKind {
    if capabilities.neural {
        BackendKind::NeuralAutoencoder
    } else if capabilities.tensor_graph {
        BackendKind::GraphAutoencoder
    } else {
        BackendKind::LinearReconstructor
    }
}
