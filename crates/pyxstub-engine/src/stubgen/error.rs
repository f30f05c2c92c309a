//! Fatal errors of the stub pipeline.

use thiserror::Error;

pub use crate::parser::ParseFailure;
pub use crate::stubgen::config::ConfigError;
pub use crate::stubgen::graph::GraphError;

/// The renderer refused to produce a stub.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RenderError {
    #[error("Declaration '{name}' in module '{module}' was never classified")]
    Unclassified { module: String, name: String },

    #[error("Declaration '{name}' in module '{module}' was never resolved")]
    Unresolved { module: String, name: String },

    #[error("Type '{reference}' used by '{name}' in module '{module}' has no import in the stub")]
    MissingImport {
        module: String,
        name: String,
        reference: String,
    },
}

/// Any error that stops one module (or the whole run).
#[derive(Debug, Error)]
pub enum StubError {
    #[error(transparent)]
    Parse(#[from] ParseFailure),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}
