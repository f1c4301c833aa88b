#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RenderGraphError {
    #[error("pass `{0}` is already registered")]
    DuplicatePass(String),

    #[error("pass `{pass}` depends on `{dependency}`, which is not registered")]
    MissingDependency { pass: String, dependency: String },

    #[error("dependency cycle detected at pass `{pass}`")]
    Cycle { pass: String },
}
