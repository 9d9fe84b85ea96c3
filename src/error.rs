use std::path::PathBuf;

/// Every way the host can fail. Anything returned from the reload sequence is
/// fatal: the host cleans up and exits with [`HostError::exit_code`].
#[derive(thiserror::Error, Debug)]
pub enum HostError {
    #[error("Unable to copy module binary {from:?} to {to:?}: {source}")]
    CopyFailed {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Unable to delete shadow copy {path:?}: {reason}")]
    DeleteFailed { path: PathBuf, reason: String },
    #[error("Module {path:?} does not export required symbol `{name}`")]
    MissingSymbol { name: &'static str, path: PathBuf },
    #[error("`{operation}` called on a module that has been unloaded")]
    UseAfterUnload { operation: &'static str },
    #[error("Module entry point called before the primitive table was installed")]
    BridgeNotInstalled,
    #[error("Unable to load module: {0}")]
    LoadFailed(#[from] libloading::Error),
    #[error("Primitive table slot `{slot}` is null")]
    NullPrimitive { slot: &'static str },
    #[error("Primitive table version {found} is not supported (expected {expected})")]
    IncompatiblePrimitives { found: u32, expected: u32 },
    #[error("Unable to watch module binary: {0}")]
    Watch(#[from] notify::Error),
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl HostError {
    /// Process exit code for this failure, distinct per variant.
    pub fn exit_code(&self) -> i32 {
        match self {
            HostError::Config(_) => 2,
            HostError::CopyFailed { .. } => 10,
            HostError::DeleteFailed { .. } => 11,
            HostError::MissingSymbol { .. } => 12,
            HostError::UseAfterUnload { .. } => 13,
            HostError::BridgeNotInstalled => 14,
            HostError::LoadFailed(_) => 15,
            HostError::NullPrimitive { .. } => 16,
            HostError::IncompatiblePrimitives { .. } => 17,
            HostError::Watch(_) => 18,
        }
    }
}
