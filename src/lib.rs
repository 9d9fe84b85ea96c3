//! Keeps a host loop running while the code it runs is rebuilt and swapped in.
//!
//! The behavior lives in a separately compiled module (a `cdylib` exporting
//! the symbols in [`hot_module_abi::symbols`]). The host owns everything that
//! must survive a reload, including the primitive table through which the
//! module draws and reads input. The module keeps nothing across reloads.
//!
//! Note: This is meant to be used for development! Don't use it in production!
//!
//! # How a reload works
//!
//! The host never maps the canonical module binary. It maps a shadow copy
//! (`libgame-hot-1.so`, `libgame-hot-2.so`, ...) so the build can overwrite
//! the canonical binary at any time. When the module reports a reload request, the
//! host keeps running frames for a grace period of ticks, then unloads the
//! module, deletes its copy, copies the rebuilt binary and loads that. A
//! reload that fails is fatal: the host cleans up and exits with a code that
//! names the failure (see [`HostError::exit_code`]).
//!
//! # Usage
//!
//! ```no_run
//! use hot_module_host::{backend, DylibLoader, Host, HostConfig};
//!
//! fn main() -> Result<(), hot_module_host::HostError> {
//!     let config = HostConfig::new("target/debug/libgame.so");
//!     let primitives = backend::console_primitives(config.tick_rate);
//!     let mut host = Host::new(DylibLoader, primitives, &config)?;
//!     host.run()?;
//!     Ok(())
//! }
//! ```
//!
//! Running `cargo watch -w game -x 'build -p game'` next to the host and
//! pressing `R` in the module rebuilds and reloads without restarting.

pub mod backend;
#[cfg(target_os = "macos")]
mod codesign;
mod config;
mod error;
mod host;
mod module_handle;
mod reload;
mod reload_events;
mod shadow_copy;
mod static_module;
mod watcher;

pub use config::{HostArgs, HostConfig};
pub use error::HostError;
pub use host::{Host, RunSummary, TickOutcome};
pub use hot_module_abi as abi;
pub use module_handle::{
    validate_primitives, DylibLoader, HostedModule, LoadStatus, ModuleHandle, ModuleLoader,
};
pub use reload::{ReloadContext, ReloadState, ReloadStateMachine, ReloadStep, DEFAULT_GRACE_TICKS};
pub use reload_events::{ReloadEvent, ReloadObserver};
pub use shadow_copy::{canonical_library_path, ShadowCopyManager};
pub use static_module::{StaticLoader, StaticModule};
pub use watcher::{RebuildWatcher, SETTLE_POLLS};
