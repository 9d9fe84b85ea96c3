use std::ffi::OsString;
use std::path::PathBuf;

use clap::Parser;

use crate::error::HostError;
use crate::reload::DEFAULT_GRACE_TICKS;
use crate::shadow_copy::canonical_library_path;

pub const ENV_MODULE_PATH: &str = "HOT_MODULE_PATH";
pub const ENV_SHADOW_DIR: &str = "HOT_MODULE_SHADOW_DIR";
pub const ENV_GRACE_TICKS: &str = "HOT_MODULE_GRACE_TICKS";
pub const ENV_TICK_RATE: &str = "HOT_MODULE_TICK_RATE";
pub const ENV_WATCH: &str = "HOT_MODULE_WATCH";

/// Settings of a host process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostConfig {
    /// Canonical module binary, the file the build overwrites.
    pub module_path: PathBuf,
    /// Where shadow copies go. Next to the canonical binary if `None`.
    pub shadow_dir: Option<PathBuf>,
    /// Ticks between a reload request and the unload.
    pub grace_ticks: u32,
    /// Target ticks per second, enforced by the console backend.
    pub tick_rate: u32,
    /// Also reload when the canonical binary changes on disk.
    pub watch: bool,
    pub surface_width: i32,
    pub surface_height: i32,
    pub surface_title: String,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            module_path: canonical_library_path("target/debug", "demo_module"),
            shadow_dir: None,
            grace_ticks: DEFAULT_GRACE_TICKS,
            tick_rate: 60,
            watch: false,
            surface_width: 800,
            surface_height: 600,
            surface_title: "hot-module-host".to_string(),
        }
    }
}

impl HostConfig {
    pub fn new(module_path: impl Into<PathBuf>) -> Self {
        Self {
            module_path: module_path.into(),
            ..Self::default()
        }
    }

    /// Parses the process arguments and `HOT_MODULE_*` variables. Prints
    /// usage and exits on `--help` or invalid arguments.
    pub fn from_args() -> Result<Self, HostError> {
        HostArgs::parse().into_config()
    }

    /// Like [`HostConfig::from_args`] for an explicit argument list
    /// (including the program name). Usage errors become
    /// [`HostError::Config`].
    pub fn try_from_args<I, T>(args: I) -> Result<Self, HostError>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        HostArgs::try_parse_from(args)
            .map_err(|err| HostError::Config(err.to_string()))?
            .into_config()
    }

    pub fn validate(&self) -> Result<(), HostError> {
        if self.tick_rate == 0 {
            return Err(HostError::Config(format!("{ENV_TICK_RATE} must be at least 1")));
        }
        if self.module_path.as_os_str().is_empty() {
            return Err(HostError::Config("module path is empty".to_string()));
        }
        Ok(())
    }
}

/// Command line of the `hot-module-host` binary. Every option can also be
/// set through its `HOT_MODULE_*` environment variable; the command line wins.
#[derive(Debug, Parser)]
#[command(name = "hot-module-host")]
#[command(version, about = "Runs a module and swaps in its rebuilt binary without restarting", long_about = None)]
pub struct HostArgs {
    /// Canonical module binary [default: target/debug/<lib>demo_module.<ext>]
    #[arg(env = ENV_MODULE_PATH)]
    pub module_path: Option<PathBuf>,

    /// Directory for shadow copies [default: next to the module]
    #[arg(long, env = ENV_SHADOW_DIR)]
    pub shadow_dir: Option<PathBuf>,

    /// Ticks between a reload request and the unload
    #[arg(long, env = ENV_GRACE_TICKS, default_value_t = DEFAULT_GRACE_TICKS)]
    pub grace_ticks: u32,

    /// Target ticks per second
    #[arg(long, env = ENV_TICK_RATE, default_value_t = 60, value_parser = clap::value_parser!(u32).range(1..))]
    pub tick_rate: u32,

    /// Also reload when the module binary changes on disk
    #[arg(long, env = ENV_WATCH, value_parser = clap::builder::BoolishValueParser::new())]
    pub watch: bool,

    /// Surface width
    #[arg(long, default_value_t = 800)]
    pub width: i32,

    /// Surface height
    #[arg(long, default_value_t = 600)]
    pub height: i32,

    /// Surface title
    #[arg(long, default_value = "hot-module-host")]
    pub title: String,
}

impl HostArgs {
    pub fn into_config(self) -> Result<HostConfig, HostError> {
        let defaults = HostConfig::default();
        let config = HostConfig {
            module_path: self.module_path.unwrap_or(defaults.module_path),
            shadow_dir: self.shadow_dir,
            grace_ticks: self.grace_ticks,
            tick_rate: self.tick_rate,
            watch: self.watch,
            surface_width: self.width,
            surface_height: self.height,
            surface_title: self.title,
        };
        config.validate()?;
        Ok(config)
    }
}
