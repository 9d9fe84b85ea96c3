use std::path::{Path, PathBuf};

use hot_module_abi::{
    symbols, FrameInitFn, FrameStepFn, InstallPrimitivesFn, PrimitiveTable, QueryReloadFlagFn,
    ShouldTerminateFn, ShutdownFn, PRIMITIVE_TABLE_VERSION,
};
use libloading::{Library, Symbol};

use crate::error::HostError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStatus {
    Unloaded,
    Loaded,
}

/// What the host loop needs from a module, however it was obtained.
pub trait HostedModule {
    fn frame_step(&mut self) -> Result<(), HostError>;

    /// Whether the module asks to be reloaded. Has no side effects.
    fn query_reload_flag(&self) -> Result<bool, HostError>;

    fn should_terminate(&self) -> Result<bool, HostError>;

    /// Shuts the module down and releases it. Calling it again is a no-op.
    fn unload(&mut self) -> Result<(), HostError>;

    fn status(&self) -> LoadStatus;

    /// The file this module was mapped from, `None` if it is linked into the host.
    fn binary_path(&self) -> Option<&Path>;

    /// Modules that cannot be reloaded are never asked for their reload flag.
    fn supports_reload(&self) -> bool;
}

/// Produces a loaded, bridged and initialized module from a binary.
pub trait ModuleLoader {
    type Module: HostedModule;

    fn load(&mut self, binary: &Path, primitives: &PrimitiveTable)
        -> Result<Self::Module, HostError>;
}

/// Checks a primitive table before it is handed to any module.
pub fn validate_primitives(primitives: &PrimitiveTable) -> Result<(), HostError> {
    if primitives.version != PRIMITIVE_TABLE_VERSION {
        return Err(HostError::IncompatiblePrimitives {
            found: primitives.version,
            expected: PRIMITIVE_TABLE_VERSION,
        });
    }
    match primitives.missing_slot() {
        Some(slot) => Err(HostError::NullPrimitive { slot }),
        None => Ok(()),
    }
}

/// All six entry points of one mapped module. Only ever exists complete.
///
/// The function pointers point into the mapped library, so a value of this
/// type must not outlive the [`Library`] it was resolved from. [`ModuleHandle`]
/// keeps both together and drops the symbols before closing the library.
#[derive(Clone, Copy)]
struct ModuleSymbols {
    install_primitives: InstallPrimitivesFn,
    frame_init: FrameInitFn,
    frame_step: FrameStepFn,
    query_reload_flag: QueryReloadFlagFn,
    shutdown: ShutdownFn,
    should_terminate: ShouldTerminateFn,
}

impl ModuleSymbols {
    /// # Safety
    ///
    /// The library must export the contract symbols with the signatures
    /// declared in `hot_module_abi`.
    unsafe fn resolve(library: &Library, path: &Path) -> Result<Self, HostError> {
        unsafe {
            Ok(Self {
                install_primitives: resolve(library, path, symbols::INSTALL_PRIMITIVES)?,
                frame_init: resolve(library, path, symbols::FRAME_INIT)?,
                frame_step: resolve(library, path, symbols::FRAME_STEP)?,
                query_reload_flag: resolve(library, path, symbols::QUERY_RELOAD_FLAG)?,
                shutdown: resolve(library, path, symbols::SHUTDOWN)?,
                should_terminate: resolve(library, path, symbols::SHOULD_TERMINATE)?,
            })
        }
    }
}

unsafe fn resolve<T: Copy>(
    library: &Library,
    path: &Path,
    name: &'static str,
) -> Result<T, HostError> {
    let symbol: Symbol<T> = unsafe { library.get(name.as_bytes()) }.map_err(|err| {
        log::debug!("resolving `{name}` in {path:?} failed: {err}");
        HostError::MissingSymbol {
            name,
            path: path.to_path_buf(),
        }
    })?;
    log::trace!("resolved `{name}`");
    Ok(*symbol)
}

/// One mapped instance of a module binary.
///
/// A handle is either loaded with every contract symbol resolved, or unloaded
/// with none. Every forwarding call checks this first, so calling into an
/// unloaded module is an error instead of a jump into unmapped memory.
pub struct ModuleHandle {
    binary_path: PathBuf,
    symbols: Option<ModuleSymbols>,
    bridged: bool,
    library: Option<Library>,
}

impl ModuleHandle {
    /// Maps `path` and resolves the symbol contract. If any symbol is missing
    /// the library is unmapped again before the error is returned.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, HostError> {
        let path = path.as_ref();
        log::debug!("mapping {path:?}");

        // Mapping runs the library's initializers, nothing else.
        let library = unsafe { Library::new(path) }?;

        let symbols = match unsafe { ModuleSymbols::resolve(&library, path) } {
            Ok(symbols) => symbols,
            Err(err) => {
                if let Err(close_err) = library.close() {
                    log::warn!("unable to unmap {path:?}: {close_err}");
                }
                return Err(err);
            }
        };

        Ok(Self {
            binary_path: path.to_path_buf(),
            symbols: Some(symbols),
            bridged: false,
            library: Some(library),
        })
    }

    /// Hands the primitive table to the module and runs its per-load setup.
    /// The table is installed once per handle; later calls are ignored.
    pub fn install(&mut self, primitives: &PrimitiveTable) -> Result<(), HostError> {
        let symbols = self.loaded_symbols("install_primitives")?;
        validate_primitives(primitives)?;
        if self.bridged {
            log::warn!("primitives already installed into {:?}", self.binary_path);
            return Ok(());
        }

        log::debug!("bridging primitives into {:?}", self.binary_path);
        unsafe { (symbols.install_primitives)(*primitives) };
        self.bridged = true;
        unsafe { (symbols.frame_init)() };
        Ok(())
    }

    /// [`ModuleHandle::open`] followed by [`ModuleHandle::install`].
    pub fn load(path: impl AsRef<Path>, primitives: &PrimitiveTable) -> Result<Self, HostError> {
        let mut handle = Self::open(path)?;
        handle.install(primitives)?;
        log::info!("loaded {:?}", handle.binary_path);
        Ok(handle)
    }

    pub fn path(&self) -> &Path {
        &self.binary_path
    }

    fn loaded_symbols(&self, operation: &'static str) -> Result<ModuleSymbols, HostError> {
        self.symbols.ok_or(HostError::UseAfterUnload { operation })
    }

    fn bridged_symbols(&self, operation: &'static str) -> Result<ModuleSymbols, HostError> {
        let symbols = self.loaded_symbols(operation)?;
        if !self.bridged {
            return Err(HostError::BridgeNotInstalled);
        }
        Ok(symbols)
    }
}

impl HostedModule for ModuleHandle {
    fn frame_step(&mut self) -> Result<(), HostError> {
        let symbols = self.bridged_symbols("frame_step")?;
        unsafe { (symbols.frame_step)() };
        Ok(())
    }

    fn query_reload_flag(&self) -> Result<bool, HostError> {
        let symbols = self.bridged_symbols("query_reload_flag")?;
        Ok(unsafe { (symbols.query_reload_flag)() })
    }

    fn should_terminate(&self) -> Result<bool, HostError> {
        let symbols = self.bridged_symbols("should_terminate")?;
        Ok(unsafe { (symbols.should_terminate)() })
    }

    fn unload(&mut self) -> Result<(), HostError> {
        let Some(symbols) = self.symbols.take() else {
            return Ok(());
        };
        if self.bridged {
            log::debug!("shutting down {:?}", self.binary_path);
            unsafe { (symbols.shutdown)() };
            self.bridged = false;
        }
        // `symbols` is a copy local to this scope and gone before the unmap.
        if let Some(library) = self.library.take() {
            library.close()?;
        }
        log::info!("unloaded {:?}", self.binary_path);
        Ok(())
    }

    fn status(&self) -> LoadStatus {
        if self.symbols.is_some() {
            LoadStatus::Loaded
        } else {
            LoadStatus::Unloaded
        }
    }

    fn binary_path(&self) -> Option<&Path> {
        Some(&self.binary_path)
    }

    fn supports_reload(&self) -> bool {
        true
    }
}

impl Drop for ModuleHandle {
    fn drop(&mut self) {
        if let Err(err) = self.unload() {
            log::warn!("unloading {:?} on drop failed: {err}", self.binary_path);
        }
    }
}

/// Loads modules from shared libraries.
#[derive(Debug, Default, Clone, Copy)]
pub struct DylibLoader;

impl ModuleLoader for DylibLoader {
    type Module = ModuleHandle;

    fn load(&mut self, binary: &Path, primitives: &PrimitiveTable) -> Result<ModuleHandle, HostError> {
        ModuleHandle::load(binary, primitives)
    }
}
