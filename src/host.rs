use std::path::{Path, PathBuf};

use hot_module_abi::PrimitiveTable;

use crate::config::HostConfig;
use crate::error::HostError;
use crate::module_handle::{validate_primitives, HostedModule, ModuleLoader};
use crate::reload::{ReloadState, ReloadStateMachine, ReloadStep};
use crate::reload_events::{ReloadEvent, ReloadNotifier, ReloadObserver};
use crate::shadow_copy::ShadowCopyManager;
use crate::watcher::{RebuildWatcher, SETTLE_POLLS};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Continue,
    Terminate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub ticks: u64,
    pub reloads: usize,
}

/// Drives the tick loop around exactly one active module.
///
/// Each tick runs the module's frame step, advances the reload state machine
/// and asks the module whether to terminate, in that order. Reloading happens
/// between frame steps, never during one.
pub struct Host<L: ModuleLoader> {
    // Dropped before `shadow` so the active copy is unmapped when the manager
    // cleans up.
    module: Option<L::Module>,
    shadow: Option<ShadowCopyManager>,
    loader: L,
    primitives: PrimitiveTable,
    reload: ReloadStateMachine,
    notifier: ReloadNotifier,
    watcher: Option<RebuildWatcher>,
    ticks: u64,
    reloads: usize,
    finished: bool,
}

impl<L: ModuleLoader> Host<L> {
    /// Loads the first shadow copy of `config.module_path` and returns a host
    /// ready to tick.
    pub fn new(mut loader: L, primitives: PrimitiveTable, config: &HostConfig) -> Result<Self, HostError> {
        config.validate()?;
        validate_primitives(&primitives)?;

        let mut shadow = ShadowCopyManager::new(&config.module_path, config.shadow_dir.clone())?;
        let watcher = if config.watch {
            Some(RebuildWatcher::new(shadow.canonical_path())?)
        } else {
            None
        };

        let binary = shadow.make_shadow_copy()?;
        let module = loader.load(&binary, &primitives)?;
        shadow.mark_mapped(&binary);

        Ok(Self {
            module: Some(module),
            shadow: Some(shadow),
            loader,
            primitives,
            reload: ReloadStateMachine::new(config.grace_ticks),
            notifier: ReloadNotifier::default(),
            watcher,
            ticks: 0,
            reloads: 0,
            finished: false,
        })
    }

    /// A host for a module linked into the binary. No shadow copies are made
    /// and the reload machine never leaves `Idle`.
    pub fn new_static(mut loader: L, primitives: PrimitiveTable) -> Result<Self, HostError> {
        validate_primitives(&primitives)?;
        let module = loader.load(Path::new(""), &primitives)?;

        Ok(Self {
            module: Some(module),
            shadow: None,
            loader,
            primitives,
            reload: ReloadStateMachine::default(),
            notifier: ReloadNotifier::default(),
            watcher: None,
            ticks: 0,
            reloads: 0,
            finished: false,
        })
    }

    pub fn subscribe(&mut self) -> ReloadObserver {
        self.notifier.subscribe()
    }

    pub fn state(&self) -> ReloadState {
        self.reload.state()
    }

    pub fn reload_machine(&self) -> &ReloadStateMachine {
        &self.reload
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn reloads(&self) -> usize {
        self.reloads
    }

    pub fn module(&self) -> Option<&L::Module> {
        self.module.as_ref()
    }

    pub fn loader(&self) -> &L {
        &self.loader
    }

    pub fn shadow_copies(&self) -> Option<&ShadowCopyManager> {
        self.shadow.as_ref()
    }

    /// Path of the shadow copy the active module was mapped from.
    pub fn active_binary(&self) -> Option<&Path> {
        self.module.as_ref().and_then(|module| module.binary_path())
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Runs one iteration of the loop.
    pub fn tick(&mut self) -> Result<TickOutcome, HostError> {
        if self.finished || self.reload.is_fatal() {
            return Err(HostError::UseAfterUnload { operation: "tick" });
        }

        self.active_mut("frame_step")?.frame_step()?;
        self.ticks += 1;

        self.reload_tick()?;

        if self.active("should_terminate")?.should_terminate()? {
            log::info!("module requested termination after {} ticks", self.ticks);
            return Ok(TickOutcome::Terminate);
        }
        Ok(TickOutcome::Continue)
    }

    /// Ticks until the module asks to terminate, then shuts down. On failure
    /// the host cleans up what it can and returns the error.
    pub fn run(&mut self) -> Result<RunSummary, HostError> {
        log::info!("entering main loop");
        loop {
            match self.tick() {
                Ok(TickOutcome::Continue) => {}
                Ok(TickOutcome::Terminate) => break,
                Err(err) => {
                    log::error!("{err}");
                    if let Err(cleanup_err) = self.shutdown() {
                        log::warn!("cleanup after failure: {cleanup_err}");
                    }
                    return Err(err);
                }
            }
        }
        self.shutdown()?;
        Ok(RunSummary {
            ticks: self.ticks,
            reloads: self.reloads,
        })
    }

    /// Unloads the active module and deletes its shadow copy. Runs once;
    /// later calls do nothing.
    pub fn shutdown(&mut self) -> Result<(), HostError> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;

        let mut result = Ok(());
        if let Some(mut module) = self.module.take() {
            let binary = module.binary_path().map(Path::to_path_buf);
            result = module.unload();
            drop(module);

            // A module that failed to unload may still be mapped; keep its copy.
            if result.is_ok() {
                if let (Some(shadow), Some(binary)) = (self.shadow.as_mut(), binary) {
                    shadow.mark_unmapped(&binary);
                    result = shadow.discard(&binary);
                }
            }
        }
        if let Some(shadow) = self.shadow.as_mut() {
            shadow.discard_unmapped();
        }
        log::info!("host shut down after {} ticks and {} reloads", self.ticks, self.reloads);
        result
    }

    fn active(&self, operation: &'static str) -> Result<&L::Module, HostError> {
        self.module
            .as_ref()
            .ok_or(HostError::UseAfterUnload { operation })
    }

    fn active_mut(&mut self, operation: &'static str) -> Result<&mut L::Module, HostError> {
        self.module
            .as_mut()
            .ok_or(HostError::UseAfterUnload { operation })
    }

    fn reload_tick(&mut self) -> Result<(), HostError> {
        let module = self.active("query_reload_flag")?;
        let mut flag = module.supports_reload() && module.query_reload_flag()?;
        if let Some(watcher) = self.watcher.as_mut() {
            flag |= watcher.poll();
        }

        let was_idle = self.reload.state() == ReloadState::Idle;
        let step = self.reload.observe(flag);
        if was_idle && self.reload.context().trigger_latched {
            self.notifier.notify(ReloadEvent::Armed {
                grace_ticks: self.reload.grace_ticks(),
            });
        }

        if step == ReloadStep::Proceed {
            if let Err(err) = self.swap_module() {
                self.reload.fail();
                self.notifier.notify(ReloadEvent::Fatal {
                    exit_code: err.exit_code(),
                    message: err.to_string(),
                });
                return Err(err);
            }
        }
        Ok(())
    }

    /// Unloading → Reloading → Idle. Any error leaves the host without a
    /// module.
    fn swap_module(&mut self) -> Result<(), HostError> {
        let shadow = self.shadow.as_mut().ok_or_else(|| {
            HostError::Config("module is linked into the host and cannot be reloaded".to_string())
        })?;

        self.reload.begin_unload();
        if let Some(mut old) = self.module.take() {
            let binary = old.binary_path().map(Path::to_path_buf);
            if let Some(binary) = &binary {
                self.notifier.notify(ReloadEvent::Unloading {
                    binary: binary.clone(),
                });
            }
            old.unload()?;
            drop(old);
            if let Some(binary) = binary {
                shadow.mark_unmapped(&binary);
                shadow.discard(&binary)?;
            }
        }

        self.reload.begin_reload();
        let binary: PathBuf = shadow.make_shadow_copy()?;
        let module = self.loader.load(&binary, &self.primitives)?;
        shadow.mark_mapped(&binary);
        self.module = Some(module);

        self.reload.complete();
        if let Some(watcher) = self.watcher.as_mut() {
            watcher.suppress(SETTLE_POLLS);
        }
        self.reloads += 1;
        log::info!("reloaded module from {binary:?}");
        self.notifier.notify(ReloadEvent::Reloaded {
            binary,
            sequence: shadow.copy_sequence(),
        });
        Ok(())
    }
}

/// Best-effort cleanup for hosts that were not shut down explicitly.
impl<L: ModuleLoader> Drop for Host<L> {
    fn drop(&mut self) {
        if let Err(err) = self.shutdown() {
            log::warn!("host shutdown on drop failed: {err}");
        }
    }
}
