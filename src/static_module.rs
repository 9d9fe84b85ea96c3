use std::marker::PhantomData;
use std::path::Path;

use hot_module_abi::{ModuleBehavior, PrimitiveTable, Primitives};

use crate::error::HostError;
use crate::module_handle::{validate_primitives, HostedModule, LoadStatus, ModuleLoader};

/// A [`ModuleBehavior`] linked into the host binary.
///
/// Runs through the same primitive table as a loaded module but cannot be
/// reloaded, so the host never asks it for a reload flag.
pub struct StaticModule<B> {
    behavior: Option<B>,
    primitives: Primitives,
}

impl<B: ModuleBehavior> StaticModule<B> {
    pub fn new(behavior: B, primitives: &PrimitiveTable) -> Result<Self, HostError> {
        validate_primitives(primitives)?;
        let primitives = Primitives::new(*primitives);
        let mut behavior = behavior;
        behavior.frame_init(&primitives);
        Ok(Self {
            behavior: Some(behavior),
            primitives,
        })
    }

    pub fn behavior(&self) -> Option<&B> {
        self.behavior.as_ref()
    }

    fn loaded(&self, operation: &'static str) -> Result<&B, HostError> {
        self.behavior
            .as_ref()
            .ok_or(HostError::UseAfterUnload { operation })
    }
}

impl<B: ModuleBehavior> HostedModule for StaticModule<B> {
    fn frame_step(&mut self) -> Result<(), HostError> {
        let behavior = self
            .behavior
            .as_mut()
            .ok_or(HostError::UseAfterUnload {
                operation: "frame_step",
            })?;
        behavior.frame_step(&self.primitives);
        Ok(())
    }

    fn query_reload_flag(&self) -> Result<bool, HostError> {
        self.loaded("query_reload_flag")?;
        Ok(false)
    }

    fn should_terminate(&self) -> Result<bool, HostError> {
        Ok(self
            .loaded("should_terminate")?
            .should_terminate(&self.primitives))
    }

    fn unload(&mut self) -> Result<(), HostError> {
        if let Some(mut behavior) = self.behavior.take() {
            behavior.shutdown(&self.primitives);
            log::info!("static module shut down");
        }
        Ok(())
    }

    fn status(&self) -> LoadStatus {
        if self.behavior.is_some() {
            LoadStatus::Loaded
        } else {
            LoadStatus::Unloaded
        }
    }

    fn binary_path(&self) -> Option<&Path> {
        None
    }

    fn supports_reload(&self) -> bool {
        false
    }
}

/// Creates [`StaticModule`]s from `B::default()`. The binary path is ignored.
pub struct StaticLoader<B> {
    _behavior: PhantomData<fn() -> B>,
}

impl<B> Default for StaticLoader<B> {
    fn default() -> Self {
        Self {
            _behavior: PhantomData,
        }
    }
}

impl<B: ModuleBehavior> ModuleLoader for StaticLoader<B> {
    type Module = StaticModule<B>;

    fn load(&mut self, _binary: &Path, primitives: &PrimitiveTable) -> Result<StaticModule<B>, HostError> {
        StaticModule::new(B::default(), primitives)
    }
}
