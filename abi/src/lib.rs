//! The contract between `hot-module-host` and the modules it loads.
//!
//! A module is a `cdylib` that exports the six entry points named in
//! [`symbols`]. The host never links against the module and the module never
//! links against the host: the only thing both sides agree on is the layout of
//! [`PrimitiveTable`] and the signatures in this crate.
//!
//! Writing a module by hand means exporting the six functions yourself. Most
//! modules instead implement [`ModuleBehavior`] and let [`export_module!`]
//! generate the exports:
//!
//! ```ignore
//! use hot_module_abi::{export_module, ModuleBehavior, Primitives, KEY_R};
//!
//! #[derive(Default)]
//! struct Game {
//!     reload: bool,
//! }
//!
//! impl ModuleBehavior for Game {
//!     fn frame_step(&mut self, primitives: &Primitives) {
//!         if primitives.key_pressed() == KEY_R {
//!             self.reload = true;
//!         }
//!         primitives.frame_begin();
//!         primitives.clear(hot_module_abi::Color::RED);
//!         primitives.frame_end();
//!     }
//!
//!     fn reload_requested(&self) -> bool {
//!         self.reload
//!     }
//! }
//!
//! export_module!(Game);
//! ```

use std::ffi::{c_char, CString};

/// Bumped whenever the order or signature of a [`PrimitiveTable`] slot changes.
pub const PRIMITIVE_TABLE_VERSION: u32 = 1;

pub const KEY_NULL: i32 = 0;
pub const KEY_Q: i32 = 81;
pub const KEY_R: i32 = 82;
pub const KEY_ESCAPE: i32 = 256;

/// Style controls and properties understood by `style_set`.
pub mod style {
    pub const CONTROL_DEFAULT: i32 = 0;
    pub const CONTROL_BUTTON: i32 = 2;

    pub const PROPERTY_BORDER_COLOR_NORMAL: i32 = 0;
    pub const PROPERTY_BASE_COLOR_NORMAL: i32 = 1;
    pub const PROPERTY_TEXT_COLOR_NORMAL: i32 = 2;
    pub const PROPERTY_TEXT_SIZE: i32 = 16;
}

/// Names of the entry points every module exports.
pub mod symbols {
    pub const INSTALL_PRIMITIVES: &str = "hot_module_install_primitives";
    pub const FRAME_INIT: &str = "hot_module_frame_init";
    pub const FRAME_STEP: &str = "hot_module_frame_step";
    pub const QUERY_RELOAD_FLAG: &str = "hot_module_query_reload_flag";
    pub const SHUTDOWN: &str = "hot_module_shutdown";
    pub const SHOULD_TERMINATE: &str = "hot_module_should_terminate";

    /// Resolution order used by the host.
    pub const ALL: [&str; 6] = [
        INSTALL_PRIMITIVES,
        FRAME_INIT,
        FRAME_STEP,
        QUERY_RELOAD_FLAG,
        SHUTDOWN,
        SHOULD_TERMINATE,
    ];
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const RED: Color = Color::rgba(230, 41, 55, 255);
    pub const RAYWHITE: Color = Color::rgba(245, 245, 245, 255);
    pub const DARKGRAY: Color = Color::rgba(80, 80, 80, 255);

    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Packs the color the way `style_set` expects it (`0xRRGGBBAA`).
    pub const fn to_style_value(self) -> i32 {
        i32::from_be_bytes([self.r, self.g, self.b, self.a])
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rectangle {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rectangle {
    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

pub type SurfaceInitFn = extern "C" fn(width: i32, height: i32, title: *const c_char);
pub type SurfaceCloseFn = extern "C" fn();
pub type SurfaceShouldCloseFn = extern "C" fn() -> bool;
pub type FrameBeginFn = extern "C" fn();
pub type FrameEndFn = extern "C" fn();
pub type ClearFn = extern "C" fn(color: Color);
pub type KeyPressedFn = extern "C" fn() -> i32;
pub type WidgetButtonFn = extern "C" fn(bounds: Rectangle, label: *const c_char) -> bool;
pub type StyleSetFn = extern "C" fn(control: i32, property: i32, value: i32);

pub type InstallPrimitivesFn = unsafe extern "C" fn(table: PrimitiveTable);
pub type FrameInitFn = unsafe extern "C" fn();
pub type FrameStepFn = unsafe extern "C" fn();
pub type QueryReloadFlagFn = unsafe extern "C" fn() -> bool;
pub type ShutdownFn = unsafe extern "C" fn();
pub type ShouldTerminateFn = unsafe extern "C" fn() -> bool;

/// Host-provided operations handed to a module once per load.
///
/// Slots are nullable so that a half-filled table can be detected instead of
/// jumping through a null pointer. The host refuses to install a table for
/// which [`PrimitiveTable::missing_slot`] returns `Some`.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct PrimitiveTable {
    pub version: u32,
    pub surface_init: Option<SurfaceInitFn>,
    pub surface_close: Option<SurfaceCloseFn>,
    pub surface_should_close: Option<SurfaceShouldCloseFn>,
    pub frame_begin: Option<FrameBeginFn>,
    pub frame_end: Option<FrameEndFn>,
    pub clear: Option<ClearFn>,
    pub key_pressed: Option<KeyPressedFn>,
    pub widget_button: Option<WidgetButtonFn>,
    pub style_set: Option<StyleSetFn>,
}

impl Default for PrimitiveTable {
    fn default() -> Self {
        Self::empty()
    }
}

impl PrimitiveTable {
    /// A table of the current version with every slot null.
    pub const fn empty() -> Self {
        Self {
            version: PRIMITIVE_TABLE_VERSION,
            surface_init: None,
            surface_close: None,
            surface_should_close: None,
            frame_begin: None,
            frame_end: None,
            clear: None,
            key_pressed: None,
            widget_button: None,
            style_set: None,
        }
    }

    /// Name of the first null slot, in table order.
    pub fn missing_slot(&self) -> Option<&'static str> {
        let slots = [
            ("surface_init", self.surface_init.is_some()),
            ("surface_close", self.surface_close.is_some()),
            ("surface_should_close", self.surface_should_close.is_some()),
            ("frame_begin", self.frame_begin.is_some()),
            ("frame_end", self.frame_end.is_some()),
            ("clear", self.clear.is_some()),
            ("key_pressed", self.key_pressed.is_some()),
            ("widget_button", self.widget_button.is_some()),
            ("style_set", self.style_set.is_some()),
        ];
        slots
            .into_iter()
            .find(|(_, present)| !present)
            .map(|(name, _)| name)
    }
}

/// Module-side view of a [`PrimitiveTable`].
///
/// Every call is a no-op (or returns a neutral value) when its slot is null;
/// the host never installs such a table, so this only matters for modules
/// driven by hand in tests.
#[derive(Debug, Clone, Copy)]
pub struct Primitives {
    table: PrimitiveTable,
}

impl Primitives {
    pub fn new(table: PrimitiveTable) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &PrimitiveTable {
        &self.table
    }

    pub fn surface_init(&self, width: i32, height: i32, title: &str) {
        if let Some(f) = self.table.surface_init {
            let title = c_string(title);
            f(width, height, title.as_ptr());
        }
    }

    pub fn surface_close(&self) {
        if let Some(f) = self.table.surface_close {
            f();
        }
    }

    pub fn surface_should_close(&self) -> bool {
        self.table.surface_should_close.map(|f| f()).unwrap_or(false)
    }

    pub fn frame_begin(&self) {
        if let Some(f) = self.table.frame_begin {
            f();
        }
    }

    pub fn frame_end(&self) {
        if let Some(f) = self.table.frame_end {
            f();
        }
    }

    pub fn clear(&self, color: Color) {
        if let Some(f) = self.table.clear {
            f(color);
        }
    }

    /// Key code of the key pressed since the last call, [`KEY_NULL`] if none.
    pub fn key_pressed(&self) -> i32 {
        self.table.key_pressed.map(|f| f()).unwrap_or(KEY_NULL)
    }

    /// Draws a button and returns whether it was activated this frame.
    pub fn button(&self, bounds: Rectangle, label: &str) -> bool {
        match self.table.widget_button {
            Some(f) => {
                let label = c_string(label);
                f(bounds, label.as_ptr())
            }
            None => false,
        }
    }

    pub fn style_set(&self, control: i32, property: i32, value: i32) {
        if let Some(f) = self.table.style_set {
            f(control, property, value);
        }
    }
}

// Interior NULs would make the string unrepresentable; cut at the first one.
fn c_string(s: &str) -> CString {
    let end = s.find('\0').unwrap_or(s.len());
    CString::new(&s[..end]).unwrap_or_default()
}

/// Behavior of a module, independent of whether it is linked statically into
/// the host or loaded from a shared library.
pub trait ModuleBehavior: Default + Send + 'static {
    /// Per-load setup, called once right after the primitives are installed.
    fn frame_init(&mut self, _primitives: &Primitives) {}

    /// Draws one frame.
    fn frame_step(&mut self, primitives: &Primitives);

    /// Whether the module asks the host to reload it. Must not have side
    /// effects, the host may ask more than once per tick.
    fn reload_requested(&self) -> bool {
        false
    }

    fn should_terminate(&self, primitives: &Primitives) -> bool {
        primitives.surface_should_close()
    }

    /// Called once before the module is unloaded.
    fn shutdown(&mut self, _primitives: &Primitives) {}
}

/// Exports the six contract symbols for a [`ModuleBehavior`] type.
///
/// The behavior instance is created by `hot_module_install_primitives` and
/// dropped by `hot_module_shutdown`. Each load of the shared library gets its
/// own instance.
#[macro_export]
macro_rules! export_module {
    ($behavior:ty) => {
        static __HOT_MODULE_INSTANCE: ::std::sync::Mutex<
            ::std::option::Option<($behavior, $crate::Primitives)>,
        > = ::std::sync::Mutex::new(::std::option::Option::None);

        fn __hot_module_with<R>(
            f: impl FnOnce(&mut $behavior, &$crate::Primitives) -> R,
        ) -> ::std::option::Option<R> {
            let mut guard = __HOT_MODULE_INSTANCE
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            guard
                .as_mut()
                .map(|(behavior, primitives)| f(behavior, primitives))
        }

        #[unsafe(no_mangle)]
        pub extern "C" fn hot_module_install_primitives(table: $crate::PrimitiveTable) {
            let mut guard = __HOT_MODULE_INSTANCE
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            *guard = ::std::option::Option::Some((
                <$behavior as ::std::default::Default>::default(),
                $crate::Primitives::new(table),
            ));
        }

        #[unsafe(no_mangle)]
        pub extern "C" fn hot_module_frame_init() {
            __hot_module_with(|behavior, primitives| {
                $crate::ModuleBehavior::frame_init(behavior, primitives)
            });
        }

        #[unsafe(no_mangle)]
        pub extern "C" fn hot_module_frame_step() {
            __hot_module_with(|behavior, primitives| {
                $crate::ModuleBehavior::frame_step(behavior, primitives)
            });
        }

        #[unsafe(no_mangle)]
        pub extern "C" fn hot_module_query_reload_flag() -> bool {
            __hot_module_with(|behavior, _| $crate::ModuleBehavior::reload_requested(behavior))
                .unwrap_or(false)
        }

        #[unsafe(no_mangle)]
        pub extern "C" fn hot_module_shutdown() {
            let taken = __HOT_MODULE_INSTANCE
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .take();
            if let ::std::option::Option::Some((mut behavior, primitives)) = taken {
                $crate::ModuleBehavior::shutdown(&mut behavior, &primitives);
            }
        }

        #[unsafe(no_mangle)]
        pub extern "C" fn hot_module_should_terminate() -> bool {
            __hot_module_with(|behavior, primitives| {
                $crate::ModuleBehavior::should_terminate(behavior, primitives)
            })
            .unwrap_or(true)
        }
    };
}
