//! A module written directly against the symbol contract. It reports every
//! entry point through the primitive table so tests can count them host-side:
//!
//! - `frame_init` → `style_set(STYLE_CONTROL_INIT, 0, 0)`
//! - `frame_step` → `frame_begin`, `clear`, `frame_end`
//! - `shutdown` → `style_set(STYLE_CONTROL_SHUTDOWN, 0, 0)`

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use hot_module_abi::{Color, PrimitiveTable, Primitives, KEY_R};

pub const STYLE_CONTROL_INIT: i32 = 1000;
pub const STYLE_CONTROL_SHUTDOWN: i32 = 1001;

static PRIMITIVES: Mutex<Option<Primitives>> = Mutex::new(None);
static RELOAD_REQUESTED: AtomicBool = AtomicBool::new(false);

fn primitives() -> Option<Primitives> {
    *PRIMITIVES.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[unsafe(no_mangle)]
pub extern "C" fn hot_module_install_primitives(table: PrimitiveTable) {
    *PRIMITIVES.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(Primitives::new(table));
}

#[unsafe(no_mangle)]
pub extern "C" fn hot_module_frame_init() {
    if let Some(p) = primitives() {
        p.style_set(STYLE_CONTROL_INIT, 0, 0);
    }
}

#[unsafe(no_mangle)]
pub extern "C" fn hot_module_frame_step() {
    let Some(p) = primitives() else { return };
    if p.key_pressed() == KEY_R {
        RELOAD_REQUESTED.store(true, Ordering::SeqCst);
    }
    p.frame_begin();
    p.clear(Color::DARKGRAY);
    p.frame_end();
}

#[unsafe(no_mangle)]
pub extern "C" fn hot_module_query_reload_flag() -> bool {
    RELOAD_REQUESTED.load(Ordering::SeqCst)
}

#[cfg(not(feature = "without-shutdown"))]
#[unsafe(no_mangle)]
pub extern "C" fn hot_module_shutdown() {
    if let Some(p) = primitives() {
        p.style_set(STYLE_CONTROL_SHUTDOWN, 0, 0);
    }
}

#[unsafe(no_mangle)]
pub extern "C" fn hot_module_should_terminate() -> bool {
    primitives().map(|p| p.surface_should_close()).unwrap_or(true)
}
