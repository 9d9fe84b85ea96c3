//! A headless backend behind the primitive table.
//!
//! There is no window: surface and draw calls are logged, `frame_end` paces
//! the loop to the configured tick rate and keys come from stdin, one command
//! per line:
//!
//! - `r` presses `R` (modules use it to request a reload)
//! - `b` activates the next button that is drawn
//! - `q` asks the surface to close
//! - any other single character presses that key

use std::ffi::{c_char, CStr};
use std::io::BufRead;
use std::sync::{mpsc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use hot_module_abi::{Color, PrimitiveTable, Rectangle, KEY_NULL, KEY_R, PRIMITIVE_TABLE_VERSION};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConsoleInput {
    Key(i32),
    Click,
    Close,
}

struct Console {
    input: mpsc::Receiver<ConsoleInput>,
    frame_interval: Duration,
    next_frame: Option<Instant>,
    frames: u64,
    open: bool,
    close_requested: bool,
    click_pending: bool,
}

impl Console {
    fn drain_input(&mut self) -> i32 {
        let mut key = KEY_NULL;
        while let Ok(input) = self.input.try_recv() {
            match input {
                ConsoleInput::Key(code) if key == KEY_NULL => key = code,
                ConsoleInput::Key(code) => log::debug!("dropping key {code}, one key per frame"),
                ConsoleInput::Click => self.click_pending = true,
                ConsoleInput::Close => self.close_requested = true,
            }
        }
        key
    }
}

static CONSOLE: Mutex<Option<Console>> = Mutex::new(None);

fn with_console<R>(f: impl FnOnce(&mut Console) -> R) -> Option<R> {
    let mut guard = CONSOLE.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    guard.as_mut().map(f)
}

/// Starts the stdin reader and returns the table of console primitives.
/// `tick_rate` is the number of frames per second `frame_end` paces to.
pub fn console_primitives(tick_rate: u32) -> PrimitiveTable {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            if let Some(input) = parse_input(&line) {
                if tx.send(input).is_err() {
                    break;
                }
            }
        }
        log::debug!("stdin closed, no more console input");
    });

    let frame_interval = Duration::from_secs(1) / tick_rate.max(1);
    *CONSOLE.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(Console {
        input: rx,
        frame_interval,
        next_frame: None,
        frames: 0,
        open: false,
        close_requested: false,
        click_pending: false,
    });

    PrimitiveTable {
        version: PRIMITIVE_TABLE_VERSION,
        surface_init: Some(surface_init),
        surface_close: Some(surface_close),
        surface_should_close: Some(surface_should_close),
        frame_begin: Some(frame_begin),
        frame_end: Some(frame_end),
        clear: Some(clear),
        key_pressed: Some(key_pressed),
        widget_button: Some(widget_button),
        style_set: Some(style_set),
    }
}

fn parse_input(line: &str) -> Option<ConsoleInput> {
    match line.trim() {
        "" => None,
        "r" | "R" => Some(ConsoleInput::Key(KEY_R)),
        "b" | "click" => Some(ConsoleInput::Click),
        "q" | "quit" | "exit" => Some(ConsoleInput::Close),
        other => {
            let mut chars = other.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) if c.is_ascii_alphanumeric() => {
                    Some(ConsoleInput::Key(c.to_ascii_uppercase() as i32))
                }
                _ => {
                    log::warn!("unknown console input {other:?}");
                    None
                }
            }
        }
    }
}

fn c_str(ptr: *const c_char) -> String {
    if ptr.is_null() {
        return String::new();
    }
    // The caller keeps the string alive for the duration of the call.
    unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned()
}

extern "C" fn surface_init(width: i32, height: i32, title: *const c_char) {
    let title = c_str(title);
    log::info!("opening {width}x{height} surface {title:?}");
    with_console(|console| console.open = true);
}

extern "C" fn surface_close() {
    log::info!("closing surface");
    with_console(|console| console.open = false);
}

extern "C" fn surface_should_close() -> bool {
    with_console(|console| console.close_requested || !console.open).unwrap_or(true)
}

extern "C" fn frame_begin() {}

extern "C" fn frame_end() {
    let sleep = with_console(|console| {
        console.frames += 1;
        let now = Instant::now();
        let next = console.next_frame.unwrap_or(now) + console.frame_interval;
        // don't try to catch up after a stall (e.g. a slow reload)
        console.next_frame = Some(if next < now { now } else { next });
        next.saturating_duration_since(now)
    });
    if let Some(sleep) = sleep.filter(|d| !d.is_zero()) {
        thread::sleep(sleep);
    }
}

extern "C" fn clear(color: Color) {
    log::trace!("clear {color:?}");
}

extern "C" fn key_pressed() -> i32 {
    let key = with_console(Console::drain_input).unwrap_or(KEY_NULL);
    if key != KEY_NULL {
        log::debug!("key pressed: {key}");
    }
    key
}

extern "C" fn widget_button(bounds: Rectangle, label: *const c_char) -> bool {
    let clicked = with_console(|console| std::mem::take(&mut console.click_pending)).unwrap_or(false);
    if clicked {
        log::info!("button {:?} at {bounds:?} pressed", c_str(label));
    }
    clicked
}

extern "C" fn style_set(control: i32, property: i32, value: i32) {
    log::debug!("style control {control} property {property} = {value:#x}");
}
