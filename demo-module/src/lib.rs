//! Build with `cargo build -p demo-module` and run the host with
//! `cargo run -- target/debug/libdemo_module.so`. Edit [`BACKGROUND`] or
//! [`BUTTON_LABEL`], rebuild, then type `r` into the host to swap the new
//! build in.
//!
//! Output goes through `println!`: a module depends only on `hot-module-abi`
//! and runs without a logger of its own.

use hot_module_abi::{export_module, style, Color, ModuleBehavior, Primitives, Rectangle, KEY_NULL, KEY_R};

pub const BACKGROUND: Color = Color::RED;
pub const BUTTON_LABEL: &str = "TEST BUTTON";
pub const BUTTON_BOUNDS: Rectangle = Rectangle::new(500.0, 200.0, 250.0, 60.0);

#[derive(Debug, Default)]
pub struct Demo {
    frames: u64,
    presses: u32,
    reload_requested: bool,
}

impl Demo {
    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn presses(&self) -> u32 {
        self.presses
    }
}

impl ModuleBehavior for Demo {
    fn frame_init(&mut self, primitives: &Primitives) {
        primitives.style_set(style::CONTROL_DEFAULT, style::PROPERTY_TEXT_SIZE, 20);
        primitives.style_set(
            style::CONTROL_BUTTON,
            style::PROPERTY_BASE_COLOR_NORMAL,
            Color::RAYWHITE.to_style_value(),
        );
        println!("demo module ready");
    }

    fn frame_step(&mut self, primitives: &Primitives) {
        self.frames += 1;

        match primitives.key_pressed() {
            KEY_NULL => {}
            KEY_R => {
                self.reload_requested = true;
                println!("reload requested");
            }
            key => println!("key pressed: {key}"),
        }

        primitives.frame_begin();
        primitives.clear(BACKGROUND);
        if primitives.button(BUTTON_BOUNDS, BUTTON_LABEL) {
            self.presses += 1;
            println!("button pressed {} times", self.presses);
        }
        primitives.frame_end();
    }

    fn reload_requested(&self) -> bool {
        self.reload_requested
    }

    fn shutdown(&mut self, _primitives: &Primitives) {
        println!("demo module shutting down after {} frames", self.frames);
    }
}

export_module!(Demo);
