use anyhow::Result;
use minifb::{Key, Window, WindowOptions};

use super::overlay::FrameBuffer;

/// minifb window presenting an overlay buffer
pub struct MinifbWindow {
    window: Window,
    width: usize,
    height: usize,
}

impl MinifbWindow {
    pub fn new(title: &str, width: usize, height: usize) -> Result<Self> {
        let mut window = Window::new(
            title,
            width,
            height,
            WindowOptions {
                resize: false,
                ..WindowOptions::default()
            },
        )?;
        window.set_target_fps(60);

        Ok(Self {
            window,
            width,
            height,
        })
    }

    /// Open until closed or Escape
    pub fn is_open(&self) -> bool {
        self.window.is_open() && !self.window.is_key_down(Key::Escape)
    }

    pub fn set_title(&mut self, title: &str) {
        self.window.set_title(title);
    }

    /// Show `fb`; a buffer of another size is a caller bug and rejected by minifb.
    pub fn present(&mut self, fb: &FrameBuffer) -> Result<()> {
        if fb.width() != self.width || fb.height() != self.height {
            anyhow::bail!(
                "buffer {}x{} does not match window {}x{}",
                fb.width(),
                fb.height(),
                self.width,
                self.height
            );
        }
        self.window
            .update_with_buffer(fb.pixels(), self.width, self.height)?;
        Ok(())
    }
}
