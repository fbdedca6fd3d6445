use std::fs::File;
use std::io::{self, Write};
use std::path::Path;
use std::thread;
use std::time::Duration;

use crate::color::Color;

/// The hardware side of the animation engine: stage pixels one at a time,
/// then commit the whole frame to the strip.
pub trait StripDevice: Send + 'static {
    fn set_pixel(&mut self, index: usize, color: Color) -> io::Result<()>;
    fn commit_frame(&mut self) -> io::Result<()>;
}

// WS2801 latches the shifted-in frame once the clock idles for ~500us.
const LATCH_DELAY: Duration = Duration::from_micros(500);

/// WS2801 strip behind an SPI character device. A frame is the raw RGB
/// bytes for every pixel in strip order, followed by the latch pause.
pub struct Ws2801Strip {
    dev: File,
    frame: Vec<u8>,
}

impl Ws2801Strip {
    pub fn open(led_count: usize, path: &Path) -> io::Result<Ws2801Strip> {
        let dev = File::options().write(true).open(path)?;

        Ok(Ws2801Strip {
            dev,
            frame: vec![0; led_count * 3],
        })
    }
}

impl StripDevice for Ws2801Strip {
    fn set_pixel(&mut self, index: usize, color: Color) -> io::Result<()> {
        let base = index * 3;
        if base + 3 > self.frame.len() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("pixel index {index} is past the end of the strip"),
            ));
        }

        self.frame[base] = color.r;
        self.frame[base + 1] = color.g;
        self.frame[base + 2] = color.b;
        Ok(())
    }

    fn commit_frame(&mut self) -> io::Result<()> {
        self.dev.write_all(&self.frame)?;
        self.dev.flush()?;
        thread::sleep(LATCH_DELAY);
        Ok(())
    }
}
