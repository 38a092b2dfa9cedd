//! Scripted fakes for the generation and sleep seams.

use std::collections::VecDeque;
use std::io::Cursor;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Result};
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use mascot_contracts::media::EncodedImage;

use crate::providers::{GenerationRequest, ImageGenerator};
use crate::retry::Sleeper;

#[derive(Debug, Default)]
pub struct RecordingSleeper {
    sleeps: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn recorded(&self) -> Vec<Duration> {
        self.sleeps.lock().map(|rows| rows.clone()).unwrap_or_default()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) {
        if let Ok(mut rows) = self.sleeps.lock() {
            rows.push(duration);
        }
    }
}

/// Replays a fixed list of outcomes, one per call, and records every request.
/// Runs out into a "script exhausted" error.
#[derive(Debug, Default)]
pub struct ScriptedGenerator {
    script: Mutex<VecDeque<Result<EncodedImage, String>>>,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl ScriptedGenerator {
    pub fn new(script: Vec<Result<EncodedImage, String>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().map(|rows| rows.clone()).unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.requests().len()
    }
}

impl ImageGenerator for ScriptedGenerator {
    fn name(&self) -> &str {
        "scripted"
    }

    fn generate(&self, request: &GenerationRequest) -> Result<EncodedImage> {
        if let Ok(mut rows) = self.requests.lock() {
            rows.push(request.clone());
        }
        let next = self
            .script
            .lock()
            .map_err(|_| anyhow!("script lock poisoned"))?
            .pop_front();
        match next {
            Some(Ok(image)) => Ok(image),
            Some(Err(message)) => Err(anyhow!(message)),
            None => Err(anyhow!("script exhausted")),
        }
    }
}

/// Boxable handle that keeps the script inspectable after the box moves.
pub struct SharedGenerator(pub Arc<ScriptedGenerator>);

impl ImageGenerator for SharedGenerator {
    fn name(&self) -> &str {
        self.0.name()
    }

    fn generate(&self, request: &GenerationRequest) -> Result<EncodedImage> {
        self.0.generate(request)
    }
}

/// A small PNG: a `color` square on a white field.
pub fn sticker_png(color: [u8; 3]) -> EncodedImage {
    let mut canvas = RgbaImage::from_pixel(12, 12, Rgba([255, 255, 255, 255]));
    for y in 3..9 {
        for x in 3..9 {
            canvas.put_pixel(x, y, Rgba([color[0], color[1], color[2], 255]));
        }
    }
    let mut bytes = Vec::new();
    DynamicImage::ImageRgba8(canvas)
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .expect("encode test png");
    EncodedImage::png(bytes)
}
