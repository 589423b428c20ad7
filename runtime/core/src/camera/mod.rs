//! Camera controller driven by `internal camera` rules.
//!
//! The first data byte selects an operation and the second one carries its
//! argument. State (effect, rotation, zoom, flips, preview) lives in
//! [`CameraSettings`] and only changes through [`Camera::apply`]; the
//! backend turns the resulting settings into hardware calls.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub mod backend;

pub use backend::{BackendCall, CameraBackend, LoggingBackend, RaspistillBackend};

/// Image effects selectable by index.
pub const EFFECTS: [&str; 22] = [
    "none",
    "negative",
    "solarize",
    "sketch",
    "denoise",
    "emboss",
    "oilpaint",
    "hatch",
    "gpen",
    "pastel",
    "watercolor",
    "film",
    "blur",
    "saturation",
    "colorswap",
    "washedout",
    "posterise",
    "colorpoint",
    "colorbalance",
    "cartoon",
    "deinterlace1",
    "deinterlace2",
];

pub const OP_PREVIEW: u8 = 20;
pub const OP_EFFECT: u8 = 21;
pub const OP_ROTATION: u8 = 22;
pub const OP_CAPTURE: u8 = 23;
pub const OP_ZOOM_WIDTH: u8 = 25;
pub const OP_ZOOM_HEIGHT: u8 = 26;
pub const OP_ZOOM_X: u8 = 27;
pub const OP_ZOOM_Y: u8 = 28;
pub const OP_FLIP: u8 = 29;

/// Rotation code that advances by a quarter turn instead of setting an angle.
pub const ROTATE_NEXT: u8 = 99;

#[derive(Debug, Error)]
pub enum CameraError {
    #[error("failed to start `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("`{program}` exited with {status}")]
    CommandFailed {
        program: String,
        status: std::process::ExitStatus,
    },
    #[error("unknown rotation code {0}")]
    UnknownRotation(u8),
}

/// Zoom region as fractions of the full sensor frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZoomRect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl ZoomRect {
    pub const FULL: ZoomRect = ZoomRect {
        x: 0.0,
        y: 0.0,
        width: 1.0,
        height: 1.0,
    };
}

#[derive(Debug, Clone, PartialEq)]
pub struct CameraSettings {
    pub effect: usize,
    pub rotation: u16,
    pub zoom: ZoomRect,
    pub hflip: bool,
    pub vflip: bool,
    pub preview: bool,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            effect: 0,
            rotation: 0,
            zoom: ZoomRect::FULL,
            hflip: false,
            vflip: false,
            preview: false,
        }
    }
}

impl CameraSettings {
    pub fn effect_name(&self) -> &'static str {
        EFFECTS[self.effect % EFFECTS.len()]
    }
}

/// One camera operation decoded from `(data1, data2)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CameraOp {
    StartPreview,
    StopPreview,
    SetEffect(usize),
    CycleEffect,
    SetRotation(u16),
    RotateNext,
    Capture,
    ZoomWidth(f32),
    ZoomHeight(f32),
    ZoomX(f32),
    ZoomY(f32),
    RandomFlip,
}

impl CameraOp {
    /// `Ok(None)` for inputs that map to no operation.
    pub fn decode(data1: u8, data2: Option<u8>) -> Result<Option<Self>, CameraError> {
        let op = match (data1, data2) {
            (OP_PREVIEW, Some(1)) => CameraOp::StartPreview,
            (OP_PREVIEW, Some(2)) => CameraOp::StopPreview,
            (OP_EFFECT, Some(index)) if usize::from(index) < EFFECTS.len() => {
                CameraOp::SetEffect(usize::from(index))
            }
            (OP_EFFECT, _) => CameraOp::CycleEffect,
            (OP_ROTATION, Some(ROTATE_NEXT)) => CameraOp::RotateNext,
            (OP_ROTATION, Some(code)) => CameraOp::SetRotation(rotation_for(code)?),
            // Value-carrying operations without a value fall through to `None`.
            (OP_CAPTURE, _) => CameraOp::Capture,
            (OP_ZOOM_WIDTH, Some(value)) => CameraOp::ZoomWidth(percent(value)),
            (OP_ZOOM_HEIGHT, Some(value)) => CameraOp::ZoomHeight(percent(value)),
            (OP_ZOOM_X, Some(value)) => CameraOp::ZoomX(percent(value)),
            (OP_ZOOM_Y, Some(value)) => CameraOp::ZoomY(percent(value)),
            (OP_FLIP, _) => CameraOp::RandomFlip,
            _ => return Ok(None),
        };
        Ok(Some(op))
    }
}

fn rotation_for(code: u8) -> Result<u16, CameraError> {
    match code {
        0 => Ok(0),
        1 => Ok(90),
        2 => Ok(180),
        3 => Ok(270),
        other => Err(CameraError::UnknownRotation(other)),
    }
}

fn percent(value: u8) -> f32 {
    f32::from(value.min(100)) / 100.0
}

pub struct Camera {
    settings: CameraSettings,
    /// Position of the effect cycle; `None` until the first cycle or set.
    effect_cursor: Option<usize>,
    capture_dir: PathBuf,
    last_capture: Option<PathBuf>,
    backend: Box<dyn CameraBackend>,
}

impl std::fmt::Debug for Camera {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Camera")
            .field("settings", &self.settings)
            .field("capture_dir", &self.capture_dir)
            .field("backend", &self.backend.name())
            .finish_non_exhaustive()
    }
}

impl Camera {
    pub fn new(backend: Box<dyn CameraBackend>, capture_dir: impl Into<PathBuf>) -> Self {
        info!(backend = backend.name(), "Initializing camera");
        Self {
            settings: CameraSettings::default(),
            effect_cursor: None,
            capture_dir: capture_dir.into(),
            last_capture: None,
            backend,
        }
    }

    /// Checks the backend first; a camera that cannot be driven is refused.
    pub fn open(
        mut backend: Box<dyn CameraBackend>,
        capture_dir: impl Into<PathBuf>,
    ) -> Result<Self, CameraError> {
        backend.check_available()?;
        Ok(Self::new(backend, capture_dir))
    }

    pub fn settings(&self) -> &CameraSettings {
        &self.settings
    }

    pub fn capture_dir(&self) -> &Path {
        &self.capture_dir
    }

    pub fn last_capture(&self) -> Option<&Path> {
        self.last_capture.as_deref()
    }

    /// Entry point for `internal camera` commands.
    pub fn execute(&mut self, data1: u8, data2: Option<u8>) -> Result<(), CameraError> {
        match CameraOp::decode(data1, data2)? {
            Some(op) => self.apply(op),
            None => {
                debug!(data1, ?data2, "Ignoring unrecognized camera operation");
                Ok(())
            }
        }
    }

    pub fn apply(&mut self, op: CameraOp) -> Result<(), CameraError> {
        debug!(?op, "Applying camera operation");
        match op {
            CameraOp::StartPreview => {
                self.settings.effect = 0;
                self.settings.zoom = ZoomRect::FULL;
                self.settings.preview = true;
                return self.backend.start_preview(&self.settings);
            }
            CameraOp::StopPreview => {
                self.settings.preview = false;
                return self.backend.stop_preview();
            }
            CameraOp::SetEffect(index) => {
                self.settings.effect = index;
                self.effect_cursor = Some(index);
            }
            CameraOp::CycleEffect => {
                let next = self
                    .effect_cursor
                    .map_or(0, |cursor| (cursor + 1) % EFFECTS.len());
                self.effect_cursor = Some(next);
                self.settings.effect = next;
            }
            CameraOp::SetRotation(degrees) => self.settings.rotation = degrees,
            CameraOp::RotateNext => self.settings.rotation = (self.settings.rotation + 90) % 360,
            CameraOp::Capture => {
                let path = self.capture_dir.join(format!("{}.jpg", Uuid::new_v4()));
                self.backend.capture(&self.settings, &path)?;
                info!(path = %path.display(), "Captured still image");
                self.last_capture = Some(path);
                return Ok(());
            }
            CameraOp::ZoomWidth(width) => {
                self.settings.zoom = ZoomRect {
                    x: 0.0,
                    y: 0.0,
                    width,
                    height: self.settings.zoom.height,
                };
            }
            CameraOp::ZoomHeight(height) => {
                self.settings.zoom = ZoomRect {
                    x: 0.0,
                    y: 0.0,
                    width: self.settings.zoom.width,
                    height,
                };
            }
            CameraOp::ZoomX(x) => self.settings.zoom.x = x,
            CameraOp::ZoomY(y) => self.settings.zoom.y = y,
            CameraOp::RandomFlip => {
                self.settings.hflip = rand::random();
                self.settings.vflip = rand::random();
            }
        }
        self.backend.apply(&self.settings)
    }
}

impl Drop for Camera {
    fn drop(&mut self) {
        if self.settings.preview {
            if let Err(err) = self.backend.stop_preview() {
                warn!("Failed to stop camera preview: {err}");
            }
        }
        self.backend.release();
    }
}
