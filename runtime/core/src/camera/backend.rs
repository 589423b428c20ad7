use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::{Arc, Mutex};

use tracing::{debug, info, warn};

use super::{CameraError, CameraSettings};

/// Hardware side of the camera. Implementations receive the full settings
/// after every change.
pub trait CameraBackend: Send {
    fn name(&self) -> &'static str;
    /// Checks that the device can be driven at all. Called once before the
    /// camera is accepted.
    fn check_available(&mut self) -> Result<(), CameraError> {
        Ok(())
    }
    fn start_preview(&mut self, settings: &CameraSettings) -> Result<(), CameraError>;
    fn stop_preview(&mut self) -> Result<(), CameraError>;
    fn apply(&mut self, settings: &CameraSettings) -> Result<(), CameraError>;
    fn capture(&mut self, settings: &CameraSettings, path: &Path) -> Result<(), CameraError>;
    /// Frees the device. Called once when the camera is dropped.
    fn release(&mut self) {}
}

/// Drives the legacy Raspberry Pi camera stack through `raspistill`.
/// Settings cannot change on a running preview, so the preview process is
/// restarted whenever they do.
pub struct RaspistillBackend {
    program: String,
    preview: Option<Child>,
}

impl RaspistillBackend {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            preview: None,
        }
    }

    fn settings_args(settings: &CameraSettings) -> Vec<String> {
        let zoom = settings.zoom;
        let mut args = vec![
            "-ifx".to_string(),
            raspistill_effect(settings.effect_name()).to_string(),
            "-rot".to_string(),
            settings.rotation.to_string(),
            "-roi".to_string(),
            format!("{},{},{},{}", zoom.x, zoom.y, zoom.width, zoom.height),
        ];
        if settings.hflip {
            args.push("-hf".to_string());
        }
        if settings.vflip {
            args.push("-vf".to_string());
        }
        args
    }

    fn spawn_preview(&mut self, settings: &CameraSettings) -> Result<(), CameraError> {
        let child = Command::new(&self.program)
            .args(["-t", "0"])
            .args(Self::settings_args(settings))
            .stdin(Stdio::null())
            .spawn()
            .map_err(|source| CameraError::Spawn {
                program: self.program.clone(),
                source,
            })?;
        debug!(pid = child.id(), "Camera preview started");
        self.preview = Some(child);
        Ok(())
    }

    fn kill_preview(&mut self) {
        if let Some(mut child) = self.preview.take() {
            if let Err(err) = child.kill() {
                debug!("Camera preview already exited: {err}");
            }
            if let Err(err) = child.wait() {
                debug!("Failed to reap camera preview: {err}");
            }
        }
    }
}

impl CameraBackend for RaspistillBackend {
    fn name(&self) -> &'static str {
        "raspistill"
    }

    /// Runs `<program> --help`; only a failure to start counts, the exit
    /// status is ignored.
    fn check_available(&mut self) -> Result<(), CameraError> {
        Command::new(&self.program)
            .arg("--help")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map_err(|source| CameraError::Spawn {
                program: self.program.clone(),
                source,
            })?;
        Ok(())
    }

    fn start_preview(&mut self, settings: &CameraSettings) -> Result<(), CameraError> {
        self.kill_preview();
        self.spawn_preview(settings)
    }

    fn stop_preview(&mut self) -> Result<(), CameraError> {
        self.kill_preview();
        Ok(())
    }

    fn apply(&mut self, settings: &CameraSettings) -> Result<(), CameraError> {
        if self.preview.is_some() {
            self.kill_preview();
            self.spawn_preview(settings)?;
        }
        Ok(())
    }

    fn capture(&mut self, settings: &CameraSettings, path: &Path) -> Result<(), CameraError> {
        // The sensor is exclusive: pause the preview for the still.
        let resume = self.preview.is_some();
        self.kill_preview();

        let status = Command::new(&self.program)
            .args(["-n", "-t", "1", "-o"])
            .arg(path)
            .args(Self::settings_args(settings))
            .stdin(Stdio::null())
            .status()
            .map_err(|source| CameraError::Spawn {
                program: self.program.clone(),
                source,
            });

        if resume {
            if let Err(err) = self.spawn_preview(settings) {
                warn!("Failed to resume camera preview: {err}");
            }
        }

        let status = status?;
        if !status.success() {
            return Err(CameraError::CommandFailed {
                program: self.program.clone(),
                status,
            });
        }
        Ok(())
    }

    fn release(&mut self) {
        self.kill_preview();
    }
}

/// `raspistill -ifx` uses British spellings for a few effects.
fn raspistill_effect(name: &str) -> &str {
    match name {
        "solarize" => "solarise",
        "watercolor" => "watercolour",
        "colorswap" => "colourswap",
        "colorpoint" => "colourpoint",
        "colorbalance" => "colourbalance",
        other => other,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum BackendCall {
    StartPreview,
    StopPreview,
    Apply(CameraSettings),
    Capture(PathBuf),
    Release,
}

/// Backend without hardware: logs every call and keeps a shared record.
#[derive(Debug, Clone, Default)]
pub struct LoggingBackend {
    calls: Arc<Mutex<Vec<BackendCall>>>,
}

impl LoggingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<BackendCall> {
        self.calls
            .lock()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }

    fn record(&self, call: BackendCall) {
        info!(?call, "camera");
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
    }
}

impl CameraBackend for LoggingBackend {
    fn name(&self) -> &'static str {
        "log"
    }

    fn start_preview(&mut self, _settings: &CameraSettings) -> Result<(), CameraError> {
        self.record(BackendCall::StartPreview);
        Ok(())
    }

    fn stop_preview(&mut self) -> Result<(), CameraError> {
        self.record(BackendCall::StopPreview);
        Ok(())
    }

    fn apply(&mut self, settings: &CameraSettings) -> Result<(), CameraError> {
        self.record(BackendCall::Apply(settings.clone()));
        Ok(())
    }

    fn capture(&mut self, _settings: &CameraSettings, path: &Path) -> Result<(), CameraError> {
        self.record(BackendCall::Capture(path.to_path_buf()));
        Ok(())
    }

    fn release(&mut self) {
        self.record(BackendCall::Release);
    }
}
