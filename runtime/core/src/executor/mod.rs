//! Rule dispatch: renders matched rules and runs them.
//!
//! A failure while handling one rule is logged and recorded; it never stops
//! the remaining rules or later events.

use std::process::Stdio;

use rule_format::{InternalTarget, Rule, RuleAction, RuleTable};
use thiserror::Error;
use tracing::{debug, error, info, trace};

use crate::camera::{Camera, CameraError};
use crate::matcher::matching_rules;
use crate::midi::{DecodedEvent, EventDecoder};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionLog {
    External(Vec<String>),
    Camera { data1: u8, data2: Option<u8> },
    Skipped(String),
    Failed { rule: String, error: String },
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("could not split command line `{0}`")]
    Tokenize(String),
    #[error("command line is empty")]
    Empty,
    #[error("failed to spawn `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("camera operation failed: {0}")]
    Camera(#[from] CameraError),
}

/// Starts external commands without waiting for them.
pub trait ProcessSpawner: Send {
    fn spawn(&self, args: &[String]) -> std::io::Result<()>;
}

/// Spawns detached children that inherit the parent's standard streams.
/// Must be called from within a tokio runtime, which reaps the children.
#[derive(Debug, Default, Clone, Copy)]
pub struct DetachedSpawner;

impl DetachedSpawner {
    pub fn new() -> Self {
        Self
    }
}

impl ProcessSpawner for DetachedSpawner {
    fn spawn(&self, args: &[String]) -> std::io::Result<()> {
        let Some((program, rest)) = args.split_first() else {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "empty command",
            ));
        };
        let child = tokio::process::Command::new(program)
            .args(rest)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .spawn()?;
        debug!(pid = ?child.id(), "Spawned {program}");
        Ok(())
    }
}

pub struct Executor<S: ProcessSpawner = DetachedSpawner> {
    table: RuleTable,
    camera: Option<Camera>,
    spawner: S,
    decoder: EventDecoder,
    port_name: String,
    /// Actions taken for the most recent event.
    pub last_actions: Vec<ActionLog>,
}

impl<S: ProcessSpawner> std::fmt::Debug for Executor<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executor")
            .field("rules", &self.table.len())
            .field("camera", &self.camera)
            .field("port_name", &self.port_name)
            .finish_non_exhaustive()
    }
}

impl<S: ProcessSpawner> Executor<S> {
    pub fn new(table: RuleTable, spawner: S) -> Self {
        Self {
            table,
            camera: None,
            spawner,
            decoder: EventDecoder::new(),
            port_name: String::new(),
            last_actions: Vec::new(),
        }
    }

    pub fn with_camera(mut self, camera: Camera) -> Self {
        self.camera = Some(camera);
        self
    }

    pub fn with_port_name(mut self, port_name: impl Into<String>) -> Self {
        self.port_name = port_name.into();
        self
    }

    pub fn with_decoder(mut self, decoder: EventDecoder) -> Self {
        self.decoder = decoder;
        self
    }

    pub fn camera(&self) -> Option<&Camera> {
        self.camera.as_ref()
    }

    pub fn table(&self) -> &RuleTable {
        &self.table
    }

    /// Decodes a raw transport message and dispatches it. Returns the number
    /// of rules that fired.
    pub fn handle_raw(&mut self, bytes: &[u8], delta: f64) -> usize {
        let Some(event) = self.decoder.decode(bytes, delta) else {
            trace!("Ignoring empty MIDI message");
            self.last_actions.clear();
            return 0;
        };
        debug!(
            "[{}] @{:0.6} {:?}",
            self.port_name, event.timestamp, bytes
        );
        self.handle_event(&event)
    }

    pub fn handle_event(&mut self, event: &DecodedEvent) -> usize {
        self.last_actions.clear();
        let Self {
            table,
            camera,
            spawner,
            last_actions,
            ..
        } = self;

        let mut fired = 0;
        for rule in matching_rules(table, event) {
            fired += 1;
            match dispatch(rule, event, camera.as_mut(), spawner) {
                Ok(action) => last_actions.push(action),
                Err(err) => {
                    error!(
                        rule = %rule.name,
                        description = %rule.description,
                        command = rule.command.source(),
                        "Error calling external/internal command: {err}"
                    );
                    last_actions.push(ActionLog::Failed {
                        rule: rule.name.clone(),
                        error: err.to_string(),
                    });
                }
            }
        }
        if fired == 0 {
            trace!(status = event.status, "No rule matched");
        }
        fired
    }
}

fn dispatch<S: ProcessSpawner>(
    rule: &Rule,
    event: &DecodedEvent,
    camera: Option<&mut Camera>,
    spawner: &S,
) -> Result<ActionLog, DispatchError> {
    let cmdline = rule.command.render(&event.template_fields());
    let args = shlex::split(&cmdline).ok_or_else(|| DispatchError::Tokenize(cmdline.clone()))?;
    if args.is_empty() {
        return Err(DispatchError::Empty);
    }

    match &rule.action {
        RuleAction::External => {
            info!("Calling EXTERNAL command: {cmdline}");
            spawner
                .spawn(&args)
                .map_err(|source| DispatchError::Spawn {
                    program: args[0].clone(),
                    source,
                })?;
            Ok(ActionLog::External(args))
        }
        RuleAction::Internal(target) => {
            info!("Calling INTERNAL command: {cmdline}");
            match (target, camera, event.data1) {
                (InternalTarget::Camera, Some(camera), Some(data1)) => {
                    camera.execute(data1, event.data2)?;
                    Ok(ActionLog::Camera {
                        data1,
                        data2: event.data2,
                    })
                }
                (InternalTarget::Camera, None, _) => Ok(skipped("camera not enabled")),
                (InternalTarget::Camera, Some(_), None) => {
                    Ok(skipped("camera command without data bytes"))
                }
                (InternalTarget::Unknown(name), _, _) => {
                    Ok(skipped(&format!("unknown internal target `{name}`")))
                }
            }
        }
    }
}

fn skipped(reason: &str) -> ActionLog {
    debug!("Internal command ignored: {reason}");
    ActionLog::Skipped(reason.to_string())
}
