use std::future::Future;
use std::path::PathBuf;

use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::camera::{Camera, CameraBackend, CameraError, LoggingBackend, RaspistillBackend};
use crate::config::{load_from_path, LoadError};
use crate::executor::{DetachedSpawner, Executor, ProcessSpawner};
use crate::midi::input::{open_input, InputHandle, PortSelector};
use crate::midi::RawMidiEvent;

#[derive(thiserror::Error, Debug)]
pub enum RuntimeError {
    #[error("config error: {0}")]
    Load(#[from] LoadError),
    #[error("midi error: {0}")]
    Midi(anyhow::Error),
    #[error("camera error: {0}")]
    Camera(#[from] CameraError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraBackendKind {
    Raspistill,
    Log,
}

#[derive(Debug, Clone)]
pub struct CameraOptions {
    pub backend: CameraBackendKind,
    pub program: String,
    pub capture_dir: PathBuf,
}

impl CameraOptions {
    fn open(&self) -> Result<Camera, CameraError> {
        let backend: Box<dyn CameraBackend> = match self.backend {
            CameraBackendKind::Raspistill => Box::new(RaspistillBackend::new(&self.program)),
            CameraBackendKind::Log => Box::new(LoggingBackend::new()),
        };
        Camera::open(backend, &self.capture_dir)
    }
}

#[derive(Debug, Clone)]
pub struct RuntimeOptions {
    pub config_path: PathBuf,
    pub port: Option<PortSelector>,
    pub client_name: String,
    pub camera: Option<CameraOptions>,
}

const EVENT_QUEUE: usize = 64;

/// Owns the executor and the event source; events are handled one at a
/// time, in arrival order, on the task that calls [`RuntimeManager::run`].
pub struct RuntimeManager<S: ProcessSpawner = DetachedSpawner> {
    executor: Executor<S>,
    // Declared before `input`: on drop the receiver closes first, which
    // unblocks a callback stuck on a full queue before the port is joined.
    events: mpsc::Receiver<RawMidiEvent>,
    input: Option<Box<dyn InputHandle>>,
}

impl RuntimeManager<DetachedSpawner> {
    pub fn initialize(options: RuntimeOptions) -> Result<Self, RuntimeError> {
        let loaded = load_from_path(&options.config_path)?;
        loaded.log_summary();

        let camera = match &options.camera {
            Some(camera) => {
                debug!("Starting camera module");
                Some(camera.open()?)
            }
            None => None,
        };

        let (tx, rx) = mpsc::channel(EVENT_QUEUE);
        let midi_handle = open_input(&options.client_name, options.port.as_ref(), tx)
            .map_err(RuntimeError::Midi)?;

        let mut executor =
            Executor::new(loaded.table, DetachedSpawner::new()).with_port_name(&midi_handle.port_name);
        if let Some(camera) = camera {
            executor = executor.with_camera(camera);
        }

        debug!("Attaching MIDI input handler");
        Ok(Self {
            executor,
            events: rx,
            input: Some(Box::new(midi_handle)),
        })
    }
}

impl<S: ProcessSpawner> RuntimeManager<S> {
    /// Runs an executor against an arbitrary event source.
    pub fn with_source(executor: Executor<S>, events: mpsc::Receiver<RawMidiEvent>) -> Self {
        Self {
            executor,
            events,
            input: None,
        }
    }

    pub fn with_input(mut self, input: Box<dyn InputHandle>) -> Self {
        self.input = Some(input);
        self
    }

    pub fn executor(&self) -> &Executor<S> {
        &self.executor
    }

    /// Processes events until `shutdown` resolves or the source closes, then
    /// releases the port and the camera.
    pub async fn run(mut self, shutdown: impl Future<Output = ()>) -> Executor<S> {
        info!("Entering main loop. Press Control-C to exit.");
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => break,
                event = self.events.recv() => match event {
                    Some(event) => {
                        self.executor.handle_raw(&event.bytes, event.delta);
                    }
                    None => break,
                },
            }
        }
        self.shutdown()
    }

    fn shutdown(mut self) -> Executor<S> {
        self.events.close();
        if let Some(input) = self.input.take() {
            input.close();
        }
        info!("Listener stopped");
        self.executor
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::load_from_str;
    use crate::executor::ActionLog;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{mpsc as std_mpsc, Arc, Mutex};
    use std::time::Duration;

    #[derive(Clone, Default)]
    struct RecordingSpawner {
        spawned: Arc<Mutex<Vec<Vec<String>>>>,
    }

    impl ProcessSpawner for RecordingSpawner {
        fn spawn(&self, args: &[String]) -> std::io::Result<()> {
            if args[0] == "fail" {
                return Err(std::io::Error::new(std::io::ErrorKind::NotFound, "fail"));
            }
            self.spawned.lock().expect("lock").push(args.to_vec());
            Ok(())
        }
    }

    fn raw(bytes: &[u8]) -> RawMidiEvent {
        RawMidiEvent {
            bytes: bytes.to_vec(),
            delta: 0.01,
        }
    }

    #[tokio::test]
    async fn processes_events_in_arrival_order_until_source_closes() {
        let table = load_from_str(
            r#"- status: noteon
  data: 1
  command: fail %(data2)d
- status: noteon
  command: play %(data1)d %(data2)d
"#,
        )
        .expect("load")
        .table;
        let spawner = RecordingSpawner::default();
        let (tx, rx) = mpsc::channel(8);
        let manager = RuntimeManager::with_source(Executor::new(table, spawner.clone()), rx);

        tx.send(raw(&[0x90, 1, 10])).await.expect("send");
        tx.send(raw(&[0x90, 2, 20])).await.expect("send");
        tx.send(raw(&[0x80, 2, 0])).await.expect("send");
        drop(tx);

        let executor = manager.run(std::future::pending()).await;
        assert_eq!(
            *spawner.spawned.lock().expect("lock"),
            vec![
                vec!["play".to_string(), "1".to_string(), "10".to_string()],
                vec!["play".to_string(), "2".to_string(), "20".to_string()],
            ]
        );
        // The last event (note off) matched nothing.
        assert!(executor.last_actions.is_empty());
    }

    #[tokio::test]
    async fn shutdown_signal_stops_the_loop() {
        let (_tx, rx) = mpsc::channel(8);
        let manager = RuntimeManager::with_source(
            Executor::new(Default::default(), RecordingSpawner::default()),
            rx,
        );
        let executor = manager.run(async {}).await;
        assert_eq!(executor.last_actions, Vec::<ActionLog>::new());
    }

    /// Input whose close waits for the producer thread, like a transport
    /// joining its callback thread.
    struct JoiningInput {
        done: std_mpsc::Receiver<()>,
        joined: Arc<AtomicBool>,
    }

    impl InputHandle for JoiningInput {
        fn close(self: Box<Self>) {
            let joined = self.done.recv_timeout(Duration::from_secs(5)).is_ok();
            self.joined.store(joined, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn shutdown_with_full_queue_releases_blocked_producer() {
        let (tx, rx) = mpsc::channel(1);
        tx.try_send(raw(&[0xF8])).expect("fill queue");

        let (done_tx, done_rx) = std_mpsc::channel();
        std::thread::spawn(move || {
            let _ = tx.blocking_send(raw(&[0xF8]));
            let _ = done_tx.send(());
        });

        let joined = Arc::new(AtomicBool::new(false));
        let manager = RuntimeManager::with_source(
            Executor::new(Default::default(), RecordingSpawner::default()),
            rx,
        )
        .with_input(Box::new(JoiningInput {
            done: done_rx,
            joined: joined.clone(),
        }));

        manager.run(async {}).await;
        assert!(joined.load(Ordering::SeqCst));
    }

    #[test]
    fn missing_camera_program_fails_initialization() {
        let dir = tempfile::tempdir().expect("temp dir");
        let config_path = dir.path().join("rules.yaml");
        std::fs::write(&config_path, "- {status: noteon, command: internal camera}\n")
            .expect("write config");

        let err = RuntimeManager::initialize(RuntimeOptions {
            config_path,
            port: None,
            client_name: "midicommander-test".into(),
            camera: Some(CameraOptions {
                backend: CameraBackendKind::Raspistill,
                program: "/nonexistent/raspistill".into(),
                capture_dir: dir.path().to_path_buf(),
            }),
        })
        .err()
        .expect("camera should be refused");
        assert!(matches!(
            err,
            RuntimeError::Camera(CameraError::Spawn { .. })
        ));
    }
}
