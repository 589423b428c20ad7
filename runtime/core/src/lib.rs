pub mod camera;
pub mod config;
pub mod executor;
pub mod matcher;
pub mod midi;
pub mod runtime;

pub use camera::{Camera, CameraBackend, CameraError, CameraOp, CameraSettings};
pub use config::{load_from_path, load_from_str, Diagnostic, DiagnosticSeverity, LoadError, LoadedRules};
pub use executor::{ActionLog, DetachedSpawner, DispatchError, Executor, ProcessSpawner};
pub use matcher::matching_rules;
pub use midi::input::{list_input_ports, InputHandle, PortSelector};
pub use midi::{DecodedEvent, EventDecoder, RawMidiEvent};
pub use runtime::{CameraBackendKind, CameraOptions, RuntimeError, RuntimeManager, RuntimeOptions};
