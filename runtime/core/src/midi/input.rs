use midir::{Ignore, MidiInput, MidiInputConnection, MidiInputPort};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::RawMidiEvent;

/// Open input connection; dropping it closes the port.
pub struct MidiHandle {
    connection: MidiInputConnection<()>,
    pub port_name: String,
}

impl std::fmt::Debug for MidiHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MidiHandle")
            .field("port_name", &self.port_name)
            .finish_non_exhaustive()
    }
}

impl MidiHandle {
    pub fn close(self) {
        debug!(port = %self.port_name, "Closing MIDI input port");
        let _ = self.connection.close();
    }
}

/// Producer side of the event queue. Closing may wait for a callback that
/// is still blocked on a full queue, so the receiver must be closed first.
pub trait InputHandle {
    fn close(self: Box<Self>);
}

impl InputHandle for MidiHandle {
    fn close(self: Box<Self>) {
        MidiHandle::close(*self);
    }
}

/// How `--port` picks an input port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortSelector {
    Index(usize),
    /// Case-insensitive substring of the port name.
    Name(String),
}

impl PortSelector {
    pub fn parse(value: &str) -> Self {
        match value.trim().parse() {
            Ok(index) => PortSelector::Index(index),
            Err(_) => PortSelector::Name(value.trim().to_string()),
        }
    }

    fn pick(&self, names: &[String]) -> Option<usize> {
        match self {
            PortSelector::Index(index) => (*index < names.len()).then_some(*index),
            PortSelector::Name(name) => {
                let needle = name.to_lowercase();
                names
                    .iter()
                    .position(|candidate| candidate.to_lowercase().contains(&needle))
            }
        }
    }
}

pub fn list_input_ports(client_name: &str) -> anyhow::Result<Vec<String>> {
    let input = MidiInput::new(client_name)?;
    let names = input
        .ports()
        .iter()
        .map(|port| input.port_name(port))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(names)
}

/// Opens the selected input port, or a virtual port named after the client
/// when no selector is given (first available port on platforms without
/// virtual ports). Every message is forwarded with the time elapsed since the
/// previous one.
pub fn open_input(
    client_name: &str,
    selector: Option<&PortSelector>,
    sender: mpsc::Sender<RawMidiEvent>,
) -> anyhow::Result<MidiHandle> {
    let mut input = MidiInput::new(client_name)?;
    input.ignore(Ignore::None);

    let callback = forwarder(sender);

    match selector {
        Some(selector) => {
            let (port, port_name) = select_port(&input, selector)?;
            connect(input, &port, port_name, client_name, callback)
        }
        None => open_default(input, client_name, callback),
    }
}

fn forwarder(sender: mpsc::Sender<RawMidiEvent>) -> impl FnMut(u64, &[u8], &mut ()) + Send + 'static {
    let mut previous: Option<u64> = None;
    move |stamp, message, _| {
        let delta = previous
            .map(|prev| stamp.saturating_sub(prev) as f64 / 1_000_000.0)
            .unwrap_or(0.0);
        previous = Some(stamp);
        let event = RawMidiEvent {
            bytes: message.to_vec(),
            delta,
        };
        if sender.blocking_send(event).is_err() {
            warn!("MIDI event dropped: listener is gone");
        }
    }
}

fn select_port(input: &MidiInput, selector: &PortSelector) -> anyhow::Result<(MidiInputPort, String)> {
    let ports = input.ports();
    let names = ports
        .iter()
        .map(|port| input.port_name(port))
        .collect::<Result<Vec<_>, _>>()?;
    let Some(index) = selector.pick(&names) else {
        anyhow::bail!(
            "MIDI input port {:?} not found (available: {})",
            selector,
            if names.is_empty() {
                "none".to_string()
            } else {
                names.join(", ")
            }
        );
    };
    Ok((ports[index].clone(), names[index].clone()))
}

fn connect<F>(
    input: MidiInput,
    port: &MidiInputPort,
    port_name: String,
    client_name: &str,
    callback: F,
) -> anyhow::Result<MidiHandle>
where
    F: FnMut(u64, &[u8], &mut ()) + Send + 'static,
{
    let connection = input
        .connect(port, client_name, callback, ())
        .map_err(|err| anyhow::anyhow!("failed to open MIDI input `{port_name}`: {err}"))?;
    info!(port = %port_name, "Opened MIDI input port");
    Ok(MidiHandle {
        connection,
        port_name,
    })
}

#[cfg(unix)]
fn open_default<F>(input: MidiInput, client_name: &str, callback: F) -> anyhow::Result<MidiHandle>
where
    F: FnMut(u64, &[u8], &mut ()) + Send + 'static,
{
    use midir::os::unix::VirtualInput;

    let connection = input
        .create_virtual(client_name, callback, ())
        .map_err(|err| anyhow::anyhow!("failed to create virtual MIDI input: {err}"))?;
    info!(port = %client_name, "Opened virtual MIDI input port");
    Ok(MidiHandle {
        connection,
        port_name: client_name.to_string(),
    })
}

#[cfg(not(unix))]
fn open_default<F>(input: MidiInput, client_name: &str, callback: F) -> anyhow::Result<MidiHandle>
where
    F: FnMut(u64, &[u8], &mut ()) + Send + 'static,
{
    let (port, port_name) = select_port(&input, &PortSelector::Index(0))?;
    connect(input, &port, port_name, client_name, callback)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names() -> Vec<String> {
        vec![
            "Midi Through:Midi Through Port-0 14:0".to_string(),
            "X-Touch:X-Touch MIDI 1 20:0".to_string(),
        ]
    }

    #[test]
    fn selector_parses_index_or_name() {
        assert_eq!(PortSelector::parse("1"), PortSelector::Index(1));
        assert_eq!(
            PortSelector::parse(" x-touch "),
            PortSelector::Name("x-touch".into())
        );
    }

    #[test]
    fn selector_picks_ports() {
        let names = names();
        assert_eq!(PortSelector::Index(1).pick(&names), Some(1));
        assert_eq!(PortSelector::Index(2).pick(&names), None);
        assert_eq!(PortSelector::Name("x-touch".into()).pick(&names), Some(1));
        assert_eq!(PortSelector::Name("launchpad".into()).pick(&names), None);
    }

    #[test]
    fn forwarder_computes_deltas() {
        let (tx, mut rx) = mpsc::channel(4);
        let mut callback = forwarder(tx);
        callback(1_000_000, &[0x90, 60, 100], &mut ());
        callback(1_250_000, &[0x80, 60, 0], &mut ());

        let first = rx.try_recv().expect("first");
        assert_eq!(first.bytes, vec![0x90, 60, 100]);
        assert_eq!(first.delta, 0.0);
        let second = rx.try_recv().expect("second");
        assert!((second.delta - 0.25).abs() < 1e-9);
    }

    #[test]
    fn blocked_callback_returns_once_receiver_closes() {
        use std::sync::mpsc as std_mpsc;
        use std::time::Duration;

        let (tx, mut rx) = mpsc::channel(1);
        let mut callback = forwarder(tx);
        callback(0, &[0xF8], &mut ());

        // Stands in for the transport thread delivering into a full queue.
        let (done_tx, done_rx) = std_mpsc::channel();
        let thread = std::thread::spawn(move || {
            callback(20_833, &[0xF8], &mut ());
            let _ = done_tx.send(());
        });

        assert!(done_rx.recv_timeout(Duration::from_millis(200)).is_err());
        rx.close();
        assert!(done_rx.recv_timeout(Duration::from_secs(5)).is_ok());
        thread.join().expect("callback thread");

        // The queued event is still there; the blocked one was dropped.
        assert_eq!(rx.try_recv().expect("queued").bytes, vec![0xF8]);
        assert!(rx.try_recv().is_err());
    }
}
