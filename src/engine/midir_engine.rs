use super::{EngineError, Result, SynthEngine};
use log::{debug, error, info};
use midir::{MidiOutput, MidiOutputConnection};
use std::collections::BTreeSet;

const CLIENT_NAME: &str = "musicbox-output";
const CONNECTION_NAME: &str = "musicbox-output-conn";
const NOTE_VELOCITY: u8 = 100;
const ALL_NOTES_OFF: u8 = 123;

/// Plays notes on an external MIDI device instead of a built-in synthesizer
pub struct MidirEngine {
    connection: Option<MidiOutputConnection>,
    channel: u8,
    sounding: BTreeSet<u8>,
    paused: bool,
}

impl MidirEngine {
    /// Connects to the first output port whose name contains `device_name`,
    /// or to the first available port when no name is given.
    pub fn connect(device_name: Option<&str>) -> Result<Self> {
        let midi_out = MidiOutput::new(CLIENT_NAME).map_err(device_error)?;
        let out_ports = midi_out.ports();
        let available: Vec<String> = out_ports
            .iter()
            .filter_map(|p| midi_out.port_name(p).ok())
            .collect();
        info!("Available MIDI output ports: {:?}", available);

        let port = match device_name {
            Some(name) => out_ports.iter().find(|p| {
                midi_out
                    .port_name(p)
                    .unwrap_or_default()
                    .contains(name)
            }),
            None => out_ports.first(),
        }
        .ok_or_else(|| {
            error!("MIDI output device {:?} not found", device_name);
            EngineError::Device("MIDI output device not found".to_string())
        })?;

        let port_name = midi_out.port_name(port).map_err(device_error)?;
        info!("Connecting to MIDI output port: {}", port_name);
        let connection = midi_out
            .connect(port, CONNECTION_NAME)
            .map_err(|e| EngineError::Device(e.to_string()))?;

        Ok(Self {
            connection: Some(connection),
            channel: 0,
            sounding: BTreeSet::new(),
            paused: true,
        })
    }

    /// Lists output port names, for device selection
    pub fn list_ports() -> Result<Vec<String>> {
        let midi_out = MidiOutput::new("musicbox-port-lister").map_err(device_error)?;
        Ok(midi_out
            .ports()
            .iter()
            .filter_map(|p| midi_out.port_name(p).ok())
            .collect())
    }

    fn send(&mut self, msg: &[u8]) -> Result<()> {
        let conn = self.connection.as_mut().ok_or(EngineError::NotReady)?;
        conn.send(msg).map_err(device_error)
    }

    fn all_notes_off(&mut self) -> Result<()> {
        debug!("Sending All Notes Off: ch={}", self.channel);
        self.sounding.clear();
        self.send(&[0xB0 | (self.channel & 0x0F), ALL_NOTES_OFF, 0])
    }
}

fn device_error<E: std::fmt::Display>(e: E) -> EngineError {
    EngineError::Device(e.to_string())
}

impl SynthEngine for MidirEngine {
    fn note_on(&mut self, pitch: u8) -> Result<()> {
        if self.paused {
            return Ok(());
        }
        // Restart a note that is still held so the device re-articulates it
        if self.sounding.contains(&pitch) {
            self.note_off(pitch)?;
        }
        let msg = [0x90 | (self.channel & 0x0F), pitch & 0x7F, NOTE_VELOCITY];
        self.send(&msg)?;
        self.sounding.insert(pitch);
        Ok(())
    }

    fn note_off(&mut self, pitch: u8) -> Result<()> {
        if !self.sounding.remove(&pitch) {
            return Ok(());
        }
        self.send(&[0x80 | (self.channel & 0x0F), pitch & 0x7F, 0])
    }

    fn set_paused(&mut self, paused: bool) -> Result<()> {
        self.paused = paused;
        if paused {
            self.all_notes_off()?;
        }
        Ok(())
    }

    fn reset(&mut self) -> Result<()> {
        self.all_notes_off()
    }

    fn release(&mut self) -> Result<()> {
        if self.connection.is_some() {
            let _ = self.all_notes_off();
        }
        match self.connection.take() {
            Some(conn) => {
                conn.close();
                info!("MIDI output connection closed");
                Ok(())
            }
            None => Err(EngineError::NotReady),
        }
    }
}
