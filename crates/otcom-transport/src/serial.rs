use std::io::{ErrorKind, Read, Write};
use std::time::Duration;

use serialport::{ClearBuffer, FlowControl, SerialPort};
use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::link::{DeviceLink, FlowMode, LinkSettings};

/// [`DeviceLink`] backed by an OS serial port.
///
/// Two handles share the port: one polls reads with the short read timeout,
/// the other carries the bounded write timeout.
#[derive(Default)]
pub struct SerialPortLink {
    reader: Option<Box<dyn SerialPort>>,
    writer: Option<Box<dyn SerialPort>>,
    settings: LinkSettings,
}

impl SerialPortLink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Settings used by the most recent `open`.
    pub fn settings(&self) -> &LinkSettings {
        &self.settings
    }

    fn handles(&mut self) -> Result<(&mut Box<dyn SerialPort>, &mut Box<dyn SerialPort>)> {
        match (self.reader.as_mut(), self.writer.as_mut()) {
            (Some(reader), Some(writer)) => Ok((reader, writer)),
            _ => Err(TransportError::NotOpen),
        }
    }
}

fn flow_control(mode: FlowMode) -> FlowControl {
    match mode {
        FlowMode::None => FlowControl::None,
        FlowMode::Hardware => FlowControl::Hardware,
        FlowMode::XonXoff => FlowControl::Software,
    }
}

impl DeviceLink for SerialPortLink {
    fn open(&mut self, settings: &LinkSettings) -> Result<()> {
        self.close();

        let reader = serialport::new(&settings.port, settings.baud_rate)
            .flow_control(flow_control(settings.flow_mode))
            .timeout(settings.read_timeout)
            .open()
            .map_err(|source| TransportError::Open {
                port: settings.port.clone(),
                source,
            })?;
        let mut writer = reader.try_clone()?;
        writer.set_timeout(settings.write_timeout)?;

        info!(
            port = %settings.port,
            baud_rate = settings.baud_rate,
            flow_mode = %settings.flow_mode,
            "serial port opened"
        );
        self.reader = Some(reader);
        self.writer = Some(writer);
        self.settings = settings.clone();
        Ok(())
    }

    fn close(&mut self) {
        if self.reader.take().is_some() {
            debug!(port = %self.settings.port, "serial port closed");
        }
        self.writer = None;
    }

    fn is_open(&self) -> bool {
        self.reader.is_some()
    }

    fn set_baud_rate(&mut self, baud_rate: u32) -> Result<()> {
        let (reader, _) = self.handles()?;
        reader.set_baud_rate(baud_rate)?;
        self.settings.baud_rate = baud_rate;
        Ok(())
    }

    fn set_flow_mode(&mut self, mode: FlowMode) -> Result<()> {
        let (reader, _) = self.handles()?;
        reader.set_flow_control(flow_control(mode))?;
        self.settings.flow_mode = mode;
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let (reader, _) = self.handles()?;
        loop {
            match reader.read(buf) {
                Ok(n) => return Ok(n),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if matches!(err.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => {
                    return Ok(0)
                }
                Err(err) => return Err(TransportError::Io(err)),
            }
        }
    }

    fn write(&mut self, data: &[u8]) -> Result<usize> {
        let (_, writer) = self.handles()?;
        let mut offset = 0usize;
        while offset < data.len() {
            match writer.write(&data[offset..]) {
                Ok(0) => break,
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::TimedOut => break,
                Err(err) => return Err(TransportError::Io(err)),
            }
        }
        Ok(offset)
    }

    fn flush(&mut self) -> Result<()> {
        let (reader, _) = self.handles()?;
        reader.clear(ClearBuffer::All)?;
        Ok(())
    }

    fn send_break(&mut self, duration: Duration) -> Result<()> {
        let (_, writer) = self.handles()?;
        writer.set_break()?;
        std::thread::sleep(duration);
        writer.clear_break()?;
        Ok(())
    }
}
