use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::error::{Result, TransportError};
use crate::link::{DeviceLink, FlowMode, LinkSettings};

#[derive(Debug, Default)]
struct MemoryState {
    open: bool,
    fail_open: bool,
    settings: LinkSettings,
    inbound: VecDeque<u8>,
    outbound: Vec<u8>,
    write_limit: Option<usize>,
    open_count: usize,
    flush_count: usize,
    break_count: usize,
}

/// In-process [`DeviceLink`] used to drive the bridge without hardware.
///
/// Bytes pushed through the paired [`MemoryLinkHandle`] come out of `read`;
/// bytes written to the link are collected for inspection.
#[derive(Debug, Clone, Default)]
pub struct MemoryLink {
    state: Arc<Mutex<MemoryState>>,
}

/// Test-side view of a [`MemoryLink`].
#[derive(Debug, Clone)]
pub struct MemoryLinkHandle {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryLink {
    /// Create a link and the handle that feeds it.
    pub fn pair() -> (Self, MemoryLinkHandle) {
        let link = Self::default();
        let handle = MemoryLinkHandle {
            state: link.state.clone(),
        };
        (link, handle)
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        lock(&self.state)
    }
}

fn lock(state: &Mutex<MemoryState>) -> MutexGuard<'_, MemoryState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MemoryLinkHandle {
    /// Queue bytes as if the device had sent them.
    pub fn push_inbound(&self, data: &[u8]) {
        lock(&self.state).inbound.extend(data.iter().copied());
    }

    /// Drain everything written to the device so far.
    pub fn take_outbound(&self) -> Vec<u8> {
        std::mem::take(&mut lock(&self.state).outbound)
    }

    /// Accept at most `limit` more written bytes, then report zero-length
    /// writes. `None` removes the cap.
    pub fn limit_writes(&self, limit: Option<usize>) {
        lock(&self.state).write_limit = limit;
    }

    /// Make subsequent `open` calls fail, simulating an unplugged device.
    pub fn set_fail_open(&self, fail: bool) {
        lock(&self.state).fail_open = fail;
    }

    /// Simulate the device disappearing underneath an open link.
    pub fn unplug(&self) {
        lock(&self.state).open = false;
    }

    pub fn is_open(&self) -> bool {
        lock(&self.state).open
    }

    pub fn settings(&self) -> LinkSettings {
        lock(&self.state).settings.clone()
    }

    pub fn open_count(&self) -> usize {
        lock(&self.state).open_count
    }

    pub fn flush_count(&self) -> usize {
        lock(&self.state).flush_count
    }

    pub fn break_count(&self) -> usize {
        lock(&self.state).break_count
    }
}

impl DeviceLink for MemoryLink {
    fn open(&mut self, settings: &LinkSettings) -> Result<()> {
        let mut state = self.state();
        if state.fail_open {
            state.open = false;
            return Err(TransportError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{} is not present", settings.port),
            )));
        }
        state.open = true;
        state.open_count += 1;
        state.settings = settings.clone();
        Ok(())
    }

    fn close(&mut self) {
        self.state().open = false;
    }

    fn is_open(&self) -> bool {
        self.state().open
    }

    fn set_baud_rate(&mut self, baud_rate: u32) -> Result<()> {
        let mut state = self.state();
        if !state.open {
            return Err(TransportError::NotOpen);
        }
        state.settings.baud_rate = baud_rate;
        Ok(())
    }

    fn set_flow_mode(&mut self, mode: FlowMode) -> Result<()> {
        let mut state = self.state();
        if !state.open {
            return Err(TransportError::NotOpen);
        }
        state.settings.flow_mode = mode;
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut state = self.state();
        if !state.open {
            return Err(TransportError::NotOpen);
        }
        let n = buf.len().min(state.inbound.len());
        for (slot, byte) in buf.iter_mut().zip(state.inbound.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn write(&mut self, data: &[u8]) -> Result<usize> {
        let mut state = self.state();
        if !state.open {
            return Err(TransportError::NotOpen);
        }
        let n = state.write_limit.map_or(data.len(), |limit| limit.min(data.len()));
        if let Some(limit) = state.write_limit.as_mut() {
            *limit -= n;
        }
        state.outbound.extend_from_slice(&data[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> Result<()> {
        let mut state = self.state();
        state.inbound.clear();
        state.flush_count += 1;
        Ok(())
    }

    fn send_break(&mut self, _duration: Duration) -> Result<()> {
        self.state().break_count += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pushed_bytes_are_read_back() {
        let (mut link, handle) = MemoryLink::pair();
        link.open(&LinkSettings::new("mem0")).unwrap();
        handle.push_inbound(b"hello");

        let mut buf = [0u8; 3];
        assert_eq!(link.read(&mut buf).unwrap(), 3);
        assert_eq!(&buf, b"hel");
        assert_eq!(link.read(&mut buf).unwrap(), 2);
        assert_eq!(&buf[..2], b"lo");
        assert_eq!(link.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn writes_are_captured() {
        let (mut link, handle) = MemoryLink::pair();
        link.open(&LinkSettings::new("mem0")).unwrap();
        link.write(b"abc").unwrap();
        link.write(b"def").unwrap();
        assert_eq!(handle.take_outbound(), b"abcdef");
        assert!(handle.take_outbound().is_empty());
    }

    #[test]
    fn write_limit_caps_accepted_bytes() {
        let (mut link, handle) = MemoryLink::pair();
        link.open(&LinkSettings::new("mem0")).unwrap();
        handle.limit_writes(Some(2));
        assert_eq!(link.write(b"abc").unwrap(), 2);
        assert_eq!(link.write(b"c").unwrap(), 0);
        handle.limit_writes(None);
        assert_eq!(link.write(b"c").unwrap(), 1);
        assert_eq!(handle.take_outbound(), b"abc");
    }

    #[test]
    fn failing_open_leaves_link_closed() {
        let (mut link, handle) = MemoryLink::pair();
        handle.set_fail_open(true);
        assert!(link.open(&LinkSettings::new("mem0")).is_err());
        assert!(!link.is_open());
        assert!(matches!(link.write(b"x"), Err(TransportError::NotOpen)));
    }

    #[test]
    fn settings_changes_are_visible() {
        let (mut link, handle) = MemoryLink::pair();
        link.open(&LinkSettings::new("mem0")).unwrap();
        link.set_baud_rate(9600).unwrap();
        link.set_flow_mode(FlowMode::XonXoff).unwrap();
        let settings = handle.settings();
        assert_eq!(settings.baud_rate, 9600);
        assert_eq!(settings.flow_mode, FlowMode::XonXoff);
        assert_eq!(handle.open_count(), 1);
    }
}
