//! Scripted in-memory port for unit tests.

use super::Port;
use crate::error::Result;
use std::collections::VecDeque;
use std::io::{Read, Write};
use std::thread;
use std::time::{Duration, Instant};

/// Port that replays scripted reads and records writes.
///
/// Bytes in `stale` are what the OS had buffered before the port was opened;
/// `clear_input` throws them away. Each entry in `chunks` is delivered by one
/// `read` call. Once the script is exhausted reads time out after the
/// configured per-read timeout.
pub(crate) struct ScriptedPort {
    pub stale: Vec<u8>,
    pub chunks: VecDeque<Vec<u8>>,
    pub writes: Vec<(Instant, Vec<u8>)>,
    pub timeout: Duration,
    pub cleared: bool,
}

impl ScriptedPort {
    pub fn new(chunks: &[&[u8]]) -> Self {
        Self {
            stale: Vec::new(),
            chunks: chunks.iter().map(|c| c.to_vec()).collect(),
            writes: Vec::new(),
            timeout: Duration::from_millis(10),
            cleared: false,
        }
    }

    pub fn with_stale(mut self, stale: &[u8]) -> Self {
        self.stale = stale.to_vec();
        self
    }

    pub fn written(&self) -> Vec<Vec<u8>> {
        self.writes.iter().map(|(_, data)| data.clone()).collect()
    }
}

impl Read for ScriptedPort {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if !self.stale.is_empty() {
            let n = buf.len().min(self.stale.len());
            buf[..n].copy_from_slice(&self.stale[..n]);
            self.stale.drain(..n);
            return Ok(n);
        }
        match self.chunks.pop_front() {
            Some(chunk) => {
                let n = buf.len().min(chunk.len());
                buf[..n].copy_from_slice(&chunk[..n]);
                if n < chunk.len() {
                    self.chunks.push_front(chunk[n..].to_vec());
                }
                Ok(n)
            },
            None => {
                thread::sleep(self.timeout);
                Err(std::io::Error::new(std::io::ErrorKind::TimedOut, "no data"))
            },
        }
    }
}

impl Write for ScriptedPort {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.writes.push((Instant::now(), buf.to_vec()));
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl Port for ScriptedPort {
    fn clear_input(&mut self) -> Result<()> {
        self.stale.clear();
        self.cleared = true;
        Ok(())
    }

    fn name(&self) -> &str {
        "scripted"
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}
