use std::time::{Duration, Instant};

use anyhow::{Result, anyhow};
use crossbeam_channel::Receiver;
use reencode::SessionEvent;

mod backend;
mod clip;
mod codec;
mod sink;
mod source;
mod strategy;

pub use backend::{BackendOptions, BackendStats, SimulatedBackend};
pub use clip::{Clip, ClipBuilder, ClipSample};
pub use codec::{CodecConfig, SimulatedCodec, SimulatedFrameTransfer, Surface};
pub use sink::{RecordingSink, SinkRecord, WrittenSample};
pub use source::ClipReader;
pub use strategy::FixedStrategy;


/// Collects session events up to and including the terminal one.
pub fn collect_events(events: &Receiver<SessionEvent>, timeout: Duration) -> Result<Vec<SessionEvent>> {
    let deadline = Instant::now() + timeout;
    let mut collected = Vec::new();
    loop {
        let event = events
            .recv_deadline(deadline)
            .map_err(|err| anyhow!("No terminal event after {collected:?}: {err}"))?;
        let is_terminal = event.is_terminal();
        collected.push(event);
        if is_terminal {
            return Ok(collected);
        }
    }
}
