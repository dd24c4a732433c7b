/// Wire protocol: framing, typed messages, NALU helpers.
pub mod protocol;
/// USB transport: discovery, endpoints, hot-plug.
pub mod transport;
/// Session bring-up, state machine and outbound queue.
pub mod driver;
/// Message fan-out to the media pipelines.
pub mod demux;
/// Video decode gating, pacing and renderer probing.
pub mod video;
/// PCM players, ring buffers and the playback worklet.
pub mod audio;
/// Microphone capture bridge.
pub mod mic;
/// Touch and key command encoding.
pub mod input;
/// Upward events and downward commands.
pub mod events;
/// Top-level runtime owning the session lifecycle.
pub mod runtime;

pub use driver::{DongleConfig, SessionState};
pub use events::{CarlinkEvent, HostCommand};
pub use runtime::{Carlink, CarlinkBuilder};
