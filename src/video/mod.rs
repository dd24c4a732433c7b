/// Video path: decoder gating on SPS+IDR, frame pacing, renderer probing.
pub mod decoder;
pub mod pacer;
pub mod renderer;

use thiserror::Error;

pub use decoder::{DecoderConfig, HwAccel, VideoDecoder, VideoFrame, VideoPipeline};
pub use pacer::FramePacer;
pub use renderer::{
    probe_order, select_renderer, DecoderSupportQuery, Renderer, RendererKind, RendererProbe,
    RendererSelection,
};

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("decoder configure failed: {0}")]
    Configure(String),
    #[error("decode failed: {0}")]
    Decode(String),
    #[error("render failed: {0}")]
    Render(String),
    #[error("malformed bitstream: {0}")]
    Bitstream(#[from] crate::protocol::nalu::NaluError),
}
