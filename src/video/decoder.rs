use std::sync::Arc;

use bytes::Bytes;
use log::{debug, info, warn};

use crate::demux::LatestCell;
use crate::protocol::frames::VideoPacket;
use crate::protocol::nalu::{find_nalu, is_keyframe, parse_sps, NALU_SPS};

use super::MediaError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HwAccel {
    PreferHardware,
    PreferSoftware,
}

/// Configuration derived from the stream's SPS, handed to the decoder
/// backend.
#[derive(Debug, Clone, PartialEq)]
pub struct DecoderConfig {
    pub codec: String,
    pub coded_width: u32,
    pub coded_height: u32,
    pub hw_accel: HwAccel,
    pub optimize_for_latency: bool,
    pub sps: Vec<u8>,
}

/// A decoded picture. `data` is backend-defined (host-mapped pixels or an
/// opaque surface token the renderer understands).
#[derive(Debug, Clone)]
pub struct VideoFrame {
    pub width: u32,
    pub height: u32,
    pub timestamp: u32,
    pub data: Bytes,
}

/// Decoder backend seam. The host provides the implementation (platform
/// decoder or software fallback); the pipeline owns gating and lifetimes.
pub trait VideoDecoder: Send {
    fn configure(&mut self, config: &DecoderConfig) -> Result<(), MediaError>;
    /// Decode one access unit; zero or more pictures may come out.
    fn decode(&mut self, access_unit: &[u8], timestamp: u32) -> Result<Vec<VideoFrame>, MediaError>;
    fn reset(&mut self);
}

/// H.264 ingest: waits for SPS+IDR, configures hardware-first, drops delta
/// frames until a keyframe decodes, posts pictures into the pending cell.
pub struct VideoPipeline {
    decoder: Box<dyn VideoDecoder>,
    pending: Arc<LatestCell<VideoFrame>>,
    pending_sps: Option<Vec<u8>>,
    configured: bool,
    /// Set once the first IDR after configuration decodes successfully.
    keyframe_decoded: bool,
}

impl VideoPipeline {
    pub fn new(decoder: Box<dyn VideoDecoder>, pending: Arc<LatestCell<VideoFrame>>) -> Self {
        Self {
            decoder,
            pending,
            pending_sps: None,
            configured: false,
            keyframe_decoded: false,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.configured
    }

    /// Feed one VideoData payload (vendor header already stripped).
    pub fn handle_packet(&mut self, packet: &VideoPacket) {
        let stream = &packet.payload[..];
        if let Some(sps) = find_nalu(stream, NALU_SPS) {
            self.pending_sps = Some(sps.to_vec());
        }
        let keyframe = is_keyframe(stream);

        if !self.configured {
            // Mid-GOP start: nothing is presented until SPS+IDR arrive.
            if !keyframe {
                return;
            }
            let Some(sps) = self.pending_sps.clone() else {
                return;
            };
            if !self.try_configure(&sps) {
                return;
            }
        }

        match self.decoder.decode(stream, packet.timestamp) {
            Ok(frames) => {
                if keyframe {
                    self.keyframe_decoded = true;
                }
                for frame in frames {
                    if self.pending.put(frame).is_some() {
                        // Overwritten frames close implicitly on drop.
                        debug!("pending frame overwritten before present");
                    }
                }
            }
            Err(e) => {
                warn!("decode error: {e}");
                if !self.keyframe_decoded {
                    // The configured decoder cannot handle the stream's
                    // first keyframe: tear down and wait for a fresh
                    // SPS+IDR pair.
                    self.decoder.reset();
                    self.configured = false;
                    self.pending_sps = None;
                }
            }
        }
    }

    fn try_configure(&mut self, sps: &[u8]) -> bool {
        let info = match parse_sps(sps) {
            Ok(info) => info,
            Err(e) => {
                warn!("sps parse failed: {e}");
                self.pending_sps = None;
                return false;
            }
        };

        let mut config = DecoderConfig {
            codec: info.codec_string(),
            coded_width: info.width,
            coded_height: info.height,
            hw_accel: HwAccel::PreferHardware,
            optimize_for_latency: true,
            sps: sps.to_vec(),
        };

        if let Err(e) = self.decoder.configure(&config) {
            debug!("hardware configure failed, trying software: {e}");
            config.hw_accel = HwAccel::PreferSoftware;
            if let Err(e) = self.decoder.configure(&config) {
                warn!("decoder configure failed: {e}");
                return false;
            }
        }

        info!(
            "decoder configured: {} {}x{} ({:?})",
            config.codec, config.coded_width, config.coded_height, config.hw_accel
        );
        self.configured = true;
        self.keyframe_decoded = false;
        true
    }
}
