/// Audio path: decode-type registry, the shared PCM ring, the worklet-style
/// consumer and the per-stream player layer.
pub mod player;
pub mod registry;
pub mod ring;
pub mod volume;
pub mod worklet;

pub use player::{AudioPipeline, PlayerHandoff, StreamKey};
pub use registry::{decode_type_format, AudioFormat};
pub use ring::{ring_pair, RingReader, RingWriter};
pub use volume::VolumeRamp;
pub use worklet::{PcmWorklet, RenderReport, FRAMES_PER_QUANTUM};
