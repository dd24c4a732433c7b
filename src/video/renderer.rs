use async_trait::async_trait;
use log::info;

use super::decoder::{HwAccel, VideoFrame};
use super::MediaError;

/// Codec tag used when probing decoder support (High profile, level 4.2).
pub const PROBE_CODEC: &str = "avc1.64002A";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RendererKind {
    /// Native GPU surface path.
    Gpu,
    /// GL2 context path.
    Gl2,
}

/// Drawing seam the host implements per context kind.
pub trait Renderer: Send {
    fn kind(&self) -> RendererKind;
    fn draw(&mut self, frame: &VideoFrame) -> Result<(), MediaError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecoderSupportQuery {
    pub codec: String,
    pub hw_accel: HwAccel,
}

/// Capability probe the host supplies; context creation and decoder
/// support checks are platform work and may suspend.
#[async_trait]
pub trait RendererProbe: Send + Sync {
    async fn supports(&self, kind: RendererKind, query: &DecoderSupportQuery) -> bool;
}

/// Platform-dependent probe priority.
#[cfg(target_os = "macos")]
pub fn probe_order() -> &'static [RendererKind] {
    &[RendererKind::Gpu, RendererKind::Gl2]
}

#[cfg(all(target_os = "linux", any(target_arch = "arm", target_arch = "aarch64")))]
pub fn probe_order() -> &'static [RendererKind] {
    &[RendererKind::Gl2]
}

#[cfg(all(target_os = "linux", not(any(target_arch = "arm", target_arch = "aarch64"))))]
pub fn probe_order() -> &'static [RendererKind] {
    &[RendererKind::Gl2, RendererKind::Gpu]
}

#[cfg(not(any(target_os = "macos", target_os = "linux")))]
pub fn probe_order() -> &'static [RendererKind] {
    &[RendererKind::Gl2, RendererKind::Gpu]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RendererSelection {
    pub kind: RendererKind,
    pub hw_accel: HwAccel,
}

/// Walk the platform order; the first context reporting hardware or
/// software decoder support wins. Callers cache the result per session.
pub async fn select_renderer(probe: &dyn RendererProbe) -> Option<RendererSelection> {
    for &kind in probe_order() {
        for hw_accel in [HwAccel::PreferHardware, HwAccel::PreferSoftware] {
            let query = DecoderSupportQuery {
                codec: PROBE_CODEC.to_string(),
                hw_accel,
            };
            if probe.supports(kind, &query).await {
                info!("selected renderer {kind:?} ({hw_accel:?})");
                return Some(RendererSelection { kind, hw_accel });
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct ScriptedProbe {
        /// Kinds that report support, software-only.
        sw_only: Vec<RendererKind>,
        calls: AtomicU32,
    }

    #[async_trait]
    impl RendererProbe for ScriptedProbe {
        async fn supports(&self, kind: RendererKind, query: &DecoderSupportQuery) -> bool {
            self.calls.fetch_add(1, Ordering::Relaxed);
            assert_eq!(query.codec, PROBE_CODEC);
            self.sw_only.contains(&kind) && query.hw_accel == HwAccel::PreferSoftware
        }
    }

    #[tokio::test]
    async fn first_supported_context_in_platform_order_wins() {
        let probe = ScriptedProbe {
            sw_only: probe_order().to_vec(),
            calls: AtomicU32::new(0),
        };
        let selection = select_renderer(&probe).await.unwrap();
        assert_eq!(selection.kind, probe_order()[0]);
        assert_eq!(selection.hw_accel, HwAccel::PreferSoftware);
        // Hardware was asked first, then software.
        assert_eq!(probe.calls.load(Ordering::Relaxed), 2);
    }

    #[tokio::test]
    async fn no_support_yields_none() {
        let probe = ScriptedProbe {
            sw_only: Vec::new(),
            calls: AtomicU32::new(0),
        };
        assert!(select_renderer(&probe).await.is_none());
        assert_eq!(
            probe.calls.load(Ordering::Relaxed) as usize,
            probe_order().len() * 2
        );
    }
}
