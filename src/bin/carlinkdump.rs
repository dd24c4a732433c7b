use clap::Parser;

use carlink::driver::config::{DongleConfig, WifiBand};
use carlink::{Carlink, CarlinkEvent, HostCommand};

/// Bring a Carlinkit dongle to Streaming and print every upward event.
///
/// Useful for protocol bring-up and for checking what a phone negotiates
/// without a display stack attached: runs headless, so video stays in the
/// demux and only events and audio stream hand-offs are reported.
#[derive(Debug, Parser)]
#[command(name = "carlinkdump")]
#[command(about = "dump dongle events from a Carlinkit adapter")]
pub struct Args {
    /// projected display width in pixels
    #[arg(long, default_value_t = 800)]
    pub width: u32,

    /// projected display height in pixels
    #[arg(long, default_value_t = 480)]
    pub height: u32,

    /// target frame rate
    #[arg(long, default_value_t = 30)]
    pub fps: u32,

    /// projected display density
    #[arg(long, default_value_t = 160)]
    pub dpi: u32,

    /// use the 2.4 GHz band instead of 5 GHz
    #[arg(long)]
    pub wifi_24ghz: bool,

    /// leave upstream audio on the dongle (no host microphone)
    #[arg(long)]
    pub audio_transfer: bool,

    /// car name advertised to the phone
    #[arg(long, default_value = "carlink")]
    pub car_name: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let config = DongleConfig {
        width: args.width,
        height: args.height,
        fps: args.fps,
        dpi: args.dpi,
        audio_transfer_mode: args.audio_transfer,
        wifi_band: if args.wifi_24ghz {
            WifiBand::Ghz2_4
        } else {
            WifiBand::Ghz5
        },
        car_name: args.car_name.clone(),
        ..DongleConfig::default()
    };

    let mut link = Carlink::builder(config).spawn();
    link.send(HostCommand::Start).await;
    println!("waiting for dongle {:#06x}...", 0x1314);

    // Audio hand-offs land on their own task; a real host would wire each
    // worklet into its output callback here.
    if let Some(mut streams) = link.take_audio_streams() {
        tokio::spawn(async move {
            while let Some(handoff) = streams.recv().await {
                println!(
                    "audio hand-off: {:?} ({} Hz x{})",
                    handoff.key, handoff.format.frequency, handoff.format.channels
                );
            }
        });
    }

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                println!("stopping");
                link.shutdown().await;
                return Ok(());
            }
            event = link.next_event() => {
                let Some(event) = event else { return Ok(()) };
                match event {
                    CarlinkEvent::Plugged { phone_type } => {
                        println!("phone plugged: {phone_type:?}");
                    }
                    CarlinkEvent::Unplugged => println!("phone unplugged"),
                    CarlinkEvent::Resolution { width, height } => {
                        println!("video stream: {width}x{height}");
                    }
                    CarlinkEvent::AudioInfo { codec, sample_rate, channels, bit_depth } => {
                        println!("audio stream: {codec} {sample_rate} Hz x{channels} @{bit_depth}bit");
                    }
                    CarlinkEvent::MediaMeta(state) => {
                        println!("now playing: {}", state.bag);
                    }
                    CarlinkEvent::Command(command) => println!("command: {command:?}"),
                    CarlinkEvent::DongleInfo(info) => {
                        println!(
                            "dongle: {} {} serial={} fw={}",
                            info.manufacturer, info.product, info.serial, info.fw_version
                        );
                    }
                    CarlinkEvent::Failure(reason) => {
                        eprintln!("session failed: {reason}");
                        link.shutdown().await;
                        return Ok(());
                    }
                }
            }
        }
    }
}
