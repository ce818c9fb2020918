use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use lightbar_visualiser_core::config::DEFAULT_LED_ROOT;
use lightbar_visualiser_core::{
    CancellationToken, CpalPlayback, LightSink, Pipeline, VisualiserConfig,
};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    init_tracing();

    let cli = Cli::parse();

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %err, "fatal");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> lightbar_visualiser_core::Result<()> {
    let config = VisualiserConfig::default().with_led_root(&cli.led_root);
    tracing::info!(device = %cli.device, root = %cli.led_root.display(), "starting");

    let sink = Arc::new(LightSink::open(&config.led_root, &cli.device)?);

    let cancel = CancellationToken::new();
    let handler_token = cancel.clone();
    ctrlc::set_handler(move || {
        tracing::info!("termination signal received");
        handler_token.cancel();
    })
    .map_err(|e| format!("failed to install signal handler: {e}"))?;

    let playback = CpalPlayback::open(&config.audio)?;
    let pipeline = Pipeline::new(config);
    let mut playback = pipeline.run(std::io::stdin(), playback, Arc::clone(&sink), &cancel)?;
    playback.close();

    pipeline.shutdown(&sink)
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .try_init();
}

/// Lights up a controller's light bar to whatever is piped in on stdin
/// (16-bit little-endian stereo PCM at 44.1 kHz) while playing it back.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// LED device identifier, the part before `:red` in `ls /sys/class/leds/`.
    device: String,
    /// Directory holding the LED class devices.
    #[arg(long, value_name = "DIR", default_value = DEFAULT_LED_ROOT)]
    led_root: PathBuf,
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn requires_exactly_one_device() {
        assert!(Cli::try_parse_from(["lightbar-visualiser"]).is_err());
        assert!(Cli::try_parse_from(["lightbar-visualiser", "a", "b"]).is_err());

        let cli = Cli::try_parse_from(["lightbar-visualiser", "0005:054C:09CC.0001"]).unwrap();
        assert_eq!(cli.device, "0005:054C:09CC.0001");
        assert_eq!(cli.led_root, PathBuf::from("/sys/class/leds"));
    }

    #[test]
    fn led_root_is_optional_flag() {
        let cli =
            Cli::try_parse_from(["lightbar-visualiser", "--led-root", "/tmp/leds", "ds4"]).unwrap();
        assert_eq!(cli.device, "ds4");
        assert_eq!(cli.led_root, PathBuf::from("/tmp/leds"));
    }
}
