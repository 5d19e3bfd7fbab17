use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use pixelflut_client::source::{self, SolidColor};
use pixelflut_client::{CancelFlag, ClientConfig, Color, FailurePolicy, PixelflutError, Point, Session};
use tracing::{info, warn};
use tracing_subscriber::prelude::*;

#[derive(Parser, Debug)]
#[command(
    name = "pixelflut",
    about = "Draw an image onto a Pixelflut canvas",
    version
)]
struct Opts {
    /// Image to draw; shrunk to fit the canvas, never enlarged
    image: Option<PathBuf>,

    /// JSON config file; flags override its values
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Server host
    #[arg(long)]
    host: Option<String>,

    /// Server port
    #[arg(short, long)]
    port: Option<u16>,

    /// Number of concurrent draw workers
    #[arg(short = 't', long)]
    workers: Option<usize>,

    /// Byte budget for one server response line
    #[arg(long)]
    buffer: Option<usize>,

    /// Fill the whole canvas with this color first (RRGGBB or RRGGBBAA)
    #[arg(long)]
    background: Option<Color>,

    /// Left edge of the image on the canvas
    #[arg(short, long, default_value_t = 0)]
    x: u32,

    /// Top edge of the image on the canvas
    #[arg(short, long, default_value_t = 0)]
    y: u32,

    #[arg(long)]
    connect_timeout_ms: Option<u64>,

    #[arg(long)]
    read_timeout_ms: Option<u64>,

    /// Let the other workers finish when one fails
    #[arg(long)]
    keep_going: bool,
}

impl Opts {
    fn into_config(self) -> anyhow::Result<(ClientConfig, Option<PathBuf>, Option<Color>, Point)> {
        let mut config = match &self.config {
            Some(path) => ClientConfig::from_json_file(path)
                .with_context(|| format!("reading config {}", path.display()))?,
            None => ClientConfig::default(),
        };

        if let Some(host) = self.host {
            config.host = host;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(workers) = self.workers {
            config.workers = workers;
        }
        if let Some(buffer) = self.buffer {
            config.read_buffer_size = buffer;
        }
        if let Some(ms) = self.connect_timeout_ms {
            config.connect_timeout_ms = ms;
        }
        if let Some(ms) = self.read_timeout_ms {
            config.read_timeout_ms = ms;
        }
        if self.keep_going {
            config.failure_policy = FailurePolicy::FinishRemaining;
        }
        config.validate()?;

        Ok((config, self.image, self.background, Point::new(self.x, self.y)))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let (config, image, background, origin) = Opts::parse().into_config()?;

    info!(
        "Host {}, {} workers, read budget {} bytes",
        config.address(),
        config.workers,
        config.read_buffer_size
    );

    let session = Session::connect(&config)
        .await
        .with_context(|| format!("connecting to {}", config.address()))?;
    let canvas = session.canvas_size();
    info!("Canvas size {}", canvas);

    let cancel = CancelFlag::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping after the current rows");
            on_signal.cancel();
        }
    });

    let result = draw(&session, &cancel, image, background, origin).await;
    let closed = session.close().await;

    match result {
        Err(PixelflutError::Cancelled) => warn!("Draw cancelled"),
        other => other?,
    }
    closed?;
    Ok(())
}

async fn draw(
    session: &Session,
    cancel: &CancelFlag,
    image: Option<PathBuf>,
    background: Option<Color>,
    origin: Point,
) -> Result<(), PixelflutError> {
    let canvas = session.canvas_size();

    if let Some(color) = background {
        let fill = Arc::new(SolidColor::new(canvas.width, canvas.height, color));
        let report = session.draw_with_cancel(fill, Point::ORIGIN, cancel).await?;
        info!("Background done: {} commands", report.commands);
    }

    if let Some(path) = image {
        let image = source::load_image(&path, canvas)?;
        let report = session
            .draw_with_cancel(Arc::new(image), origin, cancel)
            .await?;
        info!(
            "Image done: {} commands, {} pixels clipped",
            report.commands, report.clipped
        );
    }

    Ok(())
}

fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};
    let _ = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(fmt::layer().with_writer(std::io::stderr))
        .try_init();
}
