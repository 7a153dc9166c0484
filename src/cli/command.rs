use std::path::PathBuf;

use clap::{Args, Parser as ClapParser, Subcommand, ValueEnum};

#[derive(Debug, ClapParser)]
#[command(
    name       = env!("CARGO_PKG_NAME"),
    version    = concat!(env!("CARGO_PKG_VERSION"), " (vdec ", env!("VDEC_VERSION"), ", built ", env!("BUILD_TIMESTAMP"), ")"),
    about      = "Real-time video decoding with lateness control and direct rendering",
    long_about = None,
)]
pub struct Cli {
    /// Set the log level
    #[arg(long, global = true, value_enum, default_value_t = LogLevel::Info)]
    pub loglevel: LogLevel,

    /// Treat warnings as fatal errors (fail on first warning).
    #[arg(long, global = true)]
    pub strict: bool,

    /// Log output format.
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Plain)]
    pub log_format: LogFormat,

    /// Show progress bars during operations.
    #[arg(long, global = true)]
    pub progress: bool,

    /// Choose an operation to perform.
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Decode a packet container and render the pictures.
    Decode(DecodeArgs),

    /// Print container and packet information.
    Info(InfoArgs),

    /// Wrap a Y4M stream into raw-codec packets.
    Pack(PackArgs),
}

#[derive(Debug, Args)]
pub struct DecodeArgs {
    /// Input .vpk stream (use "-" for stdin).
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    /// Output path for rendered pictures.
    #[arg(long, value_name = "PATH")]
    pub output_path: Option<PathBuf>,

    /// Picture format for output.
    #[arg(long, value_enum, default_value_t = VideoFormat::Y4m)]
    pub format: VideoFormat,

    /// YAML file with pipeline options; flags given here take precedence.
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Drop late pictures and skip non-reference decoding when output falls behind.
    #[arg(long)]
    pub hurry_up: bool,

    /// Decode straight into renderer buffers when the codec supports it.
    #[arg(long)]
    pub direct_rendering: bool,

    /// Post-processing quality; 0 disables post-processing.
    #[arg(long, value_name = "N")]
    pub pp_quality: Option<u8>,

    /// Post-processing mode name.
    #[arg(long, value_name = "NAME")]
    pub pp_name: Option<String>,

    /// Decode luma only.
    #[arg(long)]
    pub grayscale: bool,

    /// Render each picture at its presentation time instead of as fast as possible.
    #[arg(long)]
    pub realtime: bool,

    /// Disable progress estimation
    #[arg(long)]
    pub no_estimate_progress: bool,
}

#[derive(Debug, Args)]
pub struct InfoArgs {
    /// Input .vpk stream.
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,
}

#[derive(Debug, Args)]
pub struct PackArgs {
    /// Input Y4M stream (use "-" for stdin).
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    /// Output .vpk file.
    #[arg(value_name = "OUTPUT")]
    pub output: PathBuf,

    /// Pictures joined into one packet.
    #[arg(long, value_name = "N", default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..))]
    pub pictures_per_packet: u32,

    /// Split every packet into chunks of at most this many bytes.
    #[arg(long, value_name = "BYTES")]
    pub max_packet_size: Option<usize>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LogLevel {
    /// Disable logging output.
    Off,
    /// No output except errors.
    Error,
    /// Show warnings and errors.
    Warn,
    /// Show info, warnings and errors (default).
    Info,
    /// Show debug, info, warnings and errors.
    Debug,
    /// Show all log messages including trace.
    Trace,
}

impl LogLevel {
    /// Convert LogLevel to log::LevelFilter
    pub fn to_level_filter(self) -> log::LevelFilter {
        match self {
            LogLevel::Off => log::LevelFilter::Off,
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LogFormat {
    /// Colorized human-readable text.
    Plain,
    /// Structured JSON per log record.
    Json,
}

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq)]
pub enum VideoFormat {
    /// YUV4MPEG2 stream.
    Y4m,
    /// Planes back to back, one picture after another.
    Raw,
    /// Render without writing anything.
    Null,
}

impl Cli {
    pub fn fail_level(&self) -> log::Level {
        if self.strict {
            log::Level::Warn
        } else {
            log::Level::Error
        }
    }
}
