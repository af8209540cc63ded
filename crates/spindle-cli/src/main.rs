mod commands;

use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use commands::{EXIT_FAILURE, EXIT_INVALID};
use spindle_core::{install_signal_handler, Engine, EngineConfig};
use spindle_schema::{BlankMode, MediaCapacity, Tool, WriteMode, WriteOptions};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

#[derive(Debug, Parser)]
#[command(
    name = "spindle",
    version,
    about = "Run disc burning, reading, erasing and extraction tools as observable pipelines"
)]
struct Cli {
    /// Path to the config file (defaults to $SPINDLE_CONFIG or ~/.config/spindle/config.toml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output results as structured JSON.
    #[arg(long, default_value_t = false, global = true)]
    json: bool,

    /// Enable verbose (debug) logging output.
    #[arg(short, long, default_value_t = false, global = true)]
    verbose: bool,

    /// Enable trace-level logging (more detailed than --verbose).
    #[arg(long, default_value_t = false, global = true)]
    trace: bool,

    /// Give up and cancel the run after this many seconds.
    #[arg(long, global = true, value_name = "SECS")]
    timeout: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

/// Options shared by every operation that writes or blanks a disc.
#[derive(Debug, Args)]
struct WriteArgs {
    /// Write speed (e.g. 16). Defaults to the drive's choice.
    #[arg(long)]
    speed: Option<u32>,
    /// Simulate the write with the laser off.
    #[arg(long, default_value_t = false)]
    simulate: bool,
    /// Eject the disc when done.
    #[arg(long, default_value_t = false)]
    eject: bool,
    /// Write disc-at-once instead of track-at-once.
    #[arg(long, default_value_t = false)]
    dao: bool,
    /// Disable buffer underrun protection.
    #[arg(long, default_value_t = false)]
    no_burn_free: bool,
}

impl From<WriteArgs> for WriteOptions {
    fn from(args: WriteArgs) -> Self {
        WriteOptions {
            speed: args.speed,
            simulate: args.simulate,
            eject: args.eject,
            mode: if args.dao { WriteMode::Dao } else { WriteMode::Tao },
            burn_free: !args.no_burn_free,
        }
    }
}

#[derive(Debug, Args)]
struct CapacityArgs {
    /// Capacity of the blank medium in MB (e.g. 700).
    #[arg(long, value_name = "MB")]
    capacity: Option<u64>,
    /// Allow writing past the nominal capacity.
    #[arg(long, default_value_t = false)]
    overburn: bool,
}

impl From<CapacityArgs> for MediaCapacity {
    fn from(args: CapacityArgs) -> Self {
        let mut capacity = args
            .capacity
            .map_or_else(MediaCapacity::default, MediaCapacity::of_megabytes);
        capacity.allow_overburn = args.overburn;
        capacity
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Burn files, a disc image, or audio tracks.
    Burn {
        /// Target device (e.g. /dev/sr0).
        #[arg(short, long)]
        device: String,
        /// Files and directories to master into an ISO image.
        #[arg(required_unless_present = "image")]
        files: Vec<PathBuf>,
        /// Burn an existing image instead of mastering files.
        #[arg(long, conflicts_with_all = ["files", "audio"])]
        image: Option<PathBuf>,
        /// Treat FILES as WAV tracks and write an audio disc.
        #[arg(long, default_value_t = false)]
        audio: bool,
        /// Volume label for mastered images.
        #[arg(long)]
        label: Option<String>,
        #[command(flatten)]
        write: WriteArgs,
        #[command(flatten)]
        capacity: CapacityArgs,
    },
    /// Copy a disc from one drive to another through a temporary image.
    Copy {
        /// Device holding the source disc.
        #[arg(long)]
        from: String,
        /// Device holding the blank disc.
        #[arg(long)]
        to: String,
        #[command(flatten)]
        write: WriteArgs,
        #[command(flatten)]
        capacity: CapacityArgs,
    },
    /// Read a data disc into an image file.
    Read {
        #[arg(short, long)]
        device: String,
        /// Image file to create.
        output: PathBuf,
        /// Replace the output file if it exists.
        #[arg(long, default_value_t = false)]
        overwrite: bool,
    },
    /// Blank a rewritable disc.
    Erase {
        #[arg(short, long)]
        device: String,
        /// Blank the whole disc instead of the table of contents only.
        #[arg(long, default_value_t = false)]
        all: bool,
        #[command(flatten)]
        write: WriteArgs,
    },
    /// Extract audio tracks to WAV files.
    Extract {
        #[arg(short, long)]
        device: String,
        /// Directory the WAV files are written to.
        output: PathBuf,
        /// Track to extract; repeat for several. Defaults to all tracks.
        #[arg(short, long = "track")]
        tracks: Vec<u32>,
    },
    /// Run an operation described in a TOML request file.
    Run {
        /// Path to the request file.
        request: PathBuf,
    },
    /// Classify a tool failure into a typed error.
    Classify {
        /// Tool that failed (cdrecord, mkisofs, readcd, cdda2wav or an alias).
        tool: Tool,
        /// Exit code the tool returned.
        #[arg(allow_negative_numbers = true)]
        exit_code: i32,
        /// Error output of the tool.
        #[arg(long, conflicts_with = "stderr_file")]
        stderr: Option<String>,
        /// Read the error output from a file.
        #[arg(long)]
        stderr_file: Option<PathBuf>,
    },
    /// Parse a recorded tool log and show the events and phases it produces.
    Replay {
        /// Tool that wrote the log.
        tool: Tool,
        /// Recorded log file.
        log: PathBuf,
    },
    /// Show the effective configuration, or write it to a file.
    Config {
        /// Write the configuration to this path instead of printing it.
        #[arg(long)]
        write: Option<PathBuf>,
    },
    /// Check that the configured tools and directories are usable.
    Doctor,
    /// Generate shell completions for bash, zsh, fish, elvish, or powershell.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
    /// Generate man pages in the specified directory.
    ManPages {
        /// Output directory for man pages.
        #[arg(default_value = "man")]
        dir: PathBuf,
    },
}

fn main() -> ExitCode {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let msg = info.to_string();
        if msg.contains("Broken pipe")
            || msg.contains("broken pipe")
            || msg.contains("os error 32")
            || msg.contains("failed printing to stdout")
        {
            std::process::exit(0);
        }
        default_hook(info);
    }));

    let cli = Cli::parse();

    let default_level = if cli.trace {
        "trace"
    } else if cli.verbose {
        "debug"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("SPINDLE_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    let result = dispatch(cli);

    match result {
        Ok(code) => ExitCode::from(code),
        Err(msg) => {
            eprintln!("error: {msg}");
            let code = if msg.starts_with("config error:")
                || msg.starts_with("request error:")
                || msg.starts_with("failed to read")
            {
                EXIT_INVALID
            } else {
                EXIT_FAILURE
            };
            ExitCode::from(code)
        }
    }
}

fn dispatch(cli: Cli) -> Result<u8, String> {
    let Cli {
        config,
        json,
        timeout,
        command,
        ..
    } = cli;
    let timeout = timeout.map(Duration::from_secs);
    let load = || {
        EngineConfig::load_or_default(config.as_deref()).map_err(|e| format!("config error: {e}"))
    };

    match command {
        Commands::Classify {
            tool,
            exit_code,
            stderr,
            stderr_file,
        } => commands::classify::run(
            tool,
            exit_code,
            stderr.as_deref(),
            stderr_file.as_deref(),
            json,
        ),
        Commands::Replay { tool, log } => commands::replay::run(tool, &log, json),
        Commands::Completions { shell } => commands::completions::run::<Cli>(shell),
        Commands::ManPages { dir } => commands::man_pages::run::<Cli>(&dir),
        Commands::Config { write } => commands::config::run(&load()?, write.as_deref(), json),
        Commands::Doctor => commands::doctor::run(&load()?, json),
        operation => run_operation(operation, load()?, json, timeout),
    }
}

fn run_operation(
    command: Commands,
    config: EngineConfig,
    json: bool,
    timeout: Option<Duration>,
) -> Result<u8, String> {
    let engine = Engine::new(config).map_err(|e| format!("config error: {e}"))?;
    install_signal_handler();
    let ctx = commands::RunContext {
        engine: &engine,
        json,
        timeout,
    };

    match command {
        Commands::Burn {
            device,
            files,
            image,
            audio,
            label,
            write,
            capacity,
        } => commands::burn::run(
            &ctx,
            commands::burn::BurnArgs {
                device,
                files,
                image,
                audio,
                label,
                options: write.into(),
                capacity: capacity.into(),
            },
        ),
        Commands::Copy {
            from,
            to,
            write,
            capacity,
        } => commands::copy::run(&ctx, &from, &to, write.into(), capacity.into()),
        Commands::Read {
            device,
            output,
            overwrite,
        } => commands::read::run(&ctx, &device, &output, overwrite),
        Commands::Erase { device, all, write } => {
            let mode = if all { BlankMode::All } else { BlankMode::Fast };
            commands::erase::run(&ctx, &device, mode, write.into())
        }
        Commands::Extract {
            device,
            output,
            tracks,
        } => commands::extract::run(&ctx, &device, &output, tracks),
        Commands::Run { request } => commands::run::run(&ctx, &request),
        other => Err(format!("{other:?} does not run a pipeline")),
    }
}
