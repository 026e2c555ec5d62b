use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "dynamics-stream",
    version,
    about = "Request and record state estimates streamed by a device",
    long_about = "List the data streams a device offers, register this host as a destination \
                  and record the UDP datagrams it sends.\n\
                  The device address comes from --device or $DYNAMICS_DEVICE; further \
                  DYNAMICS_* variables are read from the environment or a .env file."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Device IPv4 address
    #[arg(short, long, env = "DYNAMICS_DEVICE", global = true)]
    pub device: Option<String>,

    /// Timeout for control-plane requests in milliseconds
    #[arg(long, global = true)]
    pub timeout_ms: Option<u64>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Subcommand)]
pub enum Command {
    /// List the device's streams and the dynamics module status
    Streams(StreamsArgs),
    /// Show where the device currently sends a stream
    Destinations(DestinationsArgs),
    /// Receive a stream on this host and print one JSON record per line
    Stream(StreamArgs),
    /// Call a module service
    Service(ServiceArgs),
    /// Remove destinations on the device that point at this host
    Clean(CleanArgs),
}

/// Connection options shared by every subcommand.
#[derive(Debug, Clone)]
pub struct Globals {
    pub device: Option<String>,
    pub timeout_ms: Option<u64>,
}

impl From<&Cli> for Globals {
    fn from(cli: &Cli) -> Self {
        Self {
            device: cli.device.clone(),
            timeout_ms: cli.timeout_ms,
        }
    }
}

#[derive(Args)]
pub struct StreamsArgs {
    /// Output as JSON
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Args)]
pub struct DestinationsArgs {
    /// Stream name, e.g. pose or imu
    pub stream: String,

    /// Output as JSON
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Args)]
pub struct StreamArgs {
    /// Stream name, e.g. pose or imu
    pub stream: String,

    /// Local network interface to receive on
    #[arg(short, long)]
    pub interface: Option<String>,

    /// Local UDP port (0 picks a free port)
    #[arg(short, long, default_value_t = 0)]
    pub port: u16,

    /// Stop after this many records
    #[arg(short = 'n', long)]
    pub count: Option<u64>,

    /// Stop after this many seconds
    #[arg(long)]
    pub duration: Option<f64>,

    /// Start the dynamics module before streaming and stop it afterwards
    #[arg(short, long, default_value_t = false)]
    pub autostart: bool,

    /// Output file for JSON lines (default: stdout)
    #[arg(short, long)]
    pub output: Option<String>,
}

#[derive(Args)]
pub struct ServiceArgs {
    /// Module name, e.g. rc_dynamics or rc_slam
    pub module: String,

    /// Service name, e.g. start or save_map
    pub name: String,

    /// Treat as a long-running service that reports a return code
    #[arg(long, default_value_t = false)]
    pub long_running: bool,

    /// Timeout for long-running services in milliseconds (default: wait)
    #[arg(long, requires = "long_running")]
    pub wait_ms: Option<u64>,
}

#[derive(Args)]
pub struct CleanArgs {
    /// Output as JSON
    #[arg(long, default_value_t = false)]
    pub json: bool,
}
