use clap::{Args, Parser};

#[derive(Parser, Debug, Clone)]
#[command(name = "zumolink", about = "Serial console for the Zumo line follower")]
pub struct Cli {
    #[command(flatten)]
    pub ser: SerialOpts,

    /// Proportional gain to apply after connecting (needs --kd too)
    #[arg(long)]
    pub kp: Option<f64>,
    /// Derivative gain to apply after connecting (needs --kp too)
    #[arg(long)]
    pub kd: Option<f64>,
    /// Max speed 0-400 to apply after connecting
    #[arg(long, short = 's')]
    pub speed: Option<i32>,
    /// Telemetry interval in ms (10-10000) to apply after connecting
    #[arg(long, short = 'i')]
    pub interval: Option<i32>,
    /// Send START right after connecting
    #[arg(long, short = 'a', default_value_t = false)]
    pub autostart: bool,
    /// Telemetry history depth
    #[arg(long, default_value_t = 500)]
    pub history: usize,
}

#[derive(Args, Debug, Clone)]
pub struct SerialOpts {
    /// Serial device path (e.g. /dev/ttyACM0, COM3)
    #[arg(long, short = 'p')]
    pub port: String,
    /// Baud rate
    #[arg(long, short = 'b', default_value_t = 115_200)]
    pub baud: u32,
}
