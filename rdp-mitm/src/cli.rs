//! Command-line surface, one to one with the original tool's `argparse`
//! parser.

use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "rdp-mitm",
    about = "RDP credential-sniffing MITM proxy",
    version
)]
pub struct Args {
    /// Show debug information (hexdumps of cleartext/modified frames).
    #[arg(short, long)]
    pub debug: bool,

    /// TCP port to listen on.
    #[arg(short = 'p', long = "listen-port", default_value_t = 3389)]
    pub listen_port: u16,

    /// IP address to bind the fake service to (default all interfaces).
    #[arg(short, long = "bind-ip", default_value = "")]
    pub bind_ip: String,

    /// Downgrade the authentication protocol to this value.
    #[arg(short = 'g', long = "downgrade", default_value = "3", value_parser = ["0", "1", "3", "11"])]
    pub downgrade: String,

    /// Path to the TLS certificate file.
    #[arg(short, long = "certfile")]
    pub certfile: String,

    /// Path to the TLS key file.
    #[arg(short, long = "keyfile")]
    pub keyfile: String,

    /// Target host of the real RDP service.
    pub target_host: String,

    /// TCP port of the target RDP service.
    #[arg(default_value_t = 3389)]
    pub target_port: u16,
}

impl Args {
    /// The downgrade limit as a protocol flags byte.
    pub fn downgrade_limit(&self) -> u8 {
        self.downgrade.parse().expect("validated by clap value_parser")
    }
}
