use clap::Parser;

pub const APP_NAME: &str = "ssh-aws-sso-login";

/// Perform aws sso login on a remote server via SSH, forward the callback
/// port, and open the browser for authentication.
#[derive(Debug, Parser)]
#[command(name = APP_NAME, version, arg_required_else_help = true)]
pub struct Cli {
    /// SSH alias (from ~/.ssh/config) used to connect to the remote server.
    pub alias: String,

    /// AWS CLI profile name for aws sso login. If omitted, you will be
    /// prompted to choose from the profiles available on the remote server.
    pub profile: Option<String>,

    /// Print the authentication URL instead of opening a browser.
    #[arg(long)]
    pub no_browser: bool,

    /// Enable debug logging (RUST_LOG takes precedence).
    #[arg(short, long)]
    pub verbose: bool,
}
