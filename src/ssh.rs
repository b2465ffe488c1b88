use std::path::{Path, PathBuf};
use tokio::process::Command;

const TUNNEL_TARGET_HOST: &str = "127.0.0.1";
/// Ends ssh's own options, so an alias can never be read as one.
const END_OF_OPTIONS: &str = "--";

/// Builds the three ssh invocations the login flow needs.
#[derive(Clone, Debug)]
pub struct SshClient {
    program: PathBuf,
    tunnel_program: PathBuf,
}

impl SshClient {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        let program = program.into();
        Self {
            tunnel_program: program.clone(),
            program,
        }
    }

    /// Uses a different executable for the port forward only.
    #[cfg(test)]
    pub(crate) fn with_tunnel_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.tunnel_program = program.into();
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// `ssh -tt -- <alias> aws sso login --profile <profile>`
    ///
    /// The forced pseudo-terminal makes the remote CLI flush its prompt
    /// (and the URL) line by line instead of buffering it.
    pub fn login_command(&self, alias: &str, profile: &str) -> Command {
        let mut command = Command::new(&self.program);
        command
            .arg("-tt")
            .arg(END_OF_OPTIONS)
            .arg(alias)
            .args(["aws", "sso", "login", "--profile"])
            .arg(quote_remote_arg(profile));
        command
    }

    /// `ssh -N -L <port>:127.0.0.1:<port> -- <alias>`
    pub fn tunnel_command(&self, alias: &str, port: u16) -> Command {
        let mut command = Command::new(&self.tunnel_program);
        command
            .arg("-N")
            .arg("-L")
            .arg(format!("{port}:{TUNNEL_TARGET_HOST}:{port}"))
            .arg(END_OF_OPTIONS)
            .arg(alias);
        command
    }

    /// `ssh -- <alias> aws configure list-profiles`
    pub fn list_profiles_command(&self, alias: &str) -> Command {
        let mut command = Command::new(&self.program);
        command
            .arg(END_OF_OPTIONS)
            .arg(alias)
            .args(["aws", "configure", "list-profiles"]);
        command
    }
}

/// ssh joins remote arguments into one string for the remote shell, so
/// anything beyond plain word characters has to be quoted.
fn quote_remote_arg(value: &str) -> String {
    let plain = !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '@' | '/' | ':'));
    if plain {
        return value.to_string();
    }
    let escaped = value.replace('\'', "'\\''");
    format!("'{escaped}'")
}
