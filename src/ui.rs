//! Console output for the login flow.

use anyhow::{Context, Result};

/// Everything the flow shows to the operator goes through this trait.
pub trait Frontend: Send + Sync {
    /// One line of remote `aws sso login` output.
    fn login_line(&self, line: &str);
    fn stage(&self, message: &str);
    /// The decoded authentication URL, shown whether or not a browser opens.
    fn link(&self, url: &str);
    fn success(&self, message: &str);
    fn warning(&self, message: &str);
    fn error(&self, message: &str);
    /// May block while the launcher runs, so callers keep it off the runtime.
    fn open_browser(&self, url: &str) -> Result<()>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct ConsoleFrontend;

impl ConsoleFrontend {
    pub fn header(&self, alias: &str, profile: &str) {
        println!();
        println!("AWS SSO Login via SSH");
        println!("  SSH alias:  {alias}");
        println!("  Profile:    {profile}");
    }
}

impl Frontend for ConsoleFrontend {
    fn login_line(&self, line: &str) {
        println!("  [sso] {line}");
    }

    fn stage(&self, message: &str) {
        println!("▸ {message}");
    }

    fn link(&self, url: &str) {
        println!("  {url}");
        println!();
    }

    fn success(&self, message: &str) {
        println!("✓ {message}");
    }

    fn warning(&self, message: &str) {
        eprintln!("⚠ {message}");
    }

    fn error(&self, message: &str) {
        eprintln!("✗ {message}");
    }

    fn open_browser(&self, url: &str) -> Result<()> {
        open::that_detached(url).with_context(|| format!("failed to open browser for {url}"))
    }
}
