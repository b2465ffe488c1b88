//! Fake `ssh` executable for exercising the runners end to end.

use std::{fs, path::PathBuf};
use tempfile::TempDir;

use crate::ssh::SshClient;

pub struct FakeSsh {
    _dir: Option<TempDir>,
    program: PathBuf,
}

impl FakeSsh {
    /// `login` runs for `ssh -tt ...`, `tunnel` for `ssh -N ...`.
    pub fn new(login: &str, tunnel: &str) -> Self {
        Self::with_profiles(login, tunnel, "exit 0")
    }

    /// `profiles` runs for every other invocation (`ssh <alias> aws configure list-profiles`).
    pub fn with_profiles(login: &str, tunnel: &str, profiles: &str) -> Self {
        let dir = TempDir::new().expect("temp dir");
        let program = dir.path().join("ssh");
        let script = format!(
            "#!/bin/sh\ncase \"$1\" in\n-tt)\n{login}\n;;\n-N)\n{tunnel}\n;;\n*)\n{profiles}\n;;\nesac\n"
        );
        fs::write(&program, script).expect("write fake ssh");
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perm = fs::metadata(&program).expect("metadata").permissions();
            perm.set_mode(0o755);
            fs::set_permissions(&program, perm).expect("chmod fake ssh");
        }
        Self {
            _dir: Some(dir),
            program,
        }
    }

    /// An ssh that cannot be launched at all.
    pub fn missing() -> Self {
        Self {
            _dir: None,
            program: PathBuf::from("/nonexistent/ssh-aws-sso-login/ssh"),
        }
    }

    /// Contents of a file the fake script wrote next to itself.
    pub fn read_file(&self, name: &str) -> Option<String> {
        let dir = self.program.parent()?;
        fs::read_to_string(dir.join(name)).ok()
    }

    pub fn client(&self) -> SshClient {
        SshClient::new(&self.program)
    }

    /// Same login behaviour, but the tunnel executable cannot be launched.
    pub fn client_with_broken_tunnel(&self) -> SshClient {
        self.client()
            .with_tunnel_program("/nonexistent/ssh-aws-sso-login/ssh")
    }
}
