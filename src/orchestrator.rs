use std::{fmt, sync::Arc, time::Duration};

use crate::{
    abort::{AbortInput, AbortListener},
    config::Settings,
    error::FlowError,
    login, process,
    signals::{LoginFailure, Session, Signals},
    ssh::SshClient,
    tunnel,
    ui::Frontend,
    url_extract::decode_url,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    FetchingProfile,
    AwaitingUrl,
    AwaitingTunnel,
    AuthPending,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::FetchingProfile => "fetching profile",
            Stage::AwaitingUrl => "awaiting url",
            Stage::AwaitingTunnel => "awaiting tunnel",
            Stage::AuthPending => "auth pending",
        };
        f.write_str(name)
    }
}

#[derive(Debug)]
pub enum TerminalState {
    Succeeded,
    Failed(FlowError),
    Aborted,
}

impl TerminalState {
    pub fn exit_code(&self) -> i32 {
        match self {
            TerminalState::Succeeded => 0,
            TerminalState::Failed(_) | TerminalState::Aborted => 1,
        }
    }
}

/// Result of one run, with the session it produced.
#[derive(Debug)]
pub struct Outcome {
    pub state: TerminalState,
    pub session: Arc<Session>,
    pub signals: Signals,
}

impl Outcome {
    pub fn exit_code(&self) -> i32 {
        self.state.exit_code()
    }
}

#[derive(Clone, Debug)]
pub struct FlowOptions {
    pub tunnel_ready_timeout: Duration,
    pub terminate_grace: Duration,
    pub browser_open_delay: Duration,
    pub open_browser: bool,
}

impl From<&Settings> for FlowOptions {
    fn from(settings: &Settings) -> Self {
        Self {
            tunnel_ready_timeout: settings.tunnel_ready_timeout(),
            terminate_grace: settings.terminate_grace(),
            browser_open_delay: settings.browser_open_delay(),
            open_browser: settings.open_browser,
        }
    }
}

impl Default for FlowOptions {
    fn default() -> Self {
        Self::from(&Settings::default())
    }
}

/// Drives one login: remote `aws sso login`, local tunnel, browser, and the
/// wait for whichever of abort / success / failure comes first.
pub struct Orchestrator {
    ssh: SshClient,
    options: FlowOptions,
    frontend: Arc<dyn Frontend>,
}

impl Orchestrator {
    pub fn new(ssh: SshClient, options: FlowOptions, frontend: Arc<dyn Frontend>) -> Self {
        Self {
            ssh,
            options,
            frontend,
        }
    }

    pub async fn run(&self, alias: &str, profile: &str, abort_input: AbortInput) -> Outcome {
        let session = Arc::new(Session::default());
        let signals = Signals::default();
        let state = self
            .drive(alias, profile, abort_input, &session, &signals)
            .await;
        log::debug!("run finished: {state:?}");
        Outcome {
            state,
            session,
            signals,
        }
    }

    async fn drive(
        &self,
        alias: &str,
        profile: &str,
        abort_input: AbortInput,
        session: &Arc<Session>,
        signals: &Signals,
    ) -> TerminalState {
        log::debug!("stage: {}", Stage::AwaitingUrl);
        self.frontend
            .stage("Starting aws sso login on the remote server…");
        tokio::spawn(login::run_login(
            self.ssh.clone(),
            alias.to_string(),
            profile.to_string(),
            Arc::clone(session),
            signals.clone(),
            Arc::clone(&self.frontend),
        ));

        tokio::select! {
            biased;
            _ = signals.login_error.raised() => {}
            _ = signals.url_ready.raised() => {}
            _ = signals.login_done.raised() => {}
        }

        if signals.login_error.is_set() {
            self.frontend.error("Error during aws sso login.");
            self.terminate(session.login()).await;
            return TerminalState::Failed(login_failure(session));
        }
        let (Some(port), Some(auth_url)) = (
            session.port().filter(|_| signals.url_ready.is_set()),
            session.auth_url(),
        ) else {
            self.frontend
                .error("aws sso login finished without printing an authentication URL.");
            self.terminate(session.login()).await;
            return TerminalState::Failed(FlowError::RemoteCommand(
                "aws sso login exited before printing an authentication URL".to_string(),
            ));
        };

        self.frontend.success("Authentication URL received");
        self.frontend
            .success(&format!("Detected callback port: {port}"));

        log::debug!("stage: {}", Stage::AwaitingTunnel);
        self.frontend
            .stage(&format!("Starting SSH tunnel (port {port})…"));
        let tunnel_task = tokio::spawn(tunnel::run_tunnel(
            self.ssh.clone(),
            alias.to_string(),
            port,
            Arc::clone(session),
            signals.clone(),
            Arc::clone(&self.frontend),
        ));

        let timeout = self.options.tunnel_ready_timeout;
        if tokio::time::timeout(timeout, signals.tunnel_ready.raised())
            .await
            .is_err()
        {
            self.frontend.error("Failed to start the SSH tunnel.");
            tunnel_task.abort();
            let _ = tunnel_task.await;
            self.terminate(session.login()).await;
            self.terminate(session.tunnel()).await;
            return TerminalState::Failed(FlowError::TunnelTimeout(timeout));
        }
        self.frontend.success("SSH tunnel established");

        log::debug!("stage: {}", Stage::AuthPending);
        if !self.options.browser_open_delay.is_zero() {
            tokio::time::sleep(self.options.browser_open_delay).await;
        }

        let decoded_url = decode_url(auth_url);
        if self.options.open_browser {
            self.frontend
                .stage("Opening the browser for authentication…");
            self.frontend.link(&decoded_url);
            self.launch_browser(decoded_url);
        } else {
            self.frontend
                .stage("Open this URL in your browser to authenticate:");
            self.frontend.link(&decoded_url);
        }

        self.frontend
            .stage("Press Enter to abort, or wait for authentication to complete…");
        let _listener = AbortListener::spawn(abort_input, signals.abort_requested.clone());

        tokio::select! {
            biased;
            _ = signals.abort_requested.raised() => {}
            _ = signals.login_done.raised() => {}
            _ = signals.login_error.raised() => {}
        }

        if signals.abort_requested.is_set() {
            self.frontend.warning("Operation aborted by the user.");
            self.terminate(session.login()).await;
            self.terminate(session.tunnel()).await;
            return TerminalState::Aborted;
        }

        if signals.login_done.is_set() {
            self.frontend
                .success("Authentication completed successfully!");
            self.terminate(session.tunnel()).await;
            return TerminalState::Succeeded;
        }

        let rc = session
            .login_exit_code()
            .map(|code| code.to_string())
            .unwrap_or_else(|| "?".to_string());
        self.frontend
            .error(&format!("aws sso login failed (exit code {rc})."));
        self.terminate(session.tunnel()).await;
        TerminalState::Failed(login_failure(session))
    }

    /// Opens `url` in the background; nothing in the flow waits for it.
    fn launch_browser(&self, url: String) {
        let frontend = Arc::clone(&self.frontend);
        tokio::task::spawn_blocking(move || {
            if let Err(err) = frontend.open_browser(&url) {
                log::debug!("browser open failed: {err:#}");
                frontend.warning("Could not open the browser. Open the URL above manually.");
            }
        });
    }

    async fn terminate(&self, handle: Option<&process::ProcessHandle>) {
        process::terminate_process(handle, self.options.terminate_grace).await;
    }
}

fn login_failure(session: &Session) -> FlowError {
    match (session.login_failure(), session.login_exit_code()) {
        (Some(LoginFailure::Parse(err)), _) => FlowError::Parse(err.clone()),
        (Some(LoginFailure::Launch(detail)), _) => FlowError::Process(detail.clone()),
        (Some(LoginFailure::Interrupted), _) => {
            FlowError::Process("login runner stopped unexpectedly".to_string())
        }
        (None, Some(code)) => {
            FlowError::RemoteCommand(format!("aws sso login exited with code {code}"))
        }
        (None, None) => FlowError::RemoteCommand("aws sso login failed".to_string()),
    }
}
