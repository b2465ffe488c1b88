use std::sync::Arc;

use crate::{
    process,
    signals::{LoginFailure, LoginOutcome, Session, Signals},
    ssh::SshClient,
    ui::Frontend,
    url_extract::{derive_port, find_url},
};

const LOGIN_LABEL: &str = "aws sso login";

/// Publishes a failure when the runner ends without an outcome of its own.
struct SettleOnExit {
    session: Arc<Session>,
    signals: Signals,
}

impl Drop for SettleOnExit {
    fn drop(&mut self) {
        if self.signals.login_settled() {
            return;
        }
        self.session.set_login_failure(LoginFailure::Interrupted);
        if self.signals.finish_login(LoginOutcome::Failed) {
            log::error!("login runner stopped before reporting an outcome");
        }
    }
}

/// Runs the remote `aws sso login` to completion and publishes its outcome.
///
/// Raises `url_ready` once a usable URL and port are stored, and exactly one
/// of `login_done` / `login_error` when the run ends.
pub async fn run_login(
    ssh: SshClient,
    alias: String,
    profile: String,
    session: Arc<Session>,
    signals: Signals,
    frontend: Arc<dyn Frontend>,
) {
    let _settle = SettleOnExit {
        session: Arc::clone(&session),
        signals: signals.clone(),
    };
    let (handle, mut lines) = match process::start(LOGIN_LABEL, ssh.login_command(&alias, &profile))
    {
        Ok(started) => started,
        Err(err) => {
            frontend.error(&format!("Error in SSO login runner: {err:#}"));
            session.set_login_failure(LoginFailure::Launch(format!("{err:#}")));
            signals.finish_login(LoginOutcome::Failed);
            return;
        }
    };
    session.set_login(handle.clone());

    while let Some(line) = lines.next_line().await {
        let stripped = line.trim();
        if !stripped.is_empty() {
            frontend.login_line(stripped);
        }

        if signals.url_ready.is_set() {
            continue;
        }
        let Some(url) = find_url(stripped) else {
            continue;
        };

        session.set_auth_url(url);
        match derive_port(url) {
            Ok(port) => {
                log::debug!("callback port {port} derived from {url}");
                session.set_port(port);
                signals.url_ready.raise();
            }
            Err(err) => {
                frontend.error(&format!("URL parsing error: {err}"));
                session.set_login_failure(LoginFailure::Parse(err));
                signals.finish_login(LoginOutcome::Failed);
                return;
            }
        }
    }

    let code = handle.wait().await;
    if code == 0 {
        signals.finish_login(LoginOutcome::Succeeded);
    } else {
        session.set_login_exit_code(code);
        signals.finish_login(LoginOutcome::Failed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::UrlError;
    use crate::test_support::FakeSsh;
    use crate::ui::recording::{Event, RecordingFrontend};

    async fn run(fake: &FakeSsh) -> (Arc<Session>, Signals, Arc<RecordingFrontend>) {
        let session = Arc::new(Session::default());
        let signals = Signals::default();
        let frontend = Arc::new(RecordingFrontend::default());
        run_login(
            fake.client(),
            "bastion".to_string(),
            "dev".to_string(),
            Arc::clone(&session),
            signals.clone(),
            frontend.clone(),
        )
        .await;
        (session, signals, frontend)
    }

    #[tokio::test]
    async fn url_then_success_publishes_port_and_done() {
        let fake = FakeSsh::new(
            "echo 'Attempting to open your default browser.'\n\
             echo '  https://sso.example/auth?redirect_uri=http%3A%2F%2F127.0.0.1%3A4433%2Fcb'\n\
             echo 'Successfully logged into Start URL'\n\
             exit 0",
            "exec sleep 30",
        );
        let (session, signals, frontend) = run(&fake).await;

        assert!(signals.url_ready.is_set());
        assert!(signals.login_done.is_set());
        assert!(!signals.login_error.is_set());
        assert_eq!(session.port(), Some(4433));
        assert_eq!(
            session.auth_url(),
            Some("https://sso.example/auth?redirect_uri=http%3A%2F%2F127.0.0.1%3A4433%2Fcb")
        );
        assert!(frontend.has(|event| {
            *event == Event::LoginLine("Successfully logged into Start URL".to_string())
        }));
        assert!(session.login().expect("login handle").has_exited());
    }

    #[tokio::test]
    async fn only_first_url_is_used() {
        let fake = FakeSsh::new(
            "echo 'https://a.example/?redirect_uri=http%3A%2F%2F127.0.0.1%3A1111%2F'\n\
             echo 'https://b.example/?redirect_uri=http%3A%2F%2F127.0.0.1%3A2222%2F'\n\
             exit 0",
            "exec sleep 30",
        );
        let (session, _signals, _frontend) = run(&fake).await;
        assert_eq!(session.port(), Some(1111));
    }

    #[tokio::test]
    async fn nonzero_exit_records_code() {
        let fake = FakeSsh::new("echo 'Error loading SSO Token' >&2\nexit 7", "exec sleep 30");
        let (session, signals, frontend) = run(&fake).await;

        assert!(signals.login_error.is_set());
        assert!(!signals.login_done.is_set());
        assert!(!signals.url_ready.is_set());
        assert_eq!(session.login_exit_code(), Some(7));
        assert!(frontend.has(|event| {
            *event == Event::LoginLine("Error loading SSO Token".to_string())
        }));
    }

    #[tokio::test]
    async fn unusable_url_stops_with_parse_error() {
        let fake = FakeSsh::new(
            "echo 'https://sso.example/auth?client_id=abc'\nexec sleep 30",
            "exec sleep 30",
        );
        let (session, signals, frontend) = run(&fake).await;

        assert!(signals.login_error.is_set());
        assert!(!signals.url_ready.is_set());
        assert_eq!(session.port(), None);
        assert_eq!(session.login_exit_code(), None);
        assert!(matches!(
            session.login_failure(),
            Some(LoginFailure::Parse(UrlError::MissingRedirectUri(_)))
        ));
        assert!(frontend.has(|event| matches!(event, Event::Error(_))));

        let login = session.login().expect("login handle");
        assert!(!login.has_exited());
        login.terminate(process::DEFAULT_TERMINATE_GRACE).await;
    }

    #[tokio::test]
    async fn panicking_runner_still_raises_error() {
        let fake = FakeSsh::new("echo 'Attempting to open'\nexec sleep 30", "exec sleep 30");
        let session = Arc::new(Session::default());
        let signals = Signals::default();
        let runner = tokio::spawn(run_login(
            fake.client(),
            "bastion".to_string(),
            "dev".to_string(),
            Arc::clone(&session),
            signals.clone(),
            Arc::new(RecordingFrontend::panicking_on_login_line()),
        ));

        assert!(runner.await.is_err());
        assert!(signals.login_error.is_set());
        assert!(!signals.login_done.is_set());
        assert_eq!(session.login_failure(), Some(&LoginFailure::Interrupted));

        let login = session.login().expect("login handle");
        login.terminate(process::DEFAULT_TERMINATE_GRACE).await;
    }

    #[tokio::test]
    async fn launch_failure_raises_error_without_exit_code() {
        let fake = FakeSsh::missing();
        let (session, signals, _frontend) = run(&fake).await;

        assert!(signals.login_error.is_set());
        assert!(session.login().is_none());
        assert_eq!(session.login_exit_code(), None);
        assert!(matches!(session.login_failure(), Some(LoginFailure::Launch(_))));
    }
}
