use std::sync::Arc;

use crate::{
    process,
    signals::{Session, Signals},
    ssh::SshClient,
    ui::Frontend,
};

const TUNNEL_LABEL: &str = "ssh tunnel";

/// Runs the local forward for `port` until it exits.
///
/// `ssh -N` has no readiness handshake, so `tunnel_ready` is raised as soon as
/// the process is running and its handle is stored.
pub async fn run_tunnel(
    ssh: SshClient,
    alias: String,
    port: u16,
    session: Arc<Session>,
    signals: Signals,
    frontend: Arc<dyn Frontend>,
) {
    let (handle, mut lines) = match process::start(TUNNEL_LABEL, ssh.tunnel_command(&alias, port)) {
        Ok(started) => started,
        Err(err) => {
            frontend.error(&format!("Error in SSH tunnel runner: {err:#}"));
            return;
        }
    };
    session.set_tunnel(handle.clone());
    signals.tunnel_ready.raise();

    let drain = async {
        while let Some(line) = lines.next_line().await {
            log::debug!("[tunnel] {line}");
        }
    };
    let ((), code) = tokio::join!(drain, handle.wait());
    log::info!("ssh tunnel on port {port} exited with code {code}");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FakeSsh;
    use crate::ui::recording::{Event, RecordingFrontend};

    #[tokio::test]
    async fn ready_is_raised_once_tunnel_runs() {
        let fake = FakeSsh::new("exit 0", "echo \"$@\"\nexec sleep 30");
        let session = Arc::new(Session::default());
        let signals = Signals::default();
        let frontend = Arc::new(RecordingFrontend::default());

        let task = tokio::spawn(run_tunnel(
            fake.client(),
            "bastion".to_string(),
            4433,
            Arc::clone(&session),
            signals.clone(),
            frontend,
        ));
        signals.tunnel_ready.raised().await;

        let tunnel = session.tunnel().expect("tunnel handle").clone();
        assert!(!tunnel.has_exited());
        tunnel.terminate(process::DEFAULT_TERMINATE_GRACE).await;
        task.await.expect("tunnel runner");
        assert!(tunnel.has_exited());
    }

    #[tokio::test]
    async fn launch_failure_never_signals_ready() {
        let fake = FakeSsh::missing();
        let session = Arc::new(Session::default());
        let signals = Signals::default();
        let frontend = Arc::new(RecordingFrontend::default());

        run_tunnel(
            fake.client(),
            "bastion".to_string(),
            4433,
            Arc::clone(&session),
            signals.clone(),
            frontend.clone(),
        )
        .await;

        assert!(!signals.tunnel_ready.is_set());
        assert!(session.tunnel().is_none());
        assert!(frontend.has(|event| matches!(event, Event::Error(msg) if msg.contains("tunnel"))));
    }
}
