//! Latches and write-once session state shared between the runners and the
//! orchestrator.
//!
//! Writers always store into [`Session`] before raising the matching latch;
//! readers only look at a field after they observed its latch.

use once_cell::sync::OnceCell;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tokio::sync::watch;

use crate::{error::UrlError, process::ProcessHandle};

/// Monotonic flag: once raised it stays raised.
#[derive(Clone, Debug)]
pub struct Latch {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for Latch {
    fn default() -> Self {
        Self {
            tx: Arc::new(watch::Sender::new(false)),
        }
    }
}

impl Latch {
    /// Raises the latch. Returns `true` if this call was the one that raised it.
    pub fn raise(&self) -> bool {
        !self.tx.send_replace(true)
    }

    pub fn is_set(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves as soon as the latch is raised, immediately if it already is.
    pub async fn raised(&self) {
        let mut rx = self.tx.subscribe();
        let _ = rx.wait_for(|raised| *raised).await;
    }
}

/// How the login runner finished.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoginOutcome {
    Succeeded,
    Failed,
}

#[derive(Clone, Debug, Default)]
pub struct Signals {
    pub url_ready: Latch,
    pub login_done: Latch,
    pub login_error: Latch,
    pub tunnel_ready: Latch,
    pub abort_requested: Latch,
    login_settled: Arc<AtomicBool>,
}

impl Signals {
    /// Raises exactly one of `login_done` / `login_error` for the whole run.
    /// Later calls are ignored and return `false`.
    pub fn finish_login(&self, outcome: LoginOutcome) -> bool {
        if self.login_settled.swap(true, Ordering::AcqRel) {
            log::warn!("login outcome already published, ignoring {outcome:?}");
            return false;
        }
        match outcome {
            LoginOutcome::Succeeded => self.login_done.raise(),
            LoginOutcome::Failed => self.login_error.raise(),
        }
    }

    pub fn login_settled(&self) -> bool {
        self.login_settled.load(Ordering::Acquire)
    }
}

/// Why the login runner gave up before the remote command finished.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LoginFailure {
    Launch(String),
    Parse(UrlError),
    /// The runner stopped without an outcome, e.g. it panicked.
    Interrupted,
}

/// Everything the runners discover about a run. Each field has a single
/// writer and can be set at most once.
#[derive(Debug, Default)]
pub struct Session {
    login: OnceCell<ProcessHandle>,
    tunnel: OnceCell<ProcessHandle>,
    auth_url: OnceCell<String>,
    port: OnceCell<u16>,
    login_exit_code: OnceCell<i32>,
    login_failure: OnceCell<LoginFailure>,
}

fn set_once<T: std::fmt::Debug>(cell: &OnceCell<T>, value: T, field: &str) {
    if let Err(value) = cell.set(value) {
        log::warn!("session {field} already set, dropping {value:?}");
    }
}

impl Session {
    pub fn set_login(&self, handle: ProcessHandle) {
        set_once(&self.login, handle, "login process");
    }

    pub fn set_tunnel(&self, handle: ProcessHandle) {
        set_once(&self.tunnel, handle, "tunnel process");
    }

    pub fn set_auth_url(&self, url: impl Into<String>) {
        set_once(&self.auth_url, url.into(), "auth url");
    }

    pub fn set_port(&self, port: u16) {
        set_once(&self.port, port, "port");
    }

    pub fn set_login_exit_code(&self, code: i32) {
        set_once(&self.login_exit_code, code, "login exit code");
    }

    pub fn set_login_failure(&self, failure: LoginFailure) {
        set_once(&self.login_failure, failure, "login failure");
    }

    pub fn login(&self) -> Option<&ProcessHandle> {
        self.login.get()
    }

    pub fn tunnel(&self) -> Option<&ProcessHandle> {
        self.tunnel.get()
    }

    pub fn auth_url(&self) -> Option<&str> {
        self.auth_url.get().map(String::as_str)
    }

    pub fn port(&self) -> Option<u16> {
        self.port.get().copied()
    }

    pub fn login_exit_code(&self) -> Option<i32> {
        self.login_exit_code.get().copied()
    }

    pub fn login_failure(&self) -> Option<&LoginFailure> {
        self.login_failure.get()
    }
}
