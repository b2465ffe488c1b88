pub mod abort;
pub mod cli;
pub mod config;
pub mod error;
pub mod login;
pub mod orchestrator;
pub mod process;
pub mod profiles;
pub mod signals;
pub mod ssh;
pub mod tunnel;
pub mod ui;
pub mod url_extract;

#[cfg(test)]
mod test_support;

use clap::{error::ErrorKind, Parser};
use std::{io::BufReader, sync::Arc, time::Duration};

use crate::{
    cli::Cli,
    orchestrator::{FlowOptions, Orchestrator, Stage},
    ssh::SshClient,
    ui::{ConsoleFrontend, Frontend},
};

const RUNTIME_SHUTDOWN_TIMEOUT: Duration = Duration::from_millis(500);

/// Parses the command line, runs the login flow and returns the process exit code.
pub fn run() -> i32 {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let code = match err.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => 0,
                _ => 1,
            };
            let _ = err.print();
            return code;
        }
    };

    init_logging(cli.verbose);

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("✗ failed to start async runtime: {err}");
            return 1;
        }
    };
    let code = runtime.block_on(login_via_ssh(cli));
    // the abort listener may still be blocked on stdin
    runtime.shutdown_timeout(RUNTIME_SHUTDOWN_TIMEOUT);
    code
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .try_init();
}

async fn login_via_ssh(cli: Cli) -> i32 {
    let settings = config::read_settings();
    log::debug!("settings from {}: {settings:?}", config::settings_file_path().display());

    let ssh = SshClient::new(&settings.ssh_program);
    let frontend = ConsoleFrontend;

    let profile = match cli.profile {
        Some(profile) => profile,
        None => {
            log::debug!("stage: {}", Stage::FetchingProfile);
            println!();
            frontend.stage(&format!(
                "No profile specified. Fetching profiles from {}…",
                cli.alias
            ));
            match select_profile(&ssh, &cli.alias, settings.profile_list_timeout()).await {
                Ok(profile) => profile,
                Err(err) => {
                    frontend.error(&err.to_string());
                    return 1;
                }
            }
        }
    };

    frontend.header(&cli.alias, &profile);
    println!();

    let mut options = FlowOptions::from(&settings);
    if cli.no_browser {
        options.open_browser = false;
    }

    let orchestrator = Orchestrator::new(ssh, options, Arc::new(frontend));
    orchestrator
        .run(&cli.alias, &profile, Box::new(BufReader::new(std::io::stdin())))
        .await
        .exit_code()
}

async fn select_profile(
    ssh: &SshClient,
    alias: &str,
    timeout: Duration,
) -> error::FlowResult<String> {
    let profiles = profiles::fetch_remote_profiles(ssh, alias, timeout).await?;
    tokio::task::spawn_blocking(move || profiles::prompt_profile_selection(&profiles))
        .await
        .map_err(|err| error::FlowError::Process(format!("profile prompt failed: {err}")))?
}
