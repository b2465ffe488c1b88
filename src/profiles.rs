use std::{io::IsTerminal, time::Duration};

use dialoguer::Select;

use crate::{
    error::{FlowError, FlowResult},
    ssh::SshClient,
};

/// Lists the AWS CLI profiles configured on the remote host.
pub async fn fetch_remote_profiles(
    ssh: &SshClient,
    alias: &str,
    timeout: Duration,
) -> FlowResult<Vec<String>> {
    let mut command = ssh.list_profiles_command(alias);
    command.kill_on_drop(true);

    let output = match tokio::time::timeout(timeout, command.output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(err)) => {
            return Err(FlowError::Process(format!(
                "failed to run {}: {err}",
                ssh.program().display()
            )))
        }
        Err(_) => {
            return Err(FlowError::RemoteCommand(format!(
                "timed out after {timeout:?} while fetching profiles from {alias}"
            )))
        }
    };

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let detail = stderr.trim();
        return Err(FlowError::RemoteCommand(if detail.is_empty() {
            format!("failed to fetch profiles from {alias} ({})", output.status)
        } else {
            format!("failed to fetch profiles from {alias}: {detail}")
        }));
    }

    let profiles = parse_profiles(&String::from_utf8_lossy(&output.stdout));
    if profiles.is_empty() {
        return Err(FlowError::NoProfiles);
    }
    Ok(profiles)
}

fn parse_profiles(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Asks the operator to pick one of `profiles`.
pub fn prompt_profile_selection(profiles: &[String]) -> FlowResult<String> {
    if !(std::io::stdin().is_terminal() && std::io::stdout().is_terminal()) {
        return Err(FlowError::Process(
            "profile selection requires a terminal; pass the profile name as an argument"
                .to_string(),
        ));
    }

    println!();
    let choice = Select::new()
        .with_prompt("Select an AWS profile on the remote server")
        .items(profiles)
        .default(0)
        .interact_opt()
        .map_err(|err| FlowError::Process(format!("profile prompt failed: {err}")))?;

    match choice {
        Some(index) => profiles
            .get(index)
            .cloned()
            .ok_or_else(|| FlowError::Process(format!("no profile at index {index}"))),
        None => Err(FlowError::UserAbort),
    }
}
