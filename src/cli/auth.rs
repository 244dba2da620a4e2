//! CLI handlers for login, callback, status, whoami and logout.

use std::io::Write;
use std::path::PathBuf;

use crate::auth::{parse_callback_url, AuthService, Profile, ValidationResult};
use crate::config::ClientConfig;

type CliResult = Result<(), Box<dyn std::error::Error>>;

/// Build the service from `.env`, the config file and `FEDAUTH_*`.
///
/// `--data-dir` decides which `config.toml` is read, not only where the
/// session is stored.
pub fn service(data_dir: Option<PathBuf>) -> Result<AuthService, Box<dyn std::error::Error>> {
    let config = ClientConfig::from_env_in(data_dir)?;
    Ok(AuthService::from_config(config)?)
}

/// Handle `fedauth login <instance> <handle>`.
pub async fn handle_login(
    service: &AuthService,
    instance: &str,
    handle: &str,
    no_wait: bool,
) -> CliResult {
    let step = service.sign_in(instance, handle).await?;

    println!("Open this URL to authorize:\n\n  {}\n", step.authorize_url);
    if no_wait {
        println!("Then run:");
        println!(
            "  fedauth callback '<redirect url>' --session {}",
            step.session_key
        );
        return Ok(());
    }

    println!("After approving, paste the URL your browser was redirected to:");
    print!("> ");
    std::io::stdout().flush()?;
    let mut line = String::new();
    std::io::stdin().read_line(&mut line)?;
    if line.trim().is_empty() {
        return Err("no redirect URL provided".into());
    }

    finish(service, &step.session_key, &line).await
}

/// Handle `fedauth callback <redirect-url> --session <key>`.
pub async fn handle_callback(service: &AuthService, redirect_url: &str, session: &str) -> CliResult {
    finish(service, session, redirect_url).await
}

async fn finish(service: &AuthService, session_key: &str, redirect_url: &str) -> CliResult {
    let params = parse_callback_url(redirect_url)?;
    let credential = service
        .complete_sign_in(session_key, params.code.as_deref(), params.state.as_deref())
        .await?;

    match service.validate().await? {
        ValidationResult::Valid(profile) => {
            println!("Signed in to {} as", credential.instance_host);
            print_profile(&profile);
            Ok(())
        }
        ValidationResult::Invalid => Err(format!(
            "{} issued a token but rejected it on verification; the session was removed",
            credential.instance_host
        )
        .into()),
        ValidationResult::NoCredential => Err(format!(
            "the session for {} was removed before it could be verified",
            credential.instance_host
        )
        .into()),
    }
}

/// Handle `fedauth status`.
pub async fn handle_status(service: &AuthService) -> CliResult {
    let instance = service
        .current_credential()?
        .map(|credential| credential.instance_host);

    match service.validate().await? {
        ValidationResult::Valid(profile) => {
            println!(
                "Signed in to {} as @{}",
                instance.unwrap_or_default(),
                profile.handle
            );
        }
        ValidationResult::Invalid => {
            println!(
                "Session for {} is no longer valid and was removed",
                instance.unwrap_or_default()
            );
        }
        ValidationResult::NoCredential => println!("Not signed in"),
    }
    Ok(())
}

/// Handle `fedauth whoami`.
pub fn handle_whoami(service: &AuthService) -> CliResult {
    match (service.current_credential()?, service.current_profile()?) {
        (Some(credential), Some(profile)) => {
            println!("{}", credential.instance_host);
            print_profile(&profile);
        }
        (Some(credential), None) => {
            println!(
                "Signed in to {} (profile not fetched yet; run `fedauth status`)",
                credential.instance_host
            );
        }
        (None, _) => println!("Not signed in"),
    }
    Ok(())
}

/// Handle `fedauth logout`.
pub fn handle_logout(service: &AuthService) -> CliResult {
    service.sign_out()?;
    println!("Signed out");
    Ok(())
}

fn print_profile(profile: &Profile) {
    println!("  {} (@{})", profile.display_name, profile.handle);
    if !profile.url.is_empty() {
        println!("  {}", profile.url);
    }
    println!(
        "  {} posts, {} followers, {} following",
        profile.post_count, profile.follower_count, profile.following_count
    );
    for field in &profile.custom_fields {
        let mark = if field.verified_at.is_some() { " (verified)" } else { "" };
        println!("  {}: {}{mark}", field.name, field.value);
    }
}
