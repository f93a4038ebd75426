//! Sign-in, registration and session inspection.

use anyhow::{Result, anyhow, bail};

use parlor_client::{GuardDecision, auth_guard, guest_guard};
use parlor_types::api::{LoginRequest, RegisterRequest};

use crate::context::Context;
use crate::output::{print_kv, print_success, print_warning};

const PASSWORD_ENV: &str = "PARLOR_PASSWORD";
const PASSWORD_CONFIRM_ENV: &str = "PARLOR_PASSWORD_CONFIRM";

/// Environment first, so scripts never block on a prompt.
fn read_password(prompt: &str, env_keys: &[&str]) -> Result<String> {
    if let Some(password) = env_keys.iter().find_map(|key| std::env::var(key).ok()) {
        return Ok(password);
    }
    dialoguer::Password::new()
        .with_prompt(prompt)
        .interact()
        .map_err(|e| anyhow!("Input error: {}", e))
}

fn check_confirmation(password: &str, confirmation: &str) -> Result<()> {
    if password.is_empty() {
        bail!("Password must not be empty");
    }
    if password != confirmation {
        bail!("Passwords do not match");
    }
    Ok(())
}

/// Signed-in users are told so instead of being signed in twice.
fn already_signed_in(context: &Context) -> bool {
    match guest_guard(&context.session.state()) {
        GuardDecision::Allow => false,
        GuardDecision::Redirect { .. } => {
            let name = context.session.username().unwrap_or_default();
            print_warning(&format!(
                "Already signed in as {}; run `parlor logout` first",
                name
            ));
            true
        }
    }
}

pub async fn login(context: &Context, user_id: &str) -> Result<()> {
    if already_signed_in(context) {
        return Ok(());
    }

    let form = LoginRequest {
        user_id: user_id.to_string(),
        password: read_password("Password", &[PASSWORD_ENV])?,
    };
    let user = context
        .session
        .login_api(&form)
        .await
        .map_err(|e| anyhow!(e.auth_failure_message()))?;

    print_success(&format!("Signed in as {}", user.username));
    Ok(())
}

pub async fn register(context: &Context, user_id: &str, username: &str) -> Result<()> {
    if already_signed_in(context) {
        return Ok(());
    }

    let password = read_password("Password", &[PASSWORD_ENV])?;
    let confirmation = read_password("Confirm password", &[PASSWORD_CONFIRM_ENV, PASSWORD_ENV])?;
    check_confirmation(&password, &confirmation)?;

    let form = RegisterRequest {
        user_id: user_id.to_string(),
        username: username.to_string(),
        password,
    };
    let user = context
        .session
        .register_api(&form)
        .await
        .map_err(|e| anyhow!(e.auth_failure_message()))?;

    print_success(&format!("Registered and signed in as {}", user.username));
    Ok(())
}

pub async fn logout(context: &Context) -> Result<()> {
    match context.session.logout_api().await {
        Ok(()) => print_success("Signed out"),
        Err(e) => print_warning(&format!("Signed out locally; server said: {}", e)),
    }
    Ok(())
}

pub fn whoami(context: &Context) -> Result<()> {
    if let GuardDecision::Redirect { .. } = auth_guard(&context.session.state(), "whoami") {
        bail!("Not signed in");
    }

    let user = context
        .session
        .user()
        .ok_or_else(|| anyhow!("Not signed in"))?;
    print_kv("id", &user.id);
    print_kv("username", &user.username);
    print_kv("email", &user.email);
    if let Some(name) = context.session.full_name() {
        print_kv("name", &name);
    }
    print_kv("origin", context.config.origin.as_str());
    Ok(())
}
