//! Authentication commands.

use super::{describe_state, AuthContext};
use crate::output::{self, OutputFormat};
use anyhow::Result;
use chrono::Local;
use std::io::{self, Write};
use std::time::Duration;
use studyhub_auth::AuthError;
use tracing::debug;

/// Prompt for a non-empty line on stdin.
fn prompt_line(label: &str) -> Result<String> {
    print!("{}: ", label);
    io::stdout().flush()?;
    let mut value = String::new();
    io::stdin().read_line(&mut value)?;
    Ok(value.trim().to_string())
}

/// Render an auth failure the way the user should see it.
fn describe_failure(action: &str, error: &AuthError) -> String {
    match error {
        AuthError::InvalidCredentials(message) => format!("{} failed: {}", action, message),
        e if e.is_transient() => format!("{} failed, please try again: {}", action, e),
        e => format!("{} failed: {}", action, e),
    }
}

/// Login with email and password.
pub async fn login(ctx: &AuthContext, format: &OutputFormat) -> Result<()> {
    if let Some(principal) = ctx.runtime.auth_state().principal() {
        let who = principal
            .email()
            .or_else(|| principal.user_id())
            .unwrap_or("unknown");
        output::print_success(&format!("Already logged in as {}", who), format);
        return Ok(());
    }

    let email = prompt_line("Email")?;
    if email.is_empty() {
        output::print_error("Email is required", format);
        return Ok(());
    }

    // Prompt for password (hidden)
    let password = rpassword::prompt_password("Password: ")?;
    if password.is_empty() {
        output::print_error("Password is required", format);
        return Ok(());
    }

    println!("Logging in...");

    match ctx.runtime.sign_in(&email, &password).await {
        Ok(principal) => {
            let who = principal.email().unwrap_or(email.as_str());
            output::print_success(&format!("Logged in as {}", who), format);
        }
        Err(e) => output::print_error(&describe_failure("Login", &e), format),
    }

    Ok(())
}

/// Create an account with email and password.
pub async fn signup(ctx: &AuthContext, name: Option<String>, format: &OutputFormat) -> Result<()> {
    let email = prompt_line("Email")?;
    if email.is_empty() {
        output::print_error("Email is required", format);
        return Ok(());
    }

    let password = rpassword::prompt_password("Password: ")?;
    if password.is_empty() {
        output::print_error("Password is required", format);
        return Ok(());
    }
    let confirmation = rpassword::prompt_password("Confirm password: ")?;
    if confirmation != password {
        output::print_error("Passwords do not match", format);
        return Ok(());
    }

    let attributes = name.map(|name| serde_json::json!({ "name": name }));

    match ctx.runtime.sign_up(&email, &password, attributes).await {
        Ok(response) if response.session.is_some() => {
            output::print_success(&format!("Account created, logged in as {}", email), format);
        }
        Ok(response) => {
            let user_id = response.user().map(|u| u.id.as_str()).unwrap_or("unknown");
            debug!(user_id = %user_id, "Account pending confirmation");
            output::print_success(
                &format!(
                    "Account created for {}. Confirm your email, then run 'studyhub login'",
                    email
                ),
                format,
            );
        }
        Err(e) => output::print_error(&describe_failure("Sign-up", &e), format),
    }

    Ok(())
}

/// Logout and clear the stored session.
pub async fn logout(ctx: &AuthContext, format: &OutputFormat) -> Result<()> {
    ctx.runtime.sign_out().await;
    output::print_success("Logged out successfully", format);
    Ok(())
}

/// Check authentication status.
pub async fn status(ctx: &AuthContext, format: &OutputFormat) -> Result<()> {
    let snapshot = ctx.runtime.snapshot();

    match format {
        OutputFormat::Text => {
            output::print_row("Auth", &describe_state(&snapshot.state));
            if let Some(user_id) = &snapshot.user_id {
                output::print_row("User ID", user_id);
            }
            if let Some(expires_at) = snapshot.expires_at {
                let local = expires_at.with_timezone(&Local);
                output::print_row("Expires", &local.format("%Y-%m-%d %H:%M:%S").to_string());
            }
        }
        OutputFormat::Json => output::print_json(&snapshot),
    }

    Ok(())
}

/// Print a valid access credential for use in scripts.
pub async fn token(ctx: &AuthContext, format: &OutputFormat) -> Result<()> {
    let Some(token) = ctx.runtime.get_credential().await else {
        anyhow::bail!("Not logged in. Run 'studyhub login' first");
    };

    match format {
        OutputFormat::Text => println!("{}", token),
        OutputFormat::Json => output::print_json(&serde_json::json!({ "access_token": token })),
    }

    Ok(())
}

/// Print every auth state change until Ctrl-C.
pub async fn watch(ctx: &AuthContext, revocation_interval: u64, format: &OutputFormat) -> Result<()> {
    let revocation = ctx
        .client
        .watch_revocation(Duration::from_secs(revocation_interval.max(1)));
    let mut states = ctx.runtime.subscribe_state();

    let print_state = |format: &OutputFormat, state: &studyhub_auth::AuthState| match format {
        OutputFormat::Text => println!(
            "[{}] {}",
            Local::now().format("%H:%M:%S"),
            describe_state(state)
        ),
        OutputFormat::Json => match serde_json::to_string(state) {
            Ok(line) => println!("{}", line),
            Err(e) => eprintln!("Error: failed to encode state: {}", e),
        },
    };

    let current = states.borrow_and_update().clone();
    print_state(format, &current);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                debug!("Interrupted, stopping watch");
                break;
            }
            changed = states.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = states.borrow_and_update().clone();
                print_state(format, &state);
            }
        }
    }

    revocation.abort();
    Ok(())
}
