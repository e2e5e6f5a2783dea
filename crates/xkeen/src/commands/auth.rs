//! First-run setup, login and logout.

use std::sync::Arc;

use secrecy::{ExposeSecret, SecretString};
use xkeen_config::Config;
use xkeen_core::{CredentialStore, MIN_PASSWORD_LEN, Session, TotpEnrollment};

use crate::cli::{GlobalOpts, LoginArgs, SetupArgs};
use crate::config::Context;
use crate::error::CliError;
use crate::output::{Output, detail_lines};

use super::{core_error, util};

pub async fn setup(ctx: Context, args: SetupArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let Context {
        profile,
        settings,
        session: session_config,
        credentials,
        mut file,
    } = ctx;

    let url = session_config.url.to_string();
    let store: Arc<dyn CredentialStore> = credentials.clone();
    let session = Session::new(session_config, store).map_err(|e| core_error(e, &profile))?;

    let result = enroll(&session, &url, args, global).await;
    session.close();
    let username = result?;

    remember_profile(&mut file, &profile, settings.panel, &username, global.insecure)?;
    util::notice(
        &format!("Panel {url} is set up, logged in as {username} (profile '{profile}')"),
        global.quiet,
    );
    Ok(())
}

/// Create the account, show the TOTP secret, and confirm it with a code.
async fn enroll(session: &Session, url: &str, args: SetupArgs, global: &GlobalOpts) -> Result<String, CliError> {
    if !session.auth_status().await?.setup_required {
        return Err(CliError::AlreadySetUp { url: url.to_owned() });
    }

    let username = match args.username {
        Some(username) => username,
        None => dialoguer::Input::<String>::new()
            .with_prompt("Username")
            .default("admin".into())
            .interact_text()?,
    };
    let password = match args.password {
        Some(password) => SecretString::from(password),
        None => new_password()?,
    };

    let enrollment = session.setup(&username, &password).await?;
    show_enrollment(&enrollment, username.trim(), global)?;

    let code = match args.code {
        Some(code) => code,
        None => dialoguer::Input::<String>::new()
            .with_prompt("Code from the authenticator")
            .interact_text()?,
    };
    session.confirm_setup(&code).await?;
    Ok(username.trim().to_owned())
}

fn new_password() -> Result<SecretString, CliError> {
    let password = rpassword::prompt_password(format!("Password (min {MIN_PASSWORD_LEN} characters): "))?;
    let again = rpassword::prompt_password("Repeat password: ")?;
    if password != again {
        return Err(CliError::Validation {
            field: "password".into(),
            reason: "the passwords do not match".into(),
        });
    }
    Ok(SecretString::from(password))
}

fn show_enrollment(enrollment: &TotpEnrollment, username: &str, global: &GlobalOpts) -> Result<(), CliError> {
    let uri = enrollment
        .otpauth_uri(username)
        .map_err(|e| CliError::Internal {
            message: format!("cannot build the enrollment link: {e}"),
        })?
        .to_string();
    let secret = enrollment.totp_secret.expose_secret();

    Output::new(global).single(
        &serde_json::json!({ "totp_secret": secret, "otpauth_uri": &uri }),
        |_| {
            format!(
                "Add this account to an authenticator app:\n{}",
                detail_lines(&[("Secret", secret.to_owned()), ("Link", uri.clone())])
            )
        },
        |_| secret.to_owned(),
    );
    Ok(())
}

pub async fn login(ctx: Context, args: LoginArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let Context {
        profile,
        settings,
        session: session_config,
        credentials,
        mut file,
    } = ctx;

    let url = session_config.url.to_string();
    let store: Arc<dyn CredentialStore> = credentials.clone();
    let session = Session::new(session_config, store).map_err(|e| core_error(e, &profile))?;

    if session.auth_status().await.map_err(|e| core_error(e, &profile))?.setup_required {
        session.close();
        return Err(CliError::SetupRequired { url });
    }

    let username = match args.username {
        Some(username) => username,
        None => {
            let mut prompt = dialoguer::Input::<String>::new().with_prompt("Username");
            if let Some(ref saved) = settings.username {
                prompt = prompt.default(saved.clone());
            }
            prompt.interact_text()?
        }
    };
    let password = match args.password {
        Some(password) => SecretString::from(password),
        None => SecretString::from(rpassword::prompt_password("Password: ")?),
    };
    let totp = match args.totp {
        Some(code) => code,
        None => dialoguer::Input::<String>::new()
            .with_prompt("TOTP code")
            .allow_empty(true)
            .interact_text()?,
    };

    let result = session.login(&username, &password, totp.trim()).await;
    session.close();
    result.map_err(|e| core_error(e, &profile))?;

    remember_profile(&mut file, &profile, settings.panel, &username, global.insecure)?;
    util::notice(&format!("Logged in to {url} as {username} (profile '{profile}')"), global.quiet);
    if !credentials.is_persistent() {
        util::notice("Keyring unavailable: the token is kept for this run only", global.quiet);
    }
    Ok(())
}

/// Save the panel and username under `profile`, making it the default
/// when none is set yet.
fn remember_profile(
    file: &mut Config,
    profile: &str,
    panel: String,
    username: &str,
    insecure: bool,
) -> Result<(), CliError> {
    let entry = file.profiles.entry(profile.to_owned()).or_default();
    entry.panel = panel;
    entry.username = Some(username.to_owned());
    if insecure {
        entry.insecure = Some(true);
    }
    if file.default_profile.is_none() {
        file.default_profile = Some(profile.to_owned());
    }
    xkeen_config::save_config(file)?;
    Ok(())
}

pub fn logout(ctx: &Context, global: &GlobalOpts) {
    if !ctx.credentials.is_present() {
        util::notice(&format!("Profile '{}' is not logged in", ctx.profile), global.quiet);
        return;
    }
    ctx.credentials.clear();
    util::notice(&format!("Logged out of profile '{}'", ctx.profile), global.quiet);
}
