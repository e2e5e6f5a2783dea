//! Profile resolution: config file, selected profile, and flag overrides.

use std::sync::Arc;

use xkeen_config::{Config, KeyringCredentialStore, Profile, profile_to_session_config};
use xkeen_core::SessionConfig;

use crate::cli::GlobalOpts;
use crate::error::CliError;

/// Everything a command needs to talk to one panel.
pub struct Context {
    /// Name of the active profile.
    pub profile: String,
    /// The profile after `--panel`, `--insecure` and `--timeout`.
    pub settings: Profile,
    pub session: SessionConfig,
    pub credentials: Arc<KeyringCredentialStore>,
    /// The loaded config file, kept so `login` can write the profile back.
    pub file: Config,
}

/// Resolve the active profile and build its session configuration.
///
/// `--panel` works without a saved profile; otherwise the profile must
/// exist in the config file.
pub fn resolve(global: &GlobalOpts) -> Result<Context, CliError> {
    let file = xkeen_config::load_config_or_default();
    let profile_name = file.active_profile_name(global.profile.as_deref());

    let mut settings = match (file.profiles.get(&profile_name), &global.panel) {
        (Some(profile), _) => profile.clone(),
        (None, Some(_)) => Profile::default(),
        (None, None) if global.profile.is_some() => {
            let mut available: Vec<&str> = file.profiles.keys().map(String::as_str).collect();
            available.sort_unstable();
            return Err(CliError::ProfileNotFound {
                name: profile_name,
                available: if available.is_empty() {
                    "(none)".into()
                } else {
                    available.join(", ")
                },
            });
        }
        (None, None) => {
            return Err(CliError::NoConfig {
                path: xkeen_config::config_path().display().to_string(),
            });
        }
    };

    apply_overrides(&mut settings, global);
    let session = profile_to_session_config(&settings, &file.defaults)?;
    let credentials = Arc::new(KeyringCredentialStore::for_profile(&profile_name));

    Ok(Context {
        profile: profile_name,
        settings,
        session,
        credentials,
        file,
    })
}

fn apply_overrides(profile: &mut Profile, global: &GlobalOpts) {
    if let Some(ref panel) = global.panel {
        profile.panel.clone_from(panel);
    }
    if global.insecure {
        profile.insecure = Some(true);
    }
    if let Some(timeout) = global.timeout {
        profile.timeout = Some(timeout);
    }
}
