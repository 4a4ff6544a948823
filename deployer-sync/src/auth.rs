//! Transport authentication for clone and fetch.

use deployer_core::Credentials;
use git2::{Cred, CredentialType, FetchOptions, RemoteCallbacks};

/// libgit2 re-invokes the credential callback after every rejected attempt.
const MAX_AUTH_ATTEMPTS: usize = 3;

/// Build remote callbacks that answer credential requests from `credentials`.
///
/// SSH requests use the configured private key (and passphrase) when one is
/// set, the SSH agent otherwise. Other transports get the default credential.
pub fn remote_callbacks(credentials: &Credentials) -> RemoteCallbacks<'static> {
    let credentials = credentials.clone();
    let mut attempts = 0usize;
    let mut callbacks = RemoteCallbacks::new();
    callbacks.credentials(move |url, username_from_url, allowed| {
        attempts += 1;
        if attempts > MAX_AUTH_ATTEMPTS {
            return Err(git2::Error::from_str(&format!(
                "authentication failed for {url} after {MAX_AUTH_ATTEMPTS} attempts"
            )));
        }

        let username = username_from_url.unwrap_or("git");
        if allowed.contains(CredentialType::SSH_KEY) {
            return match &credentials.private_key {
                Some(key) => Cred::ssh_key(username, None, key, credentials.passphrase.as_deref()),
                None => Cred::ssh_key_from_agent(username),
            };
        }
        if allowed.contains(CredentialType::USERNAME) {
            return Cred::username(username);
        }
        Cred::default()
    });
    callbacks
}

/// Fetch options carrying [`remote_callbacks`].
pub fn fetch_options(credentials: &Credentials) -> FetchOptions<'static> {
    let mut options = FetchOptions::new();
    options.remote_callbacks(remote_callbacks(credentials));
    options
}
