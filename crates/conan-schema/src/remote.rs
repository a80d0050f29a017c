//! Remote servers hosting recipes and binaries.

use serde::{Deserialize, Serialize};

/// Login state of a remote.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteAuth {
    /// User name the client is logged in as (empty if anonymous).
    pub user_name: String,
    /// Whether the client holds a valid token for this remote.
    pub authenticated: bool,
}

/// A configured remote. The order of remotes is the search priority.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Remote {
    /// Remote name, e.g. `conancenter`.
    pub name: String,
    /// Server URL.
    pub url: String,
    /// Whether TLS certificates are verified.
    pub verify_ssl: bool,
    /// Disabled remotes are skipped by searches and installs.
    pub disabled: bool,
    /// Login state, if it was queried.
    #[serde(default)]
    pub auth: Option<RemoteAuth>,
}

impl Remote {
    /// An enabled, TLS-verifying remote.
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            verify_ssl: true,
            disabled: false,
            auth: None,
        }
    }

    /// Key used to group remotes living on the same server.
    ///
    /// Artifactory hosts many repositories under one host, so those group by
    /// `scheme://host`; every other remote is its own group keyed by URL.
    pub fn server_key(&self) -> String {
        if self.url.contains("artifactory") {
            self.url.split('/').take(3).collect::<Vec<_>>().join("/")
        } else {
            self.url.clone()
        }
    }
}

/// Return every remote in `remotes` that shares a server with `remote`,
/// in configuration order. Falls back to `[remote]` if it is not listed.
pub fn remotes_from_same_server(remotes: &[Remote], remote: &Remote) -> Vec<Remote> {
    if !remotes.contains(remote) {
        return vec![remote.clone()];
    }
    let key = remote.server_key();
    remotes
        .iter()
        .filter(|r| r.server_key() == key)
        .cloned()
        .collect()
}
