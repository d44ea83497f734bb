//! Credential resolution.

use std::collections::HashMap;

use secrecy::{ExposeSecret, SecretString};

use super::endpoint::DeviceEndpoint;
use crate::error::CredentialError;

/// Supplies usernames and passwords the manifest leaves blank.
pub trait CredentialProvider: Send + Sync {
    /// Username for rows without one.
    fn default_username(&self) -> Option<String>;

    /// Login password for `username`, if one is known.
    fn password(&self, username: &str) -> Result<Option<SecretString>, CredentialError>;

    /// Enable secret for rows without one.
    fn enable_password(&self) -> Result<Option<SecretString>, CredentialError>;
}

/// Fixed credentials held in memory.
#[derive(Debug, Default)]
pub struct StaticCredentials {
    default_username: Option<String>,
    default_password: Option<SecretString>,
    passwords: HashMap<String, SecretString>,
    enable_password: Option<SecretString>,
}

impl StaticCredentials {
    /// Empty credentials; every lookup returns `None`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Username for rows without one.
    pub fn with_default_username(mut self, username: impl Into<String>) -> Self {
        self.default_username = Some(username.into());
        self
    }

    /// Password for users without their own entry.
    pub fn with_default_password(mut self, password: impl Into<String>) -> Self {
        self.default_password = Some(SecretString::from(password.into()));
        self
    }

    /// Password for `username`.
    pub fn with_password(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.passwords
            .insert(username.into(), SecretString::from(password.into()));
        self
    }

    /// Enable password for every device.
    pub fn with_enable_password(mut self, password: impl Into<String>) -> Self {
        self.enable_password = Some(SecretString::from(password.into()));
        self
    }
}

impl CredentialProvider for StaticCredentials {
    fn default_username(&self) -> Option<String> {
        self.default_username.clone()
    }

    fn password(&self, username: &str) -> Result<Option<SecretString>, CredentialError> {
        Ok(self
            .passwords
            .get(username)
            .or(self.default_password.as_ref())
            .map(copy_secret))
    }

    fn enable_password(&self) -> Result<Option<SecretString>, CredentialError> {
        Ok(self.enable_password.as_ref().map(copy_secret))
    }
}

/// Credentials for one device, row values first, provider second.
#[derive(Debug)]
pub struct Credentials {
    username: String,
    password: Option<SecretString>,
    enable_password: Option<SecretString>,
}

impl Credentials {
    /// Credentials for `username` with no secrets.
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: None,
            enable_password: None,
        }
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(SecretString::from(password.into()));
        self
    }

    pub fn with_enable_password(mut self, password: impl Into<String>) -> Self {
        self.enable_password = Some(SecretString::from(password.into()));
        self
    }

    /// Fill the endpoint's blanks from `provider`.
    ///
    /// The provider is only asked for what the endpoint does not carry.
    pub fn resolve<P>(endpoint: &DeviceEndpoint, provider: &P) -> Result<Self, CredentialError>
    where
        P: CredentialProvider + ?Sized,
    {
        let username = match endpoint.username() {
            Some(username) => username.to_string(),
            None => provider
                .default_username()
                .ok_or(CredentialError::MissingUsername)?,
        };

        let password = match endpoint.password() {
            Some(password) => Some(copy_secret(password)),
            None => provider.password(&username)?,
        };

        let enable_password = match endpoint.enable_password() {
            Some(password) => Some(copy_secret(password)),
            None => provider.enable_password()?,
        };

        Ok(Self {
            username,
            password,
            enable_password,
        })
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password(&self) -> Option<&SecretString> {
        self.password.as_ref()
    }

    pub fn enable_password(&self) -> Option<&SecretString> {
        self.enable_password.as_ref()
    }
}

fn copy_secret(secret: &SecretString) -> SecretString {
    SecretString::from(secret.expose_secret().to_string())
}
