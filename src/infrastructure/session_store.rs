use crate::domain::models::UserData;
use crate::infrastructure::error::InfraError;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Explicit session-store object: populated after the login code
/// exchange, read at process start to restore a session, cleared on
/// logout. Exactly one JSON blob under one namespaced key.
pub trait SessionStore: Send + Sync {
    fn save_user(&self, user: &UserData) -> Result<(), InfraError>;
    fn load_user(&self) -> Result<Option<UserData>, InfraError>;
    fn clear(&self) -> Result<(), InfraError>;
}

/// Default backend: the UserData blob carries the API token, so it goes
/// to the platform keyring.
#[derive(Debug, Clone)]
pub struct KeyringSessionStore {
    service_name: String,
    account_name: String,
}

impl KeyringSessionStore {
    pub fn new(service_name: impl Into<String>, account_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            account_name: account_name.into(),
        }
    }

    fn entry(&self) -> Result<keyring::Entry, InfraError> {
        keyring::Entry::new(&self.service_name, &self.account_name)
            .map_err(|error| InfraError::Credential(error.to_string()))
    }
}

impl Default for KeyringSessionStore {
    fn default() -> Self {
        Self::new("habitus.session", "userData")
    }
}

impl SessionStore for KeyringSessionStore {
    fn save_user(&self, user: &UserData) -> Result<(), InfraError> {
        let payload =
            serde_json::to_string(user).map_err(|error| InfraError::Credential(error.to_string()))?;
        self.entry()?
            .set_password(&payload)
            .map_err(|error| InfraError::Credential(error.to_string()))
    }

    fn load_user(&self) -> Result<Option<UserData>, InfraError> {
        let payload = match self.entry()?.get_password() {
            Ok(value) => value,
            Err(keyring::Error::NoEntry) => return Ok(None),
            Err(error) => return Err(InfraError::Credential(error.to_string())),
        };

        let user = serde_json::from_str::<UserData>(&payload)
            .map_err(|error| InfraError::Credential(error.to_string()))?;
        Ok(Some(user))
    }

    fn clear(&self) -> Result<(), InfraError> {
        match self.entry()?.delete_credential() {
            Ok(_) => Ok(()),
            Err(keyring::Error::NoEntry) => Ok(()),
            Err(error) => Err(InfraError::Credential(error.to_string())),
        }
    }
}

/// File backend: `state/userData.json`, the local-storage analog for
/// environments without a keyring service.
#[derive(Debug, Clone)]
pub struct JsonFileSessionStore {
    path: PathBuf,
}

impl JsonFileSessionStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl SessionStore for JsonFileSessionStore {
    fn save_user(&self, user: &UserData) -> Result<(), InfraError> {
        let formatted = serde_json::to_string_pretty(user)?;
        fs::write(&self.path, format!("{formatted}\n"))?;
        Ok(())
    }

    fn load_user(&self) -> Result<Option<UserData>, InfraError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(value) => value,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(error) => return Err(error.into()),
        };
        let user = serde_json::from_str::<UserData>(&raw)?;
        Ok(Some(user))
    }

    fn clear(&self) -> Result<(), InfraError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(error) => Err(error.into()),
        }
    }
}

#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    user: Mutex<Option<UserData>>,
}

impl SessionStore for InMemorySessionStore {
    fn save_user(&self, user: &UserData) -> Result<(), InfraError> {
        let mut guard = self
            .user
            .lock()
            .map_err(|error| InfraError::Credential(format!("in-memory lock poisoned: {error}")))?;
        *guard = Some(user.clone());
        Ok(())
    }

    fn load_user(&self) -> Result<Option<UserData>, InfraError> {
        let guard = self
            .user
            .lock()
            .map_err(|error| InfraError::Credential(format!("in-memory lock poisoned: {error}")))?;
        Ok(guard.clone())
    }

    fn clear(&self) -> Result<(), InfraError> {
        let mut guard = self
            .user
            .lock()
            .map_err(|error| InfraError::Credential(format!("in-memory lock poisoned: {error}")))?;
        *guard = None;
        Ok(())
    }
}
