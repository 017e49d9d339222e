use crate::auth::MongoAuthenticationService;
use crate::config::PasswordAuthConfig;
use crate::error::NoSqlError;
use crate::security::build_scram_credential;
use mongodb::options::Credential;
use zeroize::Zeroizing;

/// Authenticates with a password taken from configuration.
#[derive(Clone)]
pub struct PasswordMongoAuthentication {
    username: String,
    auth_source: Option<String>,
    password: Zeroizing<String>,
}

impl PasswordMongoAuthentication {
    /// Creates the strategy.
    ///
    /// # Errors
    /// Returns an invalid argument error if the password is empty.
    pub fn new(
        username: impl Into<String>,
        auth_source: Option<String>,
        password: Zeroizing<String>,
    ) -> crate::Result<Self> {
        if password.is_empty() {
            return Err(NoSqlError::invalid_argument("Null or empty password"));
        }

        Ok(Self {
            username: username.into(),
            auth_source,
            password,
        })
    }

    pub(crate) fn from_config(config: &PasswordAuthConfig) -> crate::Result<Self> {
        Self::new(
            config.username.clone(),
            config.auth_source.clone(),
            config.password.clone(),
        )
    }
}

impl MongoAuthenticationService for PasswordMongoAuthentication {
    fn read_credentials(&self) -> crate::Result<Credential> {
        let mut buffer = Zeroizing::new(self.password.as_bytes().to_vec());
        build_scram_credential(&self.username, self.auth_source.as_deref(), &mut buffer)
    }

    fn username(&self) -> &str {
        &self.username
    }

    fn strategy_name(&self) -> &'static str {
        "password"
    }
}

impl std::fmt::Debug for PasswordMongoAuthentication {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PasswordMongoAuthentication")
            .field("username", &self.username)
            .field("auth_source", &self.auth_source)
            .field("password", &"****")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::options::AuthMechanism;

    #[test]
    fn test_empty_password_rejected() {
        let error =
            PasswordMongoAuthentication::new("admin", None, Zeroizing::new(String::new()))
                .unwrap_err();
        assert_eq!(error.to_string(), "Invalid argument: Null or empty password");
    }

    #[test]
    fn test_credential_built_from_password() {
        let service = PasswordMongoAuthentication::new(
            "admin",
            Some("admin".to_string()),
            Zeroizing::new("opensilex".to_string()),
        )
        .unwrap();

        let credential = service.read_credentials().unwrap();
        assert_eq!(credential.username.as_deref(), Some("admin"));
        assert_eq!(credential.password.as_deref(), Some("opensilex"));
        assert_eq!(credential.source.as_deref(), Some("admin"));
        assert_eq!(credential.mechanism, Some(AuthMechanism::ScramSha256));
    }

    #[test]
    fn test_debug_redacts_password() {
        let service =
            PasswordMongoAuthentication::new("admin", None, Zeroizing::new("hunter2".to_string()))
                .unwrap();
        assert!(!format!("{service:?}").contains("hunter2"));
    }
}
