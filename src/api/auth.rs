use std::sync::{Arc, PoisonError, RwLock};
use tracing::info;
use crate::api::ClinicalApi;
use crate::clinical::AuthToken;
use crate::config::AuthConfig;
use crate::error::{ClientError, EmberError};

#[derive(Debug, Default)]
struct Credential {
    token: Option<String>,
    role: Option<String>,
}

/// Credential context for one client session.
///
/// Owned by the caller and handed to the REST client and the stream
/// ingestor. Clones share the same credential.
#[derive(Debug, Clone, Default)]
pub struct Session {
    credential: Arc<RwLock<Credential>>,
}

impl Session {
    pub fn new() -> Self {
        Session::default()
    }

    pub fn with_token(token: impl Into<String>) -> Self {
        let session = Session::new();
        session.set_token(token);
        session
    }

    /// Log in and keep the returned credential
    pub async fn login(
        &self,
        api: &dyn ClinicalApi,
        username: &str,
        password: &str,
    ) -> Result<AuthToken, ClientError> {
        let token = api.login(username, password).await?;

        let mut credential = self.credential.write().unwrap_or_else(PoisonError::into_inner);
        credential.token = Some(token.access_token.clone());
        credential.role = Some(token.role.clone());
        info!(username, role = %token.role, "logged in");

        Ok(token)
    }

    /// Obtain the startup credential.
    ///
    /// An explicit token wins; otherwise the configured credentials are used
    /// to log in. Having neither is fatal, as is a failed login.
    pub async fn establish(
        &self,
        api: &dyn ClinicalApi,
        token: Option<String>,
        credentials: Option<&AuthConfig>,
    ) -> Result<(), EmberError> {
        match (token, credentials) {
            (Some(token), _) => {
                self.set_token(token);
                Ok(())
            }
            (None, Some(auth)) => self
                .login(api, &auth.username, &auth.password)
                .await
                .map(|_| ())
                .map_err(EmberError::Auth),
            (None, None) => Err(EmberError::MissingCredential),
        }
    }

    pub fn token(&self) -> Option<String> {
        self.credential
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .token
            .clone()
    }

    pub fn role(&self) -> Option<String> {
        self.credential
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .role
            .clone()
    }

    pub fn set_token(&self, token: impl Into<String>) {
        self.credential.write().unwrap_or_else(PoisonError::into_inner).token = Some(token.into());
    }

    pub fn clear_token(&self) {
        let mut credential = self.credential.write().unwrap_or_else(PoisonError::into_inner);
        credential.token = None;
        credential.role = None;
    }
}
