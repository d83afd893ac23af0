use crate::domain::models::UserData;
use crate::infrastructure::api_client::AuthGateway;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::session_store::SessionStore;
use std::sync::Arc;

/// Login lifecycle around the GitHub code exchange: populate the
/// session store after the exchange, restore it at process start,
/// clear it on logout. Consumers receive this by reference instead of
/// touching ambient global state.
pub struct SessionManager<S, C>
where
    S: SessionStore + ?Sized,
    C: AuthGateway + ?Sized,
{
    session_store: Arc<S>,
    auth_gateway: Arc<C>,
}

impl<S, C> SessionManager<S, C>
where
    S: SessionStore + ?Sized,
    C: AuthGateway + ?Sized,
{
    pub fn new(session_store: Arc<S>, auth_gateway: Arc<C>) -> Self {
        Self {
            session_store,
            auth_gateway,
        }
    }

    /// The URL the user opens in a browser to authorize with GitHub.
    pub async fn login_url(&self) -> Result<String, InfraError> {
        self.auth_gateway.login_redirect().await
    }

    /// Exchanges the OAuth code for the account identity and persists
    /// it as the current session.
    pub async fn authenticate_with_code(&self, code: &str) -> Result<UserData, InfraError> {
        if code.trim().is_empty() {
            return Err(InfraError::Auth(
                "authorization code must not be empty".to_string(),
            ));
        }
        let user = self.auth_gateway.exchange_code(code.trim()).await?;
        self.session_store.save_user(&user)?;
        Ok(user)
    }

    /// The restored session, if one was persisted by a previous login.
    pub fn current_user(&self) -> Result<Option<UserData>, InfraError> {
        self.session_store.load_user()
    }

    /// Gate for protected operations: an absent session never reaches
    /// protected content.
    pub fn require_user(&self) -> Result<UserData, InfraError> {
        self.current_user()?
            .ok_or_else(|| InfraError::Auth("not logged in; run `habitus login` first".to_string()))
    }

    pub fn logout(&self) -> Result<(), InfraError> {
        self.session_store.clear()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::session_store::InMemorySessionStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Default)]
    struct FakeAuthGateway {
        exchange_calls: AtomicUsize,
        reject_exchange: bool,
    }

    #[async_trait]
    impl AuthGateway for FakeAuthGateway {
        async fn login_redirect(&self) -> Result<String, InfraError> {
            Ok("https://github.com/login/oauth/authorize?client_id=habitus".to_string())
        }

        async fn exchange_code(&self, code: &str) -> Result<UserData, InfraError> {
            self.exchange_calls.fetch_add(1, Ordering::SeqCst);
            if self.reject_exchange {
                return Err(InfraError::Api {
                    status: 401,
                    message: "bad code".to_string(),
                });
            }
            Ok(UserData {
                id: format!("gh-{code}"),
                name: "Ada".to_string(),
                avatar_url: "https://avatars.example/ada".to_string(),
                token: "tok-abc".to_string(),
            })
        }
    }

    fn manager(
        gateway: FakeAuthGateway,
    ) -> (
        SessionManager<InMemorySessionStore, FakeAuthGateway>,
        Arc<InMemorySessionStore>,
        Arc<FakeAuthGateway>,
    ) {
        let store = Arc::new(InMemorySessionStore::default());
        let gateway = Arc::new(gateway);
        (
            SessionManager::new(Arc::clone(&store), Arc::clone(&gateway)),
            store,
            gateway,
        )
    }

    #[tokio::test]
    async fn code_exchange_persists_the_session() {
        let (manager, store, gateway) = manager(FakeAuthGateway::default());

        let user = manager
            .authenticate_with_code("  code-1  ")
            .await
            .expect("authenticate");
        assert_eq!(user.id, "gh-code-1");
        assert_eq!(gateway.exchange_calls.load(Ordering::SeqCst), 1);

        let restored = store.load_user().expect("load").expect("session stored");
        assert_eq!(restored, user);
        assert_eq!(manager.require_user().expect("require"), restored);
    }

    #[tokio::test]
    async fn empty_code_is_rejected_without_a_request() {
        let (manager, _store, gateway) = manager(FakeAuthGateway::default());
        assert!(manager.authenticate_with_code("   ").await.is_err());
        assert_eq!(gateway.exchange_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn rejected_exchange_leaves_no_session_behind() {
        let (manager, store, _gateway) = manager(FakeAuthGateway {
            reject_exchange: true,
            ..FakeAuthGateway::default()
        });
        assert!(manager.authenticate_with_code("code-1").await.is_err());
        assert!(store.load_user().expect("load").is_none());
    }

    #[test]
    fn absent_session_never_reaches_protected_content() {
        let (manager, _store, _gateway) = manager(FakeAuthGateway::default());
        assert!(manager.current_user().expect("load").is_none());
        assert!(matches!(manager.require_user(), Err(InfraError::Auth(_))));
    }

    #[tokio::test]
    async fn logout_clears_the_restored_session() {
        let (manager, _store, _gateway) = manager(FakeAuthGateway::default());
        manager
            .authenticate_with_code("code-1")
            .await
            .expect("authenticate");
        manager.logout().expect("logout");
        assert!(matches!(manager.require_user(), Err(InfraError::Auth(_))));
    }
}
