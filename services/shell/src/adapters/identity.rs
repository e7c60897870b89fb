//! services/shell/src/adapters/identity.rs
//!
//! The identity provider adapter: e-mail/password accounts stored in PostgreSQL,
//! passwords hashed with argon2, login sessions kept as token rows. Auth state
//! changes are pushed to subscribers over a broadcast channel.
//!
//! The shell serves a single browser session, so the provider also remembers
//! which login session is current.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use folklore_core::domain::{AuthSession, Identity};
use folklore_core::ports::{
    auth_change_stream, AuthChange, AuthChangeStream, AuthEvent, IdentityProvider, PortError,
    PortResult, SignUpRequest, SignUpResponse,
};
use sqlx::{FromRow, PgPool};
use tokio::sync::{broadcast, RwLock};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::web::state::EmailConfirmation;

const MIN_PASSWORD_CHARS: usize = 6;
const INVALID_CREDENTIALS: &str = "Invalid login credentials";

//=========================================================================================
// Password and Token Helpers
//=========================================================================================

fn hash_password(password: &str) -> PortResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| {
            error!("Failed to hash password: {:?}", e);
            PortError::Unexpected("Failed to hash password".to_string())
        })
}

fn verify_password(password: &str, stored_hash: &str) -> PortResult<bool> {
    let parsed_hash = PasswordHash::new(stored_hash).map_err(|e| {
        error!("Failed to parse password hash: {:?}", e);
        PortError::Unexpected("Authentication error".to_string())
    })?;
    Ok(Argon2::default().verify_password(password.as_bytes(), &parsed_hash).is_ok())
}

fn new_token() -> String {
    format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple())
}

fn unexpected(e: sqlx::Error) -> PortError {
    PortError::Unexpected(e.to_string())
}

//=========================================================================================
// Database Records
//=========================================================================================

#[derive(FromRow)]
struct AccountRecord {
    id: Uuid,
    email: String,
    password_hash: String,
    confirmed_at: Option<DateTime<Utc>>,
}

#[derive(FromRow)]
struct PendingAccountRecord {
    id: Uuid,
    email: String,
    username: String,
}

#[derive(FromRow)]
struct SessionRecord {
    access_token: String,
    refresh_token: String,
    expires_at: DateTime<Utc>,
    user_id: Uuid,
    email: String,
}
impl SessionRecord {
    fn to_domain(self) -> AuthSession {
        AuthSession {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at: self.expires_at,
            user: Identity { id: self.user_id, email: self.email },
        }
    }
}

//=========================================================================================
// The Adapter
//=========================================================================================

pub struct PgIdentityProvider {
    pool: PgPool,
    session_ttl: Duration,
    current: RwLock<Option<AuthSession>>,
    events: broadcast::Sender<AuthChange>,
}

impl PgIdentityProvider {
    pub fn new(pool: PgPool, session_ttl: Duration) -> Self {
        let (events, _) = broadcast::channel(16);
        Self { pool, session_ttl, current: RwLock::new(None), events }
    }

    fn announce(&self, event: AuthEvent, session: Option<AuthSession>) {
        // Fails only when nobody is subscribed.
        let _ = self.events.send(AuthChange { event, session });
    }

    /// Picks up the newest unexpired login session left by a previous run.
    pub async fn restore(&self) -> PortResult<Option<AuthSession>> {
        let record = sqlx::query_as::<_, SessionRecord>(
            "SELECT s.access_token, s.refresh_token, s.expires_at, s.user_id, u.email \
             FROM auth_sessions s JOIN auth_users u ON u.id = s.user_id \
             WHERE s.expires_at > now() ORDER BY s.created_at DESC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?;
        let session = record.map(SessionRecord::to_domain);
        *self.current.write().await = session.clone();
        Ok(session)
    }

    /// Activates the account holding `token`, creates its profile from the
    /// username given at sign-up, and signs it in.
    pub async fn confirm_email(&self, token: &str) -> PortResult<AuthSession> {
        let mut tx = self.pool.begin().await.map_err(unexpected)?;

        let account = sqlx::query_as::<_, PendingAccountRecord>(
            "UPDATE auth_users SET confirmed_at = now(), confirmation_token = NULL \
             WHERE confirmation_token = $1 RETURNING id, email, username",
        )
        .bind(token)
        .fetch_optional(&mut *tx)
        .await
        .map_err(unexpected)?
        .ok_or_else(|| PortError::Rejected("Confirmation link is invalid or has expired".to_string()))?;

        let created = sqlx::query(
            "INSERT INTO profiles (id, username) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(account.id)
        .bind(&account.username)
        .execute(&mut *tx)
        .await
        .map_err(unexpected)?;
        if created.rows_affected() == 0 {
            warn!("Username {} already taken; account {} has no profile", account.username, account.id);
        }

        tx.commit().await.map_err(unexpected)?;
        info!("Account {} confirmed", account.id);

        self.open_session(Identity { id: account.id, email: account.email }).await
    }

    /// Rotates the current session's tokens. A session revoked or expired in
    /// the meantime is dropped and announced as a sign-out.
    pub async fn refresh_session(&self) -> PortResult<Option<AuthSession>> {
        let Some(current) = self.current.read().await.clone() else {
            return Ok(None);
        };

        let refreshed = AuthSession {
            access_token: new_token(),
            refresh_token: new_token(),
            expires_at: Utc::now() + self.session_ttl,
            user: current.user.clone(),
        };
        let result = sqlx::query(
            "UPDATE auth_sessions SET access_token = $1, refresh_token = $2, expires_at = $3 \
             WHERE refresh_token = $4 AND expires_at > now()",
        )
        .bind(&refreshed.access_token)
        .bind(&refreshed.refresh_token)
        .bind(refreshed.expires_at)
        .bind(&current.refresh_token)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;

        if result.rows_affected() == 0 {
            warn!("Session of {} is no longer valid", current.user.id);
            *self.current.write().await = None;
            self.announce(AuthEvent::SignedOut, None);
            return Ok(None);
        }

        *self.current.write().await = Some(refreshed.clone());
        self.announce(AuthEvent::TokenRefreshed, Some(refreshed.clone()));
        Ok(Some(refreshed))
    }

    async fn open_session(&self, user: Identity) -> PortResult<AuthSession> {
        let session = AuthSession {
            access_token: new_token(),
            refresh_token: new_token(),
            expires_at: Utc::now() + self.session_ttl,
            user,
        };
        sqlx::query(
            "INSERT INTO auth_sessions (access_token, refresh_token, user_id, expires_at) VALUES ($1, $2, $3, $4)",
        )
        .bind(&session.access_token)
        .bind(&session.refresh_token)
        .bind(session.user.id)
        .bind(session.expires_at)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;

        *self.current.write().await = Some(session.clone());
        self.announce(AuthEvent::SignedIn, Some(session.clone()));
        Ok(session)
    }
}

//=========================================================================================
// `IdentityProvider` Trait Implementation
//=========================================================================================

#[async_trait]
impl IdentityProvider for PgIdentityProvider {
    async fn get_session(&self) -> PortResult<Option<AuthSession>> {
        let current = self.current.read().await;
        Ok(current.as_ref().filter(|s| s.expires_at > Utc::now()).cloned())
    }

    fn subscribe(&self) -> AuthChangeStream {
        auth_change_stream(self.events.subscribe())
    }

    async fn sign_up(&self, request: SignUpRequest) -> PortResult<SignUpResponse> {
        let email = request.email.trim().to_lowercase();
        if email.is_empty() || !email.contains('@') {
            return Err(PortError::Rejected("Unable to validate email address".to_string()));
        }
        if request.password.chars().count() < MIN_PASSWORD_CHARS {
            return Err(PortError::Rejected(format!(
                "Password should be at least {} characters",
                MIN_PASSWORD_CHARS
            )));
        }

        let existing: Option<Uuid> = sqlx::query_scalar("SELECT id FROM auth_users WHERE email = $1")
            .bind(&email)
            .fetch_optional(&self.pool)
            .await
            .map_err(unexpected)?;
        if let Some(id) = existing {
            // A known address yields a user with no identities.
            return Ok(SignUpResponse { user: Some(Identity { id, email }), identities: Some(Vec::new()) });
        }

        let password_hash = hash_password(&request.password)?;
        let id = Uuid::new_v4();
        let token = new_token();
        sqlx::query(
            "INSERT INTO auth_users (id, email, password_hash, username, email_redirect_to, confirmation_token) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(id)
        .bind(&email)
        .bind(&password_hash)
        .bind(request.username.trim())
        .bind(&request.email_redirect_to)
        .bind(&token)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;

        info!(
            "Account {} created; confirm at {}/auth/confirm?token={}",
            id, request.email_redirect_to, token
        );
        Ok(SignUpResponse {
            user: Some(Identity { id, email }),
            identities: Some(vec!["email".to_string()]),
        })
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> PortResult<AuthSession> {
        let account = sqlx::query_as::<_, AccountRecord>(
            "SELECT id, email, password_hash, confirmed_at FROM auth_users WHERE email = $1",
        )
        .bind(email.trim().to_lowercase())
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?
        .ok_or_else(|| PortError::Rejected(INVALID_CREDENTIALS.to_string()))?;

        if !verify_password(password, &account.password_hash)? {
            return Err(PortError::Rejected(INVALID_CREDENTIALS.to_string()));
        }
        if account.confirmed_at.is_none() {
            return Err(PortError::Rejected("Email not confirmed".to_string()));
        }

        self.open_session(Identity { id: account.id, email: account.email }).await
    }

    async fn sign_out(&self) -> PortResult<()> {
        let previous = self.current.write().await.take();
        if let Some(session) = previous {
            sqlx::query("DELETE FROM auth_sessions WHERE access_token = $1")
                .bind(&session.access_token)
                .execute(&self.pool)
                .await
                .map_err(unexpected)?;
            info!("User {} signed out", session.user.id);
        }
        self.announce(AuthEvent::SignedOut, None);
        Ok(())
    }
}

#[async_trait]
impl EmailConfirmation for PgIdentityProvider {
    async fn confirm_email(&self, token: &str) -> PortResult<AuthSession> {
        PgIdentityProvider::confirm_email(self, token).await
    }
}
