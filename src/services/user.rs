//! User service
//!
//! Customer registration, password login with an optional 2FA step,
//! session handling and staff administration. Granting or revoking the
//! admin and super admin roles is reserved for super admins.

use crate::db::repositories::{SessionRepository, UserRepository};
use crate::models::{CreateUserInput, Session, UpdateUserInput, User, UserRole, UserStatus};
use crate::services::password::{check_password_policy, hash_password, verify_password};
use crate::services::random::random_hex;
use crate::services::rate_limiter::LoginRateLimiter;
use crate::services::two_factor::{TwoFactorError, TwoFactorService};
use anyhow::Context;
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::sync::Arc;

const DEFAULT_SESSION_DAYS: i64 = 7;
const SESSION_TOKEN_BYTES: usize = 32;

#[derive(Debug, thiserror::Error)]
pub enum UserServiceError {
    #[error("Fel e-postadress eller lösenord")]
    InvalidCredentials,

    #[error("Kontot är spärrat. Kontakta oss för hjälp.")]
    AccountBanned,

    #[error("E-postadressen {0} är redan registrerad")]
    EmailTaken(String),

    #[error("Användaren hittades inte: {0}")]
    NotFound(i64),

    #[error("{0}")]
    Forbidden(&'static str),

    #[error("För många inloggningsförsök. Försök igen om en stund.")]
    RateLimited,

    #[error("{field}: {message}")]
    ValidationError { field: &'static str, message: String },

    #[error(transparent)]
    TwoFactor(#[from] TwoFactorError),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

impl UserServiceError {
    fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        Self::ValidationError { field, message: message.into() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegisterInput {
    pub email: String,
    pub password: String,
    pub display_name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginInput {
    pub email: String,
    pub password: String,
}

/// Result of the password step
#[derive(Debug, Clone)]
pub enum LoginOutcome {
    Authenticated { user: User, session: Session },
    /// Password accepted; finish with the challenge and a 2FA code
    TwoFactorRequired { challenge: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct UserList {
    pub users: Vec<User>,
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
}

pub struct UserService {
    users: Arc<dyn UserRepository>,
    sessions: Arc<dyn SessionRepository>,
    two_factor: Arc<TwoFactorService>,
    limiter: Arc<LoginRateLimiter>,
    session_days: i64,
}

impl UserService {
    pub fn new(
        users: Arc<dyn UserRepository>,
        sessions: Arc<dyn SessionRepository>,
        two_factor: Arc<TwoFactorService>,
        limiter: Arc<LoginRateLimiter>,
    ) -> Self {
        Self {
            users,
            sessions,
            two_factor,
            limiter,
            session_days: DEFAULT_SESSION_DAYS,
        }
    }

    pub fn with_session_days(mut self, days: i64) -> Self {
        self.session_days = days.max(1);
        self
    }

    /// Storefront sign-up. On an empty database the first account becomes
    /// the super admin so the site can be bootstrapped.
    pub async fn register(&self, input: RegisterInput) -> Result<User, UserServiceError> {
        let is_first = self.users.count().await.context("Failed to count users")? == 0;
        let role = if is_first { UserRole::SuperAdmin } else { UserRole::Customer };

        let user = self
            .insert_user(CreateUserInput {
                email: input.email,
                password: input.password,
                display_name: input.display_name,
                role: Some(role),
            })
            .await?;

        tracing::info!(user_id = user.id, role = %user.role, "User registered");
        Ok(user)
    }

    /// Password step of the login. Limits apply per email and per client IP.
    pub async fn login(&self, input: LoginInput, ip: Option<IpAddr>) -> Result<LoginOutcome, UserServiceError> {
        let email = normalize_email(&input.email);

        if let Some(ip) = ip {
            if self.limiter.is_ip_limited(ip).await {
                return Err(UserServiceError::RateLimited);
            }
            self.limiter.record_ip_request(ip).await;
        }
        if self.limiter.is_email_limited(&email).await {
            return Err(UserServiceError::RateLimited);
        }

        let user = match self.users.get_by_email(&email).await.context("Failed to get user")? {
            Some(user) if verify_password(&input.password, &user.password_hash).context("Failed to verify password")? => user,
            _ => {
                self.limiter.record_failed_attempt(&email).await;
                tracing::info!(email = %email, "Failed login");
                return Err(UserServiceError::InvalidCredentials);
            }
        };

        if user.is_banned() {
            return Err(UserServiceError::AccountBanned);
        }
        self.limiter.clear_email_attempts(&email).await;

        if user.two_factor_enabled {
            let challenge = self.two_factor.issue_challenge(user.id)?;
            return Ok(LoginOutcome::TwoFactorRequired { challenge });
        }

        let session = self.start_session(&user).await?;
        Ok(LoginOutcome::Authenticated { user, session })
    }

    /// Second login step for accounts with 2FA. Wrong codes count per user,
    /// requests count per client IP like the password step.
    pub async fn complete_two_factor_login(
        &self,
        challenge: &str,
        code: &str,
        ip: Option<IpAddr>,
    ) -> Result<(User, Session), UserServiceError> {
        if let Some(ip) = ip {
            if self.limiter.is_ip_limited(ip).await {
                return Err(UserServiceError::RateLimited);
            }
            self.limiter.record_ip_request(ip).await;
        }

        let user_id = self.two_factor.verify_challenge(challenge)?;
        if self.limiter.is_two_factor_limited(user_id).await {
            return Err(UserServiceError::RateLimited);
        }

        let user = match self.two_factor.complete_login(challenge, code).await {
            Ok(user) => user,
            Err(TwoFactorError::InvalidCode) => {
                self.limiter.record_two_factor_failure(user_id).await;
                tracing::info!(user_id, "Failed 2FA login step");
                return Err(TwoFactorError::InvalidCode.into());
            }
            Err(e) => return Err(e.into()),
        };
        self.limiter.clear_two_factor_attempts(user_id).await;

        let session = self.start_session(&user).await?;
        Ok((user, session))
    }

    pub async fn logout(&self, session_id: &str) -> Result<(), UserServiceError> {
        self.sessions.delete(session_id).await.context("Failed to delete session")?;
        Ok(())
    }

    /// The user behind a live session. Expired sessions are removed;
    /// banned users get no user back.
    pub async fn validate_session(&self, token: &str) -> Result<Option<User>, UserServiceError> {
        let Some(session) = self.sessions.get_by_id(token).await.context("Failed to get session")? else {
            return Ok(None);
        };

        if session.is_expired() {
            let _ = self.sessions.delete(token).await;
            return Ok(None);
        }

        let user = self.users.get_by_id(session.user_id).await.context("Failed to get user")?;
        Ok(user.filter(|u| u.is_active()))
    }

    pub async fn cleanup_expired_sessions(&self) -> Result<i64, UserServiceError> {
        self.limiter.cleanup().await;
        Ok(self.sessions.delete_expired().await.context("Failed to delete expired sessions")?)
    }

    pub async fn get_by_id(&self, id: i64) -> Result<User, UserServiceError> {
        self.users
            .get_by_id(id)
            .await
            .context("Failed to get user")?
            .ok_or(UserServiceError::NotFound(id))
    }

    /// Self-service profile change
    pub async fn update_profile(&self, user: &User, display_name: &str) -> Result<User, UserServiceError> {
        let display_name = validate_display_name(display_name)?;
        Ok(self
            .users
            .update(&User { display_name, ..user.clone() })
            .await
            .context("Failed to update user")?)
    }

    pub async fn change_password(&self, user: &User, current: &str, new: &str) -> Result<(), UserServiceError> {
        if !verify_password(current, &user.password_hash).context("Failed to verify password")? {
            return Err(UserServiceError::invalid("current_password", "Nuvarande lösenord stämmer inte"));
        }
        check_password_policy(new).map_err(|m| UserServiceError::invalid("password", m))?;

        let password_hash = hash_password(new).context("Failed to hash password")?;
        self.users
            .update(&User { password_hash, ..user.clone() })
            .await
            .context("Failed to update password")?;
        Ok(())
    }

    // ========================================================================
    // Administration
    // ========================================================================

    pub async fn list(&self, page: i64, per_page: i64, role: Option<UserRole>) -> Result<UserList, UserServiceError> {
        let page = page.max(1);
        let per_page = per_page.clamp(1, 100);
        let (users, total) = self.users.list(page, per_page, role).await.context("Failed to list users")?;
        Ok(UserList { users, total, page, per_page })
    }

    pub async fn create_user(&self, actor: &User, input: CreateUserInput) -> Result<User, UserServiceError> {
        let role = input.role.unwrap_or_default();
        ensure_may_assign(actor, role)?;

        let user = self.insert_user(input).await?;
        tracing::info!(actor_id = actor.id, user_id = user.id, role = %user.role, "User created");
        Ok(user)
    }

    pub async fn update_user(&self, actor: &User, id: i64, input: UpdateUserInput) -> Result<User, UserServiceError> {
        let mut user = self.get_by_id(id).await?;
        if user.role.is_elevated() && actor.role != UserRole::SuperAdmin {
            return Err(UserServiceError::Forbidden("Endast superadministratörer kan ändra administratörer"));
        }

        if let Some(email) = input.email {
            let email = validate_email(&email)?;
            if email != user.email {
                if self.users.get_by_email(&email).await.context("Failed to check email")?.is_some() {
                    return Err(UserServiceError::EmailTaken(email));
                }
                user.email = email;
            }
        }
        if let Some(name) = input.display_name {
            user.display_name = validate_display_name(&name)?;
        }
        if let Some(password) = input.password {
            check_password_policy(&password).map_err(|m| UserServiceError::invalid("password", m))?;
            user.password_hash = hash_password(&password).context("Failed to hash password")?;
        }
        if let Some(role) = input.role {
            if role != user.role {
                self.check_role_change(actor, &user, role).await?;
                user.role = role;
            }
        }
        if let Some(status) = input.status {
            if status == UserStatus::Banned && actor.id == user.id {
                return Err(UserServiceError::Forbidden("Du kan inte spärra ditt eget konto"));
            }
            user.status = status;
        }

        let updated = self.users.update(&user).await.context("Failed to update user")?;
        if updated.is_banned() {
            self.sessions.delete_by_user(updated.id).await.context("Failed to revoke sessions")?;
        }
        Ok(updated)
    }

    pub async fn change_role(&self, actor: &User, id: i64, role: UserRole) -> Result<User, UserServiceError> {
        self.update_user(actor, id, UpdateUserInput { role: Some(role), ..Default::default() }).await
    }

    /// Ban or unban. A ban also ends every session of the user.
    pub async fn set_banned(&self, actor: &User, id: i64, banned: bool) -> Result<User, UserServiceError> {
        let status = if banned { UserStatus::Banned } else { UserStatus::Active };
        let user = self
            .update_user(actor, id, UpdateUserInput { status: Some(status), ..Default::default() })
            .await?;
        tracing::info!(actor_id = actor.id, user_id = id, banned, "User status changed");
        Ok(user)
    }

    pub async fn delete_user(&self, actor: &User, id: i64) -> Result<(), UserServiceError> {
        if actor.id == id {
            return Err(UserServiceError::Forbidden("Du kan inte ta bort ditt eget konto"));
        }
        let user = self.get_by_id(id).await?;
        if user.role.is_elevated() && actor.role != UserRole::SuperAdmin {
            return Err(UserServiceError::Forbidden("Endast superadministratörer kan ta bort administratörer"));
        }
        self.ensure_not_last_super_admin(&user).await?;

        self.users.delete(id).await.context("Failed to delete user")?;
        tracing::info!(actor_id = actor.id, user_id = id, "User deleted");
        Ok(())
    }

    pub async fn count(&self) -> Result<i64, UserServiceError> {
        Ok(self.users.count().await.context("Failed to count users")?)
    }

    async fn check_role_change(&self, actor: &User, target: &User, role: UserRole) -> Result<(), UserServiceError> {
        ensure_may_assign(actor, role)?;
        if actor.id == target.id {
            return Err(UserServiceError::Forbidden("Du kan inte ändra din egen roll"));
        }
        self.ensure_not_last_super_admin(target).await
    }

    async fn ensure_not_last_super_admin(&self, target: &User) -> Result<(), UserServiceError> {
        if target.role == UserRole::SuperAdmin {
            let remaining = self
                .users
                .count_by_role(UserRole::SuperAdmin)
                .await
                .context("Failed to count super admins")?;
            if remaining <= 1 {
                return Err(UserServiceError::Forbidden("Det måste finnas minst en superadministratör"));
            }
        }
        Ok(())
    }

    async fn insert_user(&self, input: CreateUserInput) -> Result<User, UserServiceError> {
        let email = validate_email(&input.email)?;
        let display_name = validate_display_name(&input.display_name)?;
        check_password_policy(&input.password).map_err(|m| UserServiceError::invalid("password", m))?;

        if self.users.get_by_email(&email).await.context("Failed to check email")?.is_some() {
            return Err(UserServiceError::EmailTaken(email));
        }

        let password_hash = hash_password(&input.password).context("Failed to hash password")?;
        let user = User::new(email.clone(), password_hash, display_name, input.role.unwrap_or_default());

        self.users.create(&user).await.map_err(|e| {
            if crate::db::is_unique_violation(&e) {
                UserServiceError::EmailTaken(email)
            } else {
                e.into()
            }
        })
    }

    async fn start_session(&self, user: &User) -> Result<Session, UserServiceError> {
        let now = Utc::now();
        let session = Session {
            id: random_hex(SESSION_TOKEN_BYTES)?,
            user_id: user.id,
            expires_at: now + Duration::days(self.session_days),
            created_at: now,
        };
        let created = self.sessions.create(&session).await.context("Failed to create session")?;
        self.users
            .touch_last_login(user.id, now)
            .await
            .context("Failed to record login time")?;
        Ok(created)
    }
}

fn ensure_may_assign(actor: &User, role: UserRole) -> Result<(), UserServiceError> {
    if role.is_elevated() && actor.role != UserRole::SuperAdmin {
        return Err(UserServiceError::Forbidden(
            "Endast superadministratörer kan tilldela administratörsroller",
        ));
    }
    Ok(())
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Loose structural check: one `@`, a non-empty local part and a dotted domain
pub fn is_valid_email(email: &str) -> bool {
    if email.len() > 254 || email.chars().any(char::is_whitespace) {
        return false;
    }
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
        }
        None => false,
    }
}

fn validate_email(email: &str) -> Result<String, UserServiceError> {
    let email = normalize_email(email);
    if !is_valid_email(&email) {
        return Err(UserServiceError::invalid("email", "Ange en giltig e-postadress"));
    }
    Ok(email)
}

fn validate_display_name(name: &str) -> Result<String, UserServiceError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(UserServiceError::invalid("display_name", "Namn måste anges"));
    }
    if name.chars().count() > 100 {
        return Err(UserServiceError::invalid("display_name", "Namnet får vara högst 100 tecken"));
    }
    Ok(name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SecurityConfig;
    use crate::db::repositories::{SqlxSessionRepository, SqlxTwoFactorRepository, SqlxUserRepository};
    use crate::db::{create_test_pool, migrations};
    use proptest::prelude::*;

    async fn setup() -> UserService {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool).await.expect("Failed to run migrations");

        let users = SqlxUserRepository::boxed(pool.clone());
        let two_factor = TwoFactorService::new(
            users.clone(),
            SqlxTwoFactorRepository::boxed(pool.clone()),
            &SecurityConfig::default(),
        )
        .unwrap();
        UserService::new(
            users,
            SqlxSessionRepository::boxed(pool),
            Arc::new(two_factor),
            Arc::new(LoginRateLimiter::new()),
        )
    }

    fn register_input(email: &str) -> RegisterInput {
        RegisterInput {
            email: email.into(),
            password: "lösenord123".into(),
            display_name: "Test Testsson".into(),
        }
    }

    fn login_input(email: &str, password: &str) -> LoginInput {
        LoginInput { email: email.into(), password: password.into() }
    }

    async fn session_of(outcome: LoginOutcome) -> Session {
        match outcome {
            LoginOutcome::Authenticated { session, .. } => session,
            LoginOutcome::TwoFactorRequired { .. } => panic!("unexpected 2FA step"),
        }
    }

    /// Super admin first, then a customer
    async fn seeded() -> (UserService, User, User) {
        let svc = setup().await;
        let root = svc.register(register_input("root@firma.se")).await.unwrap();
        let customer = svc.register(register_input("kund@firma.se")).await.unwrap();
        (svc, root, customer)
    }

    #[tokio::test]
    async fn test_first_user_is_super_admin_then_customers() {
        let (_, root, customer) = seeded().await;
        assert_eq!(root.role, UserRole::SuperAdmin);
        assert_eq!(customer.role, UserRole::Customer);
    }

    #[tokio::test]
    async fn test_register_validation() {
        let svc = setup().await;
        assert!(matches!(
            svc.register(register_input("inte-en-adress")).await,
            Err(UserServiceError::ValidationError { field: "email", .. })
        ));
        assert!(matches!(
            svc.register(RegisterInput { password: "kort".into(), ..register_input("a@b.se") }).await,
            Err(UserServiceError::ValidationError { field: "password", .. })
        ));

        svc.register(register_input("Dubbel@Firma.se")).await.unwrap();
        assert!(matches!(
            svc.register(register_input("dubbel@firma.se")).await,
            Err(UserServiceError::EmailTaken(_))
        ));
    }

    #[tokio::test]
    async fn test_login_and_session_lifecycle() {
        let (svc, _, customer) = seeded().await;

        let session = session_of(svc.login(login_input("KUND@firma.se ", "lösenord123"), None).await.unwrap()).await;
        assert_eq!(session.id.len(), SESSION_TOKEN_BYTES * 2);

        let user = svc.validate_session(&session.id).await.unwrap().unwrap();
        assert_eq!(user.id, customer.id);
        assert!(user.last_login_at.is_some());

        svc.logout(&session.id).await.unwrap();
        assert!(svc.validate_session(&session.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_login_wrong_password_and_rate_limit() {
        let (svc, _, _) = seeded().await;
        for _ in 0..5 {
            assert!(matches!(
                svc.login(login_input("kund@firma.se", "fel-lösenord"), None).await,
                Err(UserServiceError::InvalidCredentials)
            ));
        }
        assert!(matches!(
            svc.login(login_input("kund@firma.se", "lösenord123"), None).await,
            Err(UserServiceError::RateLimited)
        ));
    }

    #[tokio::test]
    async fn test_ip_rate_limit() {
        let (svc, _, _) = seeded().await;
        let ip: IpAddr = "198.51.100.4".parse().unwrap();
        for i in 0..10 {
            let _ = svc.login(login_input(&format!("okand{}@firma.se", i), "x"), Some(ip)).await;
        }
        assert!(matches!(
            svc.login(login_input("kund@firma.se", "lösenord123"), Some(ip)).await,
            Err(UserServiceError::RateLimited)
        ));
    }

    #[tokio::test]
    async fn test_banned_user_cannot_login_and_loses_sessions() {
        let (svc, root, customer) = seeded().await;
        let session = session_of(svc.login(login_input("kund@firma.se", "lösenord123"), None).await.unwrap()).await;

        svc.set_banned(&root, customer.id, true).await.unwrap();
        assert!(svc.validate_session(&session.id).await.unwrap().is_none());
        assert!(matches!(
            svc.login(login_input("kund@firma.se", "lösenord123"), None).await,
            Err(UserServiceError::AccountBanned)
        ));

        svc.set_banned(&root, customer.id, false).await.unwrap();
        assert!(svc.login(login_input("kund@firma.se", "lösenord123"), None).await.is_ok());
    }

    #[tokio::test]
    async fn test_only_super_admin_grants_admin() {
        let (svc, root, customer) = seeded().await;
        let admin = svc
            .create_user(
                &root,
                CreateUserInput {
                    email: "admin@firma.se".into(),
                    password: "lösenord123".into(),
                    display_name: "Admin".into(),
                    role: Some(UserRole::Admin),
                },
            )
            .await
            .unwrap();

        assert!(matches!(
            svc.change_role(&admin, customer.id, UserRole::Admin).await,
            Err(UserServiceError::Forbidden(_))
        ));
        assert!(matches!(
            svc.change_role(&admin, root.id, UserRole::Customer).await,
            Err(UserServiceError::Forbidden(_))
        ));

        let editor = svc.change_role(&admin, customer.id, UserRole::Editor).await.unwrap();
        assert_eq!(editor.role, UserRole::Editor);

        let promoted = svc.change_role(&root, customer.id, UserRole::Admin).await.unwrap();
        assert_eq!(promoted.role, UserRole::Admin);
    }

    #[tokio::test]
    async fn test_last_super_admin_protected() {
        let (svc, root, _) = seeded().await;
        let second = svc
            .create_user(
                &root,
                CreateUserInput {
                    email: "root2@firma.se".into(),
                    password: "lösenord123".into(),
                    display_name: "Root 2".into(),
                    role: Some(UserRole::SuperAdmin),
                },
            )
            .await
            .unwrap();

        svc.delete_user(&second, root.id).await.unwrap();
        assert!(matches!(
            svc.change_role(&root, second.id, UserRole::Customer).await,
            Err(UserServiceError::Forbidden(_))
        ));
        assert!(matches!(svc.delete_user(&second, second.id).await, Err(UserServiceError::Forbidden(_))));
    }

    #[tokio::test]
    async fn test_change_password() {
        let (svc, _, customer) = seeded().await;
        assert!(matches!(
            svc.change_password(&customer, "fel", "nyttlösen1").await,
            Err(UserServiceError::ValidationError { field: "current_password", .. })
        ));
        svc.change_password(&customer, "lösenord123", "nyttlösen1").await.unwrap();
        assert!(svc.login(login_input("kund@firma.se", "nyttlösen1"), None).await.is_ok());
    }

    fn now_secs() -> u64 {
        Utc::now().timestamp() as u64
    }

    /// Enable 2FA for the customer and hand back its TOTP generator
    async fn with_two_factor(svc: &UserService, customer: &User) -> totp_rs::TOTP {
        let setup = svc.two_factor.begin_setup(customer).await.unwrap();
        let totp = totp_rs::TOTP::new(
            totp_rs::Algorithm::SHA1,
            6,
            1,
            30,
            totp_rs::Secret::Encoded(setup.secret.clone()).to_bytes().unwrap(),
            Some("Portalen".into()),
            customer.email.clone(),
        )
        .unwrap();
        svc.two_factor.confirm_setup(customer, &totp.generate(now_secs())).await.unwrap();
        totp
    }

    async fn challenge_for(svc: &UserService, email: &str) -> String {
        match svc.login(login_input(email, "lösenord123"), None).await.unwrap() {
            LoginOutcome::TwoFactorRequired { challenge } => challenge,
            LoginOutcome::Authenticated { .. } => panic!("2FA step skipped"),
        }
    }

    #[tokio::test]
    async fn test_two_factor_login_requires_challenge() {
        let (svc, _, customer) = seeded().await;
        let totp = with_two_factor(&svc, &customer).await;
        let challenge = challenge_for(&svc, "kund@firma.se").await;

        assert!(matches!(
            svc.complete_two_factor_login(&challenge, "000000", None).await,
            Err(UserServiceError::TwoFactor(_))
        ));
        let (user, session) = svc
            .complete_two_factor_login(&challenge, &totp.generate(now_secs()), None)
            .await
            .unwrap();
        assert_eq!(user.id, customer.id);
        assert!(svc.validate_session(&session.id).await.unwrap().is_some());

        // Replaying the used challenge, even with a valid code, starts nothing
        assert!(matches!(
            svc.complete_two_factor_login(&challenge, &totp.generate(now_secs()), None).await,
            Err(UserServiceError::TwoFactor(TwoFactorError::InvalidChallenge))
        ));
    }

    #[tokio::test]
    async fn test_two_factor_guesses_are_limited() {
        let (svc, _, customer) = seeded().await;
        let totp = with_two_factor(&svc, &customer).await;
        let challenge = challenge_for(&svc, "kund@firma.se").await;

        for _ in 0..5 {
            assert!(matches!(
                svc.complete_two_factor_login(&challenge, "000000", None).await,
                Err(UserServiceError::TwoFactor(TwoFactorError::InvalidCode))
            ));
        }
        // Locked out for this user, right code or not, and with a new challenge
        assert!(matches!(
            svc.complete_two_factor_login(&challenge, &totp.generate(now_secs()), None).await,
            Err(UserServiceError::RateLimited)
        ));
        let fresh = challenge_for(&svc, "kund@firma.se").await;
        assert!(matches!(
            svc.complete_two_factor_login(&fresh, &totp.generate(now_secs()), None).await,
            Err(UserServiceError::RateLimited)
        ));
    }

    #[tokio::test]
    async fn test_two_factor_step_counts_ip_requests() {
        let (svc, _, customer) = seeded().await;
        with_two_factor(&svc, &customer).await;
        let challenge = challenge_for(&svc, "kund@firma.se").await;
        let ip: IpAddr = "198.51.100.4".parse().unwrap();

        for _ in 0..10 {
            let _ = svc.complete_two_factor_login("skräp", "000000", Some(ip)).await;
        }
        assert!(matches!(
            svc.complete_two_factor_login(&challenge, "000000", Some(ip)).await,
            Err(UserServiceError::RateLimited)
        ));
    }

    #[test]
    fn test_email_shape() {
        assert!(is_valid_email("anna.svensson@firma.se"));
        assert!(!is_valid_email("anna@firma"));
        assert!(!is_valid_email("@firma.se"));
        assert!(!is_valid_email("anna@@firma.se"));
        assert!(!is_valid_email("anna svensson@firma.se"));
        assert!(!is_valid_email("anna@firma.se."));
    }

    proptest! {
        #[test]
        fn prop_elevated_roles_need_super_admin(actor_idx in 0usize..5, role_idx in 0usize..5) {
            let actor = User::new("a@b.se".into(), "h".into(), "A".into(), UserRole::all()[actor_idx]);
            let role = UserRole::all()[role_idx];
            let allowed = ensure_may_assign(&actor, role).is_ok();
            prop_assert_eq!(allowed, !role.is_elevated() || actor.role == UserRole::SuperAdmin);
        }
    }
}
