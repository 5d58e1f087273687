//! Authentication flows: login, token rotation, password reset, role upsert,
//! and the bearer/route guards the transport calls.

use std::sync::Arc;

use tracing::{info, instrument};

use warden_auth::{
    Enforcer, PasswordHasher, Payload, Role, TokenClass, Tokens, authorize, authorize_owner_or,
};
use warden_core::{UserId, UserPatch, UserView};
use warden_events::{EventBus, Notification};
use warden_infra::cache::USERS_NAMESPACE;
use warden_infra::{CacheAside, CacheKey, Deadlines, RequestContext, UserStore};

use crate::dto::{
    AccessToken, Ack, ForgotPasswordRequest, LoginOutcome, LoginRequest, ResetPasswordRequest,
    Standard, UpsertRoleRequest,
};
use crate::errors::{AppError, ErrorSet, classify};
use crate::validation::Validator;

const BEARER_PREFIX: &str = "Bearer ";

pub struct AuthService {
    pub(crate) users: Arc<dyn UserStore>,
    pub(crate) enforcer: Arc<Enforcer>,
    pub(crate) tokens: Tokens,
    pub(crate) hasher: Arc<dyn PasswordHasher>,
    pub(crate) bus: Arc<dyn EventBus<Notification>>,
    pub(crate) cache: CacheAside<UserView>,
    pub(crate) deadlines: Deadlines,
}

impl std::fmt::Debug for AuthService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthService")
            .field("scheme", &self.tokens.scheme())
            .field("deadlines", &self.deadlines)
            .finish_non_exhaustive()
    }
}

impl AuthService {
    pub fn builder() -> crate::builder::AuthServiceBuilder {
        crate::builder::AuthServiceBuilder::default()
    }

    pub fn tokens(&self) -> &Tokens {
        &self.tokens
    }

    /// Exchange credentials for an access token and a refresh token.
    #[instrument(skip_all, err)]
    pub async fn login(&self, ctx: &RequestContext, req: LoginRequest) -> Result<LoginOutcome, ErrorSet> {
        let mut v = Validator::new();
        v.required_email("email", &req.email);
        if v.required("password", &req.password) {
            v.min_len("password", &req.password, 8);
        }
        v.finish()?;

        let user = self
            .deadlines
            .database(ctx, self.users.get_by_email(&req.email))
            .await
            .map_err(|e| classify("find user by email", e))?;

        let matched = self
            .hasher
            .verify(&req.password, &user.password)
            .map_err(|e| classify("verify password", e))?;
        if !matched {
            return Err(AppError::unauthorized("email or password wrong").into());
        }

        let access = self
            .tokens
            .issue(TokenClass::Access, user.id, &user.email)
            .map_err(|e| classify("create access token", e))?;
        let refresh = self
            .tokens
            .issue(TokenClass::Refresh, user.id, &user.email)
            .map_err(|e| classify("create refresh token", e))?;

        info!(user_id = %user.id, "user authenticated");
        Ok(LoginOutcome {
            response: Standard::ok(AccessToken {
                access_token: access.token,
                expired_at: access.payload.expires_at_millis(),
            }),
            refresh_token: refresh.token,
        })
    }

    /// Tokens are stateless: logout only checks the refresh token is genuine.
    #[instrument(skip_all, err)]
    pub async fn logout(&self, refresh_token: &str) -> Result<Ack, ErrorSet> {
        self.tokens
            .verify(TokenClass::Refresh, refresh_token)
            .map_err(|e| classify("verify refresh token", e))?;
        Ok(Ack::ack())
    }

    #[instrument(skip_all, err)]
    pub async fn refresh_token(&self, refresh_token: &str) -> Result<Standard<AccessToken>, ErrorSet> {
        let payload = self
            .tokens
            .verify(TokenClass::Refresh, refresh_token)
            .map_err(|e| classify("verify refresh token", e))?;

        let access = self
            .tokens
            .issue(TokenClass::Access, payload.id, &payload.email)
            .map_err(|e| classify("create access token", e))?;

        Ok(Standard::ok(AccessToken {
            access_token: access.token,
            expired_at: access.payload.expires_at_millis(),
        }))
    }

    /// Mint a reset token and hand it to the mailer through the bus.
    #[instrument(skip_all, err)]
    pub async fn forgot_password(&self, ctx: &RequestContext, req: ForgotPasswordRequest) -> Result<Ack, ErrorSet> {
        let mut v = Validator::new();
        v.required_email("email", &req.email);
        v.finish()?;

        let user = self
            .deadlines
            .database(ctx, self.users.get_by_email(&req.email))
            .await
            .map_err(|e| classify("find user by email", e))?;

        let reset = self
            .tokens
            .issue(TokenClass::ResetPassword, user.id, &user.email)
            .map_err(|e| classify("create reset token", e))?;

        let notification = Notification::PasswordResetRequested {
            user_id: user.id,
            email: user.email,
            token: reset.token,
            expires_at: reset.payload.expires_at,
        };
        self.deadlines
            .downstream(ctx, self.bus.publish(notification))
            .await
            .map_err(|e| classify("publish reset notification", e))?;

        info!(user_id = %user.id, "password reset requested");
        Ok(Ack::ack())
    }

    /// `payload` comes from a reset-password token the transport already verified.
    #[instrument(skip_all, fields(user_id = %payload.id), err)]
    pub async fn reset_password(
        &self,
        ctx: &RequestContext,
        payload: &Payload,
        req: ResetPasswordRequest,
    ) -> Result<Ack, ErrorSet> {
        let mut v = Validator::new();
        if v.required("password", &req.password) {
            v.min_len("password", &req.password, 8);
        }
        if v.required("confirm_password", &req.confirm_password) {
            v.min_len("confirm_password", &req.confirm_password, 8).eq_field(
                "confirm_password",
                &req.confirm_password,
                "password",
                &req.password,
            );
        }
        v.finish()?;

        let user = self
            .deadlines
            .database(ctx, self.users.get_by_email(&payload.email))
            .await
            .map_err(|e| classify("find user by email", e))?;

        let hashed = self
            .hasher
            .hash(&req.password)
            .map_err(|e| classify("hash password", e))?;
        let patch = UserPatch {
            password: Some(hashed),
            ..UserPatch::default()
        };

        self.deadlines
            .database(ctx, self.users.update(user.id, &patch))
            .await
            .map_err(|e| classify("update password", e))?;

        self.cache
            .invalidate_cache(ctx, &CacheKey::namespace_pattern(USERS_NAMESPACE))
            .await
            .map_err(|e| classify("invalidate users cache", e))?;

        info!(user_id = %user.id, "password reset");
        Ok(Ack::ack())
    }

    /// Replace whatever roles `email` had with exactly `role_name`.
    #[instrument(skip_all, fields(role = %req.role_name), err)]
    pub async fn upsert_role(&self, ctx: &RequestContext, req: UpsertRoleRequest) -> Result<Ack, ErrorSet> {
        let mut v = Validator::new();
        v.required_email("email", &req.email);
        v.required("role_name", &req.role_name);
        v.finish()?;

        self.deadlines
            .database(ctx, self.enforcer.upsert_role(&req.email, Role::new(req.role_name.clone())))
            .await
            .map_err(|e| classify("upsert role", e))?;

        info!(role = %req.role_name, "role upserted");
        Ok(Ack::ack_with("Successfully Upsert Role"))
    }

    /// Bearer check: `Authorization: Bearer <token>` verified against `class`.
    pub fn authenticate(&self, class: TokenClass, authorization: Option<&str>) -> Result<Payload, ErrorSet> {
        let header = authorization
            .ok_or_else(|| AppError::unauthorized("missing authorization header"))?;
        let token = header
            .strip_prefix(BEARER_PREFIX)
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AppError::unauthorized("authorization header must be 'Bearer <token>'"))?;

        self.tokens
            .verify(class, token)
            .map_err(|e| classify("verify bearer token", e).into())
    }

    /// Route guard. With `target`, the owner of that id passes without a
    /// policy lookup.
    pub fn authorize(&self, payload: &Payload, permission: &str, target: Option<UserId>) -> Result<(), ErrorSet> {
        let outcome = match target {
            Some(target) => {
                authorize_owner_or(&*self.enforcer, payload.id, &payload.email, target, permission)
            }
            None => authorize(&*self.enforcer, &payload.email, permission),
        };
        outcome.map_err(|e| classify("authorize request", e).into())
    }
}
