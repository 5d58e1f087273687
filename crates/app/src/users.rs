//! User CRUD over the cache-aside layer.
//!
//! Reads: cache, then store on a miss, then a best-effort warm.
//! Writes: store, then a fatal `users:*` invalidation, then a re-read.

use std::sync::Arc;

use tracing::{debug, info, instrument};

use warden_auth::PasswordHasher;
use warden_core::{NewUser, PageSpec, User, UserId, UserPatch, UserView};
use warden_infra::cache::{USERS_NAMESPACE, users_list_key};
use warden_infra::{CacheAside, CacheKey, Deadlines, RequestContext, UserFilter, UserStore};

use crate::dto::{Ack, CreateUserRequest, EditUserRequest, Links, PageMeta, Paginated, Standard};
use crate::errors::{AppError, ErrorSet, classify};
use crate::validation::{EMAIL_MAX_LEN, Validator, parse_user_id};

pub const USERNAME_MIN_LEN: usize = 5;
pub const PASSWORD_MIN_LEN: usize = 8;

pub struct UsersService {
    pub(crate) users: Arc<dyn UserStore>,
    pub(crate) cache: CacheAside<UserView>,
    pub(crate) hasher: Arc<dyn PasswordHasher>,
    pub(crate) deadlines: Deadlines,
}

impl std::fmt::Debug for UsersService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UsersService")
            .field("cache", &self.cache)
            .field("deadlines", &self.deadlines)
            .finish_non_exhaustive()
    }
}

fn validate_full(v: &mut Validator, req: &CreateUserRequest) {
    if v.required("username", &req.username) {
        v.min_len("username", &req.username, USERNAME_MIN_LEN);
    }
    v.required_email("email", &req.email);
    if v.required("password", &req.password) {
        v.min_len("password", &req.password, PASSWORD_MIN_LEN);
    }
}

fn validate_partial(v: &mut Validator, req: &EditUserRequest) {
    if let Some(username) = &req.username {
        v.min_len("username", username, USERNAME_MIN_LEN);
    }
    if let Some(email) = &req.email {
        v.email("email", email).max_len("email", email, EMAIL_MAX_LEN);
    }
    if let Some(password) = &req.password {
        v.min_len("password", password, PASSWORD_MIN_LEN);
    }
}

impl UsersService {
    pub fn builder() -> crate::builder::UsersServiceBuilder {
        crate::builder::UsersServiceBuilder::default()
    }

    #[instrument(skip_all, fields(size = page.size), err)]
    pub async fn list(&self, ctx: &RequestContext, page: PageSpec) -> Result<Paginated<UserView>, ErrorSet> {
        let mut v = Validator::new();
        v.page(&page);
        v.finish()?;

        let key = users_list_key(&page);
        let cached = self
            .cache
            .read(ctx, &key)
            .await
            .map_err(|e| classify("read users cache", e))?;

        let data = match cached {
            Some(views) => {
                debug!(key = %key, "cache hit");
                views
            }
            None => {
                debug!(key = %key, "cache miss");
                let rows = self
                    .deadlines
                    .database(ctx, self.users.get_all(&page))
                    .await
                    .map_err(|e| classify("fetch users", e))?;
                let views: Vec<UserView> = rows.iter().map(User::view).collect();
                self.cache.warm_cache(ctx, &key, &views).await;
                views
            }
        };

        let total_data = self
            .deadlines
            .database(ctx, self.users.count())
            .await
            .map_err(|e| classify("count users", e))?;
        let total_page = page
            .total_pages(total_data)
            .map_err(|e| classify("paginate users", e))?;

        Ok(Paginated {
            status: 200,
            code: "STATUS_OK",
            data,
            meta: PageMeta {
                total_data,
                total_page,
                size: page.size,
            },
            links: Links {
                self_link: page.self_link(),
            },
        })
    }

    #[instrument(skip_all, fields(user_id = %id), err)]
    pub async fn get(&self, ctx: &RequestContext, id: &str) -> Result<Standard<UserView>, ErrorSet> {
        let id = parse_user_id("id", id)?;
        self.ensure_exists(ctx, id).await?;
        Ok(Standard::ok(self.fetch(ctx, id).await?))
    }

    #[instrument(skip_all, err)]
    pub async fn create(&self, ctx: &RequestContext, req: CreateUserRequest) -> Result<Standard<UserView>, ErrorSet> {
        let mut v = Validator::new();
        validate_full(&mut v, &req);
        v.finish()?;

        let taken = self
            .deadlines
            .database(ctx, self.users.exists_by_key_value(&UserFilter::email(&req.email)))
            .await
            .map_err(|e| classify("check email availability", e))?;
        if taken {
            return Err(AppError::conflict(format!("Users with email '{}' is exist", req.email)).into());
        }

        let id = UserId::new();
        let password = self
            .hasher
            .hash(&req.password)
            .map_err(|e| classify("hash password", e))?;
        let new_user = NewUser {
            id,
            username: req.username,
            email: req.email,
            password,
        };

        self.deadlines
            .database(ctx, self.users.create(new_user))
            .await
            .map_err(|e| classify("create user", e))?;
        self.invalidate(ctx).await?;

        let view = self.fetch(ctx, id).await?;
        info!(user_id = %id, "user created");
        Ok(Standard::created(view))
    }

    /// Full replacement: every field is required.
    #[instrument(skip_all, fields(user_id = %id), err)]
    pub async fn update(
        &self,
        ctx: &RequestContext,
        id: &str,
        req: CreateUserRequest,
    ) -> Result<Standard<UserView>, ErrorSet> {
        let mut v = Validator::new();
        let parsed = parse_user_id("id", id);
        validate_full(&mut v, &req);
        let id = v.finish_with(parsed)?;

        self.write_patch(ctx, id, req.into()).await
    }

    /// Partial update: only provided fields are validated and written.
    #[instrument(skip_all, fields(user_id = %id), err)]
    pub async fn edit(
        &self,
        ctx: &RequestContext,
        id: &str,
        req: EditUserRequest,
    ) -> Result<Standard<UserView>, ErrorSet> {
        let req = req.normalized();
        let mut v = Validator::new();
        let parsed = parse_user_id("id", id);
        validate_partial(&mut v, &req);
        let id = v.finish_with(parsed)?;

        self.write_patch(ctx, id, req).await
    }

    #[instrument(skip_all, fields(user_id = %id), err)]
    pub async fn delete(&self, ctx: &RequestContext, id: &str) -> Result<Ack, ErrorSet> {
        let id = parse_user_id("id", id)?;
        self.ensure_exists(ctx, id).await?;

        self.deadlines
            .database(ctx, self.users.delete(id))
            .await
            .map_err(|e| classify("delete user", e))?;
        self.invalidate(ctx).await?;

        info!(user_id = %id, "user deleted");
        Ok(Ack::ack())
    }

    /// Undo a soft delete. An active user is a conflict.
    #[instrument(skip_all, fields(user_id = %id), err)]
    pub async fn restore(&self, ctx: &RequestContext, id: &str) -> Result<Ack, ErrorSet> {
        let id = parse_user_id("id", id)?;

        let active = self
            .deadlines
            .database(ctx, self.users.count_by_id(id))
            .await
            .map_err(|e| classify("count user by id", e))?;
        if active > 0 {
            return Err(AppError::conflict(format!("User with ID '{id}' is active")).into());
        }

        let restored = self
            .deadlines
            .database(ctx, self.users.restore(id))
            .await
            .map_err(|e| classify("restore user", e))?;
        if !restored {
            return Err(AppError::not_found(format!("User with ID '{id}' not found")).into());
        }
        self.invalidate(ctx).await?;

        info!(user_id = %id, "user restored");
        Ok(Ack::ack())
    }

    async fn write_patch(
        &self,
        ctx: &RequestContext,
        id: UserId,
        req: EditUserRequest,
    ) -> Result<Standard<UserView>, ErrorSet> {
        self.ensure_exists(ctx, id).await?;

        let mut patch = UserPatch::from(req);
        if let Some(plain) = patch.password.take() {
            let hashed = self
                .hasher
                .hash(&plain)
                .map_err(|e| classify("hash password", e))?;
            patch.password = Some(hashed);
        }

        self.deadlines
            .database(ctx, self.users.update(id, &patch))
            .await
            .map_err(|e| classify("update user", e))?;
        self.invalidate(ctx).await?;

        let view = self.fetch(ctx, id).await?;
        info!(user_id = %id, "user updated");
        Ok(Standard::ok(view))
    }

    async fn ensure_exists(&self, ctx: &RequestContext, id: UserId) -> Result<(), ErrorSet> {
        let count = self
            .deadlines
            .database(ctx, self.users.count_by_id(id))
            .await
            .map_err(|e| classify("count user by id", e))?;
        if count != 1 {
            return Err(AppError::not_found(format!("User with ID '{id}' not found")).into());
        }
        Ok(())
    }

    async fn fetch(&self, ctx: &RequestContext, id: UserId) -> Result<UserView, ErrorSet> {
        let user = self
            .deadlines
            .database(ctx, self.users.get_by_id(id))
            .await
            .map_err(|e| classify("fetch user by id", e))?;
        Ok(user.view())
    }

    async fn invalidate(&self, ctx: &RequestContext) -> Result<(), ErrorSet> {
        let pattern = CacheKey::namespace_pattern(USERS_NAMESPACE);
        let removed = self
            .cache
            .invalidate_cache(ctx, &pattern)
            .await
            .map_err(|e| classify("invalidate users cache", e))?;
        debug!(pattern = %pattern, removed, "users cache invalidated");
        Ok(())
    }
}
