//! End-to-end orchestrator flows over in-memory collaborators.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use warden_app::dto::{
    CreateUserRequest, EditUserRequest, ForgotPasswordRequest, LoginOutcome, LoginRequest,
    ResetPasswordRequest, UpsertRoleRequest,
};
use warden_app::{AuthService, ErrorKind, ErrorSet, UsersService};
use warden_auth::{
    Argon2Hasher, Enforcer, InMemoryPolicyStore, PasswordHasher, PolicyError, PolicyRule,
    PolicySnapshot, PolicyStore, Role, SecretKey, SecretKeySet, TokenClass, TokenScheme,
    TokenTtls, Tokens, engine_for,
};
use warden_core::{NewUser, PageSpec, User, UserId, UserPatch, UserView};
use warden_events::{EventBus, InMemoryEventBus, Notification};
use warden_infra::cache::{CacheBackend, CacheError, InMemoryCache};
use warden_infra::{
    CacheAside, CacheRepository, DeadlineConfig, Deadlines, InMemoryUserStore, RequestContext,
    StoreError, UserFilter, UserStore,
};

// -------------------------
// Spies and broken backends
// -------------------------

#[derive(Debug, Default)]
struct CountingStore {
    inner: InMemoryUserStore,
    get_all: AtomicUsize,
    count: AtomicUsize,
    calls: AtomicUsize,
}

impl CountingStore {
    fn hit(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl UserStore for CountingStore {
    async fn get_all(&self, page: &PageSpec) -> Result<Vec<User>, StoreError> {
        self.hit();
        self.get_all.fetch_add(1, Ordering::SeqCst);
        self.inner.get_all(page).await
    }

    async fn get_by_id(&self, id: UserId) -> Result<User, StoreError> {
        self.hit();
        self.inner.get_by_id(id).await
    }

    async fn get_by_email(&self, email: &str) -> Result<User, StoreError> {
        self.hit();
        self.inner.get_by_email(email).await
    }

    async fn create(&self, user: NewUser) -> Result<(), StoreError> {
        self.hit();
        self.inner.create(user).await
    }

    async fn update(&self, id: UserId, patch: &UserPatch) -> Result<(), StoreError> {
        self.hit();
        self.inner.update(id, patch).await
    }

    async fn delete(&self, id: UserId) -> Result<(), StoreError> {
        self.hit();
        self.inner.delete(id).await
    }

    async fn restore(&self, id: UserId) -> Result<bool, StoreError> {
        self.hit();
        self.inner.restore(id).await
    }

    async fn count_by_id(&self, id: UserId) -> Result<u64, StoreError> {
        self.hit();
        self.inner.count_by_id(id).await
    }

    async fn count(&self) -> Result<u64, StoreError> {
        self.hit();
        self.count.fetch_add(1, Ordering::SeqCst);
        self.inner.count().await
    }

    async fn exists_by_key_value(&self, filter: &UserFilter) -> Result<bool, StoreError> {
        self.hit();
        self.inner.exists_by_key_value(filter).await
    }
}

#[derive(Debug, Default)]
struct CountingCache {
    inner: InMemoryCache,
    sets: AtomicUsize,
}

#[async_trait]
impl CacheBackend for CountingCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        self.inner.get(key).await
    }

    async fn set_ex(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        self.sets.fetch_add(1, Ordering::SeqCst);
        self.inner.set_ex(key, value, ttl).await
    }

    async fn del(&self, keys: &[String]) -> Result<u64, CacheError> {
        self.inner.del(keys).await
    }

    async fn scan(&self, pattern: &str) -> Result<Vec<String>, CacheError> {
        self.inner.scan(pattern).await
    }
}

/// Reads fail; everything else succeeds.
#[derive(Debug)]
struct UnreadableCache;

#[async_trait]
impl CacheBackend for UnreadableCache {
    async fn get(&self, _key: &str) -> Result<Option<String>, CacheError> {
        Err(CacheError::backend("connection refused"))
    }

    async fn set_ex(&self, _key: &str, _value: String, _ttl: Duration) -> Result<(), CacheError> {
        Ok(())
    }

    async fn del(&self, _keys: &[String]) -> Result<u64, CacheError> {
        Ok(0)
    }

    async fn scan(&self, _pattern: &str) -> Result<Vec<String>, CacheError> {
        Ok(Vec::new())
    }
}

/// Every call hangs forever.
#[derive(Debug)]
struct StalledCache;

#[async_trait]
impl CacheBackend for StalledCache {
    async fn get(&self, _key: &str) -> Result<Option<String>, CacheError> {
        std::future::pending().await
    }

    async fn set_ex(&self, _key: &str, _value: String, _ttl: Duration) -> Result<(), CacheError> {
        std::future::pending().await
    }

    async fn del(&self, _keys: &[String]) -> Result<u64, CacheError> {
        std::future::pending().await
    }

    async fn scan(&self, _pattern: &str) -> Result<Vec<String>, CacheError> {
        std::future::pending().await
    }
}

/// Reads always miss; writes always fail.
#[derive(Debug)]
struct UnwritableCache;

#[async_trait]
impl CacheBackend for UnwritableCache {
    async fn get(&self, _key: &str) -> Result<Option<String>, CacheError> {
        Ok(None)
    }

    async fn set_ex(&self, _key: &str, _value: String, _ttl: Duration) -> Result<(), CacheError> {
        Err(CacheError::backend("OOM command not allowed"))
    }

    async fn del(&self, _keys: &[String]) -> Result<u64, CacheError> {
        Ok(0)
    }

    async fn scan(&self, _pattern: &str) -> Result<Vec<String>, CacheError> {
        Ok(Vec::new())
    }
}

/// Commits role replacements, then acknowledges far past any deadline.
#[derive(Debug, Default)]
struct SlowAckPolicyStore {
    inner: InMemoryPolicyStore,
}

#[async_trait]
impl PolicyStore for SlowAckPolicyStore {
    async fn load_policy(&self) -> Result<PolicySnapshot, PolicyError> {
        self.inner.load_policy().await
    }

    async fn add_policy(&self, rule: &PolicyRule) -> Result<(), PolicyError> {
        self.inner.add_policy(rule).await
    }

    async fn remove_policy(&self, rule: &PolicyRule) -> Result<(), PolicyError> {
        self.inner.remove_policy(rule).await
    }

    async fn add_grouping(&self, subject: &str, role: &Role) -> Result<(), PolicyError> {
        self.inner.add_grouping(subject, role).await
    }

    async fn remove_grouping(&self, subject: &str, role: &Role) -> Result<(), PolicyError> {
        self.inner.remove_grouping(subject, role).await
    }

    async fn replace_roles(&self, subject: &str, roles: &[Role]) -> Result<(), PolicyError> {
        self.inner.replace_roles(subject, roles).await?;
        tokio::time::sleep(Duration::from_secs(10)).await;
        Ok(())
    }
}

// -------------------------
// Harness
// -------------------------

struct Harness {
    auth: AuthService,
    users: UsersService,
    store: Arc<CountingStore>,
    bus: Arc<InMemoryEventBus<Notification>>,
    enforcer: Arc<Enforcer>,
}

fn tokens() -> Tokens {
    let keys = SecretKeySet::new(
        SecretKey::new([1u8; 32]),
        SecretKey::new([2u8; 32]),
        SecretKey::new([3u8; 32]),
    )
    .unwrap();
    Tokens::new(engine_for(TokenScheme::Jwt, "warden"), keys, TokenTtls::default())
}

async fn harness(cache_backend: Arc<dyn CacheBackend>) -> Harness {
    harness_with_policy(cache_backend, Arc::new(InMemoryPolicyStore::new())).await
}

async fn harness_with_policy(
    cache_backend: Arc<dyn CacheBackend>,
    policy: Arc<dyn PolicyStore>,
) -> Harness {
    let store = Arc::new(CountingStore::default());
    let bus = Arc::new(InMemoryEventBus::<Notification>::new());
    let enforcer = Arc::new(Enforcer::new(policy).await.unwrap());
    let deadlines = Deadlines::new(DeadlineConfig::default());
    let cache: CacheAside<UserView> = CacheAside::new(CacheRepository::new(cache_backend), deadlines);
    let hasher: Arc<dyn PasswordHasher> = Arc::new(Argon2Hasher::new());

    let auth = AuthService::builder()
        .users(store.clone())
        .enforcer(enforcer.clone())
        .tokens(tokens())
        .hasher(hasher.clone())
        .bus(bus.clone())
        .cache(cache.clone())
        .deadlines(deadlines)
        .build()
        .unwrap();
    let users = UsersService::builder()
        .users(store.clone())
        .cache(cache)
        .hasher(hasher)
        .deadlines(deadlines)
        .build()
        .unwrap();

    Harness {
        auth,
        users,
        store,
        bus,
        enforcer,
    }
}

fn new_user(username: &str, email: &str) -> CreateUserRequest {
    CreateUserRequest {
        username: username.into(),
        email: email.into(),
        password: "correct-horse".into(),
    }
}

fn ctx() -> RequestContext {
    RequestContext::background()
}

async fn login(auth: &AuthService, email: &str, password: &str) -> Result<LoginOutcome, ErrorSet> {
    auth.login(
        &ctx(),
        LoginRequest {
            email: email.into(),
            password: password.into(),
        },
    )
    .await
}

// -------------------------
// Auth flows
// -------------------------

#[tokio::test]
async fn login_issues_access_and_refresh_tokens() {
    let h = harness(Arc::new(InMemoryCache::new())).await;
    let created = h
        .users
        .create(&ctx(), new_user("alice", "alice@example.com"))
        .await
        .unwrap();
    assert_eq!(created.status, 201);
    assert_eq!(created.code, "STATUS_CREATED");

    let outcome = h
        .auth
        .login(
            &ctx(),
            LoginRequest {
                email: "alice@example.com".into(),
                password: "correct-horse".into(),
            },
        )
        .await
        .unwrap();

    assert_eq!(outcome.response.status, 200);
    assert_eq!(outcome.response.code, "STATUS_OK");
    let access = outcome.response.data.unwrap();

    let now_ms = Utc::now().timestamp_millis();
    let five_min_ms = 5 * 60 * 1000;
    assert!((access.expired_at - (now_ms + five_min_ms)).abs() < 5_000);

    let payload = h
        .auth
        .tokens()
        .verify(TokenClass::Access, &access.access_token)
        .unwrap();
    assert_eq!(payload.email, "alice@example.com");

    let refresh = h
        .auth
        .tokens()
        .verify(TokenClass::Refresh, &outcome.refresh_token)
        .unwrap();
    let seven_days = chrono::Duration::days(7);
    assert!(((refresh.expires_at - Utc::now()) - seven_days).num_seconds().abs() < 5);

    // Keys are not interchangeable between classes.
    assert!(h.auth.tokens().verify(TokenClass::Access, &outcome.refresh_token).is_err());
}

#[tokio::test]
async fn login_with_unknown_email_is_not_found() {
    let h = harness(Arc::new(InMemoryCache::new())).await;
    let err = h
        .auth
        .login(
            &ctx(),
            LoginRequest {
                email: "ghost@example.com".into(),
                password: "whatever-pass".into(),
            },
        )
        .await
        .unwrap_err();
    assert!(err.is(ErrorKind::NotFound));
}

#[tokio::test]
async fn login_with_wrong_password_is_unauthorized() {
    let h = harness(Arc::new(InMemoryCache::new())).await;
    h.users
        .create(&ctx(), new_user("alice", "alice@example.com"))
        .await
        .unwrap();
    let err = h
        .auth
        .login(
            &ctx(),
            LoginRequest {
                email: "alice@example.com".into(),
                password: "wrong-horse".into(),
            },
        )
        .await
        .unwrap_err();
    assert!(err.is(ErrorKind::Unauthorized));
}

#[tokio::test]
async fn refresh_and_logout_accept_only_refresh_tokens() {
    let h = harness(Arc::new(InMemoryCache::new())).await;
    h.users
        .create(&ctx(), new_user("alice", "alice@example.com"))
        .await
        .unwrap();
    let outcome = h
        .auth
        .login(
            &ctx(),
            LoginRequest {
                email: "alice@example.com".into(),
                password: "correct-horse".into(),
            },
        )
        .await
        .unwrap();

    let refreshed = h.auth.refresh_token(&outcome.refresh_token).await.unwrap();
    assert!(refreshed.data.is_some());
    assert!(h.auth.logout(&outcome.refresh_token).await.is_ok());

    let access = outcome.response.data.unwrap().access_token;
    let err = h.auth.refresh_token(&access).await.unwrap_err();
    assert!(err.is(ErrorKind::BadRequest));
}

#[tokio::test]
async fn forgot_then_reset_password_rotates_the_credential() {
    let h = harness(Arc::new(InMemoryCache::new())).await;
    h.users
        .create(&ctx(), new_user("alice", "alice@example.com"))
        .await
        .unwrap();
    let mailer = h.bus.subscribe();

    h.auth
        .forgot_password(
            &ctx(),
            ForgotPasswordRequest {
                email: "alice@example.com".into(),
            },
        )
        .await
        .unwrap();

    let Notification::PasswordResetRequested { token, email, .. } = mailer.try_recv().unwrap();
    assert_eq!(email, "alice@example.com");

    let payload = h
        .auth
        .authenticate(TokenClass::ResetPassword, Some(&format!("Bearer {token}")))
        .unwrap();
    h.auth
        .reset_password(
            &ctx(),
            &payload,
            ResetPasswordRequest {
                password: "brand-new-pass".into(),
                confirm_password: "brand-new-pass".into(),
            },
        )
        .await
        .unwrap();

    assert!(login(&h.auth, "alice@example.com", "brand-new-pass").await.is_ok());
    assert!(
        login(&h.auth, "alice@example.com", "correct-horse")
            .await
            .unwrap_err()
            .is(ErrorKind::Unauthorized)
    );
}

#[tokio::test]
async fn forgot_password_for_unknown_email_publishes_nothing() {
    let h = harness(Arc::new(InMemoryCache::new())).await;
    let mailer = h.bus.subscribe();
    let err = h
        .auth
        .forgot_password(
            &ctx(),
            ForgotPasswordRequest {
                email: "ghost@example.com".into(),
            },
        )
        .await
        .unwrap_err();
    assert!(err.is(ErrorKind::NotFound));
    assert!(mailer.try_recv().is_err());
}

#[tokio::test]
async fn reset_password_reports_every_violation() {
    let h = harness(Arc::new(InMemoryCache::new())).await;
    let payload = h
        .auth
        .tokens()
        .issue(TokenClass::ResetPassword, UserId::new(), "a@b.co")
        .unwrap()
        .payload;
    let err = h
        .auth
        .reset_password(
            &ctx(),
            &payload,
            ResetPasswordRequest {
                password: "short".into(),
                confirm_password: "different".into(),
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.errors.len(), 2);
    assert!(err.kinds().iter().all(|k| *k == ErrorKind::UnprocessableEntity));
}

#[tokio::test]
async fn upsert_role_twice_leaves_exactly_one_role() {
    let h = harness(Arc::new(InMemoryCache::new())).await;
    for _ in 0..2 {
        h.auth
            .upsert_role(
                &ctx(),
                UpsertRoleRequest {
                    email: "alice@example.com".into(),
                    role_name: "admin".into(),
                },
            )
            .await
            .unwrap();
    }
    assert_eq!(
        h.enforcer.get_roles_for_user("alice@example.com").unwrap(),
        vec![Role::ADMIN]
    );

    h.auth
        .upsert_role(
            &ctx(),
            UpsertRoleRequest {
                email: "alice@example.com".into(),
                role_name: "editor".into(),
            },
        )
        .await
        .unwrap();
    assert_eq!(
        h.enforcer.get_roles_for_user("alice@example.com").unwrap(),
        vec![Role::new("editor")]
    );
}

#[tokio::test]
async fn authenticate_requires_a_bearer_header() {
    let h = harness(Arc::new(InMemoryCache::new())).await;
    let issued = h
        .auth
        .tokens()
        .issue(TokenClass::Access, UserId::new(), "a@b.co")
        .unwrap();

    assert!(h
        .auth
        .authenticate(TokenClass::Access, None)
        .unwrap_err()
        .is(ErrorKind::Unauthorized));
    assert!(h
        .auth
        .authenticate(TokenClass::Access, Some(&issued.token))
        .unwrap_err()
        .is(ErrorKind::Unauthorized));
    assert!(h
        .auth
        .authenticate(TokenClass::Access, Some("Bearer garbage"))
        .unwrap_err()
        .is(ErrorKind::BadRequest));

    let payload = h
        .auth
        .authenticate(TokenClass::Access, Some(&format!("Bearer {}", issued.token)))
        .unwrap();
    assert_eq!(payload.id, issued.payload.id);
    assert_eq!(payload.email, issued.payload.email);
}

#[tokio::test]
async fn guard_fails_closed_and_lets_owners_through() {
    let h = harness(Arc::new(InMemoryCache::new())).await;
    h.enforcer
        .add_policy(PolicyRule::allow("admin", "users", "read"))
        .await
        .unwrap();
    h.enforcer
        .add_role_for_user("boss@example.com", Role::ADMIN)
        .await
        .unwrap();

    let boss = h
        .auth
        .tokens()
        .issue(TokenClass::Access, UserId::new(), "boss@example.com")
        .unwrap()
        .payload;
    let alice = h
        .auth
        .tokens()
        .issue(TokenClass::Access, UserId::new(), "alice@example.com")
        .unwrap()
        .payload;

    assert!(h.auth.authorize(&boss, "users:read", None).is_ok());
    assert!(h.auth.authorize(&boss, "admin", None).is_ok());
    assert!(h.auth.authorize(&alice, "users:read", None).unwrap_err().is(ErrorKind::Forbidden));
    assert!(h.auth.authorize(&boss, "users::read", None).unwrap_err().is(ErrorKind::Forbidden));
    assert!(h.auth.authorize(&boss, "", None).unwrap_err().is(ErrorKind::Forbidden));

    // Self access skips the policy.
    assert!(h.auth.authorize(&alice, "users:read", Some(alice.id)).is_ok());
    assert!(h
        .auth
        .authorize(&alice, "users:read", Some(boss.id))
        .unwrap_err()
        .is(ErrorKind::Forbidden));
}

// -------------------------
// Users flows
// -------------------------

async fn seed(store: &CountingStore, n: usize) {
    for i in 0..n {
        store
            .inner
            .create(NewUser {
                id: UserId::new(),
                username: format!("user{i:02}"),
                email: format!("user{i}@example.com"),
                password: "hash".into(),
            })
            .await
            .unwrap();
    }
}

#[tokio::test]
async fn list_on_cold_cache_reads_once_populates_once_counts_once() {
    let cache = Arc::new(CountingCache::default());
    let h = harness(cache.clone()).await;
    seed(&h.store, 13).await;

    let page = h.users.list(&ctx(), PageSpec::new(10)).await.unwrap();
    assert_eq!(page.data.len(), 10);
    assert_eq!(page.meta.total_data, 13);
    assert_eq!(page.meta.total_page, 2);
    assert_eq!(page.meta.size, 10);
    assert_eq!(page.links.self_link, "?size=10");

    assert_eq!(h.store.get_all.load(Ordering::SeqCst), 1);
    assert_eq!(cache.sets.load(Ordering::SeqCst), 1);
    assert_eq!(h.store.count.load(Ordering::SeqCst), 1);

    // Warm cache: no second source read, no second populate.
    let again = h.users.list(&ctx(), PageSpec::new(10)).await.unwrap();
    assert_eq!(again.data, page.data);
    assert_eq!(h.store.get_all.load(Ordering::SeqCst), 1);
    assert_eq!(cache.sets.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn list_pages_with_cursors() {
    let h = harness(Arc::new(InMemoryCache::new())).await;
    seed(&h.store, 5).await;

    let first = h.users.list(&ctx(), PageSpec::new(2)).await.unwrap();
    let last_id = first.data[1].id.to_string();
    let second = h
        .users
        .list(&ctx(), PageSpec::new(2).after(last_id.clone()))
        .await
        .unwrap();
    assert_eq!(second.data.len(), 2);
    assert!(second.data.iter().all(|u| u.id > first.data[1].id));
    assert_eq!(second.links.self_link, format!("?size=2&after={last_id}"));
}

#[tokio::test]
async fn writes_are_visible_to_the_next_list() {
    let h = harness(Arc::new(InMemoryCache::new())).await;
    let created = h
        .users
        .create(&ctx(), new_user("alice", "alice@example.com"))
        .await
        .unwrap()
        .data
        .unwrap();
    let id = created.id.to_string();

    let cached = h.users.list(&ctx(), PageSpec::new(10)).await.unwrap();
    assert_eq!(cached.data.len(), 1);

    h.users
        .edit(
            &ctx(),
            &id,
            EditUserRequest {
                username: Some("alice-renamed".into()),
                ..EditUserRequest::default()
            },
        )
        .await
        .unwrap();
    let listed = h.users.list(&ctx(), PageSpec::new(10)).await.unwrap();
    assert_eq!(listed.data[0].username, "alice-renamed");

    h.users
        .update(&ctx(), &id, new_user("alice-full", "alice2@example.com"))
        .await
        .unwrap();
    let listed = h.users.list(&ctx(), PageSpec::new(10)).await.unwrap();
    assert_eq!(listed.data[0].email, "alice2@example.com");

    h.users.delete(&ctx(), &id).await.unwrap();
    let listed = h.users.list(&ctx(), PageSpec::new(10)).await.unwrap();
    assert!(listed.data.is_empty());
    assert_eq!(listed.meta.total_data, 0);

    h.users.restore(&ctx(), &id).await.unwrap();
    let listed = h.users.list(&ctx(), PageSpec::new(10)).await.unwrap();
    assert_eq!(listed.data.len(), 1);
}

#[tokio::test]
async fn create_rejects_taken_email_and_reports_all_fields() {
    let h = harness(Arc::new(InMemoryCache::new())).await;
    h.users
        .create(&ctx(), new_user("alice", "alice@example.com"))
        .await
        .unwrap();

    let err = h
        .users
        .create(&ctx(), new_user("alice2", "alice@example.com"))
        .await
        .unwrap_err();
    assert!(err.is(ErrorKind::Conflict));

    let err = h
        .users
        .create(
            &ctx(),
            CreateUserRequest {
                username: "abc".into(),
                email: "not-an-email".into(),
                password: "short".into(),
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.errors.len(), 3);
    assert!(err.errors.iter().all(|e| e.title == "Validation Error"));
}

#[tokio::test]
async fn restore_distinguishes_active_and_unknown_users() {
    let h = harness(Arc::new(InMemoryCache::new())).await;
    let created = h
        .users
        .create(&ctx(), new_user("alice", "alice@example.com"))
        .await
        .unwrap()
        .data
        .unwrap();

    let err = h
        .users
        .restore(&ctx(), &created.id.to_string())
        .await
        .unwrap_err();
    assert!(err.is(ErrorKind::Conflict));

    let err = h
        .users
        .restore(&ctx(), &UserId::new().to_string())
        .await
        .unwrap_err();
    assert!(err.is(ErrorKind::NotFound));
}

#[tokio::test]
async fn malformed_id_is_a_validation_error() {
    let h = harness(Arc::new(InMemoryCache::new())).await;
    let err = h.users.get(&ctx(), "not-a-uuid").await.unwrap_err();
    assert!(err.is(ErrorKind::UnprocessableEntity));
    assert_eq!(h.store.calls.load(Ordering::SeqCst), 0);

    let err = h.users.get(&ctx(), &UserId::new().to_string()).await.unwrap_err();
    assert!(err.is(ErrorKind::NotFound));
}

#[tokio::test]
async fn update_and_edit_report_bad_id_with_body_violations() {
    let h = harness(Arc::new(InMemoryCache::new())).await;

    let err = h
        .users
        .update(&ctx(), "not-a-uuid", new_user("abc", "not-an-email"))
        .await
        .unwrap_err();
    assert_eq!(err.errors.len(), 3);
    assert!(err.errors[0].detail.contains("'id'"));
    assert!(err.is(ErrorKind::UnprocessableEntity));

    let err = h
        .users
        .edit(
            &ctx(),
            "not-a-uuid",
            EditUserRequest {
                username: Some("abc".into()),
                ..EditUserRequest::default()
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.errors.len(), 2);
    assert!(err.errors[0].detail.contains("'id'"));
    assert_eq!(h.store.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn cache_read_failure_is_an_error_not_an_empty_page() {
    let h = harness(Arc::new(UnreadableCache)).await;
    seed(&h.store, 3).await;

    let err = h.users.list(&ctx(), PageSpec::new(10)).await.unwrap_err();
    assert!(err.is(ErrorKind::InternalServerError));
    assert_eq!(h.store.get_all.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn stalled_cache_read_times_out() {
    let h = harness(Arc::new(StalledCache)).await;
    let err = h.users.list(&ctx(), PageSpec::new(10)).await.unwrap_err();
    assert!(err.is(ErrorKind::RequestTimeout));
    assert_eq!(h.store.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn stalled_invalidation_fails_the_write() {
    let h = harness(Arc::new(StalledCache)).await;
    let err = h
        .users
        .create(&ctx(), new_user("alice", "alice@example.com"))
        .await
        .unwrap_err();
    assert!(err.is(ErrorKind::RequestTimeout));
}

#[tokio::test(start_paused = true)]
async fn exhausted_inbound_deadline_makes_no_backend_call() {
    let h = harness(Arc::new(InMemoryCache::new())).await;
    let expired = RequestContext::with_deadline(tokio::time::Instant::now());
    tokio::time::advance(Duration::from_millis(1)).await;

    let err = h
        .users
        .get(&expired, &UserId::new().to_string())
        .await
        .unwrap_err();
    assert!(err.is(ErrorKind::RequestTimeout));
    assert_eq!(h.store.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn failed_cache_populate_still_serves_the_page() {
    let h = harness(Arc::new(UnwritableCache)).await;
    seed(&h.store, 7).await;

    let page = h.users.list(&ctx(), PageSpec::new(5)).await.unwrap();
    assert_eq!(page.status, 200);
    assert_eq!(page.data.len(), 5);
    assert_eq!(page.meta.total_data, 7);
    assert_eq!(page.meta.total_page, 2);
    assert_eq!(h.store.get_all.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn timed_out_role_upsert_keeps_store_and_enforcer_in_step() {
    let policy = Arc::new(SlowAckPolicyStore::default());
    let h = harness_with_policy(Arc::new(InMemoryCache::new()), policy.clone()).await;

    let err = h
        .auth
        .upsert_role(
            &ctx(),
            UpsertRoleRequest {
                email: "a@b.com".into(),
                role_name: "admin".into(),
            },
        )
        .await
        .unwrap_err();
    assert!(err.is(ErrorKind::RequestTimeout));

    // Let the acknowledgement arrive.
    tokio::time::sleep(Duration::from_secs(10)).await;

    let persisted = policy.load_policy().await.unwrap().groupings;
    let in_memory = h.enforcer.get_roles_for_user("a@b.com").unwrap();
    assert_eq!(persisted.len(), in_memory.len());
    assert_eq!(in_memory, vec![Role::ADMIN]);
}
