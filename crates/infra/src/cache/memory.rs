use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use super::{CacheBackend, CacheError};

/// In-memory cache backend for tests/dev.
///
/// Expired entries are evicted lazily on access.
#[derive(Debug, Default)]
pub struct InMemoryCache {
    inner: RwLock<HashMap<String, (String, Instant)>>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Live entry count.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.inner
            .read()
            .map(|m| m.values().filter(|(_, exp)| *exp > now).count())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CacheBackend for InMemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let now = Instant::now();
        {
            let map = self.inner.read().map_err(|_| CacheError::backend("lock poisoned"))?;
            match map.get(key) {
                None => return Ok(None),
                Some((value, exp)) if *exp > now => return Ok(Some(value.clone())),
                Some(_) => {}
            }
        }
        let mut map = self.inner.write().map_err(|_| CacheError::backend("lock poisoned"))?;
        map.remove(key);
        Ok(None)
    }

    async fn set_ex(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        let expires_at = Instant::now()
            .checked_add(ttl)
            .ok_or_else(|| CacheError::backend(format!("ttl {ttl:?} is out of range")))?;
        let mut map = self.inner.write().map_err(|_| CacheError::backend("lock poisoned"))?;
        map.insert(key.to_owned(), (value, expires_at));
        Ok(())
    }

    async fn del(&self, keys: &[String]) -> Result<u64, CacheError> {
        let mut map = self.inner.write().map_err(|_| CacheError::backend("lock poisoned"))?;
        Ok(keys.iter().filter(|k| map.remove(k.as_str()).is_some()).count() as u64)
    }

    async fn scan(&self, pattern: &str) -> Result<Vec<String>, CacheError> {
        let now = Instant::now();
        let mut map = self.inner.write().map_err(|_| CacheError::backend("lock poisoned"))?;
        map.retain(|_, (_, exp)| *exp > now);
        let mut keys: Vec<String> = map.keys().filter(|k| glob_match(pattern, k)).cloned().collect();
        keys.sort();
        Ok(keys)
    }
}

/// Redis-style glob: `*`, `?`, `[abc]`, `[^a-z]`, and `\` escapes.
pub fn glob_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    matches_from(&p, &t)
}

fn matches_from(p: &[char], t: &[char]) -> bool {
    let Some((&head, rest)) = p.split_first() else {
        return t.is_empty();
    };
    match head {
        '*' => (0..=t.len()).any(|skip| matches_from(rest, &t[skip..])),
        '?' => !t.is_empty() && matches_from(rest, &t[1..]),
        '[' => {
            let Some((&ch, t_rest)) = t.split_first() else {
                return false;
            };
            match class_match(rest, ch) {
                Some((hit, after)) => hit && matches_from(after, t_rest),
                // Unterminated class: treat '[' literally.
                None => ch == '[' && matches_from(rest, t_rest),
            }
        }
        '\\' if !rest.is_empty() => {
            !t.is_empty() && t[0] == rest[0] && matches_from(&rest[1..], &t[1..])
        }
        literal => !t.is_empty() && t[0] == literal && matches_from(rest, &t[1..]),
    }
}

/// Returns `(matched, pattern after the closing ']')`.
fn class_match(p: &[char], ch: char) -> Option<(bool, &[char])> {
    let (negate, mut i) = match p.first() {
        Some('^') => (true, 1),
        _ => (false, 0),
    };
    let mut hit = false;
    while i < p.len() {
        match p[i] {
            ']' => return Some((hit != negate, &p[i + 1..])),
            '\\' if i + 1 < p.len() => {
                hit |= p[i + 1] == ch;
                i += 2;
            }
            lo if i + 2 < p.len() && p[i + 1] == '-' && p[i + 2] != ']' => {
                let hi = p[i + 2];
                hit |= lo <= ch && ch <= hi;
                i += 3;
            }
            c => {
                hit |= c == ch;
                i += 1;
            }
        }
    }
    None
}
