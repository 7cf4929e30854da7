//! TTL付きスタックビューキャッシュ
//!
//! getStack/listStacksの読み取りを軽くするための短命キャッシュ。
//! すべての変更系操作で該当キーを無効化する。

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

pub struct TtlCache<V> {
    ttl: Duration,
    entries: Mutex<HashMap<String, (Instant, V)>>,
}

impl<V: Clone> TtlCache<V> {
    pub fn new(ttl_ms: u64) -> Self {
        Self {
            ttl: Duration::from_millis(ttl_ms),
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn get(&self, key: &str) -> Option<V> {
        let mut entries = self.entries.lock().unwrap();
        match entries.get(key) {
            Some((inserted, value)) if inserted.elapsed() < self.ttl => Some(value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    pub fn insert(&self, key: &str, value: V) {
        self.entries
            .lock()
            .unwrap()
            .insert(key.to_string(), (Instant::now(), value));
    }

    pub fn invalidate(&self, key: &str) {
        self.entries.lock().unwrap().remove(key);
    }

    pub fn clear(&self) {
        self.entries.lock().unwrap().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_within_ttl() {
        let cache = TtlCache::new(60_000);
        cache.insert("a", 1);
        assert_eq!(cache.get("a"), Some(1));
    }

    #[test]
    fn test_expiry() {
        let cache = TtlCache::new(0);
        cache.insert("a", 1);
        // TTL 0 は即時失効
        assert_eq!(cache.get("a"), None);
    }

    #[test]
    fn test_invalidate() {
        let cache = TtlCache::new(60_000);
        cache.insert("a", 1);
        cache.invalidate("a");
        assert_eq!(cache.get("a"), None);

        cache.insert("a", 2);
        cache.insert("b", 3);
        cache.clear();
        assert_eq!(cache.get("b"), None);
    }
}
