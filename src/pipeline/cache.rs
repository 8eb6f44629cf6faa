use std::collections::{HashMap, VecDeque};

use crate::domain::ClassificationResult;

/// Classification results keyed by canonical URL, evicted oldest-inserted first.
#[derive(Debug)]
pub struct ResultCache {
    capacity: usize,
    entries: HashMap<String, ClassificationResult>,
    order: VecDeque<String>,
}

impl ResultCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: HashMap::with_capacity(capacity),
            order: VecDeque::with_capacity(capacity),
        }
    }

    pub fn get(&self, url: &str) -> Option<ClassificationResult> {
        self.entries.get(url).copied()
    }

    /// Stores `result`. Overwriting an existing key keeps its original
    /// insertion position.
    pub fn insert(&mut self, url: String, result: ClassificationResult) {
        if let Some(existing) = self.entries.get_mut(&url) {
            *existing = result;
            return;
        }
        while self.entries.len() >= self.capacity {
            let Some(oldest) = self.order.pop_front() else {
                break;
            };
            self.entries.remove(&oldest);
        }
        self.order.push_back(url.clone());
        self.entries.insert(url, result);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(prob: f64) -> ClassificationResult {
        ClassificationResult::from_probability(prob)
    }

    #[test]
    fn overflow_evicts_oldest_insertion() {
        let mut cache = ResultCache::new(500);
        for i in 0..=500 {
            cache.insert(format!("https://example.com/{i}.jpg"), result(0.5));
        }
        assert_eq!(cache.len(), 500);
        assert!(cache.get("https://example.com/0.jpg").is_none());
        assert!(cache.get("https://example.com/1.jpg").is_some());
        assert!(cache.get("https://example.com/500.jpg").is_some());
    }

    #[test]
    fn reads_do_not_refresh_position() {
        let mut cache = ResultCache::new(2);
        cache.insert("a".into(), result(0.1));
        cache.insert("b".into(), result(0.2));
        assert!(cache.get("a").is_some());
        cache.insert("c".into(), result(0.3));

        assert!(cache.get("a").is_none());
        assert!(cache.get("b").is_some());
        assert!(cache.get("c").is_some());
    }

    #[test]
    fn overwrite_keeps_size_and_position() {
        let mut cache = ResultCache::new(2);
        cache.insert("a".into(), result(0.1));
        cache.insert("b".into(), result(0.2));
        cache.insert("a".into(), result(0.95));
        assert_eq!(cache.len(), 2);
        assert!(cache.get("a").unwrap().is_ai);

        cache.insert("c".into(), result(0.3));
        assert!(cache.get("a").is_none());
    }
}
