use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Payload used by the benchmarks.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BenchProduct {
    pub id: u64,
    pub title: String,
    pub price: u32,
    pub stock: u32,
}

impl BenchProduct {
    pub fn new(id: u64) -> Self {
        Self {
            id,
            title: format!("Product {}", id),
            price: (id % 2000) as u32 + 1,
            stock: (id % 100) as u32,
        }
    }
}

/// Simulated product API with configurable latency.
#[derive(Clone)]
pub struct FakeProductApi {
    data: Arc<HashMap<String, BenchProduct>>,
    latency_ms: u64,
    request_count: Arc<AtomicUsize>,
}

impl FakeProductApi {
    pub fn new(num_products: usize, latency_ms: u64) -> Self {
        let data = (0..num_products as u64)
            .map(|i| (format!("product-{}", i), BenchProduct::new(i)))
            .collect();

        Self {
            data: Arc::new(data),
            latency_ms,
            request_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub async fn get(&self, key: &str) -> Result<BenchProduct, String> {
        self.request_count.fetch_add(1, Ordering::Relaxed);

        // Simulate network latency
        tokio::time::sleep(Duration::from_millis(self.latency_ms)).await;

        self.data
            .get(key)
            .cloned()
            .ok_or_else(|| format!("{} not found", key))
    }

    #[allow(dead_code)]
    pub fn request_count(&self) -> usize {
        self.request_count.load(Ordering::Relaxed)
    }
}

/// Generate keys for different workload patterns
pub struct KeyGenerator {
    num_keys: usize,
}

impl KeyGenerator {
    pub fn new(num_keys: usize) -> Self {
        Self { num_keys }
    }

    /// Every key once, in order.
    pub fn sequential(&self) -> Vec<String> {
        (0..self.num_keys).map(|i| format!("product-{}", i)).collect()
    }

    /// Keys with a skewed distribution (few hot keys)
    pub fn zipf_random(&self, count: usize) -> Vec<String> {
        let mut rng = rand::rng();
        let hot = (self.num_keys / 5).max(1);

        (0..count)
            .map(|_| {
                // Simplified Zipf: 80% of requests go to 20% of keys
                let id = if rng.random_bool(0.8) || hot == self.num_keys {
                    rng.random_range(0..hot)
                } else {
                    rng.random_range(hot..self.num_keys)
                };
                format!("product-{}", id)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    #[tokio::test]
    async fn test_fake_product_api() {
        use super::FakeProductApi;

        let api = FakeProductApi::new(10, 0);
        let product = api.get("product-3").await.unwrap();
        assert_eq!(product.id, 3);
        assert!(api.get("product-99").await.is_err());
        assert_eq!(api.request_count(), 2);
    }

    #[test]
    fn test_key_generator() {
        use super::KeyGenerator;

        let key_gen = KeyGenerator::new(100);
        let seq = key_gen.sequential();
        assert_eq!(seq.len(), 100);
        assert_eq!(seq[0], "product-0");
        assert_eq!(key_gen.zipf_random(50).len(), 50);
    }
}
