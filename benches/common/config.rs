use std::env;

/// Configuration for benchmarks, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct BenchConfig {
    /// Simulated API latency in milliseconds (from API_LATENCY_MS env var, defaults to 20)
    pub api_latency_ms: u64,

    /// Number of distinct products (from BENCH_PRODUCTS env var, defaults to 1000)
    pub num_products: usize,

    /// Sample size for benchmarks (from BENCH_SAMPLE_SIZE env var, defaults to 100)
    pub sample_size: usize,
}

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            api_latency_ms: env_or("API_LATENCY_MS", 20),
            num_products: env_or("BENCH_PRODUCTS", 1000),
            sample_size: env_or("BENCH_SAMPLE_SIZE", 100),
        }
    }
}

impl BenchConfig {
    pub fn new() -> Self {
        let config = Self::default();
        eprintln!("Benchmark Configuration:");
        eprintln!("  API Latency: {}ms", config.api_latency_ms);
        eprintln!("  Products: {}", config.num_products);
        eprintln!("  Sample Size: {}", config.sample_size);
        config
    }
}
