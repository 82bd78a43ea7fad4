//! Engine configuration.
//!
//! Every knob lives here and is passed into the orchestrator at construction.
//! Nothing in the engine reads mutable global state after this is built.

use rand::seq::SliceRandom;
use std::path::PathBuf;

/// Common desktop user agents, one picked per run.
const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/122.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/122.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:123.0) Gecko/20100101 Firefox/123.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.2 Safari/605.1.15",
];

/// Whether the rolling staleness hash carries across strategies within one
/// attempt, or resets when a new strategy is tried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashCarry {
    /// Carry for the lifetime of the automation context (default): any two
    /// consecutive accepted captures in the same context must differ,
    /// whichever strategies produced them.
    Context,
    /// Reset whenever a new extraction attempt starts.
    Attempt,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub output_dir: PathBuf,
    /// Base pacing delay between items, seconds. Jitter and failure backoff
    /// are added on top.
    pub delay_secs: f64,
    /// Cap on listing pages visited per category.
    pub max_pages: u32,
    pub resume: bool,
    /// Single-attempt mode: trades resilience for throughput.
    pub fast_mode: bool,
    /// Prefer the fixed-position click strategy over the selector search.
    pub positional_click: bool,
    pub headless: bool,
    /// Minimum accepted capture length, chars.
    pub min_content_len: usize,
    pub hash_carry: HashCarry,
    pub nav_timeout_ms: u64,
    /// Bound on element waits and clipboard reads.
    pub action_timeout_ms: u64,
    pub user_agent: String,
}

impl Config {
    pub fn new(output_dir: Option<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.unwrap_or_else(default_output_dir),
            delay_secs: 2.0,
            max_pages: 20,
            resume: true,
            fast_mode: false,
            positional_click: false,
            headless: true,
            min_content_len: 64,
            hash_carry: HashCarry::Context,
            nav_timeout_ms: 30_000,
            action_timeout_ms: 10_000,
            user_agent: pick_user_agent(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new(None)
    }
}

/// `MAGPIE_OUTPUT_DIR` env, falling back to `./pine_downloads`.
pub fn default_output_dir() -> PathBuf {
    std::env::var("MAGPIE_OUTPUT_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("./pine_downloads"))
}

fn pick_user_agent() -> String {
    let mut rng = rand::thread_rng();
    USER_AGENTS
        .choose(&mut rng)
        .copied()
        .unwrap_or(USER_AGENTS[0])
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = Config::new(Some(PathBuf::from("/tmp/out")));
        assert!(cfg.resume);
        assert!(!cfg.fast_mode);
        assert_eq!(cfg.max_pages, 20);
        assert_eq!(cfg.hash_carry, HashCarry::Context);
        assert!(USER_AGENTS.contains(&cfg.user_agent.as_str()));
    }
}
