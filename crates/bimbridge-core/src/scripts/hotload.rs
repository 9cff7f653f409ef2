//! Script hot-loader: materialize, execute atomically, cache, graduate
//!
//! Generated script source is written to the cache directory and executed
//! through the engine inside a document transaction group. The group is
//! committed or rolled back as a unit, so a failing script leaves zero net
//! document change no matter how many capability calls it made first.
//!
//! Successful runs update the cache entry for the script, which feeds the
//! graduation scoring: scripts that run often, fast, and recently are
//! recommended for promotion to first-class registered commands.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::HotLoaderConfig;
use crate::domain::{EngineError, Result};
use crate::gateway::IsolationGateway;

use super::engine::{MaterializedScript, ScriptEngine, ScriptExecutionContext, ScriptKind};

/// Cache entry for a hot-loaded script, keyed by name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HotLoadedScript {
    pub name: String,
    /// SHA-256 of the most recently loaded source, hex-encoded.
    pub content_digest: String,
    pub load_time: DateTime<Utc>,
    pub execution_count: u32,
    pub last_execution_time_ms: u64,
    /// Whether the most recent execution succeeded.
    pub success: bool,
}

/// Read-only projection of a cache entry with its computed score.
#[derive(Debug, Clone, Serialize)]
pub struct ScriptGraduationCandidate {
    pub name: String,
    pub execution_count: u32,
    pub last_execution_time_ms: u64,
    pub load_time: DateTime<Utc>,
    pub graduation_score: f64,
}

/// Result of one hot-load execution.
#[derive(Debug, Clone, Serialize)]
pub struct ScriptRunReport {
    pub name: String,
    pub value: serde_json::Value,
    pub execution_time_ms: u64,
}

pub struct ScriptHotLoader {
    config: HotLoaderConfig,
    engine: Arc<dyn ScriptEngine>,
    gateway: Arc<IsolationGateway>,
    cache: Mutex<HashMap<String, HotLoadedScript>>,
}

impl ScriptHotLoader {
    pub fn new(
        config: HotLoaderConfig,
        engine: Arc<dyn ScriptEngine>,
        gateway: Arc<IsolationGateway>,
    ) -> Result<Self> {
        std::fs::create_dir_all(&config.cache_dir)?;
        Ok(Self {
            config,
            engine,
            gateway,
            cache: Mutex::new(HashMap::new()),
        })
    }

    /// Materialize and execute a script atomically.
    ///
    /// The whole run happens inside a transaction group: on any engine or
    /// capability error the group is rolled back before the error
    /// propagates, so the document is unchanged.
    pub async fn load_and_execute(
        &self,
        source: &str,
        name: &str,
        ctx: &ScriptExecutionContext,
    ) -> Result<ScriptRunReport> {
        let script = self.materialize(name, source)?;
        tracing::info!(script = %script.name, kind = ?script.kind, "hot-loading script");

        self.gateway.begin_group(&script.name).await?;
        let started = Instant::now();
        let outcome = self
            .engine
            .execute(&script, ctx, Arc::clone(&self.gateway))
            .await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Ok(value) => {
                self.gateway.commit_group().await?;
                self.record_run(&script, elapsed_ms, true);
                tracing::info!(script = %script.name, elapsed_ms, "hot-loaded script committed");
                Ok(ScriptRunReport {
                    name: script.name,
                    value,
                    execution_time_ms: elapsed_ms,
                })
            }
            Err(err) => {
                self.gateway.rollback_group().await?;
                self.record_run(&script, elapsed_ms, false);
                tracing::warn!(
                    script = %script.name,
                    error = %err,
                    "hot-loaded script failed, group rolled back"
                );
                Err(err)
            }
        }
    }

    /// Write the source into the cache directory under a sanitized name.
    fn materialize(&self, name: &str, source: &str) -> Result<MaterializedScript> {
        let kind = ScriptKind::detect(name, source);
        let stem: String = name
            .trim_end_matches(".py")
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        if stem.is_empty() {
            return Err(EngineError::Script("script name must not be empty".into()));
        }
        let path = self
            .config
            .cache_dir
            .join(format!("{stem}.{}", kind.extension()));
        std::fs::write(&path, source)?;

        let content_digest = {
            use sha2::Digest;
            let mut hasher = sha2::Sha256::new();
            hasher.update(source.as_bytes());
            hex::encode(hasher.finalize())
        };

        Ok(MaterializedScript {
            name: stem,
            kind,
            path,
            content_digest,
        })
    }

    fn record_run(&self, script: &MaterializedScript, elapsed_ms: u64, success: bool) {
        let mut cache = self.cache.lock().unwrap();
        let entry = cache
            .entry(script.name.clone())
            .or_insert_with(|| HotLoadedScript {
                name: script.name.clone(),
                content_digest: script.content_digest.clone(),
                load_time: Utc::now(),
                execution_count: 0,
                last_execution_time_ms: 0,
                success,
            });
        entry.content_digest = script.content_digest.clone();
        entry.success = success;
        if success {
            entry.execution_count += 1;
            entry.last_execution_time_ms = elapsed_ms;
        }
    }

    /// Cached entry for a script, if any.
    pub fn cached(&self, name: &str) -> Option<HotLoadedScript> {
        self.cache.lock().unwrap().get(name).cloned()
    }

    /// Re-insert a previously persisted cache entry (startup restore).
    pub fn restore_entry(&self, entry: HotLoadedScript) {
        self.cache.lock().unwrap().insert(entry.name.clone(), entry);
    }

    /// Scripts stable and frequent enough to promote, best first.
    ///
    /// Score: 0.5 · min(executions/10, 1)
    ///      + 0.3 · max(0, 1 − exec_ms/1000)
    ///      + 0.2 · max(0, 1 − age_days/30)
    pub fn graduation_candidates(&self, min_execution_count: u32) -> Vec<ScriptGraduationCandidate> {
        let now = Utc::now();
        let cache = self.cache.lock().unwrap();
        let mut candidates: Vec<ScriptGraduationCandidate> = cache
            .values()
            .filter(|s| s.success && s.execution_count >= min_execution_count)
            .map(|s| {
                let frequency = (s.execution_count as f64 / 10.0).min(1.0);
                let performance =
                    (1.0 - s.last_execution_time_ms as f64 / 1000.0).max(0.0);
                let age_days =
                    (now - s.load_time).num_seconds().max(0) as f64 / 86_400.0;
                let recency = (1.0 - age_days / 30.0).max(0.0);
                ScriptGraduationCandidate {
                    name: s.name.clone(),
                    execution_count: s.execution_count,
                    last_execution_time_ms: s.last_execution_time_ms,
                    load_time: s.load_time,
                    graduation_score: 0.5 * frequency + 0.3 * performance + 0.2 * recency,
                }
            })
            .collect();
        candidates.sort_by(|a, b| {
            b.graduation_score
                .partial_cmp(&a.graduation_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        candidates
    }

    /// Sweep artifacts and cache entries older than `max_age`.
    ///
    /// Returns the number of artifact files deleted.
    pub fn cleanup(&self, max_age: Duration) -> Result<u32> {
        let mut deleted = 0u32;
        for entry in std::fs::read_dir(&self.config.cache_dir)? {
            let entry = entry?;
            let Ok(metadata) = entry.metadata() else {
                continue;
            };
            let Ok(modified) = metadata.modified() else {
                continue;
            };
            if modified.elapsed().map(|age| age > max_age).unwrap_or(false) {
                std::fs::remove_file(entry.path())?;
                deleted += 1;
            }
        }

        let cutoff = Utc::now()
            - chrono::Duration::from_std(max_age)
                .unwrap_or_else(|_| chrono::Duration::days(365));
        let mut cache = self.cache.lock().unwrap();
        cache.retain(|_, entry| entry.load_time >= cutoff);

        tracing::debug!(deleted, "script artifact sweep complete");
        Ok(deleted)
    }

    /// Default sweep using the configured maximum age.
    pub fn cleanup_default(&self) -> Result<u32> {
        self.cleanup(self.config.max_artifact_age)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bimbridge_host::{HostDocument, MemoryDocument};

    struct NoopEngine;

    #[async_trait]
    impl ScriptEngine for NoopEngine {
        async fn execute(
            &self,
            _script: &MaterializedScript,
            _ctx: &ScriptExecutionContext,
            _gateway: Arc<IsolationGateway>,
        ) -> Result<serde_json::Value> {
            Ok(serde_json::json!({"ok": true}))
        }
    }

    fn loader(dir: &std::path::Path) -> ScriptHotLoader {
        let doc = Arc::new(MemoryDocument::new()) as Arc<dyn HostDocument>;
        let gateway = Arc::new(IsolationGateway::new(doc));
        ScriptHotLoader::new(
            HotLoaderConfig {
                cache_dir: dir.to_path_buf(),
                max_artifact_age: Duration::from_secs(3600),
            },
            Arc::new(NoopEngine),
            gateway,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_successful_run_updates_cache() {
        let dir = tempfile::tempdir().unwrap();
        let loader = loader(dir.path());
        let ctx = ScriptExecutionContext::default();

        loader
            .load_and_execute("print(1)", "counter.py", &ctx)
            .await
            .unwrap();
        loader
            .load_and_execute("print(1)", "counter.py", &ctx)
            .await
            .unwrap();

        let entry = loader.cached("counter").unwrap();
        assert_eq!(entry.execution_count, 2);
        assert!(entry.success);
        assert!(dir.path().join("counter.py").exists());
    }

    #[test]
    fn test_graduation_scoring_prefers_frequent_fast_recent() {
        let dir = tempfile::tempdir().unwrap();
        let loader = loader(dir.path());

        loader.restore_entry(HotLoadedScript {
            name: "veteran".into(),
            content_digest: "a".into(),
            load_time: Utc::now() - chrono::Duration::hours(1),
            execution_count: 12,
            last_execution_time_ms: 300,
            success: true,
        });
        loader.restore_entry(HotLoadedScript {
            name: "straggler".into(),
            content_digest: "b".into(),
            load_time: Utc::now() - chrono::Duration::days(29),
            execution_count: 2,
            last_execution_time_ms: 2000,
            success: true,
        });

        let candidates = loader.graduation_candidates(1);
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].name, "veteran");
        assert!(candidates[0].graduation_score > candidates[1].graduation_score);

        // Threshold filters the straggler out entirely.
        let candidates = loader.graduation_candidates(5);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].name, "veteran");
    }

    #[test]
    fn test_failed_entries_are_not_candidates() {
        let dir = tempfile::tempdir().unwrap();
        let loader = loader(dir.path());
        loader.restore_entry(HotLoadedScript {
            name: "flaky".into(),
            content_digest: "c".into(),
            load_time: Utc::now(),
            execution_count: 20,
            last_execution_time_ms: 10,
            success: false,
        });
        assert!(loader.graduation_candidates(1).is_empty());
    }

    #[test]
    fn test_cleanup_sweeps_nothing_when_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let loader = loader(dir.path());
        std::fs::write(dir.path().join("fresh.py"), "print(1)").unwrap();
        let deleted = loader.cleanup(Duration::from_secs(3600)).unwrap();
        assert_eq!(deleted, 0);
        assert!(dir.path().join("fresh.py").exists());
    }
}
