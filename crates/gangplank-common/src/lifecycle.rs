//! The pluggable unit lifecycle contract.
//!
//! Author-supplied units run on one side of the boundary and move through
//! three phases: `init` (concurrent across units), `run` (sequential, only
//! after every init settled), `stop` (shutdown). Each unit also contributes
//! an explicit table of remotely-callable functions — there is no
//! annotation-driven discovery.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::join_all;

use crate::errors::SdkError;
use crate::message::CallTable;
use crate::Result;

/// One pluggable unit of plugin logic.
///
/// Units are owned by their coordinator for the whole process lifetime:
/// created once, `init` once, `run` once after the readiness handshake,
/// `stop` once at shutdown. Never re-created.
#[async_trait]
pub trait Unit: Send + Sync {
    /// Identity. Registering two units with the same name keeps the first.
    fn name(&self) -> &str;

    /// The functions this unit exposes to the remote side.
    fn calls(&self) -> CallTable {
        CallTable::new()
    }

    async fn init(&self) -> Result<()> {
        Ok(())
    }

    async fn run(&self) -> Result<()> {
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        Ok(())
    }
}

/// Owns every unit on one side, deduplicated by name in first-seen order.
pub struct UnitRegistry {
    units: Vec<Arc<dyn Unit>>,
    seen: HashSet<String>,
}

impl UnitRegistry {
    pub fn new() -> Self {
        Self {
            units: Vec::new(),
            seen: HashSet::new(),
        }
    }

    /// Register a unit. Returns `false` (and drops the argument) if a unit
    /// with the same name is already registered.
    pub fn register(&mut self, unit: Arc<dyn Unit>) -> bool {
        let name = unit.name().to_string();
        if !self.seen.insert(name.clone()) {
            tracing::debug!(unit = %name, "duplicate unit registration ignored");
            return false;
        }
        self.units.push(unit);
        true
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Arc<dyn Unit>> {
        self.units.iter()
    }

    /// Initialize every unit concurrently and wait for all of them to
    /// settle. The first failure fails the whole batch: `run` must never
    /// start with a partially initialized unit set.
    pub async fn init_all(&self) -> Result<()> {
        let results = join_all(self.units.iter().map(|unit| async move {
            unit.init().await.map_err(|e| SdkError::Unit {
                unit: unit.name().to_string(),
                phase: "init",
                message: e.to_string(),
            })
        }))
        .await;

        for result in results {
            result?;
        }
        Ok(())
    }

    /// Run every unit sequentially in registration order.
    pub async fn run_all(&self) -> Result<()> {
        for unit in &self.units {
            unit.run().await.map_err(|e| SdkError::Unit {
                unit: unit.name().to_string(),
                phase: "run",
                message: e.to_string(),
            })?;
        }
        Ok(())
    }

    /// Stop every unit. Failures are logged, not propagated, so one broken
    /// unit cannot block shutdown of the rest.
    pub async fn stop_all(&self) {
        for unit in &self.units {
            if let Err(e) = unit.stop().await {
                tracing::warn!(unit = %unit.name(), error = %e, "unit stop failed");
            }
        }
    }
}

impl Default for UnitRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Records phase transitions into a shared log for ordering assertions.
    struct MarkerUnit {
        name: String,
        log: Arc<Mutex<Vec<String>>>,
        fail_init: bool,
    }

    impl MarkerUnit {
        fn new(name: &str, log: Arc<Mutex<Vec<String>>>) -> Arc<Self> {
            Arc::new(Self {
                name: name.to_string(),
                log,
                fail_init: false,
            })
        }

        fn failing(name: &str, log: Arc<Mutex<Vec<String>>>) -> Arc<Self> {
            Arc::new(Self {
                name: name.to_string(),
                log,
                fail_init: true,
            })
        }

        fn mark(&self, phase: &str) {
            self.log
                .lock()
                .unwrap()
                .push(format!("{}:{}", self.name, phase));
        }
    }

    #[async_trait]
    impl Unit for MarkerUnit {
        fn name(&self) -> &str {
            &self.name
        }

        async fn init(&self) -> Result<()> {
            self.mark("init");
            if self.fail_init {
                return Err(SdkError::Other("boom".into()));
            }
            Ok(())
        }

        async fn run(&self) -> Result<()> {
            self.mark("run");
            Ok(())
        }

        async fn stop(&self) -> Result<()> {
            self.mark("stop");
            Ok(())
        }
    }

    #[test]
    fn duplicate_registration_keeps_first() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = UnitRegistry::new();
        assert!(registry.register(MarkerUnit::new("a", log.clone())));
        assert!(registry.register(MarkerUnit::new("b", log.clone())));
        assert!(!registry.register(MarkerUnit::new("a", log.clone())));
        assert_eq!(registry.len(), 2);

        let names: Vec<_> = registry.iter().map(|u| u.name().to_string()).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn run_never_precedes_all_inits() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = UnitRegistry::new();
        registry.register(MarkerUnit::new("a", log.clone()));
        registry.register(MarkerUnit::new("b", log.clone()));

        registry.init_all().await.unwrap();
        registry.run_all().await.unwrap();

        let entries = log.lock().unwrap().clone();
        let last_init = entries.iter().rposition(|e| e.ends_with(":init")).unwrap();
        let first_run = entries.iter().position(|e| e.ends_with(":run")).unwrap();
        assert!(last_init < first_run, "run observed before init settled: {entries:?}");
    }

    #[tokio::test]
    async fn run_order_is_registration_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = UnitRegistry::new();
        registry.register(MarkerUnit::new("first", log.clone()));
        registry.register(MarkerUnit::new("second", log.clone()));
        registry.register(MarkerUnit::new("third", log.clone()));

        registry.init_all().await.unwrap();
        registry.run_all().await.unwrap();

        let runs: Vec<_> = log
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.ends_with(":run"))
            .cloned()
            .collect();
        assert_eq!(runs, vec!["first:run", "second:run", "third:run"]);
    }

    #[tokio::test]
    async fn failing_init_fails_the_whole_batch() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = UnitRegistry::new();
        registry.register(MarkerUnit::new("good", log.clone()));
        registry.register(MarkerUnit::failing("bad", log.clone()));

        let err = registry.init_all().await.unwrap_err();
        assert!(matches!(err, SdkError::Unit { ref unit, phase: "init", .. } if unit == "bad"));
    }

    #[tokio::test]
    async fn stop_all_swallows_failures() {
        struct BadStop;

        #[async_trait]
        impl Unit for BadStop {
            fn name(&self) -> &str {
                "bad-stop"
            }
            async fn stop(&self) -> Result<()> {
                Err(SdkError::Other("stop failed".into()))
            }
        }

        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = UnitRegistry::new();
        registry.register(Arc::new(BadStop));
        registry.register(MarkerUnit::new("good", log.clone()));

        registry.stop_all().await;
        assert_eq!(log.lock().unwrap().as_slice(), ["good:stop"]);
    }
}
