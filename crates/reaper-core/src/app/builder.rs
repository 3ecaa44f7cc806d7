//! ReaperBuilder - 依存関係のワイヤリング
//!
//! # 学習ポイント
//! - Builder パターンの実装
//! - 起動時検証（Fail-fast 設計）
//!
//! Everything that can be checked before the first cycle is checked in
//! `build()`: configuration values, expression syntax, presence of a catalog
//! and of the drivers the configuration depends on.

use std::sync::Arc;

use crate::app::cycle::CycleController;
use crate::app::exclusion::ExclusionTracker;
use crate::app::executor::BulkDeletionExecutor;
use crate::app::fetcher::CandidateFetcher;
use crate::app::registry::DriverRegistry;
use crate::app::scheduler::WorkerPool;
use crate::app::selector::RseSelector;
use crate::app::shutdown::Shutdown;
use crate::config::ReaperConfig;
use crate::domain::ReaperError;
use crate::ports::{Catalog, Clock, DeletionDriver, IdGenerator, SystemClock, UlidGenerator};

/// # 使用例
/// ```ignore
/// let controller = ReaperBuilder::new(config)
///     .catalog(catalog)
///     .driver(Arc::new(PosixDriver::new()))?
///     .shutdown(stop)
///     .build()?;
/// let summary = controller.run().await?;
/// ```
pub struct ReaperBuilder {
    config: ReaperConfig,
    catalog: Option<Arc<dyn Catalog>>,
    drivers: DriverRegistry,
    clock: Arc<dyn Clock>,
    ids: Option<Arc<dyn IdGenerator>>,
    shutdown: Option<Shutdown>,
}

impl ReaperBuilder {
    pub fn new(config: ReaperConfig) -> Self {
        Self {
            config,
            catalog: None,
            drivers: DriverRegistry::new(),
            clock: Arc::new(SystemClock),
            ids: None,
            shutdown: None,
        }
    }

    pub fn catalog(mut self, catalog: Arc<dyn Catalog>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    /// Register a deletion driver; duplicate schemes fail immediately.
    pub fn driver(mut self, driver: Arc<dyn DeletionDriver>) -> Result<Self, ReaperError> {
        self.drivers.register(driver)?;
        Ok(self)
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Defaults to a `UlidGenerator` on the builder's clock.
    pub fn id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = Some(ids);
        self
    }

    /// Without one the controller runs until its task is dropped.
    pub fn shutdown(mut self, shutdown: Shutdown) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    pub fn build(self) -> Result<CycleController, ReaperError> {
        let config = self.config;
        config.validate()?;

        let catalog = self
            .catalog
            .ok_or_else(|| ReaperError::configuration("no catalog configured"))?;
        if self.drivers.is_empty() {
            return Err(ReaperError::configuration("no deletion driver registered"));
        }
        if let Some(scheme) = &config.scheme
            && !self.drivers.contains(scheme)
        {
            return Err(ReaperError::configuration(format!(
                "forced scheme '{scheme}' has no driver (registered: {})",
                self.drivers.schemes().join(", ")
            )));
        }

        let selector = RseSelector::from_expressions(
            config.include_rses.as_deref(),
            config.exclude_rses.as_deref(),
        )?
        .with_rses(config.rses.iter().cloned())
        .with_vos(config.vos.iter().cloned());

        let ids: Arc<dyn IdGenerator> = match self.ids {
            Some(ids) => ids,
            None => Arc::new(UlidGenerator::new(Arc::clone(&self.clock))),
        };
        let tracker = Arc::new(ExclusionTracker::new(
            config.auto_exclude_threshold,
            config.exclusion_timeout(),
            Arc::clone(&self.clock),
        ));

        let fetcher = CandidateFetcher::new(Arc::clone(&catalog), ids, config.chunk_size)
            .with_delay(config.delay())
            .with_scheme(config.scheme.clone())
            .with_greedy(config.greedy);
        let executor = BulkDeletionExecutor::new(
            Arc::clone(&catalog),
            Arc::new(self.drivers),
            Arc::clone(&tracker),
        )
        .with_scheme(config.scheme.clone());
        let pool = WorkerPool::new(config.threads, fetcher, executor, tracker);

        Ok(CycleController::new(
            selector,
            catalog,
            pool,
            self.shutdown.unwrap_or_else(Shutdown::never),
        )
        .with_sleep_time(config.sleep_duration())
        .with_run_once(config.run_once))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ErrorKind, Pfn, Protocol, Replica, Rse, RseId};
    use crate::impls::{InMemoryCatalog, InMemoryDriver, PosixDriver};
    use crate::ports::FixedClock;
    use chrono::Utc;

    fn catalog() -> Arc<InMemoryCatalog> {
        Arc::new(InMemoryCatalog::new(Arc::new(SystemClock)))
    }

    fn config_error(result: Result<CycleController, ReaperError>) -> String {
        match result {
            Ok(_) => panic!("expected a configuration error"),
            Err(err) => {
                assert_eq!(err.kind(), ErrorKind::Configuration);
                err.to_string()
            }
        }
    }

    #[test]
    fn build_success() {
        let built = ReaperBuilder::new(ReaperConfig::default())
            .catalog(catalog())
            .driver(Arc::new(PosixDriver::new()))
            .unwrap()
            .build();
        assert!(built.is_ok());
    }

    #[test]
    fn build_without_catalog_fails() {
        let msg = config_error(
            ReaperBuilder::new(ReaperConfig::default())
                .driver(Arc::new(PosixDriver::new()))
                .unwrap()
                .build(),
        );
        assert!(msg.contains("catalog"));
    }

    #[test]
    fn build_without_drivers_fails() {
        let msg = config_error(ReaperBuilder::new(ReaperConfig::default()).catalog(catalog()).build());
        assert!(msg.contains("driver"));
    }

    #[test]
    fn forced_scheme_needs_a_driver() {
        let config = ReaperConfig {
            scheme: Some("davs".into()),
            ..Default::default()
        };
        let msg = config_error(
            ReaperBuilder::new(config)
                .catalog(catalog())
                .driver(Arc::new(PosixDriver::new()))
                .unwrap()
                .build(),
        );
        assert!(msg.contains("davs"));
        assert!(msg.contains("file"));
    }

    #[test]
    fn invalid_config_fails_fast() {
        let config = ReaperConfig {
            threads: 0,
            ..Default::default()
        };
        let msg = config_error(
            ReaperBuilder::new(config)
                .catalog(catalog())
                .driver(Arc::new(PosixDriver::new()))
                .unwrap()
                .build(),
        );
        assert!(msg.contains("threads"));
    }

    #[test]
    fn malformed_expression_fails_fast() {
        let config = ReaperConfig {
            include_rses: Some("tier=1 &".into()),
            ..Default::default()
        };
        config_error(
            ReaperBuilder::new(config)
                .catalog(catalog())
                .driver(Arc::new(PosixDriver::new()))
                .unwrap()
                .build(),
        );
    }

    #[test]
    fn pathologically_nested_expression_is_a_configuration_error() {
        let config = ReaperConfig {
            exclude_rses: Some(format!("{}tier=0{}", "(".repeat(50_000), ")".repeat(50_000))),
            ..Default::default()
        };
        let msg = config_error(
            ReaperBuilder::new(config)
                .catalog(catalog())
                .driver(Arc::new(PosixDriver::new()))
                .unwrap()
                .build(),
        );
        assert!(msg.contains("nested"));
    }

    #[test]
    fn duplicate_driver_is_rejected() {
        let result = ReaperBuilder::new(ReaperConfig::default())
            .driver(Arc::new(InMemoryDriver::new("mem")))
            .unwrap()
            .driver(Arc::new(InMemoryDriver::new("mem")));
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn built_controller_runs_a_cycle() {
        let clock = Arc::new(FixedClock::new(Utc::now()));
        let catalog = Arc::new(InMemoryCatalog::new(clock.clone()));
        let driver = Arc::new(InMemoryDriver::new("mem"));
        for rse in ["SITE_A", "SITE_B"] {
            catalog
                .add_rse(Rse::new(rse).with_protocol(Protocol::new("mem").with_hostname("host")))
                .await;
        }
        let ids = UlidGenerator::new(clock.clone());
        for rse in ["SITE_A", "SITE_B"] {
            let pfn = Pfn::parse(&format!("mem://host/{rse}/f")).unwrap();
            driver.put(&pfn);
            catalog
                .add_replica(
                    Replica::new(ids.generate_replica_id(), "user", "f", RseId::new(rse), pfn, clock.now())
                        .with_tombstone(clock.now() - chrono::Duration::hours(1)),
                )
                .await;
        }

        let config = ReaperConfig {
            rses: vec!["SITE_B".into()],
            run_once: true,
            threads: 3,
            ..Default::default()
        };
        let summary = ReaperBuilder::new(config)
            .catalog(catalog.clone())
            .driver(driver.clone())
            .unwrap()
            .clock(clock)
            .build()
            .unwrap()
            .run()
            .await
            .unwrap();

        assert_eq!(summary.cycles, 1);
        assert_eq!(summary.tally.deleted, 1);
        assert_eq!(driver.deleted()[0].as_str(), "mem://host/SITE_B/f");
    }
}
