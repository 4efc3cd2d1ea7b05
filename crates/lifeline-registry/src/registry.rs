//! InstanceRegistry — applies lifecycle transitions through the repository.

use serde_json::Value;
use tracing::{debug, info};

use lifeline_core::config::AttributeLimits;
use lifeline_core::{EventKind, SharedClock};
use lifeline_state::{Instance, SharedRepository};

use crate::error::{RegistryError, RegistryResult};
use crate::transition::{Admission, Transition};

/// Owns every write to instance rows.
///
/// Each call runs its transition inside one repository write transaction:
/// the existence check, the instance update, and the appended records are
/// never observable separately.
#[derive(Clone)]
pub struct InstanceRegistry {
    repo: SharedRepository,
    clock: SharedClock,
    limits: AttributeLimits,
}

impl InstanceRegistry {
    pub fn new(repo: SharedRepository, clock: SharedClock) -> Self {
        Self {
            repo,
            clock,
            limits: AttributeLimits::default(),
        }
    }

    /// Set the bounds applied to STARTED attributes.
    pub fn with_attribute_limits(mut self, limits: AttributeLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Record an install. Creates the instance if it is unknown.
    pub fn setup(&self, instance_id: &str) -> RegistryResult<Instance> {
        self.apply(instance_id, Transition::Setup, None)
    }

    /// Record a start, creating or updating the instance and merging `data`
    /// into its attributes.
    pub fn start(&self, instance_id: &str, data: Value) -> RegistryResult<Instance> {
        self.apply(instance_id, Transition::Started { data }, None)
    }

    pub fn heartbeat(&self, instance_id: &str) -> RegistryResult<Instance> {
        self.apply(instance_id, Transition::Heartbeat, None)
    }

    pub fn stop(&self, instance_id: &str) -> RegistryResult<Instance> {
        self.apply(instance_id, Transition::Stopped, None)
    }

    pub fn utterance(&self, instance_id: &str, data: Value) -> RegistryResult<Instance> {
        self.apply(instance_id, Transition::Utterance { data }, None)
    }

    pub fn error(&self, instance_id: &str, message: impl Into<String>) -> RegistryResult<Instance> {
        let message = message.into();
        self.apply(instance_id, Transition::Error { message }, None)
    }

    /// Record a bare event of `kind` against an existing instance.
    ///
    /// Unlike [`setup`](Self::setup) and [`start`](Self::start), this never
    /// creates an instance.
    pub fn record_event(&self, instance_id: &str, kind: EventKind) -> RegistryResult<Instance> {
        self.apply(
            instance_id,
            Transition::for_event(kind),
            Some(Admission::RequireExisting),
        )
    }

    pub fn find(&self, instance_id: &str) -> RegistryResult<Option<Instance>> {
        Ok(self.repo.find_instance(instance_id)?)
    }

    fn apply(
        &self,
        instance_id: &str,
        transition: Transition,
        admission: Option<Admission>,
    ) -> RegistryResult<Instance> {
        let admission = admission.unwrap_or_else(|| transition.admission());
        let now = self.clock.now_ms();
        let mut was_online = None;

        let instance = self
            .repo
            .update_instance(instance_id, &mut |current| {
                was_online = current.as_ref().map(|i| i.is_online);
                transition.apply(instance_id, current, admission, now, &self.limits)
            })
            .map_err(|e| {
                let e = RegistryError::from(e);
                if let RegistryError::InstanceNotFound(_) = e {
                    debug!(%instance_id, kind = transition.name(), "transition rejected, unknown instance");
                }
                e
            })?;

        match (was_online, instance.is_online) {
            (None, _) => info!(%instance_id, kind = transition.name(), "instance registered"),
            (Some(false), true) => info!(%instance_id, kind = transition.name(), "instance online"),
            (Some(true), false) => info!(%instance_id, kind = transition.name(), "instance offline"),
            _ => debug!(%instance_id, kind = transition.name(), "transition applied"),
        }
        Ok(instance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use serde_json::json;

    use lifeline_core::ManualClock;
    use lifeline_state::{StateStore, TelemetryRepository};

    const T0: u64 = 1_700_000_000_000;

    fn registry() -> (InstanceRegistry, Arc<StateStore>, ManualClock) {
        let store = Arc::new(StateStore::open_in_memory().unwrap());
        let clock = ManualClock::new(T0);
        let registry = InstanceRegistry::new(store.clone(), Arc::new(clock.clone()));
        (registry, store, clock)
    }

    fn event_kinds(store: &StateStore, id: &str) -> Vec<EventKind> {
        store
            .list_events_for_instance(id)
            .unwrap()
            .into_iter()
            .map(|e| e.kind)
            .collect()
    }

    #[test]
    fn setup_twice_keeps_one_instance_and_two_events() {
        let (registry, store, clock) = registry();

        registry.setup("a").unwrap();
        clock.advance(Duration::from_secs(1));
        let inst = registry.setup("a").unwrap();

        assert_eq!(store.list_instances().unwrap().len(), 1);
        assert_eq!(inst.created_at, T0);
        assert_eq!(inst.last_setup_at, Some(T0 + 1_000));
        assert_eq!(event_kinds(&store, "a"), vec![EventKind::Setup, EventKind::Setup]);
    }

    #[test]
    fn start_creates_online_instance() {
        let (registry, store, _) = registry();

        registry.start("a", json!({"version": "1.0"})).unwrap();

        let inst = store.find_instance("a").unwrap().unwrap();
        assert!(inst.is_online);
        assert_eq!(inst.last_start_at, Some(T0));
        assert_eq!(inst.attributes["version"], "1.0");
        assert_eq!(event_kinds(&store, "a"), vec![EventKind::Started]);
    }

    #[test]
    fn heartbeat_after_start_reports_uptime() {
        let (registry, _, clock) = registry();

        registry.start("a", json!({})).unwrap();
        clock.advance(Duration::from_secs(125));
        let inst = registry.heartbeat("a").unwrap();

        assert!(inst.is_online);
        assert_eq!(inst.last_uptime, 125);
    }

    #[test]
    fn stop_then_heartbeat_goes_back_online() {
        let (registry, _, clock) = registry();

        registry.start("a", json!({})).unwrap();
        clock.advance(Duration::from_secs(30));
        let stopped = registry.stop("a").unwrap();
        assert!(!stopped.is_online);
        assert_eq!(stopped.last_uptime, 30);

        clock.advance(Duration::from_secs(30));
        let back = registry.heartbeat("a").unwrap();
        assert!(back.is_online);
        assert_eq!(back.last_uptime, 60);
    }

    #[test]
    fn unknown_instance_is_rejected_without_writes() {
        let (registry, store, _) = registry();

        assert!(matches!(registry.heartbeat("ghost"), Err(RegistryError::InstanceNotFound(_))));
        assert!(matches!(registry.stop("ghost"), Err(RegistryError::InstanceNotFound(_))));
        assert!(matches!(
            registry.utterance("ghost", json!({})),
            Err(RegistryError::InstanceNotFound(_))
        ));
        assert!(matches!(registry.error("ghost", "boom"), Err(RegistryError::InstanceNotFound(_))));
        for kind in EventKind::ALL {
            assert!(matches!(
                registry.record_event("ghost", kind),
                Err(RegistryError::InstanceNotFound(_))
            ));
        }

        assert!(store.list_instances().unwrap().is_empty());
        assert!(store.list_events_for_instance("ghost").unwrap().is_empty());
        assert!(store.list_errors_for_instance("ghost").unwrap().is_empty());
    }

    #[test]
    fn utterance_and_error_are_recorded() {
        let (registry, store, clock) = registry();

        registry.setup("a").unwrap();
        clock.advance(Duration::from_secs(1));
        let inst = registry.utterance("a", json!({"text": "hi"})).unwrap();
        assert_eq!(inst.last_utterance_at, Some(T0 + 1_000));
        assert!(!inst.is_online);

        clock.advance(Duration::from_secs(1));
        let inst = registry.error("a", "disk full").unwrap();
        assert_eq!(inst.last_error_at, Some(T0 + 2_000));

        assert_eq!(store.list_utterances_for_instance("a").unwrap()[0].data["text"], "hi");
        assert_eq!(store.list_errors_for_instance("a").unwrap()[0].message, "disk full");
        assert_eq!(event_kinds(&store, "a"), vec![EventKind::Setup, EventKind::Utterance]);
    }

    #[test]
    fn record_event_dispatches_by_kind() {
        let (registry, store, clock) = registry();

        registry.setup("a").unwrap();
        let inst = registry.record_event("a", EventKind::Started).unwrap();
        assert!(inst.is_online);

        clock.advance(Duration::from_secs(10));
        let inst = registry.record_event("a", EventKind::Stopped).unwrap();
        assert!(!inst.is_online);
        assert_eq!(inst.last_uptime, 10);

        assert_eq!(
            event_kinds(&store, "a"),
            vec![EventKind::Setup, EventKind::Started, EventKind::Stopped]
        );
    }

    #[test]
    fn attribute_limits_apply() {
        let (registry, store, _) = registry();
        let registry = registry.with_attribute_limits(AttributeLimits {
            max_keys: 1,
            ..AttributeLimits::default()
        });

        registry.start("a", json!({"a": 1, "b": 2})).unwrap();

        let inst = store.find_instance("a").unwrap().unwrap();
        assert_eq!(inst.attributes.len(), 1);
    }

    #[test]
    fn concurrent_starts_create_one_row() {
        let (registry, store, _) = registry();

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let registry = registry.clone();
                std::thread::spawn(move || registry.start("shared", json!({ "worker": i })))
            })
            .collect();
        for handle in handles {
            handle.join().unwrap().unwrap();
        }

        assert_eq!(store.list_instances().unwrap().len(), 1);
        assert_eq!(store.list_events_for_instance("shared").unwrap().len(), 8);
        assert!(store.find_instance("shared").unwrap().unwrap().is_online);
    }
}
