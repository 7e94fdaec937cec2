//! # Application State
//!
//! Shared state passed to all route handlers via Axum's State extractor.
//!
//! ## Stores
//!
//! Each resource lives in a [`Store`], an `Arc<RwLock<HashMap>>` keyed by
//! record id. The in-memory stores are authoritative while the process runs;
//! when a database pool is configured every mutation is written through to
//! Postgres and the stores are hydrated from it on startup.
//!
//! ## Lock Ordering
//!
//! Handlers that check one store and write another hold both guards for the
//! duration of the check-then-write, and acquire them in declaration order
//! of the [`AppState`] fields (frameworks before controls, topics before
//! components, and so on). Guards are never held across `.await`.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use sqlx::PgPool;
use uuid::Uuid;

use crate::audit::AuditLog;
use crate::records::{
    ClauseRecord, ComplianceFrameworkRecord, ComponentRecord, ControlRecord, EvidenceRecord,
    FrameworkMappingRecord, FrameworkRecord, LibraryEntryRecord, MembershipRecord,
    OrganizationRecord, QuestionRecord, QuestionnaireRecord, SelectionRecord, SubmissionRecord,
    TaskRecord, TopicRecord,
};

// -- Generic Store ------------------------------------------------------------

/// Thread-safe in-memory store keyed by UUID.
#[derive(Debug)]
pub struct Store<T: Clone + Send + Sync> {
    data: Arc<RwLock<HashMap<Uuid, T>>>,
}

impl<T: Clone + Send + Sync> Clone for Store<T> {
    fn clone(&self) -> Self {
        Self {
            data: Arc::clone(&self.data),
        }
    }
}

impl<T: Clone + Send + Sync> Store<T> {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            data: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Insert a record, returning the previous value if the key existed.
    pub fn insert(&self, id: Uuid, value: T) -> Option<T> {
        self.data.write().insert(id, value)
    }

    /// Retrieve a record by ID.
    pub fn get(&self, id: &Uuid) -> Option<T> {
        self.data.read().get(id).cloned()
    }

    /// List all records.
    pub fn list(&self) -> Vec<T> {
        self.data.read().values().cloned().collect()
    }

    /// Clone every record matching `pred`.
    pub fn filter(&self, pred: impl Fn(&T) -> bool) -> Vec<T> {
        self.data
            .read()
            .values()
            .filter(|v| pred(v))
            .cloned()
            .collect()
    }

    /// Whether any record matches `pred`.
    pub fn any(&self, pred: impl Fn(&T) -> bool) -> bool {
        self.data.read().values().any(pred)
    }

    /// Update a record in place. Returns the updated record, or `None` if not found.
    pub fn update(&self, id: &Uuid, f: impl FnOnce(&mut T)) -> Option<T> {
        let mut guard = self.data.write();
        if let Some(entry) = guard.get_mut(id) {
            f(entry);
            Some(entry.clone())
        } else {
            None
        }
    }

    /// Atomically read-validate-update a record.
    ///
    /// The closure may inspect the current state, validate preconditions,
    /// mutate the record, and return `Ok(R)` or `Err(E)`, all under a
    /// single write lock. Returns `None` if the record doesn't exist.
    pub fn try_update<R, E>(
        &self,
        id: &Uuid,
        f: impl FnOnce(&mut T) -> Result<R, E>,
    ) -> Option<Result<R, E>> {
        self.data.write().get_mut(id).map(f)
    }

    /// Run `f` against the whole map under one write lock.
    ///
    /// Used for uniqueness checks followed by an insert, and for updates
    /// that touch several records of the same store.
    pub fn mutate_all<R>(&self, f: impl FnOnce(&mut HashMap<Uuid, T>) -> R) -> R {
        f(&mut self.data.write())
    }

    /// Shared guard over the whole map, for checks spanning several stores.
    pub fn read(&self) -> RwLockReadGuard<'_, HashMap<Uuid, T>> {
        self.data.read()
    }

    /// Exclusive guard over the whole map, for checks spanning several stores.
    pub fn write(&self) -> RwLockWriteGuard<'_, HashMap<Uuid, T>> {
        self.data.write()
    }

    /// Remove a record by ID.
    pub fn remove(&self, id: &Uuid) -> Option<T> {
        self.data.write().remove(id)
    }

    /// Check if a record exists.
    pub fn contains(&self, id: &Uuid) -> bool {
        self.data.read().contains_key(id)
    }

    /// Return the number of records.
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Replace the contents with hydrated records.
    fn load(&self, records: Vec<T>, id_of: impl Fn(&T) -> Uuid) -> usize {
        let mut guard = self.data.write();
        let count = records.len();
        for record in records {
            guard.insert(id_of(&record), record);
        }
        count
    }
}

impl<T: Clone + Send + Sync> Default for Store<T> {
    fn default() -> Self {
        Self::new()
    }
}

// -- Configuration ------------------------------------------------------------

/// Log output format selected by `LOG_FORMAT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per line.
    Json,
}

/// Application configuration, read from the environment.
///
/// Custom `Debug` redacts the auth token.
#[derive(Clone)]
pub struct AppConfig {
    /// Port to bind the HTTP server to.
    pub port: u16,
    /// Shared secret for bearer tokens. `None` disables authentication.
    pub auth_token: Option<String>,
    /// Requests allowed per caller per minute.
    pub rate_limit_per_minute: u64,
    /// Activity events held in memory; older ones stay in the database.
    pub audit_retention: usize,
    pub log_format: LogFormat,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            auth_token: None,
            rate_limit_per_minute: 1000,
            audit_retention: crate::audit::DEFAULT_RETAINED_EVENTS,
            log_format: LogFormat::Text,
        }
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("port", &self.port)
            .field("auth_token", &self.auth_token.as_ref().map(|_| "[REDACTED]"))
            .field("rate_limit_per_minute", &self.rate_limit_per_minute)
            .field("audit_retention", &self.audit_retention)
            .field("log_format", &self.log_format)
            .finish()
    }
}

impl AppConfig {
    /// Build configuration from `PORT`, `AUTH_TOKEN`, `RATE_LIMIT_PER_MINUTE`,
    /// `AUDIT_RETENTION` and `LOG_FORMAT`. Unset or unparsable values fall back
    /// to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            port: lookup("PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            auth_token: lookup("AUTH_TOKEN").filter(|t| !t.is_empty()),
            rate_limit_per_minute: lookup("RATE_LIMIT_PER_MINUTE")
                .and_then(|r| r.parse().ok())
                .filter(|r| *r > 0)
                .unwrap_or(defaults.rate_limit_per_minute),
            audit_retention: lookup("AUDIT_RETENTION")
                .and_then(|r| r.parse().ok())
                .filter(|r| *r > 0)
                .unwrap_or(defaults.audit_retention),
            log_format: match lookup("LOG_FORMAT").as_deref() {
                Some(f) if f.eq_ignore_ascii_case("json") => LogFormat::Json,
                _ => LogFormat::Text,
            },
        }
    }
}

// -- Application State --------------------------------------------------------

/// Shared application state.
#[derive(Debug, Clone)]
pub struct AppState {
    // -- Framework catalogue --
    pub frameworks: Store<FrameworkRecord>,
    pub mappings: Store<FrameworkMappingRecord>,

    // -- Compliance structure --
    pub compliance_frameworks: Store<ComplianceFrameworkRecord>,
    pub topics: Store<TopicRecord>,
    pub components: Store<ComponentRecord>,
    pub clauses: Store<ClauseRecord>,

    // -- Organizations --
    pub organizations: Store<OrganizationRecord>,
    pub memberships: Store<MembershipRecord>,
    pub selections: Store<SelectionRecord>,

    // -- Organization workspace --
    pub controls: Store<ControlRecord>,
    pub evidence: Store<EvidenceRecord>,
    pub submissions: Store<SubmissionRecord>,
    pub tasks: Store<TaskRecord>,
    pub questionnaires: Store<QuestionnaireRecord>,
    pub questions: Store<QuestionRecord>,
    pub library: Store<LibraryEntryRecord>,

    /// Hash-chained activity log.
    pub audit: AuditLog,

    /// PostgreSQL pool. `None` runs the service in-memory only.
    pub db_pool: Option<PgPool>,

    pub config: AppConfig,
}

impl AppState {
    /// In-memory state with default configuration.
    pub fn new() -> Self {
        Self::with_config(AppConfig::default(), None)
    }

    /// State with the given configuration and optional database pool.
    pub fn with_config(config: AppConfig, db_pool: Option<PgPool>) -> Self {
        Self {
            frameworks: Store::new(),
            mappings: Store::new(),
            compliance_frameworks: Store::new(),
            topics: Store::new(),
            components: Store::new(),
            clauses: Store::new(),
            organizations: Store::new(),
            memberships: Store::new(),
            selections: Store::new(),
            controls: Store::new(),
            evidence: Store::new(),
            submissions: Store::new(),
            tasks: Store::new(),
            questionnaires: Store::new(),
            questions: Store::new(),
            library: Store::new(),
            audit: AuditLog::with_retention(config.audit_retention),
            db_pool,
            config,
        }
    }

    /// Load every store from the database. No-op without a pool.
    pub async fn hydrate_from_db(&self) -> Result<(), String> {
        use crate::db;

        let pool = match &self.db_pool {
            Some(pool) => pool,
            None => return Ok(()),
        };

        let frameworks = db::frameworks::load_all(pool)
            .await
            .map_err(|e| format!("failed to load frameworks: {e}"))?;
        let framework_count = self.frameworks.load(frameworks, |r| r.id);
        let mappings = db::frameworks::load_all_mappings(pool)
            .await
            .map_err(|e| format!("failed to load framework mappings: {e}"))?;
        self.mappings.load(mappings, |r| r.id);

        let structure = db::compliance::load_all(pool)
            .await
            .map_err(|e| format!("failed to load compliance structure: {e}"))?;
        let compliance_count = self
            .compliance_frameworks
            .load(structure.frameworks, |r| r.id);
        self.topics.load(structure.topics, |r| r.id);
        self.components.load(structure.components, |r| r.id);
        let clause_count = self.clauses.load(structure.clauses, |r| r.id);

        let organizations = db::organizations::load_all(pool)
            .await
            .map_err(|e| format!("failed to load organizations: {e}"))?;
        let organization_count = self.organizations.load(organizations, |r| r.id);
        let memberships = db::organizations::load_all_memberships(pool)
            .await
            .map_err(|e| format!("failed to load memberships: {e}"))?;
        self.memberships.load(memberships, |r| r.id);
        let selections = db::organizations::load_all_selections(pool)
            .await
            .map_err(|e| format!("failed to load selections: {e}"))?;
        self.selections.load(selections, |r| r.id);

        let controls = db::controls::load_all(pool)
            .await
            .map_err(|e| format!("failed to load controls: {e}"))?;
        let control_count = self.controls.load(controls, |r| r.id);

        let evidence = db::evidence::load_all(pool)
            .await
            .map_err(|e| format!("failed to load evidence: {e}"))?;
        let evidence_count = self.evidence.load(evidence, |r| r.id);
        let submissions = db::evidence::load_all_submissions(pool)
            .await
            .map_err(|e| format!("failed to load submissions: {e}"))?;
        self.submissions.load(submissions, |r| r.id);

        let tasks = db::tasks::load_all(pool)
            .await
            .map_err(|e| format!("failed to load tasks: {e}"))?;
        let task_count = self.tasks.load(tasks, |r| r.id);

        let questionnaires = db::questionnaires::load_all(pool)
            .await
            .map_err(|e| format!("failed to load questionnaires: {e}"))?;
        let questionnaire_count = self.questionnaires.load(questionnaires, |r| r.id);
        let questions = db::questionnaires::load_all_questions(pool)
            .await
            .map_err(|e| format!("failed to load questions: {e}"))?;
        self.questions.load(questions, |r| r.id);

        let library = db::library::load_all(pool)
            .await
            .map_err(|e| format!("failed to load answer library: {e}"))?;
        let library_count = self.library.load(library, |r| r.id);

        let events = db::audit::load_all(pool)
            .await
            .map_err(|e| format!("failed to load audit events: {e}"))?;
        let audit_count = events.len();
        self.audit.restore(events);

        tracing::info!(
            frameworks = framework_count,
            compliance_frameworks = compliance_count,
            clauses = clause_count,
            organizations = organization_count,
            controls = control_count,
            evidence = evidence_count,
            tasks = task_count,
            questionnaires = questionnaire_count,
            library_entries = library_count,
            audit_events = audit_count,
            "Hydrated in-memory stores from database"
        );

        Ok(())
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_insert_get_remove() {
        let store: Store<String> = Store::new();
        let id = Uuid::new_v4();
        assert!(store.insert(id, "a".into()).is_none());
        assert_eq!(store.get(&id).as_deref(), Some("a"));
        assert!(store.contains(&id));
        assert_eq!(store.len(), 1);
        assert_eq!(store.remove(&id).as_deref(), Some("a"));
        assert!(store.is_empty());
    }

    #[test]
    fn try_update_runs_under_one_lock() {
        let store: Store<i32> = Store::new();
        let id = Uuid::new_v4();
        store.insert(id, 1);
        let result: Option<Result<i32, &str>> = store.try_update(&id, |v| {
            if *v == 1 {
                *v = 2;
                Ok(*v)
            } else {
                Err("unexpected")
            }
        });
        assert_eq!(result, Some(Ok(2)));
        assert!(store
            .try_update::<(), ()>(&Uuid::new_v4(), |_| Ok(()))
            .is_none());
    }

    #[test]
    fn mutate_all_guards_duplicate_insert() {
        let store: Store<String> = Store::new();
        let insert_unique = |name: &str| {
            store.mutate_all(|map| {
                if map.values().any(|v| v == name) {
                    return false;
                }
                map.insert(Uuid::new_v4(), name.to_string());
                true
            })
        };
        assert!(insert_unique("SOC 2"));
        assert!(!insert_unique("SOC 2"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn filter_and_any() {
        let store: Store<i32> = Store::new();
        for n in 1..=5 {
            store.insert(Uuid::new_v4(), n);
        }
        assert_eq!(store.filter(|n| n % 2 == 0).len(), 2);
        assert!(store.any(|n| *n == 5));
        assert!(!store.any(|n| *n == 6));
    }

    #[test]
    fn config_from_lookup() {
        let env: HashMap<&str, &str> = [
            ("PORT", "9090"),
            ("AUTH_TOKEN", "s3cret"),
            ("RATE_LIMIT_PER_MINUTE", "30"),
            ("AUDIT_RETENTION", "500"),
            ("LOG_FORMAT", "JSON"),
        ]
        .into_iter()
        .collect();
        let config = AppConfig::from_lookup(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(config.port, 9090);
        assert_eq!(config.auth_token.as_deref(), Some("s3cret"));
        assert_eq!(config.rate_limit_per_minute, 30);
        assert_eq!(config.audit_retention, 500);
        assert_eq!(config.log_format, LogFormat::Json);
    }

    #[test]
    fn config_defaults_on_bad_values() {
        let config = AppConfig::from_lookup(|k| match k {
            "PORT" => Some("not-a-port".into()),
            "RATE_LIMIT_PER_MINUTE" => Some("0".into()),
            "AUTH_TOKEN" => Some(String::new()),
            _ => None,
        });
        assert_eq!(config.port, 8080);
        assert_eq!(config.rate_limit_per_minute, 1000);
        assert_eq!(config.audit_retention, crate::audit::DEFAULT_RETAINED_EVENTS);
        assert!(config.auth_token.is_none());
        assert_eq!(config.log_format, LogFormat::Text);
    }

    #[test]
    fn config_debug_redacts_token() {
        let config = AppConfig {
            auth_token: Some("super-secret".into()),
            ..AppConfig::default()
        };
        let debug = format!("{config:?}");
        assert!(!debug.contains("super-secret"));
        assert!(debug.contains("[REDACTED]"));
    }
}
