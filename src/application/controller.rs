// Dashboard data controller - fetch, fallback, merge-by-overwrite and timed refresh
use crate::application::decode;
use crate::application::ports::{ActionRouter, ChartHandle, RenderHooks};
use crate::application::query_service::RemoteQueryService;
use crate::application::scheduler::{Scheduler, Tick, TimerHandle};
use crate::domain::action::ListAction;
use crate::domain::dashboard::DashboardDefinition;
use crate::domain::error::{ControllerError, RemoteError};
use crate::domain::query::Query;
use crate::domain::refresh::{RefreshPolicy, View};
use crate::domain::state::{DashboardState, StatePatch};
use crate::domain::task::FetchTask;
use crate::infrastructure::config::{date_vars, prepare_query};
use chrono::Local;
use futures::FutureExt;
use futures::future::join_all;
use serde_json::Value;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;

enum Lifecycle {
    Inactive,
    Active { refresh: Option<TimerHandle> },
}

struct Inner {
    definition: DashboardDefinition,
    service: Arc<dyn RemoteQueryService>,
    scheduler: Arc<dyn Scheduler>,
    router: Arc<dyn ActionRouter>,
    hooks: Option<Arc<dyn RenderHooks>>,
    state: watch::Sender<DashboardState>,
    lifecycle: Mutex<Lifecycle>,
    view: Mutex<View>,
    charts: Mutex<Vec<ChartHandle>>,
    active_section: Mutex<Option<String>>,
}

/// Owns one dashboard's state and keeps it filled from the Remote Query
/// Service. Cheap to clone; clones share the same dashboard.
///
/// Fetch failures never escape: a failed aggregate query falls back to the
/// task's decomposed plan, and a failed plan step leaves its key at the
/// default value. Presentation code only ever sees renderable state.
#[derive(Clone)]
pub struct DashboardController {
    inner: Arc<Inner>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl DashboardController {
    pub fn new(
        definition: DashboardDefinition,
        service: Arc<dyn RemoteQueryService>,
        scheduler: Arc<dyn Scheduler>,
        router: Arc<dyn ActionRouter>,
        hooks: Option<Arc<dyn RenderHooks>>,
    ) -> Self {
        let (state, _) = watch::channel(DashboardState::new(&definition.schema()));
        let view = definition.initial_view.clone();
        Self {
            inner: Arc::new(Inner {
                definition,
                service,
                scheduler,
                router,
                hooks,
                state,
                lifecycle: Mutex::new(Lifecycle::Inactive),
                view: Mutex::new(view),
                charts: Mutex::new(Vec::new()),
                active_section: Mutex::new(None),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.definition.name
    }

    /// Receiver notified after every merge into the state.
    pub fn subscribe(&self) -> watch::Receiver<DashboardState> {
        self.inner.state.subscribe()
    }

    pub fn snapshot(&self) -> DashboardState {
        self.inner.state.borrow().clone()
    }

    pub fn is_active(&self) -> bool {
        matches!(*lock(&self.inner.lifecycle), Lifecycle::Active { .. })
    }

    pub fn pending_timers(&self) -> usize {
        match &*lock(&self.inner.lifecycle) {
            Lifecycle::Active { refresh: Some(timer) } if timer.is_active() => 1,
            _ => 0,
        }
    }

    pub fn current_view(&self) -> View {
        lock(&self.inner.view).clone()
    }

    pub fn active_section(&self) -> Option<String> {
        lock(&self.inner.active_section).clone()
    }

    pub fn mounted_charts(&self) -> usize {
        lock(&self.inner.charts).len()
    }

    /// Run the initial fetch cycle and start the dashboard's default refresh
    /// policy. Calling this on an active controller does nothing.
    pub async fn activate(&self) {
        {
            let mut lifecycle = lock(&self.inner.lifecycle);
            if matches!(*lifecycle, Lifecycle::Active { .. }) {
                tracing::debug!(dashboard = %self.name(), "already active");
                return;
            }
            *lifecycle = Lifecycle::Active { refresh: None };
        }

        tracing::info!(dashboard = %self.name(), "activating dashboard");
        self.fetch_all().await;

        if let Some(policy) = self.inner.definition.refresh.clone() {
            if let Err(e) = self.schedule_refresh(policy) {
                tracing::debug!(dashboard = %self.name(), error = %e, "default refresh not scheduled");
            }
        }
    }

    /// Cancel the refresh timer and destroy every mounted chart. Safe to call
    /// any number of times.
    pub fn deactivate(&self) {
        // Chart lock first, matching mount_charts, so no mount lands after the drain.
        let mut charts = lock(&self.inner.charts);
        let previous = std::mem::replace(&mut *lock(&self.inner.lifecycle), Lifecycle::Inactive);
        match previous {
            Lifecycle::Inactive => {
                tracing::debug!(dashboard = %self.name(), "already inactive");
            }
            Lifecycle::Active { refresh } => {
                if let Some(mut timer) = refresh {
                    timer.cancel();
                }
                tracing::info!(dashboard = %self.name(), "dashboard deactivated");
            }
        }

        let mounted = std::mem::take(&mut *charts);
        drop(charts);
        drop(mounted);
    }

    /// One manual full fetch cycle.
    pub async fn refresh_all(&self) {
        if !self.is_active() {
            tracing::debug!(dashboard = %self.name(), "refresh skipped, dashboard inactive");
            return;
        }
        self.fetch_all().await;
    }

    async fn fetch_all(&self) {
        let fetches = self
            .inner
            .definition
            .tasks
            .iter()
            .map(|task| self.fetch_primary(task));
        join_all(fetches).await;
    }

    /// Issue the task's aggregate query and merge its result. Any failure,
    /// including a result of the wrong shape, runs the fallback plan instead.
    pub async fn fetch_primary(&self, task: &FetchTask) -> StatePatch {
        let Some(query) = &task.primary else {
            return self.fetch_fallback(task).await;
        };

        let result = self
            .call(query)
            .await
            .and_then(|value| decode::primary(task, &value));

        match result {
            Ok(patch) => {
                self.merge(&patch);
                patch
            }
            Err(e) => {
                tracing::warn!(
                    dashboard = %self.name(),
                    task = %task.id,
                    error = %e,
                    "primary query failed, running fallback plan"
                );
                self.fetch_fallback(task).await
            }
        }
    }

    /// Run every step of the task's fallback plan in order. Each step is
    /// merged as soon as it resolves; a failed step merges its default value.
    pub async fn fetch_fallback(&self, task: &FetchTask) -> StatePatch {
        tracing::debug!(
            dashboard = %self.name(),
            task = %task.id,
            steps = task.fallback.len(),
            "running fallback plan"
        );

        let mut combined = StatePatch::default();
        for sub in &task.fallback {
            let result = self
                .call(&sub.query)
                .await
                .and_then(|value| decode::sub_request(sub, &value));

            let patch = match result {
                Ok(patch) => patch,
                Err(e) => {
                    tracing::warn!(
                        dashboard = %self.name(),
                        task = %task.id,
                        key = %sub.key,
                        error = %e,
                        "fallback query failed, using default"
                    );
                    decode::fallback_default(sub)
                }
            };

            self.merge(&patch);
            combined.extend(patch);
        }
        combined
    }

    /// Start periodic refresh. Replaces any refresh already scheduled, so a
    /// controller never runs more than one timer.
    pub fn schedule_refresh(&self, policy: RefreshPolicy) -> Result<(), ControllerError> {
        if policy.interval().is_zero() {
            return Err(ControllerError::ZeroInterval);
        }
        for rule in policy.rules() {
            if self.inner.definition.task(&rule.task).is_none() {
                return Err(ControllerError::UnknownTask {
                    dashboard: self.name().to_string(),
                    task: rule.task.clone(),
                });
            }
        }

        let mut lifecycle = lock(&self.inner.lifecycle);
        let Lifecycle::Active { refresh } = &mut *lifecycle else {
            return Err(ControllerError::NotActive(self.name().to_string()));
        };

        if let Some(mut previous) = refresh.take() {
            previous.cancel();
        }

        let interval = policy.interval();
        let policy = Arc::new(policy);
        let weak = Arc::downgrade(&self.inner);
        let tick: Tick = Arc::new(move || {
            let weak = weak.clone();
            let policy = policy.clone();
            async move {
                if let Some(inner) = weak.upgrade() {
                    DashboardController { inner }.refresh_tick(&policy).await;
                }
            }
            .boxed()
        });

        *refresh = Some(self.inner.scheduler.every(interval, tick));
        tracing::info!(dashboard = %self.name(), ?interval, "refresh scheduled");
        Ok(())
    }

    async fn refresh_tick(&self, policy: &RefreshPolicy) {
        if !self.is_active() {
            return;
        }

        let view = self.current_view();
        let due = policy.due_tasks(&view);
        tracing::debug!(dashboard = %self.name(), %view, tasks = ?due, "refresh tick");

        let fetches = due
            .iter()
            .filter_map(|id| self.inner.definition.task(id))
            .map(|task| self.fetch_primary(task));
        join_all(fetches).await;

        if policy.remount_due(&view) {
            self.mount_charts();
        }
    }

    /// Record the presentation's new focus and re-fetch the tasks shown in it.
    pub async fn switch_view(&self, view: View) {
        *lock(&self.inner.view) = view.clone();
        if !self.is_active() {
            return;
        }

        let fetches = self
            .inner
            .definition
            .tasks_shown_in(&view)
            .map(|task| self.fetch_primary(task));
        join_all(fetches).await;
    }

    /// Create one chart per series from the current state, destroying the
    /// charts mounted before. Returns the number of mounted charts.
    pub fn mount_charts(&self) -> usize {
        let Some(hooks) = &self.inner.hooks else {
            return 0;
        };
        let mut charts = lock(&self.inner.charts);
        if !self.is_active() {
            tracing::debug!(dashboard = %self.name(), "charts not mounted, dashboard inactive");
            return 0;
        }

        let state = self.snapshot();
        charts.clear();
        for (key, series) in &state.chart_series {
            charts.push(ChartHandle::create(hooks.clone(), key, series));
        }
        charts.len()
    }

    /// Resolve a section shortcut into a list action and hand it to the router.
    pub fn open_section(&self, key: &str) -> Option<ListAction> {
        let section = self.inner.definition.section(key)?;
        let action = section.action();
        tracing::debug!(dashboard = %self.name(), section = %key, entity = %action.entity, "opening section");
        self.inner.router.open_list(&action);
        *lock(&self.inner.active_section) = Some(section.key.clone());
        Some(action)
    }

    async fn call(&self, query: &Query) -> Result<Value, RemoteError> {
        let vars = date_vars(Local::now().date_naive());
        let bound = query.bind(&|s: &str| prepare_query(s, &vars));
        tracing::debug!(dashboard = %self.name(), query = %bound, "remote call");
        self.inner.service.call(&bound).await
    }

    fn merge(&self, patch: &StatePatch) {
        if patch.is_empty() {
            return;
        }
        self.inner.state.send_modify(|state| state.apply(patch));
    }
}
