// Refresh policies: which tasks re-run on each timer tick, gated on UI focus
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// The presentation's current focus, e.g. `home`, `stock` or `orders`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct View(String);

impl View {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub type ViewPredicate = Arc<dyn Fn(&View) -> bool + Send + Sync>;

/// Predicate holding only while `name` is the current view.
pub fn view_is(name: impl Into<String>) -> ViewPredicate {
    let expected = View::new(name);
    Arc::new(move |view: &View| *view == expected)
}

#[derive(Clone)]
pub struct RefreshRule {
    pub task: String,
    gate: Option<ViewPredicate>,
}

impl RefreshRule {
    pub fn is_due(&self, view: &View) -> bool {
        self.gate.as_ref().is_none_or(|gate| gate(view))
    }
}

#[derive(Clone)]
pub struct RefreshPolicy {
    interval: Duration,
    rules: Vec<RefreshRule>,
    remount_charts: Option<ViewPredicate>,
}

impl RefreshPolicy {
    pub fn every(interval: Duration) -> Self {
        Self {
            interval,
            rules: Vec::new(),
            remount_charts: None,
        }
    }

    /// Re-run `task` on every tick.
    pub fn refresh(mut self, task: impl Into<String>) -> Self {
        self.rules.push(RefreshRule {
            task: task.into(),
            gate: None,
        });
        self
    }

    /// Re-run `task` only on ticks where `gate` holds for the current view.
    pub fn refresh_when(mut self, task: impl Into<String>, gate: ViewPredicate) -> Self {
        self.rules.push(RefreshRule {
            task: task.into(),
            gate: Some(gate),
        });
        self
    }

    /// Recreate chart handles after ticks where `gate` holds.
    pub fn remount_charts_when(mut self, gate: ViewPredicate) -> Self {
        self.remount_charts = Some(gate);
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn rules(&self) -> &[RefreshRule] {
        &self.rules
    }

    pub fn due_tasks<'a>(&'a self, view: &View) -> Vec<&'a str> {
        self.rules
            .iter()
            .filter(|rule| rule.is_due(view))
            .map(|rule| rule.task.as_str())
            .collect()
    }

    pub fn remount_due(&self, view: &View) -> bool {
        self.remount_charts.as_ref().is_some_and(|gate| gate(view))
    }
}

impl fmt::Debug for RefreshPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefreshPolicy")
            .field("interval", &self.interval)
            .field("tasks", &self.rules.iter().map(|r| r.task.as_str()).collect::<Vec<_>>())
            .field("remount_charts", &self.remount_charts.is_some())
            .finish()
    }
}
