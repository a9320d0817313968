// Application state for HTTP handlers
use crate::application::controller::DashboardController;
use std::collections::BTreeMap;

#[derive(Clone, Default)]
pub struct AppState {
    dashboards: BTreeMap<String, DashboardController>,
}

impl AppState {
    pub fn new(controllers: impl IntoIterator<Item = DashboardController>) -> Self {
        Self {
            dashboards: controllers
                .into_iter()
                .map(|controller| (controller.name().to_string(), controller))
                .collect(),
        }
    }

    pub fn dashboard(&self, name: &str) -> Option<&DashboardController> {
        self.dashboards.get(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.dashboards.keys().cloned().collect()
    }

    pub async fn activate_all(&self) {
        futures::future::join_all(self.dashboards.values().map(|controller| controller.activate())).await;
    }

    pub fn deactivate_all(&self) {
        for controller in self.dashboards.values() {
            controller.deactivate();
        }
    }
}
