// Presentation-side collaborators the controller drives but does not implement
use crate::domain::action::ListAction;
use crate::domain::state::Series;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChartId(pub u64);

/// Chart lifecycle owned by the presentation layer.
pub trait RenderHooks: Send + Sync {
    fn create_chart(&self, series: &str, data: &Series) -> ChartId;
    fn destroy_chart(&self, id: ChartId);
}

/// Opens record list views.
pub trait ActionRouter: Send + Sync {
    fn open_list(&self, action: &ListAction);
}

/// A live chart instance. Dropping the handle destroys the chart, so a
/// created chart is always paired with exactly one destroy call.
pub struct ChartHandle {
    id: ChartId,
    hooks: Arc<dyn RenderHooks>,
}

impl ChartHandle {
    pub fn create(hooks: Arc<dyn RenderHooks>, series: &str, data: &Series) -> Self {
        let id = hooks.create_chart(series, data);
        Self { id, hooks }
    }
}

impl Drop for ChartHandle {
    fn drop(&mut self) {
        self.hooks.destroy_chart(self.id);
    }
}
