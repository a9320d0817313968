// Action router that records list actions in the log
use crate::application::ports::ActionRouter;
use crate::domain::action::ListAction;

/// Logs every opened list. The HTTP bridge hands the action itself back to
/// the browser, which performs the navigation.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingActionRouter;

impl ActionRouter for TracingActionRouter {
    fn open_list(&self, action: &ListAction) {
        tracing::info!(
            title = %action.title,
            entity = %action.entity,
            domain = %action.domain,
            view_modes = ?action.view_modes,
            "opening list view"
        );
    }
}
