//! Store-scoped bind/unbind conveniences for action handlers.

use crate::binding::{bind, unbind, BindError, BindOptions};
use crate::registry::BindingRegistry;
use crate::source::BindSource;
use crate::store::{SharedSink, SharedState};

/// Context handed to binding-aware actions: one store's collaborators
/// plus bind/unbind scoped to them.
pub struct ActionContext<'a> {
    pub state: &'a SharedState,
    pub sink: &'a SharedSink,
    registry: &'a mut BindingRegistry,
}

impl<'a> ActionContext<'a> {
    pub fn new(
        registry: &'a mut BindingRegistry,
        state: &'a SharedState,
        sink: &'a SharedSink,
    ) -> Self {
        ActionContext {
            state,
            sink,
            registry,
        }
    }

    /// [`bind`] against this context's store.
    pub fn bind_ref(
        &mut self,
        key: &str,
        source: &dyn BindSource,
        options: BindOptions,
    ) -> Result<(), BindError> {
        bind(self.registry, self.state, self.sink, key, source, options)
    }

    /// [`unbind`] against this context's store.
    pub fn unbind_ref(&mut self, key: &str) -> Result<(), BindError> {
        unbind(self.registry, self.sink, key)
    }
}

/// Runs `action` with bind/unbind conveniences scoped to one store.
pub fn with_bindings<R>(
    registry: &mut BindingRegistry,
    state: &SharedState,
    sink: &SharedSink,
    action: impl FnOnce(&mut ActionContext<'_>) -> R,
) -> R {
    let mut ctx = ActionContext::new(registry, state, sink);
    action(&mut ctx)
}
