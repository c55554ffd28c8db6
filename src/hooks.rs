//! Lifecycle hooks
//!
//! The external training loop owns an ordered hook registry and invokes
//! it at two points: once before the run starts and once after every
//! training batch. This crate only ever appends to the registry (row
//! normalization registers itself here); it never drives dispatch.

use crate::embedder::table::EmbeddingTable;

/// Trait for embedder lifecycle hooks.
///
/// Both methods default to no-ops, so a hook only implements the events
/// it cares about.
pub trait EmbedderHook: Send {
    /// Called once before the first training batch.
    fn on_run_start(&mut self, _table: &mut EmbeddingTable) {}

    /// Called after every training batch.
    fn on_post_batch(&mut self, _table: &mut EmbeddingTable) {}

    /// Hook name for logging.
    fn name(&self) -> &'static str {
        "EmbedderHook"
    }
}

/// Ordered registry of lifecycle hooks, dispatched in registration order.
#[derive(Default)]
pub struct HookRegistry {
    hooks: Vec<Box<dyn EmbedderHook>>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self { hooks: Vec::new() }
    }

    /// Append a hook. Hooks fire in registration order.
    pub fn register<H: EmbedderHook + 'static>(&mut self, hook: H) {
        self.hooks.push(Box::new(hook));
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    /// Fire the run-start event.
    pub fn run_start(&mut self, table: &mut EmbeddingTable) {
        for hook in &mut self.hooks {
            hook.on_run_start(table);
        }
    }

    /// Fire the post-batch event.
    pub fn post_batch(&mut self, table: &mut EmbeddingTable) {
        for hook in &mut self.hooks {
            hook.on_post_batch(table);
        }
    }
}
