//! Per-layer filters

use tracing::{subscriber::Interest, Metadata, Subscriber};
use tracing_subscriber::layer::{Context, Filter};

const WRITER_TARGET: &str = "logit_file";

/// Keeps the rolling writer's own events out of the file it is writing.
///
/// A roll event logged into the file being rolled would re-enter the writer
/// while it still holds its lock.
#[derive(Debug, Clone, Copy, Default)]
pub struct WriterEventFilter;

impl WriterEventFilter {
    pub fn new() -> Self {
        Self
    }
}

impl<S> Filter<S> for WriterEventFilter
where
    S: Subscriber,
{
    fn enabled(&self, meta: &Metadata<'_>, _ctx: &Context<'_, S>) -> bool {
        !is_writer_event(meta)
    }

    fn callsite_enabled(&self, meta: &Metadata<'_>) -> Interest {
        if is_writer_event(meta) {
            Interest::never()
        } else {
            Interest::sometimes()
        }
    }
}

/// Whether an event was emitted by the rolling writer crate
pub fn is_writer_event(meta: &Metadata<'_>) -> bool {
    let target = meta.target();
    target == WRITER_TARGET || target.starts_with("logit_file::")
}
