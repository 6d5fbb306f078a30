pub use torahbench_types::{TokenUsage, Trace, TraceBuilder};

use std::cell::RefCell;

tokio::task_local! {
    static TRACES: RefCell<Vec<Trace>>;
}

/// Run a future within a tracing scope and return its result along with
/// every trace reported while it ran.
pub async fn scope_traces<F, R>(f: F) -> (R, Vec<Trace>)
where
    F: std::future::Future<Output = R>,
{
    TRACES
        .scope(RefCell::new(Vec::new()), async move {
            let result = f.await;
            let collected = TRACES.with(|t| t.take());
            (result, collected)
        })
        .await
}

/// Record an upstream call against the case currently being evaluated.
/// Outside a scope this is a no-op.
pub fn report_trace(trace: Trace) {
    let _ = TRACES.try_with(|traces| {
        traces.borrow_mut().push(trace);
    });
}
