//! # Query Warnings
//!
//! Task-local collection of non-fatal warnings raised during query execution
//! (for example, the row mapper falling back to defensive conversion).
//!
//! Warnings are only recorded while a caller has opened a scope with
//! [`collect_warnings`]; outside of one, [`add_warning`] is a no-op.

use std::future::Future;
use std::sync::{Arc, Mutex};

tokio::task_local! {
    pub static QUERY_WARNINGS: Arc<Mutex<Vec<String>>>;
}

/// Helper to add a warning to the current task's warning list, if active.
pub fn add_warning(warning: String) {
    if let Ok(warnings) = QUERY_WARNINGS.try_with(|w: &Arc<Mutex<Vec<String>>>| w.clone()) {
        if let Ok(mut lock) = warnings.lock() {
            lock.push(warning);
        }
    }
}

/// Runs `fut` with a fresh warning scope and returns its output together
/// with every warning recorded while it ran.
pub async fn collect_warnings<F: Future>(fut: F) -> (F::Output, Vec<String>) {
    let warnings = Arc::new(Mutex::new(Vec::new()));
    let output = QUERY_WARNINGS.scope(warnings.clone(), fut).await;
    let collected = match warnings.lock() {
        Ok(mut lock) => std::mem::take(&mut *lock),
        Err(_) => Vec::new(),
    };
    (output, collected)
}

/// Synchronous counterpart of [`collect_warnings`].
pub fn collect_warnings_sync<R>(f: impl FnOnce() -> R) -> (R, Vec<String>) {
    let warnings = Arc::new(Mutex::new(Vec::new()));
    let output = QUERY_WARNINGS.sync_scope(warnings.clone(), f);
    let collected = match warnings.lock() {
        Ok(mut lock) => std::mem::take(&mut *lock),
        Err(_) => Vec::new(),
    };
    (output, collected)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_warnings_are_scoped() {
        add_warning("outside".to_string());

        let (value, warnings) = collect_warnings(async {
            add_warning("first".to_string());
            add_warning("second".to_string());
            7
        })
        .await;

        assert_eq!(value, 7);
        assert_eq!(warnings, vec!["first".to_string(), "second".to_string()]);
    }

    #[test]
    fn test_sync_scope() {
        let ((), warnings) = collect_warnings_sync(|| add_warning("sync".to_string()));
        assert_eq!(warnings, vec!["sync".to_string()]);
    }
}
