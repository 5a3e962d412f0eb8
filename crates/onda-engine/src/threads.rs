//! Thread-role diagnostics.
//!
//! The engine distinguishes two thread roles: *control* (graph building,
//! user script, non-realtime logic) and *render* (the per-quantum graph
//! traversal, invoked by the OS audio callback or an offline render loop).
//! Embeddings tag their threads with [`register_thread_role`]; the debug
//! assertions then catch calls that land on the wrong side of the boundary.
//!
//! This is diagnostic tooling, not a correctness mechanism: a thread with
//! no registered role passes every assertion (offline rendering runs both
//! roles on one caller thread), and the checks compile to nothing in
//! release builds.

use std::cell::Cell;

/// Role a thread plays in the engine's concurrency model.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ThreadRole {
    /// Builds graphs, applies descriptions, runs user script callbacks.
    Control,
    /// Runs the per-quantum graph traversal.
    Render,
}

thread_local! {
    static THREAD_ROLE: Cell<Option<ThreadRole>> = const { Cell::new(None) };
}

/// Tags the current thread with a role.
pub fn register_thread_role(role: ThreadRole) {
    THREAD_ROLE.with(|cell| cell.set(Some(role)));
}

/// Clears the current thread's role tag.
pub fn clear_thread_role() {
    THREAD_ROLE.with(|cell| cell.set(None));
}

/// Returns the current thread's registered role, if any.
pub fn current_thread_role() -> Option<ThreadRole> {
    THREAD_ROLE.with(|cell| cell.get())
}

/// Debug-asserts that this thread is not registered as the render thread.
#[inline]
pub fn debug_assert_control_thread() {
    #[cfg(debug_assertions)]
    if let Some(role) = current_thread_role() {
        assert_eq!(
            role,
            ThreadRole::Control,
            "control-thread entry point called from the render thread"
        );
    }
}

/// Debug-asserts that this thread is not registered as the control thread.
#[inline]
pub fn debug_assert_render_thread() {
    #[cfg(debug_assertions)]
    if let Some(role) = current_thread_role() {
        assert_eq!(
            role,
            ThreadRole::Render,
            "render-path entry point called from the control thread"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roles_are_per_thread() {
        register_thread_role(ThreadRole::Control);
        assert_eq!(current_thread_role(), Some(ThreadRole::Control));

        std::thread::spawn(|| {
            assert_eq!(current_thread_role(), None);
            register_thread_role(ThreadRole::Render);
            assert_eq!(current_thread_role(), Some(ThreadRole::Render));
        })
        .join()
        .unwrap();

        assert_eq!(current_thread_role(), Some(ThreadRole::Control));
        clear_thread_role();
        assert_eq!(current_thread_role(), None);
    }

    #[test]
    fn unregistered_threads_pass_both_assertions() {
        clear_thread_role();
        debug_assert_control_thread();
        debug_assert_render_thread();
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic]
    fn render_assertion_catches_control_thread() {
        register_thread_role(ThreadRole::Control);
        // Restore on unwind so other tests on this thread are unaffected.
        struct Reset;
        impl Drop for Reset {
            fn drop(&mut self) {
                clear_thread_role();
            }
        }
        let _reset = Reset;
        debug_assert_render_thread();
    }
}
