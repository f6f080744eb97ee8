use tracing::debug;

/// Thread-pool setup for batch training runs.
///
/// Subspace fan-out goes through rayon's global pool; for long training
/// batches pinning each worker to a core avoids migration noise. Calling
/// this is optional; training works on the default pool too.
pub struct RuntimeConfig;

impl RuntimeConfig {
    /// Configure the global rayon pool with one pinned worker per core.
    /// A no-op on platforms where core enumeration fails.
    pub fn init_pinned_pool() -> Result<(), rayon::ThreadPoolBuildError> {
        let core_ids = core_affinity::get_core_ids().unwrap_or_default();
        if core_ids.is_empty() {
            return Ok(());
        }
        debug!(workers = core_ids.len(), "pinning rayon workers");

        rayon::ThreadPoolBuilder::new()
            .num_threads(core_ids.len())
            .start_handler(move |thread_id| {
                if thread_id < core_ids.len() {
                    core_affinity::set_for_current(core_ids[thread_id]);
                }
            })
            .build_global()
    }
}
