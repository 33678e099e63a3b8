use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use tracing::{info, warn};

/// Raise `stop` on Ctrl-C. The listener thread is detached and lives until
/// the process exits.
pub fn spawn_interrupt_listener(stop: Arc<AtomicBool>) -> bool {
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            warn!(error = %e, "Failed to create signal runtime; Ctrl-C will not turn the output off");
            return false;
        }
    };

    let spawned = thread::Builder::new()
        .name("interrupt".to_string())
        .spawn(move || {
            runtime.block_on(async move {
                match tokio::signal::ctrl_c().await {
                    Ok(()) => {
                        info!("Interrupt received, stopping sweep");
                        stop.store(true, Ordering::Relaxed);
                    }
                    Err(e) => warn!(error = %e, "Unable to listen for Ctrl-C"),
                }
            });
        });

    match spawned {
        Ok(_) => true,
        Err(e) => {
            warn!(error = %e, "Failed to spawn interrupt listener");
            false
        }
    }
}
