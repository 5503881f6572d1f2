//! Deferred deallocation for audio-thread owned buffers
//!
//! Decks and sampler slots hold their audio through `basedrop::Shared<T>`.
//! When the audio thread drops the last reference (a slot is cleared, a
//! recording replaces an old sample, a deck unloads) the memory is not freed
//! in place: the pointer is queued and a background collector thread frees
//! it. Freeing a multi-minute buffer can take long enough to glitch the
//! output if done inside the callback.
//!
//! ```ignore
//! use crate::engine::gc_handle;
//!
//! let sample = basedrop::Shared::new(&gc_handle(), pcm);
//! ```

use basedrop::{Collector, Handle};
use std::sync::mpsc;
use std::sync::OnceLock;
use std::thread;
use std::time::Duration;

/// How often the collector thread reclaims queued drops
const COLLECT_INTERVAL: Duration = Duration::from_millis(100);

static GC_HANDLE: OnceLock<Handle> = OnceLock::new();

/// Spawn the collector thread and hand back its handle
fn init_gc() -> Handle {
    let (tx, rx) = mpsc::channel();

    let spawned = thread::Builder::new()
        .name("vinyl-gc".to_string())
        .spawn(move || {
            // Collector is !Sync, so it lives on this thread only
            let mut collector = Collector::new();
            if tx.send(collector.handle()).is_err() {
                return;
            }

            log::info!("Audio GC thread started");

            loop {
                collector.collect();
                thread::sleep(COLLECT_INTERVAL);
            }
        });

    match spawned.ok().and_then(|_| rx.recv().ok()) {
        Some(handle) => handle,
        None => {
            // Without a collector thread, fall back to a collector that is
            // never drained. Memory handed to it leaks instead of being freed
            // on the audio thread.
            log::error!("Failed to start audio GC thread, deferred drops will leak");
            let collector = Box::leak(Box::new(Collector::new()));
            collector.handle()
        }
    }
}

/// Handle for creating `Shared<T>` allocations
pub fn gc_handle() -> Handle {
    GC_HANDLE.get_or_init(init_gc).clone()
}

/// Hand a value to the collector thread instead of dropping it here
#[inline]
pub fn defer_drop<T: Send + 'static>(value: T) {
    drop(basedrop::Owned::new(&gc_handle(), value));
}
