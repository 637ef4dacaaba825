use kill_tree::{blocking::kill_tree_with_config, Config};
use lazy_static::lazy_static;
use std::sync::Mutex;

// Process ids of shell commands spawned by the developer system that may still be running.
lazy_static! {
    static ref PROCESS_STORE: Mutex<Vec<u32>> = Mutex::new(Vec::new());
}

pub fn store_process(pid: u32) {
    let mut store = PROCESS_STORE.lock().unwrap_or_else(|e| e.into_inner());
    store.push(pid);
}

// This removes the record of a process from the store, it does not kill it or check that it is dead.
pub fn remove_process(pid: u32) -> bool {
    let mut store = PROCESS_STORE.lock().unwrap_or_else(|e| e.into_inner());
    if let Some(index) = store.iter().position(|&x| x == pid) {
        store.remove(index);
        true
    } else {
        false
    }
}

/// Kill a process and all of its descendants, then forget it
pub fn kill_process(pid: u32) {
    let config = Config {
        signal: "SIGKILL".to_string(),
        ..Default::default()
    };
    if let Err(e) = kill_tree_with_config(pid, &config) {
        tracing::warn!(pid, error = %e, "failed to kill process tree");
    }
    remove_process(pid);
}

/// Kill all stored processes
pub fn kill_processes() {
    let pids: Vec<u32> = {
        let store = PROCESS_STORE.lock().unwrap_or_else(|e| e.into_inner());
        store.clone()
    };
    for pid in pids {
        kill_process(pid);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_and_remove() {
        store_process(999_999_001);
        assert!(remove_process(999_999_001));
        assert!(!remove_process(999_999_001));
    }
}
