//! Registering output scripts with the wallet's relevance tracker

use super::builder::Script;
use crate::wallet::tracker::RelevanceTracker;

/// Ask the tracker to watch `script_pubkey`
///
/// Best effort: a failed registration is logged and reported as `false`
/// but never aborts the operation that produced the script.
pub fn register_watched_script(tracker: &dyn RelevanceTracker, script_pubkey: &Script) -> bool {
    if tracker.is_watched(script_pubkey) {
        return true;
    }
    match tracker.watch_script(script_pubkey) {
        Ok(()) => {
            log::debug!("Watching script {}", script_pubkey.to_hex());
            true
        }
        Err(e) => {
            log::warn!("Failed to watch script {}: {}", script_pubkey.to_hex(), e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::Transaction;
    use crate::wallet::tracker::TrackerError;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingTracker {
        scripts: Mutex<Vec<Script>>,
        fail: bool,
    }

    impl RelevanceTracker for RecordingTracker {
        fn watch_script(&self, script_pubkey: &Script) -> Result<(), TrackerError> {
            if self.fail {
                return Err(TrackerError::Unavailable("offline".to_string()));
            }
            self.scripts.lock().unwrap().push(script_pubkey.clone());
            Ok(())
        }

        fn is_watched(&self, script_pubkey: &Script) -> bool {
            self.scripts.lock().unwrap().contains(script_pubkey)
        }

        fn register_transaction(&self, _tx: &Transaction) -> Result<(), TrackerError> {
            Ok(())
        }
    }

    #[test]
    fn test_registers_once() {
        let tracker = RecordingTracker::default();
        let script = Script::from_bytes(vec![0xa9, 0x14]);
        assert!(register_watched_script(&tracker, &script));
        assert!(register_watched_script(&tracker, &script));
        assert_eq!(tracker.scripts.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_failure_is_not_fatal() {
        let tracker = RecordingTracker {
            fail: true,
            ..Default::default()
        };
        assert!(!register_watched_script(&tracker, &Script::new()));
    }
}
