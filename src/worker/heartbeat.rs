//! Worker liveness loop
//!
//! A background thread pings the coordinator on a fixed interval from the
//! moment registration succeeds until the worker dies. The loop is the
//! sole cancellation trigger: an authoritative "unknown worker" reply
//! flips the shared state to Dead, which the main loop and the chunk
//! tasks observe cooperatively. Transport hiccups are logged and ignored.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use super::client::{ClientError, CoordinatorClient};
use super::{WorkerState, WorkerStatus};

/// Spawn the heartbeat thread for a registered worker.
pub fn spawn<C: CoordinatorClient + 'static>(
    client: Arc<C>,
    state: Arc<WorkerState>,
    interval: Duration,
) -> JoinHandle<()> {
    thread::spawn(move || {
        while !state.is_dead() {
            thread::sleep(interval);
            if state.is_dead() || !tick(client.as_ref(), &state) {
                break;
            }
        }
    })
}

/// Send one pulse. Returns false when the loop should stop.
fn tick<C: CoordinatorClient + ?Sized>(client: &C, state: &WorkerState) -> bool {
    let Some(worker) = state.worker_id() else {
        return false;
    };

    match client.heartbeat(&worker) {
        Ok(()) => {
            log::trace!("heartbeat acknowledged");
            true
        }
        Err(ClientError::UnknownWorker) => {
            log::error!(
                "coordinator no longer knows worker {}; shutting down",
                worker.id
            );
            state.set_status(WorkerStatus::Dead);
            false
        }
        Err(error) => {
            log::warn!("heartbeat failed: {}", error);
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::worker::tests::MockCoordinator;
    use crate::worker::wire::WorkerId;

    fn registered_state() -> WorkerState {
        let state = WorkerState::new();
        state.set_worker_id(WorkerId {
            id: "w1".to_string(),
        });
        state
    }

    #[test]
    fn test_tick_continues_on_ack() {
        let state = registered_state();
        let client = MockCoordinator::default();
        assert!(tick(&client, &state));
        assert!(!state.is_dead());
    }

    #[test]
    fn test_tick_continues_on_transport_error() {
        let state = registered_state();
        let client = MockCoordinator::default();
        client.fail_next_heartbeat();
        assert!(tick(&client, &state));
        assert!(!state.is_dead());
    }

    #[test]
    fn test_unknown_worker_is_terminal() {
        let state = registered_state();
        let client = MockCoordinator::default();
        client.reject_heartbeats();
        assert!(!tick(&client, &state));
        assert!(state.is_dead());
    }
}
