//! Focus controller using the Actor pattern.
//!
//! The controller ties the pieces together: it owns the focus session
//! manager, the unlock evaluator, and the restriction poller, and is driven
//! by commands over an mpsc channel.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌─────────────────┐     ┌──────────────────┐
//! │ ControllerHandle│────▶│ ControllerActor │────▶│ Broadcast Channel│
//! └─────────────────┘     └─────────────────┘     └──────────────────┘
//!         │                       │                        │
//!         │  ControllerCommand    │  owns                  │  FocusEvent
//!         ▼                       ▼                        ▼
//!   start / tasks /      FocusSessionManager         CLI, loggers
//!   stop / CRUD          UnlockEvaluator
//!                        RestrictionPoller ──▶ ProcessDetected / ProcessTerminated
//! ```
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()` or `.expect()` in production code
//! - Channel operations handle closure gracefully

use std::sync::Arc;

use taskgate_core::{FocusSessionManager, UnlockEvaluator};
use tokio::sync::{broadcast, mpsc};

use crate::config::{ConfigError, EngineConfig};
use crate::platform::ProcessControl;
use crate::poller::RestrictionPoller;

mod actor;
mod commands;
mod handle;

pub use actor::ControllerActor;
pub use commands::{ControllerCommand, ControllerError, ControllerSnapshot, FocusEvent};
pub use handle::ControllerHandle;

/// Channel buffer sizes
const COMMAND_BUFFER: usize = 64;
const EVENT_BUFFER: usize = 256;

/// Spawns the controller actor and returns a handle for interaction.
///
/// # Errors
///
/// Returns `ConfigError::InvalidRestriction` if the configured restricted
/// apps are invalid.
pub fn spawn_controller(
    config: &EngineConfig,
    control: Arc<dyn ProcessControl>,
) -> Result<ControllerHandle, ConfigError> {
    let restrictions = config.restriction_list()?;

    let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_BUFFER);
    let (event_tx, _) = broadcast::channel(EVENT_BUFFER);

    let actor = ControllerActor::new(
        cmd_rx,
        FocusSessionManager::with_restrictions(config.focus.clone(), restrictions),
        UnlockEvaluator::with_config(config.unlock.clone()),
        RestrictionPoller::with_config(control, config.poller_config()),
        event_tx.clone(),
    );
    tokio::spawn(actor.run());

    Ok(ControllerHandle::new(cmd_tx, event_tx))
}
