//! State handler functions and the static state table.
//!
//! Each state is defined by up to three plain functions:
//!   - `on_enter(ctx)`: queued once on entry
//!   - `on_exit(ctx)`: queued once on exit
//!   - `on_update(ctx) -> Option<StateId>`: reacts to `ctx.event`
//!
//! Handlers are **pure**: they update the bitsets and the armed timeout in
//! the context and queue [`RadioAction`]s.  The service applies those
//! actions through the radio port after the dispatch returns.

use log::{info, warn};

use super::context::{
    DisconnectReason, LifecycleEvent, RadioAction, TagContext, TimeoutKind,
};
use super::{StateDescriptor, StateId};
use crate::ecp::BasicState;

/// Build the state table.  Order **must** match `StateId` discriminants.
pub fn build_state_table() -> [StateDescriptor; StateId::COUNT] {
    [
        StateDescriptor {
            id: StateId::Unassociated,
            name: "UNASSOCIATED",
            on_enter: Some(unassociated_enter),
            on_exit: None,
            on_update: unassociated_update,
        },
        StateDescriptor {
            id: StateId::Configuring,
            name: "CONFIGURING",
            on_enter: None,
            on_exit: None,
            on_update: configuring_update,
        },
        StateDescriptor {
            id: StateId::Configured,
            name: "CONFIGURED",
            on_enter: Some(configured_enter),
            on_exit: None,
            on_update: configured_update,
        },
        StateDescriptor {
            id: StateId::Synchronized,
            name: "SYNCHRONIZED",
            on_enter: Some(synchronized_enter),
            on_exit: None,
            on_update: synchronized_update,
        },
        StateDescriptor {
            id: StateId::Updating,
            name: "UPDATING",
            on_enter: Some(updating_enter),
            on_exit: None,
            on_update: updating_update,
        },
        StateDescriptor {
            id: StateId::Unsynchronized,
            name: "UNSYNCHRONIZED",
            on_enter: Some(unsynchronized_enter),
            on_exit: None,
            on_update: unsynchronized_update,
        },
    ]
}

/// First sync after provisioning also waits for the AP to signal the end
/// of its update.
fn may_synchronize(ctx: &TagContext) -> bool {
    ctx.configuring.is_complete() && ctx.update_complete
}

fn is_link_loss(e: LifecycleEvent) -> bool {
    matches!(
        e,
        LifecycleEvent::Disconnected(
            DisconnectReason::Remote | DisconnectReason::AuthenticationFailure
        )
    )
}

// ═══════════════════════════════════════════════════════════════════════════
//  UNASSOCIATED: advertising, waiting for an AP to provision us
// ═══════════════════════════════════════════════════════════════════════════

fn unassociated_enter(ctx: &mut TagContext) {
    ctx.basic_state.set(BasicState::SYNCHRONIZED, false);
    ctx.cancel_timeout();
    ctx.queue(RadioAction::StartAdvertising);
}

fn unassociated_update(ctx: &mut TagContext) -> Option<StateId> {
    match ctx.event.take()? {
        LifecycleEvent::ConfiguringBitSet if ctx.configuring.is_complete() => {
            info!("UNASSOCIATED: all configuring characteristics written");
            Some(StateId::Configuring)
        }
        LifecycleEvent::ConfiguringBitSet => {
            info!(
                "UNASSOCIATED: configuring bits 0b{:04b}",
                ctx.configuring.bits()
            );
            None
        }
        // AP went away mid-provisioning: restart advertising.
        e if is_link_loss(e) => Some(StateId::Unassociated),
        other => {
            ctx.event = Some(other);
            None
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  CONFIGURING: provisioned, AP still writing initial commands
// ═══════════════════════════════════════════════════════════════════════════

fn configuring_update(ctx: &mut TagContext) -> Option<StateId> {
    match ctx.event.take()? {
        LifecycleEvent::UpdateComplete => Some(StateId::Configured),
        e if is_link_loss(e) => {
            warn!("CONFIGURING: link lost before update complete, unassociating");
            ctx.queue(RadioAction::Unassociate);
            Some(StateId::Unassociated)
        }
        other => {
            ctx.event = Some(other);
            None
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  CONFIGURED: waiting for the AP to hand over PAwR sync
// ═══════════════════════════════════════════════════════════════════════════

fn configured_enter(ctx: &mut TagContext) {
    ctx.queue(RadioAction::SubscribePast);
}

fn configured_update(ctx: &mut TagContext) -> Option<StateId> {
    match ctx.event.take()? {
        LifecycleEvent::SyncEstablished if may_synchronize(ctx) => Some(StateId::Synchronized),
        LifecycleEvent::SyncEstablished => {
            warn!("CONFIGURED: sync established before update complete, ignoring");
            None
        }
        e if is_link_loss(e) => Some(StateId::Unsynchronized),
        other => {
            ctx.event = Some(other);
            None
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  SYNCHRONIZED: receiving sync packets, link dropped
// ═══════════════════════════════════════════════════════════════════════════

fn synchronized_enter(ctx: &mut TagContext) {
    ctx.basic_state.set(BasicState::SYNCHRONIZED, true);
    ctx.queue(RadioAction::Disconnect);
    ctx.queue(RadioAction::StopAdvertising);
    ctx.arm_timeout(TimeoutKind::Unsynchronized);
}

fn synchronized_update(ctx: &mut TagContext) -> Option<StateId> {
    match ctx.event.take()? {
        LifecycleEvent::SyncLost => Some(StateId::Unsynchronized),
        LifecycleEvent::TimeoutExpired(TimeoutKind::Unsynchronized) => {
            warn!("SYNCHRONIZED: no sync packet in time, dropping sync");
            ctx.queue(RadioAction::StopSync);
            Some(StateId::Unsynchronized)
        }
        LifecycleEvent::SecurityEstablished => Some(StateId::Updating),
        LifecycleEvent::Disconnected(DisconnectReason::AuthenticationFailure) => {
            warn!("SYNCHRONIZED: AP authentication failed, staying in sync");
            None
        }
        LifecycleEvent::Disconnected(DisconnectReason::Remote) => Some(StateId::Unsynchronized),
        other => {
            ctx.event = Some(other);
            None
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  UPDATING: AP connected and secured, timeouts suspended
// ═══════════════════════════════════════════════════════════════════════════

fn updating_enter(ctx: &mut TagContext) {
    ctx.cancel_timeout();
}

fn updating_update(ctx: &mut TagContext) -> Option<StateId> {
    match ctx.event.take()? {
        LifecycleEvent::UpdateComplete if ctx.is_synchronized_bit() => Some(StateId::Synchronized),
        LifecycleEvent::UpdateComplete => Some(StateId::Configured),
        // PAST delivered while connected; UPDATE_COMPLETE finishes the move.
        LifecycleEvent::SyncEstablished => {
            ctx.basic_state.set(BasicState::SYNCHRONIZED, true);
            None
        }
        LifecycleEvent::SyncLost => {
            ctx.basic_state.set(BasicState::SYNCHRONIZED, false);
            None
        }
        e if is_link_loss(e) => Some(StateId::Unsynchronized),
        other => {
            ctx.event = Some(other);
            None
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  UNSYNCHRONIZED: provisioned but lost sync, advertising for the AP
// ═══════════════════════════════════════════════════════════════════════════

fn unsynchronized_enter(ctx: &mut TagContext) {
    ctx.basic_state.set(BasicState::SYNCHRONIZED, false);
    ctx.queue(RadioAction::StartAdvertising);
    ctx.arm_timeout(TimeoutKind::Unassociated);
}

fn unsynchronized_update(ctx: &mut TagContext) -> Option<StateId> {
    match ctx.event.take()? {
        // Re-acquiring a lost sync needs no fresh update from the AP.
        LifecycleEvent::SyncEstablished if ctx.configuring.is_complete() => {
            Some(StateId::Synchronized)
        }
        LifecycleEvent::SecurityEstablished => Some(StateId::Updating),
        LifecycleEvent::TimeoutExpired(TimeoutKind::Unassociated) => {
            warn!("UNSYNCHRONIZED: AP did not return in time, unassociating");
            ctx.queue(RadioAction::Unassociate);
            Some(StateId::Unassociated)
        }
        other => {
            ctx.event = Some(other);
            None
        }
    }
}
