//! Software alarm table.
//!
//! The fieldbus stack and the control loop both need one-shot and periodic
//! timers, but neither may own a hardware timer channel. This module provides
//! a fixed-capacity table of software alarms that the owner polls from its
//! main loop: `dispatch` fires everything that is due and returns a hint for
//! how long the caller may sleep before the next deadline.
//!
//! Handles carry a generation counter, so a stale handle kept across a
//! free/re-arm of the same slot can never cancel the newer alarm.

use tracing::{error, warn};

/// Maximum number of concurrently armed alarms.
pub const MAX_TIMERS: usize = 32;

/// Wait hint returned by `dispatch` when no alarm is armed at all.
pub const IDLE_WAIT_HINT_MS: u64 = 50;

/// Alarm callback: owner context plus the caller-chosen id passed to `arm`.
pub type TimerCallback<C> = fn(&mut C, u32);

/// Opaque reference to an armed alarm.
///
/// Valid until the alarm fires (one-shot) or is cancelled; using it afterwards
/// is rejected, even if the slot has since been re-armed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerHandle {
    slot: usize,
    generation: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SlotState {
    Free,
    Armed,
    Triggered,
}

struct TimerSlot<C> {
    state: SlotState,
    generation: u32,
    id: u32,
    due_at_us: u64,
    period_us: u64,
    callback: Option<TimerCallback<C>>,
}

impl<C> TimerSlot<C> {
    const fn empty() -> Self {
        Self {
            state: SlotState::Free,
            generation: 0,
            id: 0,
            due_at_us: 0,
            period_us: 0,
            callback: None,
        }
    }
}

/// Fixed-capacity alarm table, generic over the owner context handed back to
/// every callback.
pub struct TimerTable<C> {
    slots: [TimerSlot<C>; MAX_TIMERS],
}

impl<C> Default for TimerTable<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> TimerTable<C> {
    pub const fn new() -> Self {
        Self {
            slots: [const { TimerSlot::empty() }; MAX_TIMERS],
        }
    }

    /// Arms an alarm `delay_ms` from `now_ms`. A non-zero `period_ms` makes it
    /// periodic; zero makes it one-shot. Returns `None` when the table is
    /// full, which callers treat as a serious but non-fatal condition.
    pub fn arm(
        &mut self,
        now_ms: u64,
        id: u32,
        callback: TimerCallback<C>,
        delay_ms: u64,
        period_ms: u64,
    ) -> Option<TimerHandle> {
        let now_us = now_ms * 1_000;
        for (slot_idx, slot) in self.slots.iter_mut().enumerate() {
            if slot.state != SlotState::Free {
                continue;
            }
            slot.state = SlotState::Armed;
            slot.id = id;
            slot.due_at_us = now_us + delay_ms * 1_000;
            slot.period_us = period_ms * 1_000;
            slot.callback = Some(callback);
            return Some(TimerHandle {
                slot: slot_idx,
                generation: slot.generation,
            });
        }
        error!(id, "timer table exhausted, alarm not armed");
        None
    }

    /// Cancels an armed alarm. Stale or out-of-range handles are rejected
    /// without touching any slot.
    pub fn cancel(&mut self, handle: TimerHandle) -> bool {
        let Some(slot) = self.slots.get_mut(handle.slot) else {
            warn!(slot = handle.slot, "cancel of out-of-range timer handle");
            return false;
        };
        if slot.state == SlotState::Free || slot.generation != handle.generation {
            warn!(
                slot = handle.slot,
                generation = handle.generation,
                "cancel of stale timer handle ignored"
            );
            return false;
        }
        Self::release(slot);
        true
    }

    /// Fires every alarm that is due at `now_ms` and returns a wait hint in
    /// milliseconds: the time until the nearest deadline, `IDLE_WAIT_HINT_MS`
    /// when nothing is armed, or 1 when callbacks just ran (callers re-poll
    /// promptly since a callback may have re-armed something earlier).
    pub fn dispatch(&mut self, now_ms: u64, ctx: &mut C) -> u64 {
        let now_us = now_ms * 1_000;

        let mut nearest_due_us = u64::MAX;
        for slot in &mut self.slots {
            if slot.state != SlotState::Armed {
                continue;
            }
            if slot.due_at_us <= now_us {
                slot.state = SlotState::Triggered;
                nearest_due_us = 0;
            } else if slot.due_at_us < nearest_due_us {
                nearest_due_us = slot.due_at_us;
            }
        }

        if nearest_due_us > 0 {
            return if nearest_due_us == u64::MAX {
                IDLE_WAIT_HINT_MS
            } else {
                (nearest_due_us - now_us) / 1_000
            };
        }

        for slot in &mut self.slots {
            if slot.state != SlotState::Triggered {
                continue;
            }
            let id = slot.id;
            // Re-arm or release before running the callback so the slot is in
            // a consistent state if the callback inspects the table's owner.
            let callback = if slot.period_us > 0 {
                slot.due_at_us = now_us + slot.period_us;
                slot.state = SlotState::Armed;
                slot.callback
            } else {
                let callback = slot.callback;
                Self::release(slot);
                callback
            };
            if let Some(callback) = callback {
                callback(ctx, id);
            }
        }

        1
    }

    /// Advisory count of free slots, for diagnostics only.
    pub fn free_slots(&self) -> usize {
        self.slots
            .iter()
            .filter(|slot| slot.state == SlotState::Free)
            .count()
    }

    fn release(slot: &mut TimerSlot<C>) {
        slot.state = SlotState::Free;
        slot.callback = None;
        slot.generation = slot.generation.wrapping_add(1);
    }
}
