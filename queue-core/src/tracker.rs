//! Fairness and duplicate tracker.
//!
//! A passive witness of the Queue Manager's decisions: it never initiates
//! removals, only reacts to the three lifecycle hooks the queue manager fires
//! (`on_enqueued`, `on_start_play`, `on_finished`). State is a pair of
//! inverse multisets so that two entries sharing a `TrackIdentityKey`
//! (admitted via the short-queue duplicate exemption) are
//! each counted, preserving `len(tracker) == |pending| + has_current`.

use std::collections::HashMap;

use crate::error::TrackerError;
use crate::models::{TrackIdentityKey, UserId};

/// Per-guild tracker state.
#[derive(Debug, Default)]
pub struct Tracker {
    user_keys: HashMap<UserId, HashMap<TrackIdentityKey, u32>>,
    key_users: HashMap<TrackIdentityKey, HashMap<UserId, u32>>,
    currently_playing_user: Option<UserId>,
}

/// The fairness mode governing admission for a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FairnessMode {
    Strict,
    Lenient,
}

impl From<crate::config::FairnessMode> for FairnessMode {
    fn from(mode: crate::config::FairnessMode) -> Self {
        match mode {
            crate::config::FairnessMode::Strict => Self::Strict,
            crate::config::FairnessMode::Lenient => Self::Lenient,
        }
    }
}

impl Tracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `user` currently holds at least one entry with `key`
    /// (pending or current) — used for rule 1 (exact duplicate).
    #[must_use]
    pub fn has_key_for_user(&self, user: &UserId, key: &TrackIdentityKey) -> bool {
        self.user_keys
            .get(user)
            .is_some_and(|keys| keys.get(key).copied().unwrap_or(0) > 0)
    }

    #[must_use]
    pub fn currently_playing_user(&self) -> Option<&UserId> {
        self.currently_playing_user.as_ref()
    }

    /// Total number of (user, key) associations currently tracked. Should
    /// always equal `|pending| + (1 if current else 0)`.
    #[must_use]
    pub fn total_tracked(&self) -> u32 {
        self.user_keys.values().flat_map(|m| m.values()).sum()
    }

    /// Admission check. Does not mutate state; callers invoke
    /// `on_enqueued` separately once the queue manager has accepted the
    /// entry.
    pub fn can_admit(
        &self,
        user: &UserId,
        key: &TrackIdentityKey,
        pending_for_user: usize,
        pending_len: usize,
        max_pending_per_user: usize,
        duplicate_threshold_queue_len: usize,
        fairness_mode: FairnessMode,
    ) -> Result<(), TrackerError> {
        let is_duplicate = self.has_key_for_user(user, key);

        // Rule 2: per-user pending cap.
        if pending_for_user >= max_pending_per_user {
            return Err(TrackerError::FairnessPending);
        }

        // Rule 3: currently playing, strict mode.
        if fairness_mode == FairnessMode::Strict
            && self.currently_playing_user.as_ref() == Some(user)
        {
            return Err(TrackerError::FairnessPlaying);
        }

        // Rule 1 + rule 4 exemption (duplicate only, never overrides rule 2/3).
        if is_duplicate && pending_len >= duplicate_threshold_queue_len {
            return Err(TrackerError::Duplicate);
        }

        Ok(())
    }

    /// Mutator hook: entry admitted into `pending`.
    pub fn on_enqueued(&mut self, user: &UserId, key: &TrackIdentityKey) {
        *self
            .user_keys
            .entry(user.clone())
            .or_default()
            .entry(key.clone())
            .or_insert(0) += 1;
        *self
            .key_users
            .entry(key.clone())
            .or_default()
            .entry(user.clone())
            .or_insert(0) += 1;
    }

    /// Mutator hook: entry transitioned from `pending` to `current`.
    pub fn on_start_play(&mut self, user: &UserId) {
        self.currently_playing_user = Some(user.clone());
    }

    /// Mutator hook: entry finished playing, was skipped, or was removed
    /// from the queue. Reverses exactly one `on_enqueued` call for
    /// this `(user, key)` pair.
    pub fn on_finished(&mut self, user: &UserId, key: &TrackIdentityKey) {
        if let Some(keys) = self.user_keys.get_mut(user) {
            if let Some(count) = keys.get_mut(key) {
                *count -= 1;
                if *count == 0 {
                    keys.remove(key);
                }
            }
            if keys.is_empty() {
                self.user_keys.remove(user);
            }
        }
        if let Some(users) = self.key_users.get_mut(key) {
            if let Some(count) = users.get_mut(user) {
                *count -= 1;
                if *count == 0 {
                    users.remove(user);
                }
            }
            if users.is_empty() {
                self.key_users.remove(key);
            }
        }
        if self.currently_playing_user.as_ref() == Some(user) {
            self.currently_playing_user = None;
        }
    }

    /// Exact-inverse check used by tests.
    #[cfg(test)]
    fn is_consistent(&self) -> bool {
        for (user, keys) in &self.user_keys {
            for (key, count) in keys {
                let inverse_count = self
                    .key_users
                    .get(key)
                    .and_then(|users| users.get(user))
                    .copied()
                    .unwrap_or(0);
                if inverse_count != *count {
                    return false;
                }
            }
        }
        for (key, users) in &self.key_users {
            for (user, count) in users {
                let forward_count = self
                    .user_keys
                    .get(user)
                    .and_then(|keys| keys.get(key))
                    .copied()
                    .unwrap_or(0);
                if forward_count != *count {
                    return false;
                }
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(tag: &str) -> TrackIdentityKey {
        TrackIdentityKey {
            normalized_title: tag.to_string(),
            duration_ms: 1000,
            url_key: tag.to_string(),
        }
    }

    #[test]
    fn inverse_maps_stay_consistent_through_lifecycle() {
        let mut tracker = Tracker::new();
        let u1 = UserId::from("u1");
        let u2 = UserId::from("u2");
        let k1 = key("a");
        let k2 = key("b");

        tracker.on_enqueued(&u1, &k1);
        tracker.on_enqueued(&u2, &k1);
        tracker.on_enqueued(&u1, &k2);
        assert!(tracker.is_consistent());
        assert_eq!(tracker.total_tracked(), 3);

        tracker.on_start_play(&u1);
        assert_eq!(tracker.currently_playing_user(), Some(&u1));

        tracker.on_finished(&u1, &k1);
        assert!(tracker.is_consistent());
        assert_eq!(tracker.total_tracked(), 2);
        assert_eq!(tracker.currently_playing_user(), None);
    }

    #[test]
    fn duplicate_exemption_allows_same_key_twice_for_same_user() {
        let mut tracker = Tracker::new();
        let u1 = UserId::from("u1");
        let k1 = key("a");

        tracker.on_enqueued(&u1, &k1);
        tracker.on_enqueued(&u1, &k1);
        assert_eq!(tracker.total_tracked(), 2);
        assert!(tracker.has_key_for_user(&u1, &k1));

        tracker.on_finished(&u1, &k1);
        assert!(tracker.has_key_for_user(&u1, &k1));
        tracker.on_finished(&u1, &k1);
        assert!(!tracker.has_key_for_user(&u1, &k1));
    }

    #[test]
    fn rule2_pending_cap_rejects_regardless_of_duplicate() {
        let tracker = Tracker::new();
        let u1 = UserId::from("u1");
        let k1 = key("a");
        let result = tracker.can_admit(&u1, &k1, 1, 10, 1, 5, FairnessMode::Strict);
        assert_eq!(result, Err(TrackerError::FairnessPending));
    }

    #[test]
    fn rule3_currently_playing_strict_mode_rejects() {
        let mut tracker = Tracker::new();
        let u1 = UserId::from("u1");
        let k1 = key("a");
        tracker.on_start_play(&u1);
        let result = tracker.can_admit(&u1, &k1, 0, 10, 5, 5, FairnessMode::Strict);
        assert_eq!(result, Err(TrackerError::FairnessPlaying));
    }

    #[test]
    fn rule3_lenient_mode_allows_currently_playing_user() {
        let mut tracker = Tracker::new();
        let u1 = UserId::from("u1");
        let k1 = key("a");
        tracker.on_start_play(&u1);
        let result = tracker.can_admit(&u1, &k1, 0, 10, 5, 5, FairnessMode::Lenient);
        assert!(result.is_ok());
    }

    #[test]
    fn rule1_duplicate_rejected_above_threshold() {
        let mut tracker = Tracker::new();
        let u1 = UserId::from("u1");
        let k1 = key("a");
        tracker.on_enqueued(&u1, &k1);
        let result = tracker.can_admit(&u1, &k1, 0, 5, 5, 5, FairnessMode::Strict);
        assert_eq!(result, Err(TrackerError::Duplicate));
    }

    #[test]
    fn rule4_short_queue_exemption_admits_duplicate() {
        let mut tracker = Tracker::new();
        let u1 = UserId::from("u1");
        let k1 = key("a");
        tracker.on_enqueued(&u1, &k1);
        let result = tracker.can_admit(&u1, &k1, 0, 2, 5, 5, FairnessMode::Strict);
        assert!(result.is_ok());
    }
}
