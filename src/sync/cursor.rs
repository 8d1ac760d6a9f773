//! Cursor arithmetic for a single run.
//!
//! Pure functions only: where a run starts, and what the cursor becomes once
//! the batch it describes has been persisted.

use std::collections::HashSet;

use chrono::{DateTime, Utc};

use crate::models::{SyncCursor, SyncMode};

/// Where a run starts listing and which ids it may skip without a lookup.
#[derive(Debug, Clone, Default)]
pub struct StartPoint {
    pub since_uid: u32,
    pub recent_ids: HashSet<String>,
    /// Stored cursor belongs to a different UIDVALIDITY and was discarded.
    pub validity_reset: bool,
}

/// A message the run has accounted for: stored now or already present.
#[derive(Debug, Clone)]
pub struct HandledMessage {
    pub uid: u32,
    pub message_id: String,
    pub date: Option<DateTime<Utc>>,
}

fn same_epoch(cursor: &SyncCursor, uid_validity: Option<u32>) -> bool {
    match (cursor.uid_validity, uid_validity) {
        (Some(stored), Some(current)) => stored == current,
        // Servers without UIDVALIDITY give us nothing to compare against.
        _ => true,
    }
}

pub fn start_point(
    stored: Option<&SyncCursor>,
    mode: SyncMode,
    uid_validity: Option<u32>,
) -> StartPoint {
    let Some(cursor) = stored else {
        return StartPoint::default();
    };

    if !same_epoch(cursor, uid_validity) {
        return StartPoint {
            validity_reset: true,
            ..StartPoint::default()
        };
    }

    let recent_ids = cursor.recent_message_ids.iter().cloned().collect();
    match mode {
        SyncMode::Incremental => StartPoint {
            since_uid: cursor.last_uid,
            recent_ids,
            validity_reset: false,
        },
        SyncMode::Full => StartPoint {
            since_uid: 0,
            recent_ids,
            validity_reset: false,
        },
    }
}

/// Cursor after `handled` has been persisted.
///
/// `last_uid` never moves backwards within one UIDVALIDITY, whatever the
/// mode. `window` bounds the recent-id list.
pub fn advance(
    previous: Option<&SyncCursor>,
    account_id: i32,
    uid_validity: Option<u32>,
    handled: &[HandledMessage],
    window: usize,
    now: DateTime<Utc>,
) -> SyncCursor {
    let base = previous.filter(|cursor| same_epoch(cursor, uid_validity));

    let mut last_uid = base.map(|c| c.last_uid).unwrap_or(0);
    let mut recent: Vec<String> = base
        .map(|c| c.recent_message_ids.clone())
        .unwrap_or_default();
    let mut last_message_at = base.and_then(|c| c.last_message_at);

    for message in handled {
        last_uid = last_uid.max(message.uid);
        recent.retain(|id| id != &message.message_id);
        recent.push(message.message_id.clone());
        if let Some(date) = message.date {
            last_message_at = Some(last_message_at.map_or(date, |seen| seen.max(date)));
        }
    }

    if recent.len() > window {
        let excess = recent.len() - window;
        recent.drain(..excess);
    }

    SyncCursor {
        account_id,
        uid_validity: uid_validity.or(base.and_then(|c| c.uid_validity)),
        last_uid,
        recent_message_ids: recent,
        last_message_at,
        last_synced_at: now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn cursor(last_uid: u32, validity: Option<u32>, ids: &[&str]) -> SyncCursor {
        SyncCursor {
            account_id: 1,
            uid_validity: validity,
            last_uid,
            recent_message_ids: ids.iter().map(|s| s.to_string()).collect(),
            last_message_at: None,
            last_synced_at: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
        }
    }

    fn handled(uid: u32, id: &str) -> HandledMessage {
        HandledMessage {
            uid,
            message_id: id.to_string(),
            date: None,
        }
    }

    #[test]
    fn incremental_starts_after_stored_uid() {
        let stored = cursor(40, Some(9), &["a", "b"]);
        let start = start_point(Some(&stored), SyncMode::Incremental, Some(9));
        assert_eq!(start.since_uid, 40);
        assert!(start.recent_ids.contains("a"));
        assert!(!start.validity_reset);
    }

    #[test]
    fn full_mode_ignores_stored_uid() {
        let stored = cursor(40, Some(9), &["a"]);
        let start = start_point(Some(&stored), SyncMode::Full, Some(9));
        assert_eq!(start.since_uid, 0);
        assert!(start.recent_ids.contains("a"));
    }

    #[test]
    fn validity_change_discards_cursor() {
        let stored = cursor(40, Some(9), &["a"]);
        let start = start_point(Some(&stored), SyncMode::Incremental, Some(10));
        assert_eq!(start.since_uid, 0);
        assert!(start.recent_ids.is_empty());
        assert!(start.validity_reset);

        let next = advance(Some(&stored), 1, Some(10), &[handled(3, "x")], 10, Utc::now());
        assert_eq!(next.uid_validity, Some(10));
        assert_eq!(next.last_uid, 3);
        assert_eq!(next.recent_message_ids, vec!["x".to_string()]);
    }

    #[test]
    fn advance_never_regresses() {
        let stored = cursor(40, Some(9), &[]);
        // A full rescan that only reached uid 12 keeps the stored high-water mark.
        let next = advance(Some(&stored), 1, Some(9), &[handled(12, "m12")], 10, Utc::now());
        assert_eq!(next.last_uid, 40);

        let next = advance(Some(&next), 1, Some(9), &[handled(55, "m55")], 10, Utc::now());
        assert_eq!(next.last_uid, 55);
    }

    #[test]
    fn recent_window_is_bounded_and_ordered() {
        let stored = cursor(3, None, &["m1", "m2", "m3"]);
        let batch = [handled(4, "m4"), handled(5, "m5"), handled(2, "m2")];
        let next = advance(Some(&stored), 1, None, &batch, 4, Utc::now());
        assert_eq!(next.recent_message_ids, vec!["m3", "m4", "m5", "m2"]);
        assert_eq!(next.last_uid, 5);
    }

    #[test]
    fn last_message_at_tracks_newest_date() {
        let early = Utc.with_ymd_and_hms(2025, 2, 1, 0, 0, 0).unwrap();
        let late = Utc.with_ymd_and_hms(2025, 2, 3, 0, 0, 0).unwrap();
        let batch = [
            HandledMessage {
                uid: 1,
                message_id: "a".into(),
                date: Some(late),
            },
            HandledMessage {
                uid: 2,
                message_id: "b".into(),
                date: Some(early),
            },
        ];
        let next = advance(None, 1, Some(1), &batch, 10, Utc::now());
        assert_eq!(next.last_message_at, Some(late));
    }
}
