use crate::catalog::CatalogError;
use crate::limits::MAX_USER_ID_LEN;
use crate::model::*;

use super::ScheduleError;

pub(crate) fn validate_user(user_id: &UserId) -> Result<(), ScheduleError> {
    if user_id.is_empty() {
        return Err(ScheduleError::Unauthenticated);
    }
    if user_id.as_str().len() > MAX_USER_ID_LEN {
        return Err(ScheduleError::LimitExceeded("user id too long"));
    }
    Ok(())
}

/// Catalog implementations are outside our control; a session whose start is
/// not before its end cannot be placed on a schedule.
pub(crate) fn validate_session(session: &Session) -> Result<(), ScheduleError> {
    if session.start_time >= session.end_time {
        return Err(CatalogError::InvalidSession("start time must be before end time").into());
    }
    Ok(())
}

/// Recompute conflict flags for one day of a schedule.
///
/// `day` must hold a single date, sorted by start time. Every entry is
/// compared with the later entries that start before it ends; both sides of
/// an overlap are flagged. Returns how many entries went from clear to
/// conflicting.
pub(crate) fn recompute_day(day: &mut [ScheduledSession]) -> usize {
    let before: Vec<bool> = day.iter().map(|s| s.has_conflict).collect();
    for slot in day.iter_mut() {
        slot.has_conflict = false;
    }

    for i in 0..day.len() {
        let span_i = day[i].session.span();
        for j in (i + 1)..day.len() {
            let span_j = day[j].session.span();
            // Sorted by start: nothing further can reach back into span_i.
            if span_j.start >= span_i.end {
                break;
            }
            if span_i.overlaps(&span_j) {
                day[i].has_conflict = true;
                day[j].has_conflict = true;
            }
        }
    }

    day.iter()
        .zip(before)
        .filter(|(slot, was)| slot.has_conflict && !was)
        .count()
}

/// Ids of the scheduled sessions in `day` that would overlap `candidate`.
pub(crate) fn conflicting_with(day: &[ScheduledSession], candidate: &Session) -> Vec<SessionId> {
    day.iter()
        .filter(|slot| slot.session.conflicts_with(candidate))
        .map(|slot| slot.session.id)
        .collect()
}
