// Structured logging contract: every event the daemon emits carries
// `tender_id`, `rev`, and one of the documented message identifiers, plus
// optional extra params, carried as `tracing` fields.

use tracing::{error, info, warn};

/// The message identifiers the daemon emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageId {
    ConflictDetected,
    ConflictErrorGet,
    ConflictErrorCommon,
    ConflictErrorRestore,
    ConflictErrorPointer,
    ConflictErrorPatch,
    ConflictErrorSave,
    ConflictNotResolved,
    ConflictResolved,
    ConflictResolvedWoChanges,
    ConflictErrorDeleting,
    ConflictDeleting,
}

impl MessageId {
    pub fn as_str(self) -> &'static str {
        match self {
            MessageId::ConflictDetected => "conflict_detected",
            MessageId::ConflictErrorGet => "conflict_error_get",
            MessageId::ConflictErrorCommon => "conflict_error_common",
            MessageId::ConflictErrorRestore => "conflict_error_restore",
            MessageId::ConflictErrorPointer => "conflict_error_pointer",
            MessageId::ConflictErrorPatch => "conflict_error_patch",
            MessageId::ConflictErrorSave => "conflict_error_save",
            MessageId::ConflictNotResolved => "conflict_not_resolved",
            MessageId::ConflictResolved => "conflict_resolved",
            MessageId::ConflictResolvedWoChanges => "conflict_resolved_wo_changes",
            MessageId::ConflictErrorDeleting => "conflict_error_deleting",
            MessageId::ConflictDeleting => "conflict_deleting",
        }
    }
}

/// Emits an informational structured event.
pub fn log_info(tender_id: &str, rev: &str, message_id: MessageId, params: &str) {
    info!(
        tender_id = tender_id,
        rev = rev,
        message_id = message_id.as_str(),
        params = params,
        "{}",
        message_id.as_str()
    );
}

/// Emits a warning-level structured event (used for retryable conditions
/// such as a store conflict on save).
pub fn log_warn(tender_id: &str, rev: &str, message_id: MessageId, params: &str) {
    warn!(
        tender_id = tender_id,
        rev = rev,
        message_id = message_id.as_str(),
        params = params,
        "{}",
        message_id.as_str()
    );
}

/// Emits an error-level structured event (used for the resolution abort
/// paths).
pub fn log_error(tender_id: &str, rev: &str, message_id: MessageId, params: &str) {
    error!(
        tender_id = tender_id,
        rev = rev,
        message_id = message_id.as_str(),
        params = params,
        "{}",
        message_id.as_str()
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_ids_match_documented_identifiers() {
        assert_eq!(MessageId::ConflictDetected.as_str(), "conflict_detected");
        assert_eq!(MessageId::ConflictResolvedWoChanges.as_str(), "conflict_resolved_wo_changes");
        assert_eq!(MessageId::ConflictDeleting.as_str(), "conflict_deleting");
    }
}
