use thiserror::Error;

use crate::followups::FollowUpStatus;

#[derive(Error, Debug)]
pub enum Error {
    #[error("{entity} not found")]
    NotFound { entity: String },

    #[error("Invalid {field}: {message}")]
    InvalidInput { field: String, message: String },

    #[error("Scheduling conflict: {message}")]
    SchedulingConflict { message: String },

    #[error("Invalid status transition from {from} to {to}")]
    InvalidTransition {
        from: FollowUpStatus,
        to: FollowUpStatus,
    },

    #[error("Invalid state: {message}")]
    InvalidState { message: String },

    #[error("Reminder dispatch already in progress for follow-up {id}")]
    DispatchInProgress { id: String },

    #[error("Reminder dispatch failed: {detail}")]
    DispatchFailed { detail: String },

    #[error("Scheduling failed: {message}")]
    SchedulingFailed { message: String },

    #[error("Store error: {message}")]
    Store { message: String },
}
