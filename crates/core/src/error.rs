use crate::types::{DbId, UserId};

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: &'static str, id: DbId },

    #[error("Invalid transition for {entity} {id}: {from} -> {to}")]
    InvalidTransition {
        entity: &'static str,
        id: DbId,
        from: &'static str,
        to: &'static str,
    },

    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Annotator {annotator} holds {active} active assignments (limit {limit})")]
    CapacityExceeded {
        annotator: UserId,
        active: usize,
        limit: u32,
    },

    #[error("Image {image} cannot be assigned from status '{status}'")]
    ImageNotAssignable { image: DbId, status: &'static str },

    #[error("Image {image} already has an active annotation")]
    DuplicateSubmission { image: DbId },

    #[error("Annotation {annotation} has already been verified")]
    AlreadyVerified { annotation: DbId },

    #[error("Verifier {verifier} cannot provide the follow-up opinion on this chain")]
    SameVerifierConflict { verifier: UserId },

    #[error("Detection failed: {0}")]
    Detection(String),

    #[error("Internal error: {0}")]
    Internal(String),
}
