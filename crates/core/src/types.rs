/// All entity primary keys are sequential arena ids.
pub type DbId = i64;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Users are supplied by the external identity provider as opaque ids.
pub type UserId = uuid::Uuid;
