//! `CseError`: the engine's single error type, carrying a oneM2M response
//! status code (spec §7, "Error Handling Design").
//!
//! Every hook and manager returns `Result<_, CseError>`; the Dispatcher is
//! the sole place that catches these and decides compensation (spec §7:
//! "the Dispatcher is the sole point that maps").

use std::fmt;

/// A oneM2M response status code, as referenced by spec §6/§7. Only the
/// subset the engine actually raises is represented; unmapped upstream
/// values are not round-tripped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseStatusCode {
    BadRequest,
    NotFound,
    OperationNotAllowed,
    OriginatorHasNoPrivilege,
    ConflictAlreadyExists,
    SecurityAssociationRequired,
    InvalidChildResourceType,
    TargetNotSubscribable,
    SubscriptionVerificationInitiationFailed,
    NotAcceptable,
    AppRuleValidationFailed,
    OriginatorHasAlreadyRegistered,
    TargetNotReachable,
    InternalServerError,
}

impl ResponseStatusCode {
    /// The numeric oneM2M response status code.
    pub fn code(&self) -> u16 {
        match self {
            ResponseStatusCode::BadRequest => 4000,
            ResponseStatusCode::NotFound => 4004,
            ResponseStatusCode::OperationNotAllowed => 4005,
            ResponseStatusCode::OriginatorHasNoPrivilege => 4103,
            ResponseStatusCode::ConflictAlreadyExists => 4105,
            ResponseStatusCode::SecurityAssociationRequired => 4107,
            ResponseStatusCode::InvalidChildResourceType => 4108,
            ResponseStatusCode::TargetNotSubscribable => 4126,
            ResponseStatusCode::SubscriptionVerificationInitiationFailed => 4187,
            ResponseStatusCode::NotAcceptable => 4102,
            ResponseStatusCode::AppRuleValidationFailed => 4129,
            ResponseStatusCode::OriginatorHasAlreadyRegistered => 4117,
            ResponseStatusCode::TargetNotReachable => 5103,
            ResponseStatusCode::InternalServerError => 5000,
        }
    }
}

/// The engine's error type. Each variant names the oneM2M response status
/// code it maps to, carrying a human-readable detail message (spec §7).
pub enum CseError {
    /// Malformed request: missing mandatory attribute, wrong type, attempt
    /// to set an immutable attribute (maps to `BAD_REQUEST`).
    BadRequest(String),
    /// Target resource, parent, or ACP reference does not exist (maps to
    /// `NOT_FOUND`).
    NotFound(String),
    /// Structurally valid but semantically disallowed (e.g. child type not
    /// accepted by parent) (maps to `OPERATION_NOT_ALLOWED` /
    /// `INVALID_CHILD_RESOURCE_TYPE`).
    NotAllowed(String),
    /// Originator lacks the permission bit required for the operation
    /// (maps to `ORIGINATOR_HAS_NO_PRIVILEGE`).
    Forbidden(String),
    /// Duplicate `rn` under the same parent, or an AE re-registering an
    /// already-taken `aei` (maps to `CONFLICT_ALREADY_EXISTS`).
    Conflict(String),
    /// Verification handshake failed (subscription `vrq`) (maps to
    /// `SUBSCRIPTION_VERIFICATION_INITIATION_FAILED`).
    Transient(String),
    /// An originator fails an admission allowlist check, or any other
    /// server-side rule on the request content (maps to
    /// `APP_RULE_VALIDATION_FAILED`).
    AppRuleValidationFailed(String),
    /// An AE attempts to register an `aei` that already belongs to another
    /// AE (maps to `ORIGINATOR_HAS_ALREADY_REGISTERED`).
    AlreadyRegistered(String),
    /// A remote HTTP/MQTT target exhausted its retry budget (maps to
    /// `TARGET_NOT_REACHABLE`).
    TargetNotReachable(String),
    /// Storage adapter or internal invariant failure; never attributable
    /// to the caller (maps to `INTERNAL_SERVER_ERROR`).
    Internal(String),
}

impl CseError {
    /// The oneM2M response status code this error maps to.
    pub fn status_code(&self) -> ResponseStatusCode {
        match self {
            CseError::BadRequest(_) => ResponseStatusCode::BadRequest,
            CseError::NotFound(_) => ResponseStatusCode::NotFound,
            CseError::NotAllowed(_) => ResponseStatusCode::InvalidChildResourceType,
            CseError::Forbidden(_) => ResponseStatusCode::OriginatorHasNoPrivilege,
            CseError::Conflict(_) => ResponseStatusCode::ConflictAlreadyExists,
            CseError::Transient(_) => ResponseStatusCode::SubscriptionVerificationInitiationFailed,
            CseError::AppRuleValidationFailed(_) => ResponseStatusCode::AppRuleValidationFailed,
            CseError::AlreadyRegistered(_) => ResponseStatusCode::OriginatorHasAlreadyRegistered,
            CseError::TargetNotReachable(_) => ResponseStatusCode::TargetNotReachable,
            CseError::Internal(_) => ResponseStatusCode::InternalServerError,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            CseError::BadRequest(m)
            | CseError::NotFound(m)
            | CseError::NotAllowed(m)
            | CseError::Forbidden(m)
            | CseError::Conflict(m)
            | CseError::Transient(m)
            | CseError::AppRuleValidationFailed(m)
            | CseError::AlreadyRegistered(m)
            | CseError::TargetNotReachable(m)
            | CseError::Internal(m) => m,
        }
    }
}

impl fmt::Display for CseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code = self.status_code().code();
        match self {
            CseError::BadRequest(msg) => write!(f, "Bad Request ({code}): {msg}"),
            CseError::NotFound(msg) => write!(f, "Not Found ({code}): {msg}"),
            CseError::NotAllowed(msg) => write!(f, "Operation Not Allowed ({code}): {msg}"),
            CseError::Forbidden(msg) => write!(f, "Originator Has No Privilege ({code}): {msg}"),
            CseError::Conflict(msg) => write!(f, "Conflict ({code}): {msg}"),
            CseError::Transient(msg) => write!(f, "Transient Failure ({code}): {msg}"),
            CseError::AppRuleValidationFailed(msg) => write!(f, "App Rule Validation Failed ({code}): {msg}"),
            CseError::AlreadyRegistered(msg) => write!(f, "Originator Has Already Registered ({code}): {msg}"),
            CseError::TargetNotReachable(msg) => write!(f, "Target Not Reachable ({code}): {msg}"),
            CseError::Internal(msg) => write!(f, "Internal Error ({code}): {msg}"),
        }
    }
}

impl fmt::Debug for CseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        <Self as fmt::Display>::fmt(self, f)
    }
}

impl std::error::Error for CseError {}

impl From<serde_json::Error> for CseError {
    fn from(err: serde_json::Error) -> Self {
        CseError::BadRequest(err.to_string())
    }
}

/// Generate `From<E> for CseError` implementations that map error types to
/// a specific `CseError` variant.
///
/// ```ignore
/// cse_model::map_error! {
///     std::io::Error => Internal,
/// }
/// ```
#[macro_export]
macro_rules! map_error {
    ( $( $err_ty:ty => $variant:ident ),* $(,)? ) => {
        $(
            impl From<$err_ty> for $crate::error::CseError {
                fn from(err: $err_ty) -> Self {
                    $crate::error::CseError::$variant(err.to_string())
                }
            }
        )*
    };
}
