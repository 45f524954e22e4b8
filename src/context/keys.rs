//! Business attribute key schema
//!
//! These names are the only externally visible "format" of the tracing
//! layer: trace-analysis dashboards and alerts query them directly.
//! Renaming a key is a breaking change.

// ============================================================================
// Operation / request attributes
// ============================================================================

/// Logical operation name, e.g. `CardService.issueCard`
pub const OPERATION_NAME: &str = "business.operation.name";

/// Operation category (`request`, `service`, `read`, `write`, ...)
pub const OPERATION_TYPE: &str = "business.operation.type";

/// Whether the operation completed without a business error
pub const OPERATION_SUCCESS: &str = "business.operation.success";

/// Correlation id of the inbound request this operation belongs to
pub const CORRELATION_ID: &str = "business.correlation.id";

/// Name of the microservice that recorded the span
pub const SERVICE_NAME: &str = "business.service.name";

// ============================================================================
// Customer attributes
// ============================================================================

pub const CUSTOMER_ID: &str = "business.customer.id";

/// Masked email, see [`crate::utils::masking::mask_email`]
pub const CUSTOMER_EMAIL: &str = "business.customer.email";

/// Masked phone number, see [`crate::utils::masking::mask_phone`]
pub const CUSTOMER_PHONE: &str = "business.customer.phone";

pub const CUSTOMER_SEGMENT: &str = "business.customer.segment";

// ============================================================================
// Account attributes
// ============================================================================

pub const ACCOUNT_NUMBER: &str = "business.account.number";
pub const ACCOUNT_TYPE: &str = "business.account.type";
pub const ACCOUNT_BRANCH: &str = "business.account.branch";

// ============================================================================
// Card attributes
// ============================================================================

/// Masked card number, see [`crate::utils::masking::mask_card_number`]
pub const CARD_NUMBER: &str = "business.card.number";
pub const CARD_TYPE: &str = "business.card.type";
pub const CARD_STATUS: &str = "business.card.status";
pub const CARD_LIMIT: &str = "business.card.limit";
pub const CARD_AVAILABLE_AMOUNT: &str = "business.card.available_amount";

// ============================================================================
// Loan attributes
// ============================================================================

pub const LOAN_NUMBER: &str = "business.loan.number";
pub const LOAN_TYPE: &str = "business.loan.type";
pub const LOAN_AMOUNT: &str = "business.loan.amount";
pub const LOAN_OUTSTANDING: &str = "business.loan.outstanding";
pub const LOAN_STATUS: &str = "business.loan.status";

// ============================================================================
// Transaction attributes
// ============================================================================

pub const TRANSACTION_ID: &str = "business.transaction.id";
pub const TRANSACTION_TYPE: &str = "business.transaction.type";
pub const TRANSACTION_AMOUNT: &str = "business.transaction.amount";
pub const TRANSACTION_CURRENCY: &str = "business.transaction.currency";

// ============================================================================
// Error attributes
// ============================================================================

/// Stable machine-readable error code (`errorCode`)
pub const ERROR_CODE: &str = "business.error.code";

/// Coarse error category (`errorCategory`)
pub const ERROR_CATEGORY: &str = "business.error.category";

/// Sanitized, truncated error message
pub const ERROR_MESSAGE: &str = "business.error.message";

/// Maximum characters of an error message attached to a span
pub const ERROR_MESSAGE_MAX_CHARS: usize = 256;

// ============================================================================
// Performance attributes
// ============================================================================

pub const DURATION_MS: &str = "business.performance.duration_ms";
pub const RESULT_COUNT: &str = "business.performance.result_count";
pub const BATCH_SIZE: &str = "business.performance.batch_size";

// ============================================================================
// Downstream service-call attributes
// ============================================================================

pub const SERVICE_CALL_TARGET: &str = "business.service_call.target";
pub const SERVICE_CALL_OPERATION: &str = "business.service_call.operation";
pub const SERVICE_CALL_SUCCESS: &str = "business.service_call.success";

// ============================================================================
// Persistence interception attributes
// ============================================================================

/// Classified persistence operation (`read`, `write`, `delete`, `generic`)
pub const PERSISTENCE_OPERATION_TYPE: &str = "persistence.operation.type";

/// Repository method name as written at the call site
pub const PERSISTENCE_METHOD: &str = "persistence.method";

/// Entity (document collection) the repository manages
pub const PERSISTENCE_ENTITY: &str = "persistence.entity";

/// Collection size or numeric result of the call
pub const PERSISTENCE_BATCH_SIZE: &str = "persistence.batch_size";

pub const PERSISTENCE_DURATION_MS: &str = "persistence.duration_ms";

// ============================================================================
// Exception event attributes (OpenTelemetry semantic conventions)
// ============================================================================

pub const EXCEPTION_EVENT: &str = "exception";
pub const EXCEPTION_MESSAGE: &str = "exception.message";
pub const EXCEPTION_TYPE: &str = "exception.type";
