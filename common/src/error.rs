use thiserror::Error;

// request-scoped error taxonomy
//
// every failure a pipeline request can produce lands in exactly one of
// these variants, and each variant belongs to one http status family.  the
// display strings are the user-visible messages; anything sensitive
// (key material, urls with credentials, stack detail) must stay out of
// them and go to the logs instead.
#[derive(Clone, Debug, Error)]
pub enum PipelineError {
    // input errors -> 400
    #[error("Invalid request path")]
    MalformedPath,

    #[error("Unknown step type: {0}")]
    UnknownStep(String),

    #[error("Missing step argument: {0}")]
    MissingArgument(&'static str),

    #[error("Pipeline produced no output")]
    EmptyPipeline,

    #[error("Input is not a valid ZIP archive")]
    NotAZip,

    #[error("Entry not found in archive: {0}")]
    EntryNotFound(String),

    #[error("Input could not be decoded as an image")]
    NotAnImage,

    #[error("Invalid key material: {0}")]
    BadKey(String),

    #[error("Input is not a Crypt4GH container")]
    NotCrypt4gh,

    #[error("No header packet could be opened with the supplied key")]
    DecryptionFailed,

    // security errors -> 400
    #[error("Token envelope could not be opened")]
    BadEnvelope,

    #[error("Token signature rejected")]
    BadSignature,

    #[error("Malformed token payload: {0}")]
    MalformedPayload(String),

    // not found -> 404
    #[error("Token not found or expired")]
    TokenMissing,

    #[error("Token not found or expired")]
    ExpiredToken,

    // external services -> 503
    #[error("Token store unavailable")]
    TokenStoreUnavailable(String),

    #[error("Object store unavailable")]
    ObjectStoreUnavailable(String),

    #[error("Object store does not honour range requests")]
    RangeUnsupported,

    #[error("Object size could not be determined")]
    SizeUnavailable,

    // internal errors -> 500
    #[error("Internal pipeline error")]
    BridgeProtocolViolation(String),

    #[error("Step failed: {0}")]
    StepCrashed(String),

    #[error("Request cancelled")]
    Cancelled,

    #[error("Internal error")]
    Internal(String),
}

impl PipelineError {
    pub fn http_status(&self) -> u16 {
        match self {
            PipelineError::MalformedPath
            | PipelineError::UnknownStep(_)
            | PipelineError::MissingArgument(_)
            | PipelineError::EmptyPipeline
            | PipelineError::NotAZip
            | PipelineError::EntryNotFound(_)
            | PipelineError::NotAnImage
            | PipelineError::BadKey(_)
            | PipelineError::NotCrypt4gh
            | PipelineError::DecryptionFailed
            | PipelineError::BadEnvelope
            | PipelineError::BadSignature
            | PipelineError::MalformedPayload(_) => 400,

            PipelineError::TokenMissing | PipelineError::ExpiredToken => 404,

            PipelineError::TokenStoreUnavailable(_)
            | PipelineError::ObjectStoreUnavailable(_)
            | PipelineError::RangeUnsupported
            | PipelineError::SizeUnavailable => 503,

            PipelineError::BridgeProtocolViolation(_)
            | PipelineError::StepCrashed(_)
            | PipelineError::Cancelled
            | PipelineError::Internal(_) => 500,
        }
    }

    // the detailed cause, for tracing logs only
    pub fn detail(&self) -> Option<&str> {
        match self {
            PipelineError::TokenStoreUnavailable(detail)
            | PipelineError::ObjectStoreUnavailable(detail)
            | PipelineError::BridgeProtocolViolation(detail)
            | PipelineError::Internal(detail) => Some(detail),
            _ => None,
        }
    }

    // recover a PipelineError that crossed a std::io boundary, e.g. through
    // the blocking stream adapter or a zip/image crate call
    pub fn from_io(err: std::io::Error) -> Self {
        match err.get_ref().and_then(|e| e.downcast_ref::<PipelineError>()) {
            Some(inner) => inner.clone(),
            None => PipelineError::Internal(err.to_string()),
        }
    }
}

impl From<PipelineError> for std::io::Error {
    fn from(err: PipelineError) -> Self {
        std::io::Error::other(err)
    }
}
