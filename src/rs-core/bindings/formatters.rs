use crate::{
    errors::{BufferError, ManifestError, NetworkError, PlayerErrorKind, StateError},
    manifest::ByteRange,
};

use super::{AddSourceBufferErrorCode, BufferOperationErrorCode, ErrorCode};

pub(crate) fn format_range_for_js(original: Option<&ByteRange>) -> (Option<usize>, Option<usize>) {
    match original {
        None => (None, None),
        Some(ByteRange {
            first_byte,
            last_byte,
        }) => (Some(*first_byte), *last_byte),
    }
}

pub(crate) fn format_error_code_for_js(kind: &PlayerErrorKind) -> ErrorCode {
    match kind {
        PlayerErrorKind::Network(NetworkError::Timeout) => ErrorCode::NetworkTimeout,
        PlayerErrorKind::Network(NetworkError::HttpStatus(_)) => ErrorCode::NetworkHttpStatus,
        PlayerErrorKind::Network(NetworkError::Aborted) => ErrorCode::NetworkAborted,
        PlayerErrorKind::Buffer(BufferError::AppendFailed(_)) => ErrorCode::BufferAppendFailed,
        PlayerErrorKind::Buffer(BufferError::QuotaExceeded) => ErrorCode::BufferQuotaExceeded,
        PlayerErrorKind::Buffer(BufferError::SinkUnavailable) => ErrorCode::BufferSinkUnavailable,
        PlayerErrorKind::Manifest(ManifestError::Malformed(_)) => ErrorCode::ManifestMalformed,
        PlayerErrorKind::Manifest(ManifestError::Unreachable(_)) => ErrorCode::ManifestUnreachable,
        PlayerErrorKind::State(StateError::InvalidTransition { .. }) => {
            ErrorCode::StateInvalidTransition
        }
        PlayerErrorKind::State(StateError::NotLoaded(_)) => ErrorCode::StateNotLoaded,
    }
}

pub(crate) fn parse_add_source_buffer_error(
    code: AddSourceBufferErrorCode,
    desc: Option<String>,
) -> BufferError {
    match code {
        AddSourceBufferErrorCode::QuotaExceededError => BufferError::QuotaExceeded,
        AddSourceBufferErrorCode::NoMediaSourceAttached => BufferError::SinkUnavailable,
        AddSourceBufferErrorCode::TypeNotSupportedError | AddSourceBufferErrorCode::UnknownError => {
            BufferError::AppendFailed(desc.unwrap_or_else(|| "cannot create sink".to_owned()))
        }
    }
}

pub(crate) fn parse_buffer_operation_error(
    code: BufferOperationErrorCode,
    desc: Option<String>,
) -> BufferError {
    match code {
        BufferOperationErrorCode::NoSourceBuffer => BufferError::SinkUnavailable,
        BufferOperationErrorCode::QuotaExceeded => BufferError::QuotaExceeded,
        BufferOperationErrorCode::UnknownError => {
            BufferError::AppendFailed(desc.unwrap_or_else(|| "unknown error".to_owned()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_range_for_js() {
        assert_eq!(format_range_for_js(None), (None, None));
        let range = ByteRange {
            first_byte: 10,
            last_byte: Some(99),
        };
        assert_eq!(format_range_for_js(Some(&range)), (Some(10), Some(99)));
        let open_range = ByteRange {
            first_byte: 10,
            last_byte: None,
        };
        assert_eq!(format_range_for_js(Some(&open_range)), (Some(10), None));
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(
            format_error_code_for_js(&NetworkError::HttpStatus(404).into()),
            ErrorCode::NetworkHttpStatus
        );
        assert_eq!(
            format_error_code_for_js(&StateError::NotLoaded("seek").into()),
            ErrorCode::StateNotLoaded
        );
        assert_eq!(
            parse_buffer_operation_error(BufferOperationErrorCode::UnknownError, None),
            BufferError::AppendFailed("unknown error".to_owned())
        );
    }
}
