//! Crate-wide error taxonomy and the stable wire response codes.
//!
//! Every fallible layer of the server returns [`Error`]; the connection
//! layer flattens whatever reaches it into one of the stable integer codes
//! of [`ResponseCode`] before writing the response frame.

use std::io;
use std::path::PathBuf;

use num_derive::{FromPrimitive, ToPrimitive};
use thiserror::Error;

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Stable response codes carried in the response status block.
#[derive(Debug, Copy, Clone, PartialEq, Eq, FromPrimitive, ToPrimitive)]
pub enum ResponseCode {
    /// The request succeeded.
    Success = 0,
    /// The command name is not registered.
    UnknownCommand = 1,
    /// The request could not be parsed or executed.
    MalformedRequest = 2,
    /// The authentication type tag is not `U`, `S` or `N`.
    InvalidAuthType = 3,
    /// Authentication failed, the session expired, or an I/O deadline was
    /// exceeded.
    InvalidAuth = 4,
    /// A non-expiring session was requested but is disallowed, or the
    /// protocol version byte did not match.
    DisallowedSession = 5,
    /// Session ID minting exhausted its retry budget.
    SessionGenLimit = 6,
    /// The principal's clearance does not meet the requirement.
    InsufficientClearance = 7,
    /// No such user.
    UserNotFound = 8,
    /// Parallel argument arrays differ in length.
    LengthMismatch = 9,
    /// Client and server protocol revisions are incompatible.
    IncompatibleVersions = 10,
    /// The user already exists.
    UserAlreadyExists = 11,
    /// No such session.
    SessionNotFound = 12,
    /// No such drive.
    DriveNotFound = 13,
    /// The drive already exists.
    DriveAlreadyExists = 14,
    /// Invalid worker count.
    InvalidNumWorkers = 15,
    /// Invalid request timeout.
    InvalidTimeout = 16,
    /// Invalid log file path.
    InvalidLogPath = 17,
    /// Invalid log level.
    InvalidLogLevel = 18,
    /// Invalid rate-limit parameters, or the remote was rate limited.
    RateLimit = 19,
    /// Invalid server manifest path.
    InvalidServerFilePath = 20,
    /// Invalid host or port.
    InvalidHostPort = 21,
    /// Invalid drive file path.
    InvalidDriveFilePath = 22,
}

/// Errors produced by the drive tree, the codec layers and the server.
#[derive(Debug, Error)]
pub enum Error {
    /// The path does not resolve to a directory or file in the tree.
    #[error("path not found: {0:?}")]
    PathNotFound(String),

    /// An operation requiring a non-empty path received the root path.
    #[error("empty path")]
    EmptyPath,

    /// The node name is empty or contains an illegal character.
    #[error("invalid name: {0:?}")]
    InvalidName(String),

    /// The normalized path begins with `..`.
    #[error("path escapes the root")]
    InvalidPathStart,

    /// The target name is already taken under its parent.
    #[error("already exists: {0:?}")]
    AlreadyExists(String),

    /// A descendant path does not live under the expected parent.
    #[error("{child:?} is not a child of {parent:?}")]
    NotChildOf { parent: String, child: String },

    /// A descendant list is not resolvable in traversal order.
    #[error("invalid directory tree")]
    InvalidDirectoryTree,

    /// Parallel argument arrays differ in length.
    #[error("argument lists differ in length")]
    InvalidLength,

    /// A read range does not satisfy `0 <= start <= end <= size`.
    #[error("invalid start/end range")]
    InvalidStartEnd,

    /// The chunk header does not correspond 1:1 with the file list.
    #[error("chunk streams do not match the file list")]
    InvalidChunks,

    /// A chunk buffer could not be allocated.
    #[error("insufficient memory for chunk buffer")]
    InsufficientMemory,

    /// A frame footer was not the literal `END`.
    #[error("invalid frame footer")]
    InvalidFooter,

    /// The opening magic or envelope structure is wrong.
    #[error("invalid protocol header")]
    InvalidProtocol,

    /// A marshalled boolean byte was neither `0x00` nor `0xFF`.
    #[error("invalid boolean byte {0:#04x}")]
    InvalidBool(u8),

    /// Modify clearance below access clearance, or a clearance outside 1-5.
    #[error("invalid clearance pair")]
    InvalidClearancePair,

    /// Password verification failed.
    #[error("invalid password")]
    InvalidPassword,

    /// The session's expiry instant has passed.
    #[error("session expired")]
    SessionExpired,

    /// No session with the given ID.
    #[error("session not found")]
    SessionNotFound,

    /// Session ID generation exhausted its collision retry budget.
    #[error("session id generation limit reached")]
    SessionGenLimitReached,

    /// The user already holds the maximum number of sessions.
    #[error("per-user session limit reached")]
    PerUserLimitReached,

    /// No such user.
    #[error("user not found: {0:?}")]
    UserNotFound(String),

    /// The username is already taken.
    #[error("user already exists: {0:?}")]
    UserAlreadyExists(String),

    /// No such drive.
    #[error("drive does not exist: {0:?}")]
    DriveNotFound(String),

    /// The drive name is already taken.
    #[error("drive already exists: {0:?}")]
    DriveAlreadyExists(String),

    /// The manifest names a drive file that is absent on the host.
    #[error("drive file missing: {0:?}")]
    DriveFileMissing(PathBuf),

    /// A network deadline elapsed.
    #[error("operation timed out")]
    TimedOut,

    /// The requested chunk size is zero.
    #[error("invalid chunk size")]
    InvalidChunkSize,

    /// A length prefix exceeds its field width.
    #[error("invalid slice length")]
    InvalidSliceLength,

    /// The command name is not registered.
    #[error("unknown command: {0:?}")]
    UnknownCommand(String),

    /// The request body could not be parsed.
    #[error("malformed request: {0}")]
    MalformedRequest(String),

    /// The authentication type tag is unknown.
    #[error("invalid authentication type {0:?}")]
    InvalidAuthType(char),

    /// Credentials or session token were rejected.
    #[error("invalid authentication")]
    InvalidAuth,

    /// A non-expiring session was requested but the server disallows them.
    #[error("non-expiring sessions are disallowed")]
    NonExpiringSessionDisallowed,

    /// The principal's clearance does not meet the requirement.
    #[error("insufficient clearance")]
    InsufficientClearance,

    /// The protocol version byte did not match.
    #[error("incompatible protocol version {0:?}")]
    IncompatibleVersion(char),

    /// The remote address exceeded its token bucket.
    #[error("rate limited")]
    RateLimited,

    /// Worker count outside the accepted range.
    #[error("invalid worker count {0}")]
    InvalidNumWorkers(u32),

    /// Non-positive or unrepresentable timeout.
    #[error("invalid timeout")]
    InvalidTimeout,

    /// Log path is empty or not writable.
    #[error("invalid log path: {0:?}")]
    InvalidLogPath(String),

    /// Unrecognized log level name.
    #[error("invalid log level: {0:?}")]
    InvalidLogLevel(String),

    /// Non-positive rate-limit interval or zero burst.
    #[error("invalid rate limit parameters")]
    InvalidRateLimit,

    /// Server manifest path is empty or not a file path.
    #[error("invalid server file path: {0:?}")]
    InvalidServerFilePath(String),

    /// Host or port could not be parsed.
    #[error("invalid host or port")]
    InvalidHostPort,

    /// Drive file path is empty or relative.
    #[error("invalid drive file path: {0:?}")]
    InvalidDriveFilePath(String),

    /// A string field was not valid UTF-8.
    #[error("invalid string encoding")]
    InvalidString(#[from] std::string::FromUtf8Error),

    /// Argument map (de)serialization failure.
    #[error("invalid argument map: {0}")]
    InvalidArgumentMap(String),

    /// Underlying I/O failure.
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl Error {
    /// Maps this error onto the stable wire code table.
    ///
    /// Filesystem and codec failures without a dedicated code collapse into
    /// [`ResponseCode::MalformedRequest`]; the human-readable description
    /// travels in the status string.
    pub fn code(&self) -> ResponseCode {
        match self {
            Error::UnknownCommand(_) => ResponseCode::UnknownCommand,
            Error::InvalidAuthType(_) => ResponseCode::InvalidAuthType,
            Error::InvalidAuth
            | Error::InvalidPassword
            | Error::SessionExpired
            | Error::TimedOut => ResponseCode::InvalidAuth,
            Error::NonExpiringSessionDisallowed | Error::IncompatibleVersion(_) => {
                ResponseCode::DisallowedSession
            }
            Error::SessionGenLimitReached => ResponseCode::SessionGenLimit,
            Error::InsufficientClearance => ResponseCode::InsufficientClearance,
            Error::UserNotFound(_) => ResponseCode::UserNotFound,
            Error::InvalidLength | Error::InvalidStartEnd => ResponseCode::LengthMismatch,
            Error::UserAlreadyExists(_) => ResponseCode::UserAlreadyExists,
            Error::SessionNotFound => ResponseCode::SessionNotFound,
            Error::DriveNotFound(_) => ResponseCode::DriveNotFound,
            Error::DriveAlreadyExists(_) => ResponseCode::DriveAlreadyExists,
            Error::InvalidNumWorkers(_) => ResponseCode::InvalidNumWorkers,
            Error::InvalidTimeout => ResponseCode::InvalidTimeout,
            Error::InvalidLogPath(_) => ResponseCode::InvalidLogPath,
            Error::InvalidLogLevel(_) => ResponseCode::InvalidLogLevel,
            Error::InvalidRateLimit | Error::RateLimited => ResponseCode::RateLimit,
            Error::InvalidServerFilePath(_) => ResponseCode::InvalidServerFilePath,
            Error::InvalidHostPort => ResponseCode::InvalidHostPort,
            Error::InvalidDriveFilePath(_) => ResponseCode::InvalidDriveFilePath,
            _ => ResponseCode::MalformedRequest,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_table_stability() {
        assert_eq!(ResponseCode::Success as u32, 0);
        assert_eq!(ResponseCode::UnknownCommand as u32, 1);
        assert_eq!(ResponseCode::InvalidAuthType as u32, 3);
        assert_eq!(ResponseCode::SessionGenLimit as u32, 6);
        assert_eq!(ResponseCode::RateLimit as u32, 19);
        assert_eq!(ResponseCode::InvalidDriveFilePath as u32, 22);
    }

    #[test]
    fn test_auth_failures_share_code_four() {
        assert_eq!(Error::InvalidAuth.code(), ResponseCode::InvalidAuth);
        assert_eq!(Error::SessionExpired.code(), ResponseCode::InvalidAuth);
        assert_eq!(Error::TimedOut.code(), ResponseCode::InvalidAuth);
    }

    #[test]
    fn test_fs_errors_collapse_to_malformed() {
        assert_eq!(
            Error::PathNotFound("a/b".into()).code(),
            ResponseCode::MalformedRequest
        );
        assert_eq!(Error::InvalidFooter.code(), ResponseCode::MalformedRequest);
    }
}
