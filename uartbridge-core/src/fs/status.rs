//! Filesystem result codes
//!
//! Codes follow FatFS `FRESULT` numbering so a native result can be
//! carried unchanged inside [`FsError`].

/// Native filesystem result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum FsStatus {
    Ok = 0,
    DiskErr = 1,
    IntErr = 2,
    NotReady = 3,
    NoFile = 4,
    NoPath = 5,
    InvalidName = 6,
    Denied = 7,
    Exist = 8,
    InvalidObject = 9,
    WriteProtected = 10,
    InvalidDrive = 11,
    NotEnabled = 12,
    NoFilesystem = 13,
    MkfsAborted = 14,
    Timeout = 15,
    Locked = 16,
    NotEnoughCore = 17,
    TooManyOpenFiles = 18,
    InvalidParameter = 19,
    /// Code outside the known range
    Unknown = 0xFF,
}

/// Coarse classification of a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ErrorKind {
    Io,
    NotFound,
    InvalidInput,
    PermissionDenied,
    AlreadyExists,
    ReadOnly,
    NoDevice,
    TimedOut,
    Locked,
    OutOfMemory,
    TooManyOpenFiles,
}

impl FsStatus {
    /// Decode a native result code
    pub fn from_code(code: u8) -> Self {
        use FsStatus::*;
        match code {
            0 => Ok,
            1 => DiskErr,
            2 => IntErr,
            3 => NotReady,
            4 => NoFile,
            5 => NoPath,
            6 => InvalidName,
            7 => Denied,
            8 => Exist,
            9 => InvalidObject,
            10 => WriteProtected,
            11 => InvalidDrive,
            12 => NotEnabled,
            13 => NoFilesystem,
            14 => MkfsAborted,
            15 => Timeout,
            16 => Locked,
            17 => NotEnoughCore,
            18 => TooManyOpenFiles,
            19 => InvalidParameter,
            _ => Unknown,
        }
    }

    /// Canonical upper-case name
    pub fn name(self) -> &'static str {
        use FsStatus::*;
        match self {
            Ok => "OK",
            DiskErr => "DISK_ERR",
            IntErr => "INT_ERR",
            NotReady => "NOT_READY",
            NoFile => "NO_FILE",
            NoPath => "NO_PATH",
            InvalidName => "INVALID_NAME",
            Denied => "DENIED",
            Exist => "EXIST",
            InvalidObject => "INVALID_OBJECT",
            WriteProtected => "WRITE_PROTECTED",
            InvalidDrive => "INVALID_DRIVE",
            NotEnabled => "NOT_ENABLED",
            NoFilesystem => "NO_FILESYSTEM",
            MkfsAborted => "MKFS_ABORTED",
            Timeout => "TIMEOUT",
            Locked => "LOCKED",
            NotEnoughCore => "NOT_ENOUGH_CORE",
            TooManyOpenFiles => "TOO_MANY_OPEN_FILES",
            InvalidParameter => "INVALID_PARAMETER",
            Unknown => "UNKNOWN",
        }
    }

    /// Classification used when reporting upward
    pub fn kind(self) -> ErrorKind {
        use FsStatus::*;
        match self {
            NoFile | NoPath => ErrorKind::NotFound,
            InvalidName | InvalidObject | InvalidParameter => ErrorKind::InvalidInput,
            Denied => ErrorKind::PermissionDenied,
            Exist => ErrorKind::AlreadyExists,
            WriteProtected => ErrorKind::ReadOnly,
            InvalidDrive | NotEnabled | NoFilesystem => ErrorKind::NoDevice,
            Timeout => ErrorKind::TimedOut,
            Locked => ErrorKind::Locked,
            NotEnoughCore => ErrorKind::OutOfMemory,
            TooManyOpenFiles => ErrorKind::TooManyOpenFiles,
            Ok | DiskErr | IntErr | NotReady | MkfsAborted | Unknown => ErrorKind::Io,
        }
    }

    /// Turn a native result for `op` into a `Result`
    pub fn check(op: &'static str, code: u8) -> Result<(), FsError> {
        if code == FsStatus::Ok as u8 {
            return Result::Ok(());
        }
        Err(FsError { op, code })
    }
}

/// A failed filesystem operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FsError {
    /// Name of the operation that failed ("mount", "mkfs", ...)
    pub op: &'static str,
    /// Native result code
    pub code: u8,
}

impl FsError {
    pub fn new(op: &'static str, status: FsStatus) -> Self {
        Self {
            op,
            code: status as u8,
        }
    }

    pub fn status(&self) -> FsStatus {
        FsStatus::from_code(self.code)
    }

    pub fn kind(&self) -> ErrorKind {
        self.status().kind()
    }
}

impl core::fmt::Display for FsError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{} error: {} ({})", self.op, self.status().name(), self.code)
    }
}
