use std::io;
use thiserror::Error;

/// Kernel query that produced an errno, used to pick the right message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelOp {
    OpenChannel,
    GetInfo,
    GetServices,
    GetDests,
}

impl KernelOp {
    pub const fn as_str(&self) -> &'static str {
        match self {
            KernelOp::OpenChannel => "socket",
            KernelOp::GetInfo => "get_info",
            KernelOp::GetServices => "get_services",
            KernelOp::GetDests => "get_dests",
        }
    }
}

impl std::fmt::Display for KernelOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Error, Debug)]
pub enum IpvsError {
    #[error("{op}: Permission denied (you must be root)")]
    PermissionDenied { op: KernelOp },

    #[error("{op}: Module is wrong version")]
    InvalidModuleVersion { op: KernelOp },

    #[error("{op}: Protocol not available (is the ip_vs module loaded?)")]
    ProtocolUnavailable { op: KernelOp },

    #[error("{op}: Memory allocation problem in the kernel")]
    KernelOutOfMemory { op: KernelOp },

    #[error("{op}: No such service")]
    NoSuchService { op: KernelOp },

    #[error("{op}: kernel returned {actual} bytes, expected {expected}")]
    SizeMismatch {
        op: KernelOp,
        expected: usize,
        actual: usize,
    },

    #[error("{op}: {source}")]
    Kernel {
        op: KernelOp,
        #[source]
        source: io::Error,
    },

    #[error("Out of memory sizing buffer for {entries} {what} entries")]
    AllocationFailed { what: &'static str, entries: u64 },

    #[error("{kind} identifier truncated: {partial}")]
    Truncated { kind: &'static str, partial: String },

    #[error("Collector not initialized")]
    NotInitialized,

    #[error("Collector already initialized")]
    AlreadyInitialized,

    #[error("Metrics error: {0}")]
    MetricsError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] io::Error),

    #[error("Unsupported feature on this system: {0}")]
    UnsupportedFeature(String),
}

impl IpvsError {
    /// Translate an OS error from a kernel query into its typed variant.
    ///
    /// `ESRCH` only means "no such service" for the table queries; elsewhere it
    /// keeps the generic system description.
    pub fn from_os(op: KernelOp, err: io::Error) -> Self {
        match err.raw_os_error() {
            Some(libc::EPERM) => IpvsError::PermissionDenied { op },
            Some(libc::EINVAL) => IpvsError::InvalidModuleVersion { op },
            Some(libc::ENOPROTOOPT) => IpvsError::ProtocolUnavailable { op },
            Some(libc::ENOMEM) => IpvsError::KernelOutOfMemory { op },
            Some(libc::ESRCH) if matches!(op, KernelOp::GetServices | KernelOp::GetDests) => {
                IpvsError::NoSuchService { op }
            }
            _ => IpvsError::Kernel { op, source: err },
        }
    }

    /// Errors the host must treat as process-terminating.
    pub fn is_fatal(&self) -> bool {
        matches!(self, IpvsError::AllocationFailed { .. })
    }
}

pub type Result<T> = std::result::Result<T, IpvsError>;
