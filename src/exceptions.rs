//! Error types for dir-projector

use std::fmt;
use std::path::PathBuf;

/// Main error type for projector and bundle builds
#[derive(Debug)]
pub enum ProjectorError {
    /// An output path (executable, config, splash, lingo, resource) already exists
    OutputAlreadyExists(PathBuf),

    /// Skeleton path has an extension no archive reader handles
    UnsupportedSkeletonFormat(PathBuf),

    /// Skeleton path is missing or is neither a file nor a directory
    SkeletonNotFileOrDirectory(PathBuf),

    /// A structural marker of the skeleton was never seen during extraction
    MissingRequiredSkeletonEntry(String),

    /// Archive member path is absolute or climbs out of the archive root
    UnsafeEntryPath(String),

    /// Byte-pattern scan found no candidate
    NoPatchCandidates(String),

    /// Byte-pattern scan found more than one candidate
    MultiplePatchCandidates(String),

    /// PE parsing failure
    MalformedExecutable(String),

    /// The resource section is followed by another section
    NonFinalResourceSection,

    /// COFF machine the launcher table has no stub for
    UnknownMachineType(u16),

    /// Mach-O magic not recognized
    UnknownHeaderMagic(u32),

    /// Mach-O CPU type with no launcher payload
    UnknownCpuType(u32),

    /// A configured patch matched no skeleton entry
    PatchTargetNotFound(String),

    /// Invalid or incomplete configuration
    InvalidConfig(String),

    /// Bundle opened twice or used while closed
    BundleState(String),

    /// Resource destination already exists
    ResourceExists(PathBuf),

    /// Resource source is not a file, directory or symlink
    UnsupportedResourceType(PathBuf),

    /// Launcher payload could not be located
    MissingLauncher(String),

    /// IO error
    IoError(std::io::Error),

    /// JSON parsing error
    JsonError(serde_json::Error),

    /// Zip container error
    ZipError(zip::result::ZipError),

    /// Property list error
    PlistError(plist::Error),

    /// Generic error with message
    Generic(String),
}

impl ProjectorError {
    /// True for failures caused by the skeleton contents rather than the caller
    pub fn is_skeleton_error(&self) -> bool {
        matches!(
            self,
            ProjectorError::UnsupportedSkeletonFormat(_)
                | ProjectorError::SkeletonNotFileOrDirectory(_)
                | ProjectorError::MissingRequiredSkeletonEntry(_)
                | ProjectorError::UnsafeEntryPath(_)
                | ProjectorError::PatchTargetNotFound(_)
                | ProjectorError::NoPatchCandidates(_)
                | ProjectorError::MultiplePatchCandidates(_)
        )
    }

    /// True for binary format parsing failures
    pub fn is_format_error(&self) -> bool {
        matches!(
            self,
            ProjectorError::MalformedExecutable(_)
                | ProjectorError::NonFinalResourceSection
                | ProjectorError::UnknownMachineType(_)
                | ProjectorError::UnknownHeaderMagic(_)
                | ProjectorError::UnknownCpuType(_)
        )
    }
}

impl fmt::Display for ProjectorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProjectorError::OutputAlreadyExists(path) => {
                write!(f, "Output path already exists: {}", path.display())
            }
            ProjectorError::UnsupportedSkeletonFormat(path) => {
                write!(f, "Unsupported skeleton format: {}", path.display())
            }
            ProjectorError::SkeletonNotFileOrDirectory(path) => {
                write!(f, "Skeleton not a file or directory: {}", path.display())
            }
            ProjectorError::MissingRequiredSkeletonEntry(name) => {
                write!(f, "Failed to locate: {name}")
            }
            ProjectorError::UnsafeEntryPath(name) => write!(f, "Unsafe entry path: {name}"),
            ProjectorError::NoPatchCandidates(name) => {
                write!(f, "No patch candidates found for: {name}")
            }
            ProjectorError::MultiplePatchCandidates(name) => {
                write!(f, "Multiple patch candidates found for: {name}")
            }
            ProjectorError::MalformedExecutable(msg) => write!(f, "Malformed executable: {msg}"),
            ProjectorError::NonFinalResourceSection => {
                write!(f, "Resource section is not the last section")
            }
            ProjectorError::UnknownMachineType(machine) => {
                write!(f, "Unknown machine type: 0x{machine:04x}")
            }
            ProjectorError::UnknownHeaderMagic(magic) => {
                write!(f, "Unknown header magic: 0x{magic:08x}")
            }
            ProjectorError::UnknownCpuType(cpu) => write!(f, "Unknown CPU type: 0x{cpu:x}"),
            ProjectorError::PatchTargetNotFound(name) => {
                write!(f, "Failed to locate for patching: {name}")
            }
            ProjectorError::InvalidConfig(msg) => write!(f, "Invalid config: {msg}"),
            ProjectorError::BundleState(msg) => write!(f, "{msg}"),
            ProjectorError::ResourceExists(path) => {
                write!(f, "Resource path exists: {}", path.display())
            }
            ProjectorError::UnsupportedResourceType(path) => {
                write!(f, "Unsupported resource type: {}", path.display())
            }
            ProjectorError::MissingLauncher(id) => write!(f, "Missing launcher: {id}"),
            ProjectorError::IoError(err) => write!(f, "IO error: {err}"),
            ProjectorError::JsonError(err) => write!(f, "JSON error: {err}"),
            ProjectorError::ZipError(err) => write!(f, "Zip error: {err}"),
            ProjectorError::PlistError(err) => write!(f, "Plist error: {err}"),
            ProjectorError::Generic(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for ProjectorError {}

impl From<std::io::Error> for ProjectorError {
    fn from(err: std::io::Error) -> Self {
        ProjectorError::IoError(err)
    }
}

impl From<serde_json::Error> for ProjectorError {
    fn from(err: serde_json::Error) -> Self {
        ProjectorError::JsonError(err)
    }
}

impl From<zip::result::ZipError> for ProjectorError {
    fn from(err: zip::result::ZipError) -> Self {
        ProjectorError::ZipError(err)
    }
}

impl From<plist::Error> for ProjectorError {
    fn from(err: plist::Error) -> Self {
        ProjectorError::PlistError(err)
    }
}

impl From<anyhow::Error> for ProjectorError {
    fn from(err: anyhow::Error) -> Self {
        // Keep typed errors that were wrapped with context
        match err.downcast::<ProjectorError>() {
            Ok(inner) => inner,
            Err(err) => ProjectorError::Generic(format!("{err:#}")),
        }
    }
}

/// Result type for projector operations
pub type Result<T> = std::result::Result<T, ProjectorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_names_missing_entry() {
        let err = ProjectorError::MissingRequiredSkeletonEntry("Projec32.skl".to_string());
        assert_eq!(err.to_string(), "Failed to locate: Projec32.skl");
        assert!(err.is_skeleton_error());
        assert!(!err.is_format_error());
    }

    #[test]
    fn test_unsafe_entry_path_is_skeleton_error() {
        let err = ProjectorError::UnsafeEntryPath("../escaped.txt".to_string());
        assert_eq!(err.to_string(), "Unsafe entry path: ../escaped.txt");
        assert!(err.is_skeleton_error());
    }

    #[test]
    fn test_anyhow_keeps_typed_error() {
        let err = anyhow::Error::new(ProjectorError::NonFinalResourceSection);
        let converted: ProjectorError = err.into();
        assert!(matches!(converted, ProjectorError::NonFinalResourceSection));
    }

    #[test]
    fn test_anyhow_context_becomes_generic() {
        let err = anyhow::anyhow!("reading manifest");
        let converted: ProjectorError = err.into();
        assert_eq!(converted.to_string(), "reading manifest");
    }
}
