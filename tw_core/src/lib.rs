pub mod artifact;
pub mod context;
pub mod errors;
pub mod formula;
pub mod formula_doc;
pub mod formula_parser;
pub mod version;

pub use artifact::{Arch, ArchivedBinary, BuildConfig, FormulaPublishInfo};
pub use context::{Context, LogLevel, Paths};
pub use errors::{Error, ErrorKind, PublishStage};
pub use formula::{Formula, GitHubRemote, Tap, TestCommand, UploadType};
pub use formula_doc::FormulaDocumentGenerator;
pub use formula_parser::{DecodedFormula, ParseError, parse_ruby_formula};
pub use version::{ReleaseVersionInfo, SemanticVersion, VersionPart, resolve_version};
