//! Face-matched attendance for class sessions.
//!
//! [`SessionPipeline`] ties the pieces together for one submitted photo:
//!
//! 1. decode the image ([`decode_image`])
//! 2. load the session roster into an exact L2 index ([`IndexBuilder`])
//! 3. detect faces with a [`FaceModel`]
//! 4. match each face ([`Matcher`]) and mark it present once
//!    ([`AttendanceRecorder`])
//!
//! The outcome is always a [`Report`], never a bare error.

mod error;
mod export;
mod http_model;
mod index;
mod matcher;
mod model;
mod pipeline;
mod recorder;
mod report;


pub use error::{ErrorKind, PipelineError};
pub use export::{ExportRow, export_rows, write_csv};
pub use http_model::{HttpFaceModel, HttpFaceModelConfig};
pub use index::{IndexBuilder, IndexCache};
pub use matcher::{DEFAULT_THRESHOLD, Matcher};
pub use model::{FaceModel, StaticFaceModel, decode_image};
pub use pipeline::{PipelineConfig, SessionPipeline};
pub use recorder::AttendanceRecorder;
pub use report::{AttendanceEntry, RecordFailure, Report, ReportStatus};
