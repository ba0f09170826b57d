//! Request parameter descriptors, coercion and the validation pipeline.

pub mod coerce;
pub mod pipeline;
pub mod spec;

pub use pipeline::{parse_params, ParsedParams};
pub use spec::{ParamKind, ParamSpec, ParamValue, ParseContext, UploadedFile};
