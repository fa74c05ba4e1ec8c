//! OpenAPI specification model and streaming extraction

pub mod model;
mod stream;

pub use model::{
    ApiInfo, Endpoint, ParameterRecord, ParseReport, ParsedRecord, RequestBodyRecord,
    ResponseRecord, SchemaRecord, SecurityScheme, SpecWarning, TagDefinition,
    TagGroupDefinition, collect_references, reference_target,
};
pub use stream::{parse_stream, RecordSink, VecSink};
