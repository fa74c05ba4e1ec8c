//! Streaming specification extraction
//!
//! Reads an OpenAPI 3.x JSON document from any `io::Read` source and emits
//! typed records in document order without materializing the whole document.
//! The extraction rides on serde's deserializer: seeded visitors descend into
//! the recognized top-level keys (`info`, `tags`, `x-tagGroups`, `paths`,
//! `components`) and hold at most one record's subtree in memory at a time.
//! Everything else is skipped through `IgnoredAny` without buffering.
//!
//! Failure channels: recoverable warnings accumulate in the [`ParseReport`];
//! malformed JSON aborts with `InvalidSpecification` carrying the byte offset
//! reached. Semantic OpenAPI validation is the caller's job.

use std::io::Read;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::de::{self, DeserializeSeed, IgnoredAny, MapAccess, SeqAccess, Visitor};
use serde_json::Value;

use crate::errors::{Result, SpecdexError};
use crate::openapi::model::{
    ApiInfo, Endpoint, ParameterRecord, ParseReport, ParsedRecord, RequestBodyRecord,
    ResponseRecord, SchemaRecord, SecurityScheme, SpecWarning, TagDefinition,
    TagGroupDefinition, collect_references, KNOWN_METHODS, PATH_ITEM_FIELDS,
};

/// Receives records as the parser emits them. A sink error aborts the stream.
pub trait RecordSink {
    fn record(&mut self, record: ParsedRecord) -> Result<()>;
}

impl<F> RecordSink for F
where
    F: FnMut(ParsedRecord) -> Result<()>,
{
    fn record(&mut self, record: ParsedRecord) -> Result<()> {
        self(record)
    }
}

/// Collects every record; convenient for tests and small documents.
#[derive(Default)]
pub struct VecSink {
    pub records: Vec<ParsedRecord>,
}

impl RecordSink for VecSink {
    fn record(&mut self, record: ParsedRecord) -> Result<()> {
        self.records.push(record);
        Ok(())
    }
}

/// Parse a specification from `reader`, driving `sink` once per record.
pub fn parse_stream<R: Read, S: RecordSink>(reader: R, sink: &mut S) -> Result<ParseReport> {
    let offset = Arc::new(AtomicU64::new(0));
    let counting = CountingReader {
        inner: reader,
        offset: Arc::clone(&offset),
    };

    let mut report = ParseReport::default();
    let mut ctx = Ctx {
        sink,
        report: &mut report,
        sink_error: None,
        openapi_version: None,
        saw_openapi: false,
        saw_info: false,
        saw_paths: false,
    };

    let mut de = serde_json::Deserializer::from_reader(counting);
    let outcome = RootSeed { ctx: &mut ctx }.deserialize(&mut de);
    let outcome = outcome.and_then(|()| de.end());

    let bytes_read = offset.load(Ordering::Relaxed);

    if let Some(err) = ctx.sink_error.take() {
        return Err(err);
    }
    if let Err(err) = outcome {
        return Err(SpecdexError::InvalidSpecification {
            offset: bytes_read,
            message: err.to_string(),
        });
    }

    for (seen, field) in [
        (ctx.saw_openapi, "openapi"),
        (ctx.saw_info, "info"),
        (ctx.saw_paths, "paths"),
    ] {
        if !seen {
            return Err(SpecdexError::InvalidSpecification {
                offset: bytes_read,
                message: format!("missing required field '{}'", field),
            });
        }
    }

    report.bytes_read = bytes_read;
    Ok(report)
}

/// `io::Read` wrapper tracking how many bytes the deserializer consumed, so
/// fatal errors can carry an offset.
struct CountingReader<R> {
    inner: R,
    offset: Arc<AtomicU64>,
}

impl<R: Read> Read for CountingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.offset.fetch_add(n as u64, Ordering::Relaxed);
        Ok(n)
    }
}

/// Shared mutable state threaded through the seeded visitors.
struct Ctx<'a, S: RecordSink> {
    sink: &'a mut S,
    report: &'a mut ParseReport,
    sink_error: Option<SpecdexError>,
    openapi_version: Option<String>,
    saw_openapi: bool,
    saw_info: bool,
    saw_paths: bool,
}

impl<S: RecordSink> Ctx<'_, S> {
    fn emit<E: de::Error>(&mut self, record: ParsedRecord) -> std::result::Result<(), E> {
        if let Err(err) = self.sink.record(record) {
            self.sink_error = Some(err);
            return Err(E::custom("record sink aborted"));
        }
        Ok(())
    }

    fn warn(&mut self, warning: SpecWarning) {
        self.report.warnings.push(warning);
    }
}

struct RootSeed<'c, 'a, S: RecordSink> {
    ctx: &'c mut Ctx<'a, S>,
}

impl<'de, S: RecordSink> DeserializeSeed<'de> for RootSeed<'_, '_, S> {
    type Value = ();

    fn deserialize<D: de::Deserializer<'de>>(self, de: D) -> std::result::Result<(), D::Error> {
        de.deserialize_map(self)
    }
}

impl<'de, S: RecordSink> Visitor<'de> for RootSeed<'_, '_, S> {
    type Value = ();

    fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str("an OpenAPI document object")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> std::result::Result<(), A::Error> {
        while let Some(key) = map.next_key::<String>()? {
            match key.as_str() {
                "openapi" => {
                    let version: String = map.next_value()?;
                    self.ctx.saw_openapi = true;
                    if !version.starts_with('3') {
                        self.ctx.warn(SpecWarning::UnsupportedVersion {
                            version: version.clone(),
                        });
                    }
                    self.ctx.openapi_version = Some(version);
                }
                "info" => {
                    let info: Value = map.next_value()?;
                    self.ctx.saw_info = true;
                    let record = ApiInfo {
                        title: str_field(&info, "title").unwrap_or_else(|| "Untitled API".to_string()),
                        version: str_field(&info, "version").unwrap_or_else(|| "0.0.0".to_string()),
                        description: str_field(&info, "description"),
                        openapi_version: self.ctx.openapi_version.clone(),
                    };
                    self.ctx.emit(ParsedRecord::Api(record))?;
                }
                "tags" => {
                    map.next_value_seed(TagsSeed { ctx: &mut *self.ctx })?;
                }
                "x-tagGroups" => {
                    map.next_value_seed(TagGroupsSeed { ctx: &mut *self.ctx })?;
                }
                "paths" => {
                    map.next_value_seed(PathsSeed { ctx: &mut *self.ctx })?;
                    self.ctx.saw_paths = true;
                }
                "components" => {
                    map.next_value_seed(ComponentsSeed { ctx: &mut *self.ctx })?;
                }
                _ => {
                    map.next_value::<IgnoredAny>()?;
                }
            }
        }
        Ok(())
    }
}

struct TagsSeed<'c, 'a, S: RecordSink> {
    ctx: &'c mut Ctx<'a, S>,
}

impl<'de, S: RecordSink> DeserializeSeed<'de> for TagsSeed<'_, '_, S> {
    type Value = ();

    fn deserialize<D: de::Deserializer<'de>>(self, de: D) -> std::result::Result<(), D::Error> {
        de.deserialize_seq(self)
    }
}

impl<'de, S: RecordSink> Visitor<'de> for TagsSeed<'_, '_, S> {
    type Value = ();

    fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str("an array of tag definitions")
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> std::result::Result<(), A::Error> {
        while let Some(tag) = seq.next_element::<Value>()? {
            let Some(name) = str_field(&tag, "name") else {
                continue;
            };
            let record = TagDefinition {
                name,
                description: str_field(&tag, "description"),
                display_name: str_field(&tag, "x-displayName"),
            };
            self.ctx.report.tags += 1;
            self.ctx.emit(ParsedRecord::Tag(record))?;
        }
        Ok(())
    }
}

struct TagGroupsSeed<'c, 'a, S: RecordSink> {
    ctx: &'c mut Ctx<'a, S>,
}

impl<'de, S: RecordSink> DeserializeSeed<'de> for TagGroupsSeed<'_, '_, S> {
    type Value = ();

    fn deserialize<D: de::Deserializer<'de>>(self, de: D) -> std::result::Result<(), D::Error> {
        de.deserialize_seq(self)
    }
}

impl<'de, S: RecordSink> Visitor<'de> for TagGroupsSeed<'_, '_, S> {
    type Value = ();

    fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str("an array of tag group definitions")
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> std::result::Result<(), A::Error> {
        while let Some(group) = seq.next_element::<Value>()? {
            let Some(name) = str_field(&group, "name") else {
                continue;
            };
            let tags = group
                .get("tags")
                .and_then(|t| t.as_array())
                .map(|arr| {
                    arr.iter()
                        .filter_map(|v| v.as_str().map(String::from))
                        .collect()
                })
                .unwrap_or_default();
            let record = TagGroupDefinition { name, tags };
            self.ctx.report.tag_groups += 1;
            self.ctx.emit(ParsedRecord::TagGroup(record))?;
        }
        Ok(())
    }
}

struct PathsSeed<'c, 'a, S: RecordSink> {
    ctx: &'c mut Ctx<'a, S>,
}

impl<'de, S: RecordSink> DeserializeSeed<'de> for PathsSeed<'_, '_, S> {
    type Value = ();

    fn deserialize<D: de::Deserializer<'de>>(self, de: D) -> std::result::Result<(), D::Error> {
        de.deserialize_map(self)
    }
}

impl<'de, S: RecordSink> Visitor<'de> for PathsSeed<'_, '_, S> {
    type Value = ();

    fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str("a paths object")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> std::result::Result<(), A::Error> {
        while let Some(path) = map.next_key::<String>()? {
            map.next_value_seed(PathItemSeed {
                ctx: &mut *self.ctx,
                path,
            })?;
        }
        Ok(())
    }
}

struct PathItemSeed<'c, 'a, S: RecordSink> {
    ctx: &'c mut Ctx<'a, S>,
    path: String,
}

impl<'de, S: RecordSink> DeserializeSeed<'de> for PathItemSeed<'_, '_, S> {
    type Value = ();

    fn deserialize<D: de::Deserializer<'de>>(self, de: D) -> std::result::Result<(), D::Error> {
        de.deserialize_map(self)
    }
}

impl<'de, S: RecordSink> Visitor<'de> for PathItemSeed<'_, '_, S> {
    type Value = ();

    fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str("a path item object")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> std::result::Result<(), A::Error> {
        while let Some(key) = map.next_key::<String>()? {
            let method = key.to_ascii_lowercase();
            if KNOWN_METHODS.contains(&method.as_str()) {
                let operation: Value = map.next_value()?;
                let endpoint = build_endpoint(&self.path, &method, &operation);
                self.ctx.report.endpoints += 1;
                self.ctx.emit(ParsedRecord::Endpoint(endpoint))?;
            } else if PATH_ITEM_FIELDS.contains(&key.as_str()) || key.starts_with("x-") {
                map.next_value::<IgnoredAny>()?;
            } else {
                self.ctx.warn(SpecWarning::UnknownMethod {
                    path: self.path.clone(),
                    method: key,
                });
                map.next_value::<IgnoredAny>()?;
            }
        }
        Ok(())
    }
}

struct ComponentsSeed<'c, 'a, S: RecordSink> {
    ctx: &'c mut Ctx<'a, S>,
}

impl<'de, S: RecordSink> DeserializeSeed<'de> for ComponentsSeed<'_, '_, S> {
    type Value = ();

    fn deserialize<D: de::Deserializer<'de>>(self, de: D) -> std::result::Result<(), D::Error> {
        de.deserialize_map(self)
    }
}

impl<'de, S: RecordSink> Visitor<'de> for ComponentsSeed<'_, '_, S> {
    type Value = ();

    fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str("a components object")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> std::result::Result<(), A::Error> {
        while let Some(key) = map.next_key::<String>()? {
            match key.as_str() {
                "schemas" => {
                    map.next_value_seed(SchemasSeed { ctx: &mut *self.ctx })?;
                }
                "securitySchemes" => {
                    map.next_value_seed(SecuritySchemesSeed { ctx: &mut *self.ctx })?;
                }
                _ => {
                    map.next_value::<IgnoredAny>()?;
                }
            }
        }
        Ok(())
    }
}

struct SchemasSeed<'c, 'a, S: RecordSink> {
    ctx: &'c mut Ctx<'a, S>,
}

impl<'de, S: RecordSink> DeserializeSeed<'de> for SchemasSeed<'_, '_, S> {
    type Value = ();

    fn deserialize<D: de::Deserializer<'de>>(self, de: D) -> std::result::Result<(), D::Error> {
        de.deserialize_map(self)
    }
}

impl<'de, S: RecordSink> Visitor<'de> for SchemasSeed<'_, '_, S> {
    type Value = ();

    fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str("a schema components object")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> std::result::Result<(), A::Error> {
        while let Some(name) = map.next_key::<String>()? {
            let body: Value = map.next_value()?;
            let references = collect_references(&body);
            let record = SchemaRecord {
                name,
                body,
                references,
            };
            self.ctx.report.schemas += 1;
            self.ctx.emit(ParsedRecord::Schema(record))?;
        }
        Ok(())
    }
}

struct SecuritySchemesSeed<'c, 'a, S: RecordSink> {
    ctx: &'c mut Ctx<'a, S>,
}

impl<'de, S: RecordSink> DeserializeSeed<'de> for SecuritySchemesSeed<'_, '_, S> {
    type Value = ();

    fn deserialize<D: de::Deserializer<'de>>(self, de: D) -> std::result::Result<(), D::Error> {
        de.deserialize_map(self)
    }
}

impl<'de, S: RecordSink> Visitor<'de> for SecuritySchemesSeed<'_, '_, S> {
    type Value = ();

    fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str("a security schemes object")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> std::result::Result<(), A::Error> {
        while let Some(name) = map.next_key::<String>()? {
            let scheme: Value = map.next_value()?;
            let Some(scheme_type) = str_field(&scheme, "type") else {
                continue;
            };
            let record = SecurityScheme {
                name,
                scheme_type,
                scheme: str_field(&scheme, "scheme"),
                location: str_field(&scheme, "in"),
                key_name: str_field(&scheme, "name"),
            };
            self.ctx.report.security_schemes += 1;
            self.ctx.emit(ParsedRecord::Security(record))?;
        }
        Ok(())
    }
}

/// Build an endpoint record from an accumulated operation object.
fn build_endpoint(path: &str, method: &str, operation: &Value) -> Endpoint {
    let tags = operation
        .get("tags")
        .and_then(|t| t.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|v| v.as_str().map(String::from))
                .collect()
        })
        .unwrap_or_default();

    let parameters = operation
        .get("parameters")
        .and_then(|p| p.as_array())
        .map(|arr| arr.iter().filter_map(parse_parameter).collect())
        .unwrap_or_default();

    let request_body = operation.get("requestBody").and_then(parse_request_body);

    let mut responses = indexmap::IndexMap::new();
    if let Some(entries) = operation.get("responses").and_then(|r| r.as_object()) {
        for (status, entry) in entries {
            responses.insert(
                status.clone(),
                ResponseRecord {
                    description: str_field(entry, "description").unwrap_or_default(),
                    schema: json_content_schema(entry.get("content")),
                },
            );
        }
    }

    Endpoint {
        path: path.to_string(),
        method: method.to_uppercase(),
        summary: str_field(operation, "summary"),
        description: str_field(operation, "description"),
        operation_id: str_field(operation, "operationId"),
        tags,
        deprecated: operation
            .get("deprecated")
            .and_then(|d| d.as_bool())
            .unwrap_or(false),
        parameters,
        request_body,
        responses,
    }
}

fn parse_parameter(param: &Value) -> Option<ParameterRecord> {
    let name = param.get("name")?.as_str()?.to_string();
    let location = param.get("in")?.as_str()?.to_string();

    Some(ParameterRecord {
        name,
        location,
        description: str_field(param, "description"),
        required: param
            .get("required")
            .and_then(|r| r.as_bool())
            .unwrap_or(false),
        schema: param.get("schema").cloned(),
        example: param.get("example").cloned(),
    })
}

fn parse_request_body(body: &Value) -> Option<RequestBodyRecord> {
    let content = body.get("content")?.as_object()?;
    let (content_type, media) = content
        .get_key_value("application/json")
        .or_else(|| content.iter().next())?;

    Some(RequestBodyRecord {
        description: str_field(body, "description"),
        required: body
            .get("required")
            .and_then(|r| r.as_bool())
            .unwrap_or(false),
        content_type: content_type.clone(),
        schema: media.get("schema").cloned(),
    })
}

/// Pull the schema of the JSON media type out of a response `content` map,
/// falling back to the first declared media type.
fn json_content_schema(content: Option<&Value>) -> Option<Value> {
    let content = content?.as_object()?;
    let media = content
        .get("application/json")
        .or_else(|| content.values().next())?;
    media.get("schema").cloned()
}

fn str_field(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(|v| v.as_str()).map(String::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r##"{
        "openapi": "3.0.3",
        "info": {"title": "Petstore", "version": "1.2.0", "description": "Pets"},
        "tags": [{"name": "Pets", "description": "Pet things", "x-displayName": "Питомцы"}],
        "x-tagGroups": [{"name": "Core", "tags": ["Pets"]}],
        "paths": {
            "/pets": {
                "get": {
                    "operationId": "listPets",
                    "summary": "List pets",
                    "tags": ["Pets"],
                    "responses": {"200": {"description": "ok"}}
                },
                "post": {
                    "operationId": "createPet",
                    "tags": ["Pets"],
                    "requestBody": {
                        "required": true,
                        "content": {"application/json": {"schema": {"$ref": "#/components/schemas/Pet"}}}
                    },
                    "responses": {"201": {"description": "created"}}
                },
                "trace": {"operationId": "tracePets"}
            }
        },
        "components": {
            "schemas": {
                "Pet": {
                    "type": "object",
                    "properties": {"owner": {"$ref": "#/components/schemas/Owner"}}
                },
                "Owner": {"type": "object"}
            },
            "securitySchemes": {
                "bearerAuth": {"type": "http", "scheme": "bearer"}
            }
        }
    }"##;

    #[test]
    fn test_emits_records_in_document_order() {
        let mut sink = VecSink::default();
        let report = parse_stream(MINIMAL.as_bytes(), &mut sink).unwrap();

        assert_eq!(report.endpoints, 2);
        assert_eq!(report.schemas, 2);
        assert_eq!(report.tags, 1);
        assert_eq!(report.tag_groups, 1);
        assert_eq!(report.security_schemes, 1);
        assert!(report.bytes_read > 0);

        let kinds: Vec<&str> = sink
            .records
            .iter()
            .map(|r| match r {
                ParsedRecord::Api(_) => "api",
                ParsedRecord::Tag(_) => "tag",
                ParsedRecord::TagGroup(_) => "group",
                ParsedRecord::Endpoint(_) => "endpoint",
                ParsedRecord::Schema(_) => "schema",
                ParsedRecord::Security(_) => "security",
            })
            .collect();
        assert_eq!(
            kinds,
            vec!["api", "tag", "group", "endpoint", "endpoint", "schema", "schema", "security"]
        );
    }

    #[test]
    fn test_unknown_method_warns_and_skips() {
        let mut sink = VecSink::default();
        let report = parse_stream(MINIMAL.as_bytes(), &mut sink).unwrap();

        assert_eq!(report.warnings.len(), 1);
        assert!(matches!(
            &report.warnings[0],
            SpecWarning::UnknownMethod { path, method }
                if path == "/pets" && method == "trace"
        ));
    }

    #[test]
    fn test_non_ascii_display_name_survives() {
        let mut sink = VecSink::default();
        parse_stream(MINIMAL.as_bytes(), &mut sink).unwrap();

        let tag = sink
            .records
            .iter()
            .find_map(|r| match r {
                ParsedRecord::Tag(t) => Some(t),
                _ => None,
            })
            .unwrap();
        assert_eq!(tag.display_name.as_deref(), Some("Питомцы"));
    }

    #[test]
    fn test_schema_references_extracted() {
        let mut sink = VecSink::default();
        parse_stream(MINIMAL.as_bytes(), &mut sink).unwrap();

        let pet = sink
            .records
            .iter()
            .find_map(|r| match r {
                ParsedRecord::Schema(s) if s.name == "Pet" => Some(s),
                _ => None,
            })
            .unwrap();
        assert_eq!(pet.references, vec!["Owner"]);
    }

    #[test]
    fn test_missing_openapi_field_is_fatal() {
        let doc = r#"{"info": {"title": "t", "version": "1"}, "paths": {}}"#;
        let mut sink = VecSink::default();
        let err = parse_stream(doc.as_bytes(), &mut sink).unwrap_err();
        assert!(matches!(
            err,
            SpecdexError::InvalidSpecification { ref message, .. }
                if message.contains("openapi")
        ));
    }

    #[test]
    fn test_malformed_json_reports_offset() {
        let doc = r#"{"openapi": "3.0.0", "info": {"title": "t", "#;
        let mut sink = VecSink::default();
        let err = parse_stream(doc.as_bytes(), &mut sink).unwrap_err();
        match err {
            SpecdexError::InvalidSpecification { offset, .. } => assert!(offset > 0),
            other => panic!("expected InvalidSpecification, got {:?}", other),
        }
    }

    #[test]
    fn test_swagger_2_version_warns() {
        let doc = r#"{
            "openapi": "2.0",
            "info": {"title": "t", "version": "1"},
            "paths": {}
        }"#;
        let mut sink = VecSink::default();
        let report = parse_stream(doc.as_bytes(), &mut sink).unwrap();
        assert!(matches!(
            &report.warnings[0],
            SpecWarning::UnsupportedVersion { version } if version == "2.0"
        ));
    }

    #[test]
    fn test_unknown_top_level_keys_skipped() {
        let doc = r#"{
            "openapi": "3.1.0",
            "info": {"title": "t", "version": "1"},
            "servers": [{"url": "https://api.example.com"}],
            "webhooks": {"big": {"post": {"requestBody": {}}}},
            "paths": {}
        }"#;
        let mut sink = VecSink::default();
        let report = parse_stream(doc.as_bytes(), &mut sink).unwrap();
        assert_eq!(report.endpoints, 0);
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn test_sink_error_aborts_stream() {
        let mut failing = |_record: ParsedRecord| -> crate::errors::Result<()> {
            Err(SpecdexError::Cancelled)
        };
        let err = parse_stream(MINIMAL.as_bytes(), &mut failing).unwrap_err();
        assert!(matches!(err, SpecdexError::Cancelled));
    }
}
