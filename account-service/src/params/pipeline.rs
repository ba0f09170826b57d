//! Validates raw request data against a set of [`ParamSpec`]s.

use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};

use super::spec::{ParamKind, ParamSpec, ParamValue, ParseContext, UploadedFile};
use crate::services::error::ParamError;

pub const DEFAULT_PAGE_SIZE: i64 = 25;

/// Finalized parameters of one request. Read-only once built.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedParams {
    values: BTreeMap<String, ParamValue>,
}

impl ParsedParams {
    pub fn get(&self, key: &str) -> Option<&ParamValue> {
        self.values.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(ParamValue::as_str)
    }

    pub fn int(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(ParamValue::as_i64)
    }

    /// Absent or non-boolean values read as `false`.
    pub fn flag(&self, key: &str) -> bool {
        self.get(key).and_then(ParamValue::as_bool).unwrap_or(false)
    }

    pub fn list(&self, key: &str) -> Option<&[Value]> {
        self.get(key).and_then(ParamValue::as_list)
    }

    pub fn object(&self, key: &str) -> Option<&Map<String, Value>> {
        self.get(key).and_then(ParamValue::as_object)
    }

    pub fn file(&self, key: &str) -> Option<&UploadedFile> {
        self.get(key).and_then(ParamValue::as_file)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ParamValue)> {
        self.values.iter()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Run the parameter pipeline. Keys without a spec pass through untouched,
/// and every missing required key is reported at once.
pub fn parse_params(
    data: &Map<String, Value>,
    files: &HashMap<String, UploadedFile>,
    specs: &[ParamSpec],
    ctx: &ParseContext<'_>,
) -> Result<ParsedParams, ParamError> {
    let spec_for = |key: &str| specs.iter().find(|s| s.key == key);
    let mut values = BTreeMap::new();

    for (key, raw) in data {
        let value = match spec_for(key) {
            Some(spec) if spec.is_file() => spec.get_file(files)?,
            Some(spec) => spec.get_value(data, ctx)?,
            None => ParamValue::Json(raw.clone()),
        };
        values.insert(key.clone(), value);
    }

    for key in files.keys() {
        if let Some(spec) = spec_for(key) {
            values.insert(key.clone(), spec.get_file(files)?);
        }
    }

    if data.contains_key("action") {
        values
            .entry("paginated_by".to_string())
            .or_insert(ParamValue::Int(DEFAULT_PAGE_SIZE));
        values.entry("page".to_string()).or_insert(ParamValue::Int(1));
    }

    let mut missing = Vec::new();
    for spec in specs {
        if values.contains_key(&spec.key) {
            continue;
        }
        if matches!(spec.kind, ParamKind::Bool) && spec.default.is_null() {
            values.insert(spec.key.clone(), ParamValue::Bool(false));
        } else if spec.optional {
            values.insert(spec.key.clone(), spec.default.clone());
        } else {
            missing.push(spec.key.clone());
        }
    }

    if !missing.is_empty() {
        return Err(ParamError::MissingParameters(missing));
    }

    Ok(ParsedParams { values })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn run(data: Value, specs: &[ParamSpec]) -> Result<ParsedParams, ParamError> {
        parse_params(
            data.as_object().unwrap(),
            &HashMap::new(),
            specs,
            &ParseContext::default(),
        )
    }

    #[test]
    fn test_missing_keys_aggregated() {
        let specs = vec![
            ParamSpec::required("username", ParamKind::Str),
            ParamSpec::required("code", ParamKind::Str),
            ParamSpec::optional("device_uuid", ParamKind::Str),
        ];
        assert_eq!(
            run(json!({}), &specs),
            Err(ParamError::MissingParameters(vec![
                "username".into(),
                "code".into()
            ]))
        );
    }

    #[test]
    fn test_optional_default_and_bool_filled() {
        let specs = vec![
            ParamSpec::optional("limit", ParamKind::Int).with_default(ParamValue::Int(10)),
            ParamSpec::optional("note", ParamKind::Str),
            ParamSpec::required("sure", ParamKind::Bool),
        ];
        let params = run(json!({}), &specs).unwrap();
        assert_eq!(params.int("limit"), Some(10));
        assert_eq!(params.get("note"), Some(&ParamValue::Null));
        assert!(!params.flag("sure"));
    }

    #[test]
    fn test_unknown_keys_pass_through() {
        let params = run(json!({ "extra": [1, 2] }), &[]).unwrap();
        assert_eq!(params.get("extra"), Some(&ParamValue::Json(json!([1, 2]))));
    }

    #[test]
    fn test_action_injects_pagination() {
        let params = run(json!({ "action": "list" }), &[]).unwrap();
        assert_eq!(params.int("paginated_by"), Some(DEFAULT_PAGE_SIZE));
        assert_eq!(params.int("page"), Some(1));

        let params = run(json!({ "action": "list", "page": 4 }), &[]).unwrap();
        assert_eq!(params.get("page"), Some(&ParamValue::Json(json!(4))));
    }

    #[test]
    fn test_first_invalid_value_fails() {
        let specs = vec![ParamSpec::required("age", ParamKind::Int)];
        assert!(matches!(
            run(json!({ "age": "old" }), &specs),
            Err(ParamError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_files_resolved_after_values() {
        let specs = vec![ParamSpec::required("avatar", ParamKind::File).with_filetypes(["image/png"])];
        let mut files = HashMap::new();
        files.insert("avatar".to_string(), UploadedFile::new("me.png", vec![0u8; 4]));
        files.insert("ignored".to_string(), UploadedFile::new("x.bin", vec![]));

        let params = parse_params(
            json!({}).as_object().unwrap(),
            &files,
            &specs,
            &ParseContext::default(),
        )
        .unwrap();
        assert_eq!(params.file("avatar").map(|f| f.name.as_str()), Some("me.png"));
        assert!(!params.contains("ignored"));
    }
}
