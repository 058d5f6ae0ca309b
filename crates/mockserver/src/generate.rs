//! Generates JSON documents from response schemas: the initial datastore at
//! bootstrap, and the response envelopes GET results are overlaid into.

use crate::schema::{Operation, Spec};
use anyhow::Context;
use rand::Rng;
use serde_json::Value;

const MAX_DEPTH: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum UseExamples {
    /// Always generate values, ignoring schema examples.
    No,
    /// Use a schema's example when present, generate otherwise.
    IfPresent,
    /// Use only schema examples; locations without one become null.
    Exclusively,
}

impl std::fmt::Display for UseExamples {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            UseExamples::No => "no",
            UseExamples::IfPresent => "if-present",
            UseExamples::Exclusively => "exclusively",
        })
    }
}

#[derive(Debug, Clone)]
pub struct Options {
    pub use_examples: UseExamples,
    pub null_probability: f64,
    pub default_min_int: i64,
    pub default_max_int: i64,
    pub default_min_float: f64,
    pub default_max_float: f64,
    pub suppress_errors: bool,
}

impl Default for Options {
    fn default() -> Options {
        Options {
            use_examples: UseExamples::No,
            null_probability: 0.0,
            default_min_int: 0,
            default_max_int: i32::MAX as i64,
            default_min_float: -(i32::MAX as f64) / 2.0,
            default_max_float: (i32::MAX as f64) / 2.0,
            suppress_errors: false,
        }
    }
}

pub struct DataGenerator {
    options: Options,
}

impl DataGenerator {
    pub fn new(options: Options) -> DataGenerator {
        DataGenerator { options }
    }

    /// Generate a value for `schema`.
    pub fn generate(&self, spec: &Spec, schema: &Value) -> anyhow::Result<Value> {
        self.generate_at(spec, schema, 0)
    }

    /// Generate the response envelope of `operation` and name its top-level
    /// key. The envelope of a RESTCONF operation is an object with a single
    /// namespaced property.
    pub fn envelope(&self, spec: &Spec, operation: &Operation) -> anyhow::Result<(String, Value)> {
        let schema = operation
            .response_schema(spec)
            .context("operation declares no response schema")?;
        let schema = spec.resolve(schema);

        let top_key = schema
            .get("properties")
            .and_then(Value::as_object)
            .and_then(|properties| properties.keys().next())
            .context("response schema declares no properties")?
            .clone();

        let envelope = self.generate_at(spec, schema, 0)?;
        Ok((top_key, envelope))
    }

    /// Generate the initial datastore document: every top-level data
    /// resource's envelope, merged into one object.
    pub fn initial_document(&self, spec: &Spec) -> anyhow::Result<Value> {
        let mut document = serde_json::Map::new();
        for (route, operation) in spec.data_roots() {
            let (top_key, envelope) = self
                .envelope(spec, operation)
                .with_context(|| format!("generating {}", route.template))?;
            if let Some(value) = envelope.get(&top_key) {
                document.insert(top_key.clone(), value.clone());
            }
        }
        Ok(Value::Object(document))
    }

    fn generate_at(&self, spec: &Spec, schema: &Value, depth: usize) -> anyhow::Result<Value> {
        if depth > MAX_DEPTH {
            if self.options.suppress_errors {
                return Ok(Value::Null);
            }
            anyhow::bail!("schema nesting exceeds {MAX_DEPTH} levels (cyclic $ref?)");
        }
        let schema = spec.resolve(schema);

        match self.options.use_examples {
            UseExamples::No => {}
            UseExamples::IfPresent => {
                if let Some(example) = schema.get("example") {
                    return Ok(example.clone());
                }
            }
            UseExamples::Exclusively => {
                return Ok(schema.get("example").cloned().unwrap_or(Value::Null));
            }
        }

        if let Some(first) = schema.get("enum").and_then(Value::as_array).and_then(|e| e.first()) {
            return Ok(first.clone());
        }
        if schema.get("nullable").and_then(Value::as_bool) == Some(true)
            && self.options.null_probability > 0.0
            && rand::thread_rng().gen_bool(self.options.null_probability.min(1.0))
        {
            return Ok(Value::Null);
        }

        let declared = schema.get("type").and_then(Value::as_str);
        let kind = declared.unwrap_or(if schema.get("properties").is_some() {
            "object"
        } else if schema.get("items").is_some() {
            "array"
        } else {
            "null"
        });

        match kind {
            "object" => {
                let mut object = serde_json::Map::new();
                if let Some(properties) = schema.get("properties").and_then(Value::as_object) {
                    for (name, property) in properties {
                        object.insert(name.clone(), self.generate_at(spec, property, depth + 1)?);
                    }
                }
                Ok(Value::Object(object))
            }
            "array" => {
                let Some(items) = schema.get("items") else {
                    return Ok(Value::Array(Vec::new()));
                };
                let count = schema
                    .get("minItems")
                    .and_then(Value::as_u64)
                    .unwrap_or(1)
                    .max(1) as usize;
                let mut array = Vec::with_capacity(count);
                for _ in 0..count {
                    array.push(self.generate_at(spec, items, depth + 1)?);
                }
                Ok(Value::Array(array))
            }
            "string" => Ok(Value::String(self.generate_string(schema))),
            "integer" => {
                let minimum = schema
                    .get("minimum")
                    .and_then(Value::as_i64)
                    .unwrap_or(self.options.default_min_int);
                let maximum = schema
                    .get("maximum")
                    .and_then(Value::as_i64)
                    .unwrap_or(self.options.default_max_int)
                    .max(minimum);
                Ok(Value::from(rand::thread_rng().gen_range(minimum..=maximum)))
            }
            "number" => {
                let minimum = schema
                    .get("minimum")
                    .and_then(Value::as_f64)
                    .unwrap_or(self.options.default_min_float);
                let maximum = schema
                    .get("maximum")
                    .and_then(Value::as_f64)
                    .unwrap_or(self.options.default_max_float)
                    .max(minimum);
                Ok(Value::from(rand::thread_rng().gen_range(minimum..=maximum)))
            }
            "boolean" => Ok(Value::Bool(rand::thread_rng().gen_bool(0.5))),
            "null" => Ok(Value::Null),
            other => {
                if self.options.suppress_errors {
                    Ok(Value::Null)
                } else {
                    anyhow::bail!("unsupported schema type {other:?}")
                }
            }
        }
    }

    fn generate_string(&self, schema: &Value) -> String {
        match schema.get("format").and_then(Value::as_str) {
            Some("uuid") => return uuid::Uuid::new_v4().to_string(),
            Some("date-time") => {
                return chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
            }
            Some("uri") => return "https://example.net/resource".to_string(),
            _ => {}
        }

        let min_length = schema.get("minLength").and_then(Value::as_u64).unwrap_or(1) as usize;
        let max_length = schema
            .get("maxLength")
            .and_then(Value::as_u64)
            .unwrap_or((min_length + 11) as u64)
            .max(min_length as u64) as usize;

        let mut rng = rand::thread_rng();
        let length = rng.gen_range(min_length.max(1)..=max_length.max(1));
        (0..length)
            .map(|_| rng.gen_range(b'a'..=b'z') as char)
            .collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    fn spec() -> Spec {
        Spec::from_value(json!({
            "openapi": "3.0.0",
            "paths": {
                "/restconf/data/ietf-network:networks": {
                    "get": {
                        "responses": {"200": {"content": {"application/yang-data+json": {
                            "schema": {"$ref": "#/components/schemas/Networks"},
                        }}}},
                    },
                },
            },
            "components": {"schemas": {
                "Networks": {
                    "type": "object",
                    "properties": {
                        "ietf-network:networks": {
                            "type": "object",
                            "properties": {
                                "network": {
                                    "type": "array",
                                    "minItems": 1,
                                    "items": {
                                        "type": "object",
                                        "properties": {
                                            "network-id": {"type": "string", "example": "n1"},
                                            "weight": {"type": "integer", "minimum": 3, "maximum": 3},
                                        },
                                    },
                                },
                            },
                        },
                    },
                },
            }},
        }))
        .unwrap()
    }

    #[test]
    fn test_envelope_names_top_key() {
        let spec = spec();
        let operation = spec.routes()[0].operation("get").unwrap();
        let generator = DataGenerator::new(Options::default());

        let (top_key, envelope) = generator.envelope(&spec, operation).unwrap();
        assert_eq!(top_key, "ietf-network:networks");
        assert!(envelope.get(&top_key).is_some());

        let network = &envelope[&top_key]["network"][0];
        assert!(network["network-id"].is_string());
        assert_eq!(network["weight"], 3);
    }

    #[test]
    fn test_examples_if_present() {
        let spec = spec();
        let operation = spec.routes()[0].operation("get").unwrap();
        let generator = DataGenerator::new(Options {
            use_examples: UseExamples::IfPresent,
            ..Options::default()
        });

        let (top_key, envelope) = generator.envelope(&spec, operation).unwrap();
        assert_eq!(envelope[&top_key]["network"][0]["network-id"], "n1");
    }

    #[test]
    fn test_initial_document_merges_roots() {
        let spec = spec();
        let generator = DataGenerator::new(Options::default());
        let document = generator.initial_document(&spec).unwrap();
        assert!(document.get("ietf-network:networks").is_some());
    }

    #[test]
    fn test_cyclic_ref_is_an_error() {
        let spec = Spec::from_value(json!({
            "paths": {},
            "components": {"schemas": {
                "Loop": {"type": "object", "properties": {
                    "next": {"$ref": "#/components/schemas/Loop"},
                }},
            }},
        }))
        .unwrap();
        let generator = DataGenerator::new(Options::default());
        let schema = json!({"$ref": "#/components/schemas/Loop"});
        assert!(generator.generate(&spec, &schema).is_err());
    }
}
