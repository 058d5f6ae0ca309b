//! A minimal model over the loaded OpenAPI document: the route table the
//! pipeline resolves requests against, and the schema digging that recovers
//! list key leaves (`x-key`) and response envelopes.

pub mod loader;

use anyhow::Context;
use axum::http::Method;
use serde_json::Value;
use std::collections::BTreeMap;

/// Spec is a loaded OpenAPI document plus its derived route table.
pub struct Spec {
    root: Value,
    routes: Vec<Route>,
}

/// One `paths` entry: a parsed path template and its operations by method.
pub struct Route {
    pub template: String,
    segments: Vec<Segment>,
    literal_score: usize,
    operations: BTreeMap<String, Operation>,
}

/// One operation of a route.
pub struct Operation {
    path_params: Vec<Parameter>,
    value: Value,
}

/// A declared path parameter. `original_name` carries the pre-sanitization
/// leaf name when the document provides one via `x-original-name`.
#[derive(Debug, Clone)]
pub struct Parameter {
    pub name: String,
    pub original_name: Option<String>,
}

/// The outcome of route resolution: the matched route and operation, plus
/// the raw (still percent-encoded) path parameter values in template order.
pub struct RouteMatch<'s> {
    pub route: &'s Route,
    pub operation: &'s Operation,
    pub path_params: Vec<(String, String)>,
}

enum Segment {
    Literal(String),
    /// `list={p1},{p2}`: a keyed list step binding one parameter per value.
    Keyed { list: String, params: Vec<String> },
    /// `{p}`: a whole-segment parameter.
    Param(String),
}

const METHODS: [&str; 7] = ["get", "put", "post", "delete", "options", "head", "patch"];

impl Spec {
    pub fn from_value(root: Value) -> anyhow::Result<Spec> {
        let paths = root
            .get("paths")
            .and_then(Value::as_object)
            .context("specification has no paths object")?;

        let mut routes = Vec::new();
        for (template, item) in paths {
            let Some(item) = item.as_object() else {
                continue;
            };
            let shared_params = parameters_of(item.get("parameters"));

            let mut operations = BTreeMap::new();
            for method in METHODS {
                let Some(operation) = item.get(method) else {
                    continue;
                };
                let mut path_params = shared_params.clone();
                path_params.extend(parameters_of(operation.get("parameters")));
                operations.insert(
                    method.to_string(),
                    Operation {
                        path_params,
                        value: operation.clone(),
                    },
                );
            }
            routes.push(Route::new(template.clone(), operations));
        }

        Ok(Spec { root, routes })
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    /// Resolve `method` + concrete URL `path` to a route and operation.
    /// When several templates match, the one with the most literal segments
    /// wins. HEAD requests fall back to the GET operation.
    pub fn find_route(&self, method: &Method, path: &str) -> Option<RouteMatch<'_>> {
        let method_key = method.as_str().to_ascii_lowercase();

        let mut best: Option<RouteMatch<'_>> = None;
        for route in &self.routes {
            let Some(path_params) = route.match_path(path) else {
                continue;
            };
            let operation = match route.operation(&method_key) {
                Some(operation) => operation,
                None if method_key == "head" => match route.operation("get") {
                    Some(operation) => operation,
                    None => continue,
                },
                None => continue,
            };
            if best
                .as_ref()
                .map_or(true, |held| route.literal_score > held.route.literal_score)
            {
                best = Some(RouteMatch {
                    route,
                    operation,
                    path_params,
                });
            }
        }
        best
    }

    /// Follow `$ref` chains into the document. A dangling or cyclic
    /// reference yields the last reachable value unchanged.
    pub fn resolve<'a>(&'a self, mut value: &'a Value) -> &'a Value {
        for _ in 0..32 {
            let Some(reference) = value.get("$ref").and_then(Value::as_str) else {
                return value;
            };
            let Some(pointer) = reference.strip_prefix("#/") else {
                return value;
            };

            let mut target = &self.root;
            for segment in pointer.split('/') {
                let segment = segment.replace("~1", "/").replace("~0", "~");
                match target.get(&segment) {
                    Some(next) => target = next,
                    None => return value,
                }
            }
            value = target;
        }
        value
    }

    /// The GET-able top-level datastore resources: routes of the form
    /// `/restconf/data/<one-layer>` without keys. These seed the generated
    /// initial document.
    pub fn data_roots(&self) -> Vec<(&Route, &Operation)> {
        self.routes
            .iter()
            .filter_map(|route| {
                let suffix = route.template.strip_prefix("/restconf/data/")?;
                if suffix.is_empty() || suffix.contains('/') || suffix.contains('=') {
                    return None;
                }
                Some((route, route.operation("get")?))
            })
            .collect()
    }
}

impl Route {
    fn new(template: String, operations: BTreeMap<String, Operation>) -> Route {
        let segments: Vec<Segment> = template
            .trim_matches('/')
            .split('/')
            .filter(|segment| !segment.is_empty())
            .map(parse_segment)
            .collect();
        let literal_score = segments
            .iter()
            .filter(|segment| matches!(segment, Segment::Literal(_)))
            .count();

        Route {
            template,
            segments,
            literal_score,
            operations,
        }
    }

    pub fn operation(&self, method: &str) -> Option<&Operation> {
        self.operations.get(method)
    }

    /// Template parameter names in order of appearance.
    pub fn template_param_names(&self) -> Vec<&str> {
        let mut names = Vec::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(_) => {}
                Segment::Param(name) => names.push(name.as_str()),
                Segment::Keyed { params, .. } => {
                    names.extend(params.iter().map(String::as_str))
                }
            }
        }
        names
    }

    /// Match a concrete URL path, binding raw parameter values.
    fn match_path(&self, path: &str) -> Option<Vec<(String, String)>> {
        let concrete: Vec<&str> = path
            .trim_matches('/')
            .split('/')
            .filter(|segment| !segment.is_empty())
            .collect();
        if concrete.len() != self.segments.len() {
            return None;
        }

        let mut bound = Vec::new();
        for (segment, value) in self.segments.iter().zip(concrete) {
            match segment {
                Segment::Literal(literal) => {
                    if value != literal {
                        return None;
                    }
                }
                Segment::Param(name) => bound.push((name.clone(), value.to_string())),
                Segment::Keyed { list, params } => {
                    let (value_list, values) = value.split_once('=')?;
                    if value_list != list {
                        return None;
                    }
                    let values: Vec<&str> = values.split(',').collect();
                    if values.len() != params.len() {
                        return None;
                    }
                    for (name, value) in params.iter().zip(values) {
                        bound.push((name.clone(), value.to_string()));
                    }
                }
            }
        }
        Some(bound)
    }
}

impl Operation {
    /// The ordered key-leaf names the path compiler consumes: template
    /// parameters in order, each mapped through its declared
    /// `x-original-name` when present.
    pub fn key_leaf_params(&self, route: &Route) -> Vec<String> {
        route
            .template_param_names()
            .iter()
            .map(|name| {
                self.path_params
                    .iter()
                    .find(|parameter| parameter.name == *name)
                    .and_then(|parameter| parameter.original_name.clone())
                    .unwrap_or_else(|| name.to_string())
            })
            .collect()
    }

    pub fn request_body_schema<'a>(&'a self, spec: &'a Spec) -> Option<&'a Value> {
        let body = spec.resolve(self.value.get("requestBody")?);
        media_schema(spec, body.get("content")?)
    }

    pub fn response_schema<'a>(&'a self, spec: &'a Spec) -> Option<&'a Value> {
        let responses = self.value.get("responses")?.as_object()?;
        let response = responses.get("200").or_else(|| {
            responses
                .iter()
                .find(|(code, _)| code.starts_with('2'))
                .map(|(_, response)| response)
        })?;
        media_schema(spec, spec.resolve(response).get("content")?)
    }
}

fn media_schema<'a>(spec: &'a Spec, content: &'a Value) -> Option<&'a Value> {
    let content = content.as_object()?;
    let media = content
        .get("application/yang-data+json")
        .or_else(|| content.values().next())?;
    Some(spec.resolve(media.get("schema")?))
}

/// Look up the ordered key-leaf names (`x-key`) of the list property
/// `top_key` within a request-body schema, searching direct properties and
/// `oneOf` variants.
pub fn key_leaves_for(spec: &Spec, schema: &Value, top_key: &str) -> Option<Vec<String>> {
    let schema = spec.resolve(schema);

    let property = property_of(spec, schema, top_key).or_else(|| {
        schema
            .get("oneOf")?
            .as_array()?
            .iter()
            .find_map(|variant| property_of(spec, spec.resolve(variant), top_key))
    })?;

    let x_key = property
        .get("x-key")
        .and_then(Value::as_str)
        .or_else(|| {
            let items = spec.resolve(property.get("items")?);
            items.get("x-key").and_then(Value::as_str)
        })?;

    Some(
        x_key
            .split(',')
            .map(|leaf| leaf.trim().to_string())
            .collect(),
    )
}

fn property_of<'a>(spec: &'a Spec, schema: &'a Value, key: &str) -> Option<&'a Value> {
    Some(spec.resolve(schema.get("properties")?.get(key)?))
}

fn parameters_of(value: Option<&Value>) -> Vec<Parameter> {
    let Some(parameters) = value.and_then(Value::as_array) else {
        return Vec::new();
    };
    parameters
        .iter()
        .filter_map(|parameter| {
            if parameter.get("in").and_then(Value::as_str) != Some("path") {
                return None;
            }
            Some(Parameter {
                name: parameter.get("name").and_then(Value::as_str)?.to_string(),
                original_name: parameter
                    .get("x-original-name")
                    .and_then(Value::as_str)
                    .map(str::to_string),
            })
        })
        .collect()
}

fn parse_segment(segment: &str) -> Segment {
    if let Some((list, values)) = segment.split_once('=') {
        let params: Option<Vec<String>> = values
            .split(',')
            .map(|value| {
                value
                    .strip_prefix('{')
                    .and_then(|value| value.strip_suffix('}'))
                    .map(str::to_string)
            })
            .collect();
        return match params {
            Some(params) => Segment::Keyed {
                list: list.to_string(),
                params,
            },
            None => Segment::Literal(segment.to_string()),
        };
    }
    if let Some(name) = segment
        .strip_prefix('{')
        .and_then(|segment| segment.strip_suffix('}'))
    {
        return Segment::Param(name.to_string());
    }
    Segment::Literal(segment.to_string())
}
