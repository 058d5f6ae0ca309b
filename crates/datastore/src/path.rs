use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use serde_json::Value;

/// Characters escaped when a key-leaf value is rendered into a RESTCONF URL
/// segment. Commas separate the values of a composite key, so a comma inside
/// a single value must always be encoded.
const KEY_VALUE_ESCAPES: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'&')
    .add(b'+')
    .add(b',')
    .add(b'/')
    .add(b'=')
    .add(b'?');

/// Percent-encode a key-leaf value for use in a RESTCONF URL.
pub fn encode_key_value(value: &str) -> String {
    utf8_percent_encode(value, KEY_VALUE_ESCAPES).to_string()
}

/// KeyValue is the literal a key leaf is compared against.
///
/// Generated documents may store a numeric leaf as either a JSON number or a
/// string, so an integer literal matches both forms. Booleans compare as
/// literals, again in either storage form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyValue {
    String(String),
    Integer(i64),
    Boolean(bool),
}

impl KeyValue {
    /// Classify a decoded URL literal.
    pub fn from_literal(literal: &str) -> KeyValue {
        if let Ok(n) = literal.parse::<i64>() {
            KeyValue::Integer(n)
        } else if literal == "true" {
            KeyValue::Boolean(true)
        } else if literal == "false" {
            KeyValue::Boolean(false)
        } else {
            KeyValue::String(literal.to_string())
        }
    }

    /// Classify the value of a key leaf taken from a document node.
    /// Returns None for nulls, arrays, and objects, which cannot key a list.
    pub fn from_node(node: &Value) -> Option<KeyValue> {
        match node {
            Value::String(s) => Some(KeyValue::from_literal(s)),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Some(KeyValue::Integer(i)),
                None => Some(KeyValue::String(n.to_string())),
            },
            Value::Bool(b) => Some(KeyValue::Boolean(*b)),
            _ => None,
        }
    }

    pub fn matches(&self, node: &Value) -> bool {
        match self {
            KeyValue::String(want) => matches!(node, Value::String(have) if have == want),
            KeyValue::Integer(want) => match node {
                Value::Number(have) => have.as_i64() == Some(*want),
                Value::String(have) => have == &want.to_string(),
                _ => false,
            },
            KeyValue::Boolean(want) => match node {
                Value::Bool(have) => have == want,
                Value::String(have) => have == if *want { "true" } else { "false" },
                _ => false,
            },
        }
    }

    /// The plain (un-encoded) URL rendering of this literal.
    pub fn to_url_literal(&self) -> String {
        match self {
            KeyValue::String(s) => s.clone(),
            KeyValue::Integer(n) => n.to_string(),
            KeyValue::Boolean(b) => b.to_string(),
        }
    }
}

/// One `key == value` comparison of a list-element predicate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyMatch {
    pub leaf: String,
    pub value: KeyValue,
}

impl KeyMatch {
    pub fn new(leaf: impl Into<String>, value: KeyValue) -> KeyMatch {
        KeyMatch {
            leaf: leaf.into(),
            value,
        }
    }

    pub fn matches(&self, element: &Value) -> bool {
        element
            .get(&self.leaf)
            .map(|leaf| self.value.matches(leaf))
            .unwrap_or(false)
    }
}

impl std::fmt::Display for KeyMatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.value {
            KeyValue::String(s) => write!(f, "@[{:?}]=={:?}", self.leaf, s),
            KeyValue::Integer(n) => {
                write!(f, "(@[{:?}]==\"{}\"||@[{:?}]=={})", self.leaf, n, self.leaf, n)
            }
            KeyValue::Boolean(b) => write!(f, "@[{:?}]=={}", self.leaf, b),
        }
    }
}

/// Step is one movement of a path expression over the document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Descend into an object by key.
    Child(String),
    /// Descend into an array, selecting the unique element whose key leaves
    /// match the predicate.
    Entry { list: String, keys: Vec<KeyMatch> },
}

impl Step {
    pub fn name(&self) -> &str {
        match self {
            Step::Child(name) => name,
            Step::Entry { list, .. } => list,
        }
    }

    /// The `&&`-joined predicate of an Entry step, or None for a Child.
    pub fn predicate(&self) -> Option<String> {
        match self {
            Step::Child(_) => None,
            Step::Entry { keys, .. } => Some(
                keys.iter()
                    .map(|k| k.to_string())
                    .collect::<Vec<_>>()
                    .join("&&"),
            ),
        }
    }
}

/// Path is a parsed path expression: a sequence of steps from the document
/// root.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Path {
    steps: Vec<Step>,
}

impl Path {
    /// The root anchor: a path with no steps.
    pub fn root() -> Path {
        Path { steps: Vec::new() }
    }

    pub fn child(mut self, name: impl Into<String>) -> Path {
        self.steps.push(Step::Child(name.into()));
        self
    }

    pub fn entry(mut self, list: impl Into<String>, keys: Vec<KeyMatch>) -> Path {
        self.steps.push(Step::Entry {
            list: list.into(),
            keys,
        });
        self
    }

    pub fn push(&mut self, step: Step) {
        self.steps.push(step);
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn is_root(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn last(&self) -> Option<&Step> {
        self.steps.last()
    }

    /// The path of this path's parent (all steps but the last).
    pub fn parent(&self) -> Path {
        let mut steps = self.steps.clone();
        steps.pop();
        Path { steps }
    }
}

impl std::fmt::Display for Path {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "$")?;
        for step in &self.steps {
            match step {
                Step::Child(name) => write!(f, "[{:?}]", name)?,
                Step::Entry { list, keys } => {
                    let predicate = keys
                        .iter()
                        .map(|key| key.to_string())
                        .collect::<Vec<_>>()
                        .join("&&");
                    write!(f, "[{:?}][?({})]", list, predicate)?
                }
            }
        }
        Ok(())
    }
}
