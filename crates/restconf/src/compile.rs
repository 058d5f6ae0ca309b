//! Compiles a RESTCONF URL path into a datastore path expression.

use datastore::path::{KeyMatch, KeyValue, Path};

#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    #[error("invalid percent-encoding in {0:?}")]
    Encoding(String),
    #[error("path consumes {consumed} key parameters but the operation declares {declared}")]
    ParameterCount { consumed: usize, declared: usize },
}

/// Compile `url_path` against the matched operation's ordered key-leaf
/// parameter names.
///
/// The URL is split into layers on `/` after stripping the
/// `/restconf/data` prefix. A layer of the form `list=v1,v2,…` consumes one
/// declared parameter name per value and becomes a keyed list-element step;
/// every other layer becomes a named-child step. A value that parses as an
/// integer matches either the numeric or the string storage form.
pub fn compile(url_path: &str, key_params: &[String]) -> Result<Path, CompileError> {
    let trimmed = url_path
        .strip_prefix("/restconf/data")
        .unwrap_or(url_path)
        .trim_matches('/');

    let mut path = Path::root();
    let mut consumed = 0usize;

    for layer in trimmed.split('/').filter(|layer| !layer.is_empty()) {
        match layer.split_once('=') {
            Some((list, values)) => {
                let mut keys = Vec::new();
                for value in values.split(',') {
                    let leaf = key_params.get(consumed).ok_or(CompileError::ParameterCount {
                        consumed: consumed + 1,
                        declared: key_params.len(),
                    })?;
                    consumed += 1;

                    let decoded = percent_decode(value)?;
                    keys.push(KeyMatch::new(leaf.clone(), KeyValue::from_literal(&decoded)));
                }
                path = path.entry(list, keys);
            }
            None => path = path.child(layer),
        }
    }

    if consumed != key_params.len() {
        return Err(CompileError::ParameterCount {
            consumed,
            declared: key_params.len(),
        });
    }
    Ok(path)
}

/// Decode a percent-encoded URL component, rejecting malformed escapes
/// (which the lenient decoder would otherwise pass through verbatim).
pub fn percent_decode(value: &str) -> Result<String, CompileError> {
    let bytes = value.as_bytes();
    let mut index = 0;
    while let Some(position) = bytes[index..].iter().position(|b| *b == b'%') {
        let escape = index + position;
        let valid = bytes.len() >= escape + 3
            && bytes[escape + 1].is_ascii_hexdigit()
            && bytes[escape + 2].is_ascii_hexdigit();
        if !valid {
            return Err(CompileError::Encoding(value.to_string()));
        }
        index = escape + 3;
    }

    percent_encoding::percent_decode_str(value)
        .decode_utf8()
        .map(|decoded| decoded.into_owned())
        .map_err(|_| CompileError::Encoding(value.to_string()))
}

#[cfg(test)]
mod test {
    use super::*;

    fn params(names: &[&str]) -> Vec<String> {
        names.iter().map(|name| name.to_string()).collect()
    }

    #[test]
    fn test_compile_named_children() {
        let path = compile("/restconf/data/ietf-network:networks", &[]).unwrap();
        assert_eq!(path.to_string(), r#"$["ietf-network:networks"]"#);
    }

    #[test]
    fn test_compile_root() {
        let path = compile("/restconf/data", &[]).unwrap();
        assert!(path.is_root());
    }

    #[test]
    fn test_compile_keyed_layers() {
        let path = compile(
            "/restconf/data/ietf-network:networks/network=n1/node=nA",
            &params(&["network-id", "node-id"]),
        )
        .unwrap();
        assert_eq!(
            path.to_string(),
            r#"$["ietf-network:networks"]["network"][?(@["network-id"]=="n1")]["node"][?(@["node-id"]=="nA")]"#,
        );
    }

    #[test]
    fn test_compile_composite_key_predicate() {
        // A numeric value compiles to the dual-form comparison, so it matches
        // data that stores the leaf either way.
        let path = compile(
            "/restconf/data/ex:things/thing=42,foo",
            &params(&["id", "name"]),
        )
        .unwrap();

        let last = path.last().unwrap();
        assert_eq!(
            last.predicate().unwrap(),
            r#"(@["id"]=="42"||@["id"]==42)&&@["name"]=="foo""#,
        );
    }

    #[test]
    fn test_compile_percent_decoding() {
        let path = compile(
            "/restconf/data/ex:things/thing=a%2Cb",
            &params(&["id"]),
        )
        .unwrap();
        assert_eq!(
            path.last().unwrap().predicate().unwrap(),
            r#"@["id"]=="a,b""#,
        );
    }

    #[test]
    fn test_compile_rejects_bad_escapes() {
        assert!(matches!(
            compile("/restconf/data/ex:things/thing=a%zz", &params(&["id"])),
            Err(CompileError::Encoding(_)),
        ));
        assert!(matches!(
            compile("/restconf/data/ex:things/thing=a%2", &params(&["id"])),
            Err(CompileError::Encoding(_)),
        ));
    }

    #[test]
    fn test_compile_rejects_parameter_mismatch() {
        // More values than declared parameters.
        assert!(matches!(
            compile("/restconf/data/ex:things/thing=1,2", &params(&["id"])),
            Err(CompileError::ParameterCount { .. }),
        ));
        // Fewer values than declared parameters.
        assert!(matches!(
            compile("/restconf/data/ex:things/thing=1", &params(&["id", "name"])),
            Err(CompileError::ParameterCount { .. }),
        ));
    }
}
