use crate::{
    ErrorPolicy, InputSource, NodeKind, NodeSpec, ParseError, PipelineDefinition, PipelineError,
    StateVariable, Transition, resolve_variables,
};
use pipecheck_llm::{OutputSchema, ValueType, json_type_name};
use serde_json::Value as JsonValue;
use serde_yaml::{Mapping, Value as YamlValue};
use std::collections::{BTreeMap, BTreeSet};

/// Parses a pipeline document without environment substitution.
pub fn parse_pipeline(document: &str) -> Result<PipelineDefinition, ParseError> {
    let root: YamlValue = serde_yaml::from_str(document)
        .map_err(|err| ParseError::new("document", format!("invalid YAML: {err}")))?;
    convert_document(&root)
}

/// Resolves `${NAME}` placeholders in every string scalar against `env`, then
/// parses. Code payloads are left untouched.
pub fn load_pipeline(
    document: &str,
    env: &BTreeMap<String, String>,
) -> Result<PipelineDefinition, PipelineError> {
    let mut root: YamlValue = serde_yaml::from_str(document)
        .map_err(|err| ParseError::new("document", format!("invalid YAML: {err}")))?;
    substitute_scalars(&mut root, env, false)?;
    Ok(convert_document(&root)?)
}

fn substitute_scalars(
    value: &mut YamlValue,
    env: &BTreeMap<String, String>,
    skip_code: bool,
) -> Result<(), PipelineError> {
    match value {
        YamlValue::String(text) => {
            *text = resolve_variables(text, env)?;
        }
        YamlValue::Sequence(items) => {
            for item in items {
                substitute_scalars(item, env, true)?;
            }
        }
        YamlValue::Mapping(map) => {
            for (key, item) in map.iter_mut() {
                if skip_code && key.as_str() == Some("code") {
                    continue;
                }
                substitute_scalars(item, env, false)?;
            }
        }
        YamlValue::Tagged(tagged) => substitute_scalars(&mut tagged.value, env, skip_code)?,
        YamlValue::Null | YamlValue::Bool(_) | YamlValue::Number(_) => {}
    }
    Ok(())
}

fn convert_document(root: &YamlValue) -> Result<PipelineDefinition, ParseError> {
    let root = as_mapping(root, "document")?;
    let name = required_str(root, "name", "name")?;
    let description = optional_str(root, "description", "description")?;
    let state = match root.get("state") {
        None | Some(YamlValue::Null) => Vec::new(),
        Some(value) => convert_state(as_mapping(value, "state")?)?,
    };
    let entry_point = required_str(root, "entry_point", "entry_point")?;

    let nodes = match root.get("nodes") {
        Some(YamlValue::Sequence(items)) => items,
        Some(_) => return Err(ParseError::new("nodes", "expected a list of nodes")),
        None => return Err(ParseError::new("nodes", "missing required field")),
    };
    if nodes.is_empty() {
        return Err(ParseError::new("nodes", "pipeline must declare at least one node"));
    }

    let mut seen = BTreeSet::new();
    let mut specs = Vec::with_capacity(nodes.len());
    for (index, raw) in nodes.iter().enumerate() {
        let path = format!("nodes[{index}]");
        let node = convert_node(raw, &path)?;
        if !seen.insert(node.id.clone()) {
            return Err(ParseError::new(
                format!("{path}.id"),
                format!("duplicate node id '{}'", node.id),
            ));
        }
        specs.push(node);
    }

    Ok(PipelineDefinition {
        name,
        description,
        state,
        entry_point,
        nodes: specs,
    })
}

fn convert_state(raw: &Mapping) -> Result<Vec<StateVariable>, ParseError> {
    let mut variables = Vec::with_capacity(raw.len());
    for (key, entry) in raw {
        let name = key
            .as_str()
            .ok_or_else(|| ParseError::new("state", "variable names must be strings"))?
            .to_string();
        let path = format!("state.{name}");

        // `name: string` is shorthand for `name: {type: string}`.
        let (tag, initial) = match entry {
            YamlValue::String(tag) => (tag.clone(), None),
            YamlValue::Mapping(fields) => (
                required_str(fields, "type", &format!("{path}.type"))?,
                fields.get("value").filter(|value| !value.is_null()),
            ),
            _ => {
                return Err(ParseError::new(
                    path,
                    "expected a type tag or a {type, value} mapping",
                ));
            }
        };

        let value_type = parse_type_tag(&tag, &format!("{path}.type"))?;
        let value = match initial {
            Some(raw_value) => {
                let value = to_json(raw_value, &format!("{path}.value"))?;
                if !value_type.matches(&value) {
                    return Err(ParseError::new(
                        format!("{path}.value"),
                        format!(
                            "declared type {} does not match initial value of type {}",
                            value_type.as_str(),
                            json_type_name(&value)
                        ),
                    ));
                }
                Some(value)
            }
            None => None,
        };

        variables.push(StateVariable {
            name,
            value_type,
            value,
        });
    }
    Ok(variables)
}

fn convert_node(raw: &YamlValue, path: &str) -> Result<NodeSpec, ParseError> {
    let fields = as_mapping(raw, path)?;
    let id = required_str(fields, "id", &format!("{path}.id"))?;
    if id.trim().is_empty() {
        return Err(ParseError::new(format!("{path}.id"), "node id must not be empty"));
    }
    let type_path = format!("{path}.type");
    let kind = match required_str(fields, "type", &type_path)?.trim() {
        "toolkit" => NodeKind::Tool {
            toolkit: required_str(fields, "toolkit", &format!("{path}.toolkit"))?,
            tool: required_str(fields, "tool", &format!("{path}.tool"))?,
        },
        "llm" => NodeKind::LanguageModel {
            model: required_str(fields, "model", &format!("{path}.model"))?,
            prompt: required_str(fields, "prompt", &format!("{path}.prompt"))?,
            system: optional_str(fields, "system", &format!("{path}.system"))?,
            structured_output: match fields.get("structured_output") {
                None | Some(YamlValue::Null) => None,
                Some(value) => Some(convert_output_schema(
                    value,
                    &format!("{path}.structured_output"),
                )?),
            },
        },
        "code" => NodeKind::Code {
            code: required_str(fields, "code", &format!("{path}.code"))?,
        },
        other => {
            return Err(ParseError::new(
                type_path,
                format!("unknown node type '{other}' (expected toolkit, llm or code)"),
            ));
        }
    };

    let mut input = string_list(fields, "input", &format!("{path}.input"))?;
    let output = string_list(fields, "output", &format!("{path}.output"))?;
    let input_mapping = match fields.get("input_mapping") {
        None | Some(YamlValue::Null) => BTreeMap::new(),
        Some(value) => convert_input_mapping(value, &format!("{path}.input_mapping"))?,
    };
    for name in input_mapping.keys() {
        if !input.contains(name) {
            input.push(name.clone());
        }
    }

    let error_policy = match optional_str(fields, "error_policy", &format!("{path}.error_policy"))? {
        None => ErrorPolicy::default(),
        Some(raw) => ErrorPolicy::parse(&raw).ok_or_else(|| {
            ParseError::new(
                format!("{path}.error_policy"),
                format!("unknown error policy '{raw}'"),
            )
        })?,
    };
    let transition = optional_str(fields, "transition", &format!("{path}.transition"))?
        .map(|raw| Transition::parse(&raw))
        .unwrap_or(Transition::End);

    Ok(NodeSpec {
        id,
        kind,
        input,
        output,
        input_mapping,
        error_policy,
        transition,
    })
}

fn convert_input_mapping(
    raw: &YamlValue,
    path: &str,
) -> Result<BTreeMap<String, InputSource>, ParseError> {
    let mut mapping = BTreeMap::new();
    for (key, entry) in as_mapping(raw, path)? {
        let name = key
            .as_str()
            .ok_or_else(|| ParseError::new(path, "input names must be strings"))?;
        let entry_path = format!("{path}.{name}");
        let fields = as_mapping(entry, &entry_path)?;
        let source_type = required_str(fields, "type", &format!("{entry_path}.type"))?;
        let value_path = format!("{entry_path}.value");
        let source = match source_type.trim() {
            "variable" => InputSource::Variable(required_str(fields, "value", &value_path)?),
            "fixed" => InputSource::Fixed(match fields.get("value") {
                Some(value) => to_json(value, &value_path)?,
                None => return Err(ParseError::new(value_path, "missing required field")),
            }),
            "template" | "fstring" => {
                InputSource::Template(required_str(fields, "value", &value_path)?)
            }
            other => {
                return Err(ParseError::new(
                    format!("{entry_path}.type"),
                    format!("unknown input source '{other}'"),
                ));
            }
        };
        mapping.insert(name.to_string(), source);
    }
    Ok(mapping)
}

/// Accepts either `{field: type}` or a list of `{name, type}` entries.
fn convert_output_schema(raw: &YamlValue, path: &str) -> Result<OutputSchema, ParseError> {
    let mut schema = OutputSchema::new();
    match raw {
        YamlValue::Mapping(fields) => {
            for (key, tag) in fields {
                let name = key
                    .as_str()
                    .ok_or_else(|| ParseError::new(path, "field names must be strings"))?;
                let field_path = format!("{path}.{name}");
                let tag = tag
                    .as_str()
                    .ok_or_else(|| ParseError::new(&field_path, "expected a type tag"))?;
                schema = schema.field(name, parse_type_tag(tag, &field_path)?);
            }
        }
        YamlValue::Sequence(entries) => {
            for (index, entry) in entries.iter().enumerate() {
                let entry_path = format!("{path}[{index}]");
                let fields = as_mapping(entry, &entry_path)?;
                let name = required_str(fields, "name", &format!("{entry_path}.name"))?;
                let tag_path = format!("{entry_path}.type");
                let tag = required_str(fields, "type", &tag_path)?;
                schema = schema.field(name, parse_type_tag(&tag, &tag_path)?);
            }
        }
        _ => {
            return Err(ParseError::new(
                path,
                "expected a field-to-type mapping or a list of fields",
            ));
        }
    }
    if schema.fields.is_empty() {
        return Err(ParseError::new(path, "structured output declares no fields"));
    }
    Ok(schema)
}

fn parse_type_tag(tag: &str, path: &str) -> Result<ValueType, ParseError> {
    ValueType::parse(tag).ok_or_else(|| {
        ParseError::new(
            path,
            format!(
                "unknown type '{tag}' (expected string, integer, float, boolean, list or map)"
            ),
        )
    })
}

fn as_mapping<'a>(value: &'a YamlValue, path: &str) -> Result<&'a Mapping, ParseError> {
    value
        .as_mapping()
        .ok_or_else(|| ParseError::new(path, "expected a mapping"))
}

fn required_str(map: &Mapping, key: &str, path: &str) -> Result<String, ParseError> {
    optional_str(map, key, path)?.ok_or_else(|| ParseError::new(path, "missing required field"))
}

fn optional_str(map: &Mapping, key: &str, path: &str) -> Result<Option<String>, ParseError> {
    match map.get(key) {
        None | Some(YamlValue::Null) => Ok(None),
        Some(YamlValue::String(text)) => Ok(Some(text.clone())),
        Some(YamlValue::Number(number)) => Ok(Some(number.to_string())),
        Some(YamlValue::Bool(flag)) => Ok(Some(flag.to_string())),
        Some(_) => Err(ParseError::new(path, "expected a string")),
    }
}

fn string_list(map: &Mapping, key: &str, path: &str) -> Result<Vec<String>, ParseError> {
    match map.get(key) {
        None | Some(YamlValue::Null) => Ok(Vec::new()),
        Some(YamlValue::String(single)) => Ok(vec![single.clone()]),
        Some(YamlValue::Sequence(items)) => items
            .iter()
            .enumerate()
            .map(|(index, item)| {
                item.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| ParseError::new(format!("{path}[{index}]"), "expected a string"))
            })
            .collect(),
        Some(_) => Err(ParseError::new(path, "expected a list of names")),
    }
}

fn to_json(value: &YamlValue, path: &str) -> Result<JsonValue, ParseError> {
    serde_json::to_value(value)
        .map_err(|err| ParseError::new(path, format!("unsupported value: {err}")))
}
