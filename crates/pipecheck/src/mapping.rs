use crate::{InputSource, MappingError, NodeError, NodeSpec, State};
use regex::{Captures, Regex};
use serde_json::{Map, Value};
use std::sync::OnceLock;

pub type ResolvedInputs = Map<String, Value>;

fn template_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)\}")
            .unwrap_or_else(|err| panic!("template pattern is valid: {err}"))
    })
}

/// Resolves the node's declared inputs. Variable and fixed sources resolve
/// first; template sources then render against every other input and state,
/// so declaration order does not matter.
pub fn resolve_inputs(node: &NodeSpec, state: &State) -> Result<ResolvedInputs, MappingError> {
    let mut inputs = ResolvedInputs::new();
    let mut templates = Vec::new();
    for name in &node.input {
        let value = match node.source_for(name) {
            InputSource::Variable(variable) => state.get(&variable).cloned().ok_or_else(|| {
                MappingError::UnknownStateVariable {
                    node_id: node.id.clone(),
                    name: variable.clone(),
                }
            })?,
            InputSource::Fixed(literal) => literal,
            InputSource::Template(template) => {
                templates.push((name, template));
                continue;
            }
        };
        inputs.insert(name.clone(), value);
    }
    for (name, template) in templates {
        let rendered = render_template(&node.id, &template, &inputs, state)?;
        inputs.insert(name.clone(), Value::String(rendered));
    }
    Ok(inputs)
}

fn render_template(
    node_id: &str,
    template: &str,
    inputs: &ResolvedInputs,
    state: &State,
) -> Result<String, MappingError> {
    let mut unresolved: Option<String> = None;
    let rendered = template_pattern().replace_all(template, |caps: &Captures<'_>| {
        let name = &caps[1];
        match inputs.get(name).or_else(|| state.get(name)) {
            Some(value) => value_to_text(value),
            None => {
                unresolved.get_or_insert_with(|| name.to_string());
                String::new()
            }
        }
    });
    match unresolved {
        Some(name) => Err(MappingError::UnresolvedTemplateVariable {
            node_id: node_id.to_string(),
            name,
        }),
        None => Ok(rendered.into_owned()),
    }
}

/// Substitutes `{name}` for every resolved input. Braces naming anything
/// else are kept as written, so prompts may contain literal JSON.
pub fn render_prompt(template: &str, inputs: &ResolvedInputs) -> String {
    template_pattern()
        .replace_all(template, |caps: &Captures<'_>| match inputs.get(&caps[1]) {
            Some(value) => value_to_text(value),
            None => caps[0].to_string(),
        })
        .into_owned()
}

/// Strings render raw; everything else renders as compact JSON.
pub fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Writes a successful node result into state.
///
/// A single declared output takes the matching key of a map result, or the
/// whole result otherwise. Several outputs destructure a map result by key;
/// keys the result lacks are cleared so no stale value survives.
pub fn bind_outputs(node: &NodeSpec, result: Value, state: &mut State) {
    match node.output.as_slice() {
        [] => {}
        [single] => {
            let value = match result {
                Value::Object(mut fields) if fields.contains_key(single) => {
                    fields.remove(single).unwrap_or(Value::Null)
                }
                other => other,
            };
            state.set(single.clone(), value);
        }
        [first, rest @ ..] => match result {
            Value::Object(mut fields) => {
                for name in &node.output {
                    match fields.remove(name) {
                        Some(value) => state.set(name.clone(), value),
                        None => {
                            state.clear(name);
                        }
                    }
                }
            }
            scalar => {
                tracing::debug!(
                    node = %node.id,
                    "non-map result bound to first of several declared outputs"
                );
                state.set(first.clone(), scalar);
                for name in rest {
                    state.clear(name);
                }
            }
        },
    }
}

/// Binds a failed node's error text to every declared output.
pub fn bind_captured_error(node: &NodeSpec, error: &NodeError, state: &mut State) {
    let captured = Value::String(error.to_string());
    for name in &node.output {
        state.set(name.clone(), captured.clone());
    }
}
