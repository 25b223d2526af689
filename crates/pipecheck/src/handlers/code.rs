use crate::handlers::{ExecutionContext, NodeExecutor};
use crate::{NodeError, NodeKind, NodeSpec, ResolvedInputs};
use async_trait::async_trait;
use boa_engine::{Context, Source};
use serde_json::Value;

/// Globals that survive sandbox setup. Everything else is deleted before the
/// node's code runs.
pub const ALLOWED_GLOBALS: &[&str] = &[
    "Array",
    "Boolean",
    "Date",
    "Error",
    "Infinity",
    "JSON",
    "Math",
    "NaN",
    "Number",
    "Object",
    "RangeError",
    "RegExp",
    "String",
    "TypeError",
    "globalThis",
    "isFinite",
    "isNaN",
    "parseFloat",
    "parseInt",
    "undefined",
];

const DEFAULT_LOOP_ITERATION_LIMIT: u64 = 1_000_000;
const DEFAULT_RECURSION_LIMIT: usize = 256;

/// Evaluates a JavaScript payload in a fresh, restricted boa context.
///
/// The payload must define `function main(inputs)`; its return value is the
/// node's single result. A missing `main`, a thrown error, an `undefined`
/// return and an exceeded runtime limit all surface as
/// [`NodeError::CodeEvaluation`].
#[derive(Clone, Debug)]
pub struct CodeExecutor {
    loop_iteration_limit: u64,
    recursion_limit: usize,
}

impl Default for CodeExecutor {
    fn default() -> Self {
        Self {
            loop_iteration_limit: DEFAULT_LOOP_ITERATION_LIMIT,
            recursion_limit: DEFAULT_RECURSION_LIMIT,
        }
    }
}

impl CodeExecutor {
    pub fn with_loop_iteration_limit(mut self, limit: u64) -> Self {
        self.loop_iteration_limit = limit;
        self
    }

    pub fn with_recursion_limit(mut self, limit: usize) -> Self {
        self.recursion_limit = limit;
        self
    }

    fn evaluate(&self, code: &str, inputs: &ResolvedInputs) -> Result<Value, NodeError> {
        let inputs_json = serde_json::to_string(inputs)
            .map_err(|err| NodeError::CodeEvaluation(format!("inputs not serializable: {err}")))?;

        let mut context = Context::default();
        context
            .runtime_limits_mut()
            .set_loop_iteration_limit(self.loop_iteration_limit);
        context
            .runtime_limits_mut()
            .set_recursion_limit(self.recursion_limit);

        context
            .eval(Source::from_bytes(&sandbox_prelude()))
            .map_err(|err| NodeError::CodeEvaluation(format!("sandbox setup failed: {err}")))?;

        let script = format!(
            r#"{code}
;(function () {{
    try {{
        if (typeof main !== "function") {{
            return JSON.stringify({{ error: "code must define function main(inputs)" }});
        }}
        var result = main({inputs_json});
        if (result === undefined) {{
            return JSON.stringify({{ error: "main(inputs) must return a value" }});
        }}
        return JSON.stringify({{ value: result }});
    }} catch (e) {{
        var text = (e && e.message !== undefined) ? e.name + ": " + e.message : "" + e;
        return JSON.stringify({{ error: text }});
    }}
}})();
"#
        );
        let result = context
            .eval(Source::from_bytes(&script))
            .map_err(|err| NodeError::CodeEvaluation(err.to_string()))?;
        let envelope = result
            .as_string()
            .map(|text| text.to_std_string_escaped())
            .ok_or_else(|| {
                NodeError::CodeEvaluation("sandbox returned a non-string envelope".to_string())
            })?;

        let mut envelope: Value = serde_json::from_str(&envelope)
            .map_err(|err| NodeError::CodeEvaluation(format!("result is not JSON: {err}")))?;
        if let Some(error) = envelope.get("error") {
            let message = error
                .as_str()
                .map(str::to_string)
                .unwrap_or_else(|| error.to_string());
            return Err(NodeError::CodeEvaluation(message));
        }
        envelope.get_mut("value").map(Value::take).ok_or_else(|| {
            NodeError::CodeEvaluation(
                "main(inputs) returned a value with no JSON form".to_string(),
            )
        })
    }
}

fn sandbox_prelude() -> String {
    let allowed = ALLOWED_GLOBALS
        .iter()
        .map(|name| format!("{name:?}: true"))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        r#"(function () {{
    var allowed = {{ {allowed} }};
    Object.getOwnPropertyNames(globalThis).forEach(function (key) {{
        if (!allowed[key]) {{
            try {{ delete globalThis[key]; }} catch (e) {{ globalThis[key] = undefined; }}
        }}
    }});
}})();"#
    )
}

#[async_trait]
impl NodeExecutor for CodeExecutor {
    async fn execute(
        &self,
        node: &NodeSpec,
        inputs: &ResolvedInputs,
        _context: &ExecutionContext,
    ) -> Result<Value, NodeError> {
        let NodeKind::Code { code } = &node.kind else {
            return Err(NodeError::CodeEvaluation(format!(
                "node '{}' is not a code node",
                node.id
            )));
        };

        let executor = self.clone();
        let code = code.clone();
        let inputs = inputs.clone();
        tokio::task::spawn_blocking(move || executor.evaluate(&code, &inputs))
            .await
            .map_err(|err| NodeError::CodeEvaluation(format!("evaluation task failed: {err}")))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ErrorPolicy, SessionId, Transition};
    use serde_json::json;
    use std::collections::BTreeMap;

    fn node(code: &str) -> NodeSpec {
        NodeSpec {
            id: "shape".to_string(),
            kind: NodeKind::Code {
                code: code.to_string(),
            },
            input: Vec::new(),
            output: vec!["result".to_string()],
            input_mapping: BTreeMap::new(),
            error_policy: ErrorPolicy::Abort,
            transition: Transition::End,
        }
    }

    fn context() -> ExecutionContext {
        ExecutionContext {
            session_id: SessionId::from("c0dec0de"),
            pipeline: "code".to_string(),
        }
    }

    async fn run(code: &str, inputs: Value) -> Result<Value, NodeError> {
        let Value::Object(inputs) = inputs else {
            panic!("inputs must be an object");
        };
        CodeExecutor::default()
            .execute(&node(code), &inputs, &context())
            .await
    }

    #[tokio::test(flavor = "current_thread")]
    async fn code_executor_main_return_expected_single_value() {
        let value = run(
            r#"function main(inputs) {
                return {
                    count: inputs.items.length,
                    upper: inputs.items.map(function (s) { return s.toUpperCase(); }),
                    found: inputs.error.indexOf("not found") >= 0,
                };
            }"#,
            json!({"items": ["a", "b"], "error": "item not found"}),
        )
        .await
        .expect("code should evaluate");

        assert_eq!(value, json!({"count": 2, "upper": ["A", "B"], "found": true}));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn code_executor_trailing_expression_expected_not_used_as_result() {
        let error = run("var x = 41; x + 1;", json!({}))
            .await
            .expect_err("code without main should fail");
        assert!(error.message().contains("function main"));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn code_executor_undefined_return_expected_error() {
        let error = run("function main(inputs) { var x = 1; }", json!({}))
            .await
            .expect_err("undefined return should fail");
        assert_eq!(error.kind(), "CodeEvaluationError");
        assert!(error.message().contains("must return a value"));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn code_executor_function_return_expected_error_not_null() {
        for code in [
            "function main(inputs) { return function () {}; }",
            "function main(inputs) { return Math.floor; }",
        ] {
            let error = run(code, json!({}))
                .await
                .expect_err("unserializable return should fail");
            assert_eq!(error.kind(), "CodeEvaluationError");
            assert!(error.message().contains("no JSON form"));
        }
    }

    #[tokio::test(flavor = "current_thread")]
    async fn code_executor_thrown_error_expected_code_evaluation_error() {
        let error = run(
            r#"function main(inputs) { throw new Error("bad shape"); }"#,
            json!({}),
        )
        .await
        .expect_err("throw should fail");
        assert!(error.message().contains("bad shape"));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn code_executor_non_allowlisted_global_expected_unavailable() {
        let value = run(
            r#"function main(inputs) {
                return {
                    eval: typeof eval,
                    json: typeof JSON,
                    math: typeof Math.floor,
                };
            }"#,
            json!({}),
        )
        .await
        .expect("code should evaluate");

        assert_eq!(value["eval"], json!("undefined"));
        assert_eq!(value["json"], json!("object"));
        assert_eq!(value["math"], json!("function"));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn code_executor_unbounded_loop_expected_error() {
        let executor = CodeExecutor::default().with_loop_iteration_limit(1_000);
        let Value::Object(inputs) = json!({}) else {
            unreachable!();
        };
        let error = executor
            .execute(
                &node("function main(inputs) { while (true) {} return 1; }"),
                &inputs,
                &context(),
            )
            .await
            .expect_err("runaway loop should be stopped");
        assert_eq!(error.kind(), "CodeEvaluationError");
    }
}
