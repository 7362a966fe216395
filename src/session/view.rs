// src/session/view.rs — Browser page for a review session

use minijinja::Environment;
use std::sync::OnceLock;

use super::state::SessionView;

const PAGE_NAME: &str = "review.html";

const PAGE: &str = r#"<!doctype html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>prompt-doctor: {{ view.template_id }}</title>
<style>
  body { font-family: system-ui, sans-serif; margin: 2rem; max-width: 72rem; }
  textarea { width: 100%; min-height: 12rem; font-family: monospace; }
  pre { background: #f5f5f5; padding: .75rem; white-space: pre-wrap; }
  .error { color: #a00; }
  .meta { color: #666; font-size: .9rem; }
  button { margin-right: .5rem; }
</style>
</head>
<body>
<h1>{{ view.template_id }}</h1>
<p class="meta">
  {% if view.base_version %}Editing version {{ view.base_version }}{% else %}New template (not saved yet){% endif %}
</p>

<h2>Template</h2>
<textarea id="prompt_template">{{ view.template_text }}</textarea>
<p>
  <button id="call_llm">Call LLM</button>
  <button id="save_and_quit">Save and quit</button>
  <button id="discard_and_quit">Discard and quit</button>
</p>

<h2>Rendered</h2>
<pre id="rendered_prompt">{{ view.rendered_text }}</pre>

<h2>Response</h2>
<pre id="llm_response" class="{% if result_error %}error{% endif %}">{{ result_text }}</pre>

<h2>Context</h2>
<pre id="context">{{ context_json }}</pre>

<p id="status" class="meta">{% if view.ended %}Session ended.{% endif %}</p>

<script>
function resultText(r) {
  if (!r) return "";
  if (r.kind === "generated") return r.content;
  if (r.kind === "template_failed") return "Template error: " + r.message;
  return "Generation failed: " + r.cause;
}
function show(view) {
  document.getElementById("prompt_template").value = view.template_text;
  document.getElementById("rendered_prompt").textContent = view.rendered_text;
  const out = document.getElementById("llm_response");
  out.textContent = resultText(view.last_result);
  out.className = view.last_result && view.last_result.kind !== "generated" ? "error" : "";
  if (view.ended) {
    document.getElementById("status").textContent = "Session ended (" + view.end_reason + "). You can close this tab.";
    document.querySelectorAll("button").forEach(b => b.disabled = true);
  }
}
async function act(action) {
  const template = document.getElementById("prompt_template").value;
  const resp = await fetch("/api/action", {
    method: "POST",
    headers: {"Content-Type": "application/json"},
    body: JSON.stringify({action, template}),
  });
  const body = await resp.json();
  if (!resp.ok) { document.getElementById("status").textContent = body.error; return; }
  show(body);
}
document.getElementById("call_llm").onclick = () => act("regenerate");
document.getElementById("save_and_quit").onclick = () => act("saveAndEnd");
document.getElementById("discard_and_quit").onclick = () => act("discardAndEnd");
</script>
</body>
</html>
"#;

fn env() -> &'static Environment<'static> {
    static ENV: OnceLock<Environment<'static>> = OnceLock::new();
    ENV.get_or_init(|| {
        let mut env = Environment::new();
        // `.html` name turns on HTML auto-escaping for every interpolation.
        env.add_template(PAGE_NAME, PAGE)
            .expect("built-in review page must parse");
        env
    })
}

/// Render the session page for the current state.
pub fn render_page(view: &SessionView) -> Result<String, minijinja::Error> {
    let (result_text, result_error) = match &view.last_result {
        None => (String::new(), false),
        Some(r) => {
            let text = match r {
                super::state::LastResult::Generated(g) => g.content.clone(),
                super::state::LastResult::TemplateFailed(e) => e.to_string(),
                super::state::LastResult::GenerationFailed(e) => e.to_string(),
            };
            (text, r.is_error())
        }
    };
    let context_json = serde_json::to_string_pretty(&view.context).unwrap_or_default();

    env().get_template(PAGE_NAME)?.render(minijinja::context! {
        view => minijinja::Value::from_serialize(view),
        result_text => result_text,
        result_error => result_error,
        context_json => context_json,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::{GenerationMetadata, GenerationResult};
    use crate::render::Context;
    use crate::session::state::{LastResult, SessionState};

    fn view_with(template: &str, result: Option<LastResult>) -> SessionView {
        let mut s = SessionState::new("greet", Some(2), template.into());
        s.rendered_text = "Alice is 25.".into();
        s.last_result = result;
        s.view(&Context::new().with("name", "Alice"))
    }

    #[test]
    fn test_page_contains_state() {
        let html = render_page(&view_with(
            "{{name}} is {{age}}.",
            Some(LastResult::Generated(GenerationResult {
                content: "LLM Response #1".into(),
                metadata: GenerationMetadata::default(),
            })),
        ))
        .unwrap();
        assert!(html.contains("id=\"prompt_template\">{{name}} is {{age}}.</textarea>"));
        assert!(html.contains("Alice is 25."));
        assert!(html.contains("LLM Response #1"));
        assert!(html.contains("Editing version 2"));
    }

    #[test]
    fn test_page_escapes_html() {
        let html = render_page(&view_with("<script>alert(1)</script>", None)).unwrap();
        assert!(!html.contains("<script>alert(1)</script>"));
        assert!(html.contains("&lt;script&gt;"));
    }

    #[test]
    fn test_page_marks_errors() {
        let html = render_page(&view_with(
            "x",
            Some(LastResult::GenerationFailed(
                crate::infra::errors::GenerationError::new("backend down"),
            )),
        ))
        .unwrap();
        assert!(html.contains("Generation failed: backend down"));
        assert!(html.contains("class=\"error\""));
    }
}
