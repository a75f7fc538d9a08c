//! Single-page question form

use axum::{extract::State, response::Html};

use crate::AppState;

/// Serve the question form
pub async fn form(State(state): State<AppState>) -> Html<String> {
    Html(render(&state.config.server.title))
}

fn render(title: &str) -> String {
    let title = escape_html(title);
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>{title}</title>
<style>
  body {{ font-family: sans-serif; max-width: 48rem; margin: 2rem auto; padding: 0 1rem; }}
  textarea, #answer {{ width: 100%; box-sizing: border-box; }}
  #answer {{ white-space: pre-wrap; border: 1px solid #ccc; min-height: 6rem; padding: 0.5rem; }}
</style>
</head>
<body>
<h1>{title}</h1>
<form id="ask">
  <label for="question">Question</label>
  <textarea id="question" name="question" rows="3" placeholder="Enter your question here..."></textarea>
  <button type="submit">Submit</button>
</form>
<h2>Answer</h2>
<div id="answer"></div>
<script>
  const form = document.getElementById("ask");
  const output = document.getElementById("answer");
  form.addEventListener("submit", async (event) => {{
    event.preventDefault();
    output.textContent = "Thinking...";
    const question = document.getElementById("question").value;
    try {{
      const response = await fetch("/answer", {{
        method: "POST",
        headers: {{ "Content-Type": "application/json" }},
        body: JSON.stringify({{ question }}),
      }});
      const body = await response.json();
      output.textContent = response.ok ? body.answer : body.error.message;
    }} catch (err) {{
      output.textContent = "The answer service could not be reached. Please try again.";
    }}
  }});
</script>
</body>
</html>
"#
    )
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
