use crate::server::WebState;
use axum::extract::State;
use axum::response::Html;
use std::sync::Arc;

const NAME: &str = "OpenCTI Exporter";
const DESCRIPTION: &str = "Prometheus Exporter for OpenCTI";

/// Landing page linking to the metrics path and listing the exported series.
pub async fn landing_page(State(state): State<Arc<WebState>>) -> Html<String> {
    let mut series = String::new();
    for desc in state.collector.describe() {
        let labels = if desc.variable_labels.is_empty() {
            String::new()
        } else {
            format!(" {{{}}}", desc.variable_labels.join(", "))
        };
        series.push_str(&format!(
            "      <li><code>{}</code>{} &mdash; {}</li>\n",
            escape(&desc.fq_name),
            escape(&labels),
            escape(&desc.help)
        ));
    }

    Html(format!(
        r#"<!DOCTYPE html>
<html>
  <head>
    <meta charset="UTF-8">
    <title>{NAME}</title>
  </head>
  <body>
    <h1>{NAME}</h1>
    <p>{DESCRIPTION}</p>
    <p>Version: {version}</p>
    <ul>
      <li><a href="{path}">Metrics</a></li>
    </ul>
    <h2>Exported series</h2>
    <ul>
{series}    </ul>
  </body>
</html>
"#,
        version = escape(state.metrics.version()),
        path = escape(&state.metrics_path),
    ))
}

fn escape(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
