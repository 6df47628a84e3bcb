//! Template engine for dynamic fixed responses.
//!
//! Uses Handlebars with the request as context:
//!
//! | Variable | Value |
//! |---|---|
//! | `path.<name>` | route template parameter |
//! | `query.<name>` | first value of a query parameter |
//! | `headers.<name>` | first value of a header (lowercase name) |
//! | `method`, `request_path` | request line |
//! | `body` | raw body, if UTF-8 |
//! | `json` | decoded JSON body, e.g. `{{json.model}}` |

use crate::matcher::MatchContext;
use crate::request::RequestDescriptor;
use handlebars::Handlebars;
use std::fmt::Write as _;
use serde::Serialize;
use std::collections::HashMap;

/// Template engine for rendering dynamic responses.
pub struct TemplateEngine {
    handlebars: Handlebars<'static>,
}

#[derive(Debug, Serialize)]
struct TemplateContext<'a> {
    path: &'a HashMap<String, String>,
    query: HashMap<&'a str, &'a str>,
    headers: HashMap<&'a str, &'a str>,
    method: &'a str,
    request_path: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    body: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    json: Option<&'a serde_json::Value>,
}

impl<'a> TemplateContext<'a> {
    fn new(req: &'a RequestDescriptor, ctx: &'a MatchContext) -> Self {
        let mut query = HashMap::new();
        for (k, v) in req.query_pairs() {
            query.entry(k.as_str()).or_insert(v.as_str());
        }

        let mut headers = HashMap::new();
        for (name, value) in req.headers() {
            if let Ok(value) = value.to_str() {
                headers.entry(name.as_str()).or_insert(value);
            }
        }

        Self {
            path: &ctx.path_params,
            query,
            headers,
            method: req.method().as_str(),
            request_path: req.path(),
            body: req.body_str(),
            json: req.json(),
        }
    }
}

impl TemplateEngine {
    /// Create a new template engine.
    pub fn new() -> Self {
        let mut handlebars = Handlebars::new();

        handlebars.register_helper("uuid", Box::new(uuid_helper));
        handlebars.register_helper("now", Box::new(now_helper));
        handlebars.register_helper("random", Box::new(random_helper));
        handlebars.register_helper("default", Box::new(default_helper));

        // Bodies are JSON or plain text, never HTML
        handlebars.register_escape_fn(handlebars::no_escape);

        Self { handlebars }
    }

    /// Render a template string against a request.
    pub fn render(
        &self,
        template: &str,
        req: &RequestDescriptor,
        ctx: &MatchContext,
    ) -> Result<String, handlebars::RenderError> {
        self.handlebars
            .render_template(template, &TemplateContext::new(req, ctx))
    }
}

impl Default for TemplateEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// `{{uuid}}`: random version 4 UUID.
fn uuid_helper(
    _: &handlebars::Helper,
    _: &Handlebars,
    _: &handlebars::Context,
    _: &mut handlebars::RenderContext,
    out: &mut dyn handlebars::Output,
) -> handlebars::HelperResult {
    out.write(&random_uuid())?;
    Ok(())
}

fn random_uuid() -> String {
    use rand::RngCore;
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes[6] = (bytes[6] & 0x0f) | 0x40;
    bytes[8] = (bytes[8] & 0x3f) | 0x80;

    let hex: String = bytes.iter().map(|b| format!("{b:02x}")).collect();
    format!(
        "{}-{}-{}-{}-{}",
        &hex[0..8],
        &hex[8..12],
        &hex[12..16],
        &hex[16..20],
        &hex[20..32]
    )
}

/// `{{now}}`, `{{now "%H:%M"}}`, `{{now "epoch"}}` or `{{now "epoch_ms"}}`.
/// Current UTC time, RFC 3339 with milliseconds unless a format is given.
fn now_helper(
    h: &handlebars::Helper,
    _: &Handlebars,
    _: &handlebars::Context,
    _: &mut handlebars::RenderContext,
    out: &mut dyn handlebars::Output,
) -> handlebars::HelperResult {
    let now = chrono::Utc::now();
    let rendered = match h.param(0).and_then(|v| v.value().as_str()) {
        // OpenAI-style `created` fields are unix seconds
        Some("epoch") => now.timestamp().to_string(),
        Some("epoch_ms") => now.timestamp_millis().to_string(),
        Some(format) => {
            let mut s = String::new();
            write!(s, "{}", now.format(format)).map_err(|_| {
                handlebars::RenderErrorReason::Other(format!("invalid time format {format:?}"))
            })?;
            s
        }
        None => now.to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
    };
    out.write(&rendered)?;
    Ok(())
}

/// `{{random min max}}`: integer in the inclusive range, 0..=100 by default.
fn random_helper(
    h: &handlebars::Helper,
    _: &Handlebars,
    _: &handlebars::Context,
    _: &mut handlebars::RenderContext,
    out: &mut dyn handlebars::Output,
) -> handlebars::HelperResult {
    use rand::Rng;
    let min = h.param(0).and_then(|v| v.value().as_i64()).unwrap_or(0);
    let max = h
        .param(1)
        .and_then(|v| v.value().as_i64())
        .unwrap_or(100)
        .max(min);
    out.write(&rand::thread_rng().gen_range(min..=max).to_string())?;
    Ok(())
}

/// `{{default value "fallback"}}`: `value` unless it is missing or empty.
fn default_helper(
    h: &handlebars::Helper,
    _: &Handlebars,
    _: &handlebars::Context,
    _: &mut handlebars::RenderContext,
    out: &mut dyn handlebars::Output,
) -> handlebars::HelperResult {
    let fallback = h.param(1).and_then(|v| v.value().as_str()).unwrap_or("");
    let rendered = match h.param(0).map(|v| v.value()) {
        Some(serde_json::Value::Null) | None => fallback.to_string(),
        Some(serde_json::Value::String(s)) if s.is_empty() => fallback.to_string(),
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    };
    out.write(&rendered)?;
    Ok(())
}
