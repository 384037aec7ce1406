//! Jinja2-style template rendering using minijinja.
//!
//! Notification titles and messages reference case data
//! (`{{ case.reference }}`), and expression conditions are evaluated as
//! minijinja expressions (`case.fields.units > 4`).

use minijinja::{Environment, Error, ErrorKind, Value};

use crate::error::{EngineError, EngineResult};

/// Template renderer with casework filters.
pub struct TemplateRenderer {
    env: Environment<'static>,
}

impl Default for TemplateRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateRenderer {
    /// Create a new template renderer with custom filters.
    pub fn new() -> Self {
        let mut env = Environment::new();

        env.add_filter("currency", filter_currency);
        env.add_filter("date", filter_date);
        env.add_filter("humanize", filter_humanize);

        Self { env }
    }

    /// Render a template string against a JSON context.
    pub fn render(&self, template: &str, context: &serde_json::Value) -> EngineResult<String> {
        // Quick check for non-template strings
        if !contains_template_syntax(template) {
            return Ok(template.to_string());
        }

        let tmpl = self
            .env
            .template_from_str(template)
            .map_err(|e| EngineError::Template(format!("Template parse error: {}", e)))?;

        tmpl.render(context)
            .map_err(|e| EngineError::Template(format!("Template render error: {}", e)))
    }

    /// Evaluate a boolean condition.
    ///
    /// Bare expressions (`case.case_type == "demolition"`) are compiled as
    /// minijinja expressions. Strings already wrapped in `{{ }}` are
    /// rendered and compared against `true`/`1`/`yes`.
    pub fn evaluate_condition(
        &self,
        condition: &str,
        context: &serde_json::Value,
    ) -> EngineResult<bool> {
        if contains_template_syntax(condition) {
            let rendered = self.render(condition, context)?;
            let trimmed = rendered.trim().to_lowercase();
            return Ok(matches!(trimmed.as_str(), "true" | "1" | "yes"));
        }

        let expr = self
            .env
            .compile_expression(condition)
            .map_err(|e| EngineError::Template(format!("Expression parse error: {}", e)))?;
        let value = expr
            .eval(context)
            .map_err(|e| EngineError::Template(format!("Expression eval error: {}", e)))?;
        Ok(value.is_true())
    }
}

/// Check if a string contains Jinja2 template syntax.
fn contains_template_syntax(s: &str) -> bool {
    (s.contains("{{") && s.contains("}}")) || (s.contains("{%") && s.contains("%}"))
}

/// `1234.5 | currency` → `$1,234.50`
fn filter_currency(value: &Value) -> Result<String, Error> {
    let amount = f64::try_from(value.clone()).map_err(|_| {
        Error::new(
            ErrorKind::InvalidOperation,
            format!("currency expects a number, got {}", value),
        )
    })?;
    let cents = (amount.abs() * 100.0).round() as u64;
    let whole = (cents / 100).to_string();
    let mut grouped = String::new();
    for (i, ch) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    let sign = if amount < 0.0 { "-" } else { "" };
    Ok(format!("{}${}.{:02}", sign, grouped, cents % 100))
}

/// RFC 3339 timestamp → `YYYY-MM-DD`; other strings pass through.
fn filter_date(value: &Value) -> String {
    let s = value.to_string();
    match chrono::DateTime::parse_from_rfc3339(&s) {
        Ok(dt) => dt.format("%Y-%m-%d").to_string(),
        Err(_) => s,
    }
}

/// `building_permit` → `Building permit`
fn filter_humanize(value: &Value) -> String {
    let s = value.to_string().replace('_', " ");
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn make_context() -> serde_json::Value {
        json!({
            "case": {
                "reference": "PRM-2024-0113",
                "case_type": "building_permit",
                "status": "submitted",
                "fields": {"estimated_value": 125000.5, "units": 6},
                "created_at": "2024-03-05T14:30:00Z"
            },
            "history": [
                {"step_name": "documents", "skipped": false, "result": {"success": true}}
            ]
        })
    }

    #[test]
    fn test_simple_variable() {
        let renderer = TemplateRenderer::new();
        let result = renderer
            .render("Case {{ case.reference }} received", &make_context())
            .unwrap();
        assert_eq!(result, "Case PRM-2024-0113 received");
    }

    #[test]
    fn test_no_template() {
        let renderer = TemplateRenderer::new();
        let result = renderer.render("Plain text", &make_context()).unwrap();
        assert_eq!(result, "Plain text");
    }

    #[test]
    fn test_custom_filters() {
        let renderer = TemplateRenderer::new();
        let ctx = make_context();
        assert_eq!(
            renderer
                .render("{{ case.fields.estimated_value | currency }}", &ctx)
                .unwrap(),
            "$125,000.50"
        );
        assert_eq!(
            renderer.render("{{ case.created_at | date }}", &ctx).unwrap(),
            "2024-03-05"
        );
        assert_eq!(
            renderer.render("{{ case.case_type | humanize }}", &ctx).unwrap(),
            "Building permit"
        );
    }

    #[test]
    fn test_currency_small_amounts() {
        assert_eq!(filter_currency(&Value::from(7)).unwrap(), "$7.00");
        assert_eq!(filter_currency(&Value::from(999.999)).unwrap(), "$1,000.00");
        assert!(filter_currency(&Value::from("abc")).is_err());
    }

    #[test]
    fn test_evaluate_expression() {
        let renderer = TemplateRenderer::new();
        let ctx = make_context();
        assert!(renderer
            .evaluate_condition("case.fields.units > 4", &ctx)
            .unwrap());
        assert!(!renderer
            .evaluate_condition("case.case_type == 'demolition'", &ctx)
            .unwrap());
        assert!(renderer
            .evaluate_condition("history | length == 1", &ctx)
            .unwrap());
    }

    #[test]
    fn test_evaluate_wrapped_condition() {
        let renderer = TemplateRenderer::new();
        assert!(renderer
            .evaluate_condition("{{ case.status == 'submitted' }}", &make_context())
            .unwrap());
    }

    #[test]
    fn test_missing_values_are_falsy() {
        let renderer = TemplateRenderer::new();
        assert!(!renderer
            .evaluate_condition("case.fields.missing", &make_context())
            .unwrap());
    }

    #[test]
    fn test_parse_error() {
        let renderer = TemplateRenderer::new();
        assert!(renderer
            .evaluate_condition("case.status ==", &make_context())
            .is_err());
    }
}
