//! Default Typst tear-sheet template.
//!
//! Built-in Typst markup with `{{PLACEHOLDER}}` substitution. Custom
//! templates may use any subset of the placeholders.

/// Placeholders understood by [`super::resolve`].
pub const PLACEHOLDERS: [&str; 12] = [
    "{{TITLE}}",
    "{{GENERATED}}",
    "{{SUMMARY_TABLE}}",
    "{{QUANTILE_STATS}}",
    "{{RETURNS_TABLE}}",
    "{{QUANTILE_RETURNS_CHART}}",
    "{{CUMULATIVE_RETURNS_CHART}}",
    "{{QUANTILE_CUMULATIVE_CHART}}",
    "{{IC_TABLE}}",
    "{{ROLLING_IC_CHART}}",
    "{{IC_HEATMAP}}",
    "{{TURNOVER_TABLE}}",
];

const TEMPLATE: &str = r#"#set page(paper: "a4", margin: 2cm)
#set text(size: 10pt)

= Factor Tear Sheet: {{TITLE}}

_Generated {{GENERATED}}_

== Summary

{{SUMMARY_TABLE}}

== Factor Quantiles

{{QUANTILE_STATS}}

== Returns Analysis

Mean period-wise demeaned return by quantile, in basis points per bar.

{{RETURNS_TABLE}}

{{QUANTILE_RETURNS_CHART}}

{{CUMULATIVE_RETURNS_CHART}}

{{QUANTILE_CUMULATIVE_CHART}}

== Information Analysis

{{IC_TABLE}}

{{ROLLING_IC_CHART}}

=== Monthly Mean IC

{{IC_HEATMAP}}

== Turnover Analysis

{{TURNOVER_TABLE}}
"#;

pub fn template() -> &'static str {
    TEMPLATE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_carries_every_placeholder() {
        for p in PLACEHOLDERS {
            assert!(template().contains(p), "missing {}", p);
        }
        assert!(template().starts_with("#set page("));
    }
}
