use super::*;
use serde_json::json;

fn state(value: Value) -> Map<String, Value> {
    value.as_object().unwrap().clone()
}

// ── Conditions ────────────────────────────────────────────────────────────────

#[test]
fn bare_boolean_key() {
    let s = state(json!({"power": true}));
    assert!(evaluate_condition(&s, "power"));
    let s = state(json!({"power": false}));
    assert!(!evaluate_condition(&s, "power"));
}

#[test]
fn empty_state_guard() {
    let s = Map::new();
    assert!(!evaluate_condition(&s, "power"));
}

#[test]
fn unchanged_expression_guard() {
    // State has keys, but none appear in the expression
    let s = state(json!({"brightness": 50}));
    assert!(!evaluate_condition(&s, "power == true"));
}

#[test]
fn numeric_comparison() {
    let s = state(json!({"value": 75}));
    assert!(evaluate_condition(&s, "value > 50"));
    assert!(!evaluate_condition(&s, "value > 80"));
    assert!(evaluate_condition(&s, "value >= 50 && value <= 100"));
}

#[test]
fn string_equality_quotes_values() {
    let s = state(json!({"mode": "heat"}));
    assert!(evaluate_condition(&s, "mode == \"heat\""));
    assert!(!evaluate_condition(&s, "mode == \"cool\""));
}

#[test]
fn null_state_value() {
    let s = state(json!({"target": null}));
    assert!(evaluate_condition(&s, "target == null"));
}

#[test]
fn complex_values_are_skipped_not_stringified() {
    // colorComponents is an object; only the scalar key substitutes
    let s = state(json!({"colorComponents": {"red": 255}, "power": true}));
    assert!(evaluate_condition(&s, "power == true"));
    // The object key alone cannot substitute, so the guard fires
    assert!(!evaluate_condition(&s, "colorComponents"));
}

#[test]
fn key_is_not_replaced_inside_string_literal() {
    let s = state(json!({"mode": "mode"}));
    // The quoted "mode" on the right stays a literal
    assert!(evaluate_condition(&s, "mode == \"mode\""));
}

#[test]
fn partial_key_is_not_substituted() {
    // "power" must not rewrite "powerLevel"
    let s = state(json!({"power": true, "powerLevel": 10}));
    assert!(evaluate_condition(&s, "powerLevel > 5"));
}

#[test]
fn malformed_condition_is_false() {
    let s = state(json!({"value": 1}));
    assert!(!evaluate_condition(&s, "value >"));
    assert!(!evaluate_condition(&s, "value ( 1"));
}

// ── Templates ─────────────────────────────────────────────────────────────────

#[test]
fn plain_path_substitution() {
    let s = state(json!({"value": 21.5}));
    assert_eq!(interpolate("${value}°C", &s), "21.5°C");
}

#[test]
fn nested_path_substitution() {
    let s = state(json!({"colorComponents": {"red": 128}}));
    assert_eq!(interpolate("R=${colorComponents.red}", &s), "R=128");
}

#[test]
fn arithmetic_span() {
    let s = state(json!({"value": 0}));
    assert_eq!(interpolate("${value * 1.8 + 32}", &s), "32");
    let s = state(json!({"value": 100}));
    assert_eq!(interpolate("${value * 1.8 + 32}", &s), "212");
}

#[test]
fn arithmetic_with_nested_paths_longest_first() {
    let s = state(json!({"colorComponents": {"red": 10, "green": 20}}));
    assert_eq!(
        interpolate("${colorComponents.red + colorComponents.green}", &s),
        "30"
    );
}

#[test]
fn fractional_results_keep_their_fraction() {
    let s = state(json!({"value": 1}));
    assert_eq!(interpolate("${value / 2}", &s), "0.5");
}

#[test]
fn unresolved_color_component_falls_back_to_zero() {
    let s = state(json!({"power": true}));
    assert_eq!(interpolate("${colorComponents.red}", &s), "0");
    assert_eq!(interpolate("${colorComponents.red * 2}", &s), "0");
}

#[test]
fn unresolved_plain_path_keeps_span_text() {
    let s = state(json!({"power": true}));
    assert_eq!(interpolate("${battery}%", &s), "${battery}%");
}

#[test]
fn unresolved_arithmetic_keeps_span_text() {
    let s = state(json!({"power": true}));
    assert_eq!(interpolate("${battery + 1}", &s), "${battery + 1}");
}

#[test]
fn multiple_spans() {
    let s = state(json!({"value": 20, "unit": "C"}));
    assert_eq!(interpolate("${value}°${unit} now", &s), "20°C now");
}

#[test]
fn text_without_spans_is_untouched() {
    let s = state(json!({"value": 20}));
    assert_eq!(interpolate("no placeholders here", &s), "no placeholders here");
}

#[test]
fn unterminated_span_is_verbatim() {
    let s = state(json!({"value": 20}));
    assert_eq!(interpolate("broken ${value", &s), "broken ${value");
}
