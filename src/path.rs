use serde_json::Value;

/// Resolve a dotted property path against a JSON value.
///
/// Missing intermediate keys short-circuit to `None`; a path segment applied
/// to a non-object also yields `None`. Controller payloads, event payloads and
/// device state are all addressed through this one function.
///
/// # Examples
///
/// ```
/// use serde_json::json;
/// use homemap::path::resolve;
///
/// let data = json!({"properties": {"value": 42}});
/// assert_eq!(resolve(&data, "properties.value"), Some(&json!(42)));
/// assert_eq!(resolve(&data, "properties.missing"), None);
/// ```
pub fn resolve<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = value;
    for segment in path.split('.') {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}
