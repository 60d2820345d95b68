//! Label → filesystem token used to key plot artifacts.

/// Spaces become `_`, forward slashes become `-`, then lowercase.
///
/// Distinct labels can map to the same token (`"A b"` and `"a_b"`); the
/// later plot simply overwrites the earlier one.
pub fn sanitize(label: &str) -> String {
    label.replace(' ', "_").replace('/', "-").to_lowercase()
}
