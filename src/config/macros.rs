use std::collections::HashMap;

use lazy_static::lazy_static;
use regex::Regex;

use crate::error::DatastoreError;

lazy_static! {
    static ref MACRO: Regex = Regex::new(r"\[([A-Za-z_][A-Za-z0-9_.\-]*)\]").unwrap();
}

/// Replace every `[name]` in `template` with `parameters[name]`.
///
/// # Errors
/// Returns `ConfigError` naming the first macro with no matching parameter.
pub fn expand_macros(
    template: &str,
    parameters: &HashMap<String, String>,
) -> Result<String, DatastoreError> {
    let mut expanded = String::with_capacity(template.len());
    let mut last = 0;
    for captures in MACRO.captures_iter(template) {
        let (Some(whole), Some(name)) = (captures.get(0), captures.get(1)) else {
            continue;
        };
        let value = parameters.get(name.as_str()).ok_or_else(|| {
            DatastoreError::ConfigError(format!(
                "unresolved macro [{}] in descriptor",
                name.as_str()
            ))
        })?;
        expanded.push_str(&template[last..whole.start()]);
        expanded.push_str(value);
        last = whole.end();
    }
    expanded.push_str(&template[last..]);
    Ok(expanded)
}
