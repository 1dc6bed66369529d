use smallvec::SmallVec;

use crate::Value;

/// Argument tuple used as the key of cells result stores and of the
/// parametrized-child cache. Most formulas take a handful of arguments, so
/// keys stay inline.
pub type ArgKey = SmallVec<[Value; 4]>;

/// Build an [`ArgKey`] from anything convertible into values.
pub fn arg_key<I, T>(items: I) -> ArgKey
where
    I: IntoIterator<Item = T>,
    T: Into<Value>,
{
    items.into_iter().map(Into::into).collect()
}

/// Render an argument tuple the way it appears in call traces, e.g. `(1, "a")`.
pub fn format_args_key(key: &[Value]) -> String {
    let parts: Vec<String> = key
        .iter()
        .map(|v| match v {
            Value::Text(s) => format!("{s:?}"),
            other => other.to_string(),
        })
        .collect();
    format!("({})", parts.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_text_quoted() {
        let key = arg_key([Value::Int(1), Value::from("a")]);
        assert_eq!(format_args_key(&key), "(1, \"a\")");
        assert_eq!(format_args_key(&[]), "()");
    }
}
