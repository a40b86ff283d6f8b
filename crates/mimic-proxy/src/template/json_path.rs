//! Dot/bracket navigation through a JSON value: `a.b[2].c`, `[0].id`,
//! `matrix[1][0]`.

use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Step<'a> {
    Key(&'a str),
    Index(usize),
}

/// Walk `path` from `root`. Any structural mismatch, missing key, bad index
/// or malformed path yields `None`. An empty path returns the root.
pub fn navigate<'v>(root: &'v Value, path: &str) -> Option<&'v Value> {
    let steps = parse(path)?;
    steps.iter().try_fold(root, |current, step| match (step, current) {
        (Step::Key(key), Value::Object(map)) => map.get(*key),
        (Step::Index(index), Value::Array(items)) => items.get(*index),
        _ => None,
    })
}

fn parse(path: &str) -> Option<Vec<Step<'_>>> {
    let mut steps = Vec::new();
    if path.is_empty() {
        return Some(steps);
    }

    for segment in path.split('.') {
        let (key, mut brackets) = match segment.find('[') {
            Some(pos) => (&segment[..pos], &segment[pos..]),
            None => (segment, ""),
        };
        if !key.is_empty() {
            steps.push(Step::Key(key));
        } else if brackets.is_empty() {
            return None;
        }

        while !brackets.is_empty() {
            let inner = brackets.strip_prefix('[')?;
            let close = inner.find(']')?;
            steps.push(Step::Index(inner[..close].trim().parse().ok()?));
            brackets = &inner[close + 1..];
        }
    }
    Some(steps)
}
