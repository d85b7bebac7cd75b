//! Parser for `getprop` output.

use std::collections::HashMap;

/// Parse `[key]: [value]` lines into a map.
///
/// A value whose closing bracket is on a later line spans several lines and
/// keeps its embedded newlines. Carriage returns at line ends are dropped and
/// lines that are not properties are ignored.
#[must_use]
pub fn parse_getprop(output: &str) -> HashMap<String, String> {
    let mut properties = HashMap::new();
    let mut pending: Option<(String, String)> = None;

    for line in output.split('\n').map(|line| line.trim_end_matches('\r')) {
        if let Some((key, mut value)) = pending.take() {
            value.push('\n');
            if let Some(rest) = line.strip_suffix(']') {
                value.push_str(rest);
                properties.insert(key, value);
            } else {
                value.push_str(line);
                pending = Some((key, value));
            }
            continue;
        }

        let Some((key, rest)) = line
            .strip_prefix('[')
            .and_then(|line| line.split_once("]: ["))
        else {
            continue;
        };

        match rest.strip_suffix(']') {
            Some(value) => {
                properties.insert(key.to_string(), value.to_string());
            }
            None => pending = Some((key.to_string(), rest.to_string())),
        }
    }

    if let Some((key, value)) = pending {
        properties.insert(key, value);
    }
    properties
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_line_properties() {
        let props = parse_getprop(
            "[ro.product.manufacturer]: [Google]\r\n[ro.product.model]: [Pixel 7]\r\n[ro.build.version.sdk]: [34]\r\n",
        );
        assert_eq!(props["ro.product.manufacturer"], "Google");
        assert_eq!(props["ro.product.model"], "Pixel 7");
        assert_eq!(props["ro.build.version.sdk"], "34");
        assert_eq!(props.len(), 3);
    }

    #[test]
    fn keeps_empty_values() {
        let props = parse_getprop("[persist.sys.locale]: []\n");
        assert_eq!(props["persist.sys.locale"], "");
    }

    #[test]
    fn joins_multi_line_values() {
        let props = parse_getprop(
            "[ro.product.name]: [first\nsecond\nthird]\n[ro.product.model]: [Pixel]\n",
        );
        assert_eq!(props["ro.product.name"], "first\nsecond\nthird");
        assert_eq!(props["ro.product.model"], "Pixel");
    }

    #[test]
    fn values_may_contain_brackets() {
        let props = parse_getprop("[ro.boot.hardware.sku]: [G03Z5 [eu]]\n");
        assert_eq!(props["ro.boot.hardware.sku"], "G03Z5 [eu]");
    }

    #[test]
    fn ignores_noise_lines() {
        let props = parse_getprop("* daemon started successfully\n\n[a]: [b]\n");
        assert_eq!(props.len(), 1);
        assert_eq!(props["a"], "b");
    }
}
