use color_eyre::eyre::Result;
use serde::Serialize;

/// Where command results go: styled text or one JSON object per line.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Default)]
pub enum Output {
    #[default]
    Human,
    Json,
}

impl Output {
    #[must_use]
    pub const fn from_json_flag(json: bool) -> Self {
        if json { Self::Json } else { Self::Human }
    }

    #[must_use]
    pub const fn is_json(self) -> bool {
        matches!(self, Self::Json)
    }

    /// Print `payload` as a JSON line, or run `human` to print it as text.
    ///
    /// # Errors
    /// Returns an error if the payload cannot be serialized.
    pub fn emit<T: Serialize>(self, payload: &T, human: impl FnOnce()) -> Result<()> {
        if self.is_json() {
            println!("{}", json_line(payload)?);
        } else {
            human();
        }
        Ok(())
    }
}

fn json_line<T: Serialize>(payload: &T) -> Result<String> {
    Ok(serde_json::to_string(payload)?)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn flag_selects_format() {
        assert_eq!(Output::from_json_flag(false), Output::Human);
        assert!(Output::from_json_flag(true).is_json());
        assert_eq!(Output::default(), Output::Human);
    }

    #[test]
    fn json_payloads_stay_on_one_line() {
        let line = json_line(&json!({"line": "multi\nline", "devices": ["a", "b"]})).unwrap();
        assert!(!line.contains('\n'));
        assert!(line.contains(r#""line":"multi\nline""#));
    }

    #[test]
    fn human_mode_prints_through_the_callback() {
        let mut printed = false;
        Output::Human.emit(&json!({}), || printed = true).unwrap();
        assert!(printed);

        let mut printed = false;
        Output::Json.emit(&json!({}), || printed = true).unwrap();
        assert!(!printed);
    }
}
