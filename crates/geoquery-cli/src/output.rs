use console::style;
use serde::Serialize;
use std::fmt::Display;

/// Output format mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Human,
    Json,
}

/// JSON wrapper around every machine-readable message
#[derive(Debug, Serialize)]
struct Envelope<'a, T: Serialize> {
    status: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
}

impl<'a, T: Serialize> Envelope<'a, T> {
    fn render(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

pub struct OutputWriter {
    format: OutputFormat,
}

impl OutputWriter {
    pub fn new(json: bool) -> Self {
        let format = if json { OutputFormat::Json } else { OutputFormat::Human };
        Self { format }
    }

    pub fn is_json(&self) -> bool {
        self.format == OutputFormat::Json
    }

    /// Human mode only; JSON output carries its outcome in the result envelope
    pub fn success(&self, message: impl Display) {
        if !self.is_json() {
            println!("{} {}", style("✓").green().bold(), message);
        }
    }

    /// Warnings go to stderr so stdout stays parseable
    pub fn warning(&self, message: impl Display) {
        if !self.is_json() {
            eprintln!("{} {}", style("⚠").yellow().bold(), message);
            return;
        }
        let envelope: Envelope<'_, ()> =
            Envelope { status: "warning", message: Some(message.to_string()), data: None };
        match envelope.render() {
            Ok(text) => eprintln!("{}", text),
            Err(e) => tracing::warn!(error = %e, "Could not render warning"),
        }
    }

    pub fn data<T: Serialize>(&self, data: &T) -> anyhow::Result<()> {
        println!("{}", serde_json::to_string_pretty(data)?);
        Ok(())
    }

    /// JSON mode wraps `data` in a success envelope; human mode prints it as is
    pub fn result<T: Serialize>(&self, data: T) -> anyhow::Result<()> {
        if !self.is_json() {
            return self.data(&data);
        }
        println!("{}", success_envelope(data)?);
        Ok(())
    }

    pub fn kv(&self, key: impl Display, value: impl Display) {
        println!("{}: {}", style(key).bold(), value);
    }

    pub fn section(&self, title: impl Display) {
        println!("\n{}", style(title).bold().underlined());
    }

    pub fn code(&self, text: impl Display) {
        println!("  {}", style(text).cyan());
    }
}

fn success_envelope<T: Serialize>(data: T) -> serde_json::Result<String> {
    Envelope { status: "success", message: None, data: Some(data) }.render()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::ser::Error as _;
    use serde::Serializer;

    struct Unserializable;

    impl Serialize for Unserializable {
        fn serialize<S: Serializer>(&self, _: S) -> Result<S::Ok, S::Error> {
            Err(S::Error::custom("not representable"))
        }
    }

    #[test]
    fn test_success_envelope_shape() {
        let text = success_envelope(serde_json::json!({"limit": 5})).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["status"], "success");
        assert_eq!(value["data"]["limit"], 5);
        assert!(value.get("message").is_none());
    }

    #[test]
    fn test_serialization_failure_is_an_error() {
        assert!(success_envelope(Unserializable).is_err());

        let writer = OutputWriter::new(true);
        let err = writer.result(Unserializable).unwrap_err();
        assert!(err.to_string().contains("not representable"));
    }
}
