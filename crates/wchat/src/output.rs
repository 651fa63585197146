use serde::Serialize;

#[derive(Clone, Copy, PartialEq)]
enum Format {
    Human,
    Json,
}

/// Output formatter: human-readable by default, line-delimited JSON
/// envelopes for agents and scripts.
pub struct Output {
    format: Format,
}

#[derive(Serialize)]
struct Envelope<'a, T: Serialize> {
    status: &'a str,
    command: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a str>,
}

impl Output {
    pub fn new(json: bool) -> Self {
        Self {
            format: if json { Format::Json } else { Format::Human },
        }
    }

    fn emit<T: Serialize>(&self, command: &str, status: &str, data: Option<T>, error: Option<&str>) {
        match self.format {
            Format::Json => {
                let envelope = Envelope {
                    status,
                    command,
                    data,
                    error,
                };
                println!("{}", serde_json::to_string(&envelope).unwrap());
            }
            Format::Human => {
                if let Some(error) = error {
                    eprintln!("Error: {error}");
                } else if let Some(data) = data {
                    println!("{}", serde_json::to_string_pretty(&data).unwrap());
                }
            }
        }
    }

    /// Output a successful result
    pub fn success<T: Serialize>(&self, command: &str, data: T) {
        self.emit(command, "ok", Some(data), None);
    }

    /// Output a plain success message
    pub fn success_message(&self, command: &str, message: &str) {
        if self.format == Format::Human {
            println!("{message}");
            return;
        }
        self.emit(
            command,
            "ok",
            Some(serde_json::json!({ "message": message })),
            None,
        );
    }

    /// Output an error
    pub fn error(&self, message: &str) {
        self.emit::<()>("", "error", None, Some(message));
    }

    /// Output a streaming event, one line per event (for listen)
    pub fn event<T: Serialize>(&self, event_type: &str, data: T) {
        match self.format {
            Format::Json => {
                let mut line = serde_json::json!({ "event": event_type });
                if let (Some(object), Ok(serde_json::Value::Object(fields))) =
                    (line.as_object_mut(), serde_json::to_value(&data))
                {
                    object.extend(fields);
                }
                println!("{line}");
            }
            Format::Human => {
                println!(
                    "[{event_type}] {}",
                    serde_json::to_string(&data).unwrap()
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_modes() {
        assert!(Output::new(true).format == Format::Json);
        assert!(Output::new(false).format == Format::Human);
    }

    #[test]
    fn test_event_payload_flattens() {
        // shape check only: events carry their payload fields inline
        let data = serde_json::json!({ "id": "abc" });
        let mut line = serde_json::json!({ "event": "message" });
        if let (Some(object), serde_json::Value::Object(fields)) =
            (line.as_object_mut(), data)
        {
            object.extend(fields);
        }
        assert_eq!(line["event"], "message");
        assert_eq!(line["id"], "abc");
    }
}
