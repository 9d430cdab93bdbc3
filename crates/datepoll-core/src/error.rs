use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Validation failures keyed by field name
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<String, Vec<String>>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a message against a field
    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.0.entry(field.into()).or_default().push(message.into());
    }

    /// Build an error map holding a single message
    pub fn single(field: impl Into<String>, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.add(field, message);
        errors
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Messages recorded against a field
    pub fn get(&self, field: &str) -> &[String] {
        self.0.get(field).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Merge another error map into this one
    pub fn extend(&mut self, other: FieldErrors) {
        for (field, messages) in other.0 {
            self.0.entry(field).or_default().extend(messages);
        }
    }

    /// `Ok` when nothing was recorded
    pub fn into_result(self) -> Result<(), FieldErrors> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }

    /// Human readable messages such as "Username is too long"
    pub fn full_messages(&self) -> Vec<String> {
        self.0
            .iter()
            .flat_map(|(field, messages)| {
                let label = humanize(field);
                messages.iter().map(move |m| format!("{label} {m}"))
            })
            .collect()
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Validation failed: {}", self.full_messages().join(", "))
    }
}

impl std::error::Error for FieldErrors {}

fn humanize(field: &str) -> String {
    let field = field.strip_suffix("_id").unwrap_or(field).replace('_', " ");
    let mut chars = field.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collects_messages() {
        let mut errors = FieldErrors::new();
        assert!(errors.clone().into_result().is_ok());

        errors.add("username", "is too long");
        errors.add("appointment_id", "must exist");
        errors.add("username", "is invalid");

        assert_eq!(errors.get("username").len(), 2);
        assert!(errors.get("state").is_empty());
        assert_eq!(
            errors.full_messages(),
            vec!["Appointment must exist", "Username is too long", "Username is invalid"]
        );
        assert!(errors.into_result().is_err());
    }

    #[test]
    fn test_serializes_as_map() {
        let errors = FieldErrors::single("state", "is too long");
        let json = serde_json::to_value(&errors).unwrap();
        assert_eq!(json, serde_json::json!({ "state": ["is too long"] }));
        assert_eq!(errors.to_string(), "Validation failed: State is too long");
    }

    #[test]
    fn test_extend() {
        let mut errors = FieldErrors::single("user", "must exist");
        errors.extend(FieldErrors::single("user", "is blocked"));
        assert_eq!(errors.get("user"), ["must exist", "is blocked"]);
    }
}
