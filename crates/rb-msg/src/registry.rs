//! Schema resolution.
//!
//! [`SchemaResolver`] is the seam to whatever knows the message types of a
//! recording. [`Registry`] is the in-memory implementation: it starts from
//! the ROS 2 builtin types and accepts more either as explicit field tables
//! or as `.msg` / `.srv` definition text.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::error::{MsgError, Result};
use crate::types::{normalize_type_name, package_of, FieldType, MessageSchema, ServiceSchema};

/// Resolves type names to type descriptors.
pub trait SchemaResolver {
    /// Descriptor of a message type (`pkg/msg/Type` or `pkg/Type`).
    fn resolve_message(&self, type_name: &str) -> Result<Arc<MessageSchema>>;

    /// Request/response descriptors of a service type.
    fn resolve_service(&self, type_name: &str) -> Result<ServiceSchema> {
        Err(MsgError::UnknownType(normalize_type_name(type_name)))
    }
}

impl<T: SchemaResolver + ?Sized> SchemaResolver for &T {
    fn resolve_message(&self, type_name: &str) -> Result<Arc<MessageSchema>> {
        (**self).resolve_message(type_name)
    }

    fn resolve_service(&self, type_name: &str) -> Result<ServiceSchema> {
        (**self).resolve_service(type_name)
    }
}

impl<T: SchemaResolver + ?Sized> SchemaResolver for Arc<T> {
    fn resolve_message(&self, type_name: &str) -> Result<Arc<MessageSchema>> {
        (**self).resolve_message(type_name)
    }

    fn resolve_service(&self, type_name: &str) -> Result<ServiceSchema> {
        (**self).resolve_service(type_name)
    }
}

/// In-memory message and service registry.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    messages: HashMap<String, Arc<MessageSchema>>,
    services: HashMap<String, ServiceSchema>,
}

impl Registry {
    /// Empty registry.
    pub fn new() -> Self {
        Registry::default()
    }

    /// Registry preloaded with `builtin_interfaces/Time`,
    /// `builtin_interfaces/Duration` and `std_msgs/Header`.
    pub fn with_builtins() -> Self {
        let mut registry = Registry::new();
        for name in ["builtin_interfaces/Time", "builtin_interfaces/Duration"] {
            registry.register(
                MessageSchema::new(name)
                    .with_field("sec", crate::PrimitiveType::Int32)
                    .with_field("nanosec", crate::PrimitiveType::UInt32),
            );
        }
        registry.register(
            MessageSchema::new("std_msgs/Header")
                .with_field("stamp", FieldType::Time)
                .with_field("frame_id", crate::PrimitiveType::String),
        );
        registry
    }

    /// Register a schema under its own name, replacing any previous one.
    pub fn register(&mut self, schema: MessageSchema) -> Arc<MessageSchema> {
        let schema = Arc::new(schema);
        debug!(type_name = schema.name(), fields = schema.len(), "Registered message type");
        self.messages
            .insert(schema.name().to_string(), Arc::clone(&schema));
        schema
    }

    /// Register from `(field, type string)` pairs.
    pub fn register_fields(
        &mut self,
        type_name: &str,
        fields: &[(&str, &str)],
    ) -> Result<Arc<MessageSchema>> {
        let schema = MessageSchema::from_field_types(type_name, fields)?;
        Ok(self.register(schema))
    }

    /// Register from `.msg` definition text.
    pub fn register_definition(&mut self, type_name: &str, text: &str) -> Result<Arc<MessageSchema>> {
        let schema = parse_definition(type_name, text)?;
        Ok(self.register(schema))
    }

    /// Register a service; its halves are also registered as
    /// `<name>_Request` and `<name>_Response` messages.
    pub fn register_service(
        &mut self,
        type_name: &str,
        request: MessageSchema,
        response: MessageSchema,
    ) -> ServiceSchema {
        let service = ServiceSchema {
            request: self.register(request),
            response: self.register(response),
        };
        self.services
            .insert(normalize_type_name(type_name), service.clone());
        service
    }

    /// Register a service from `.srv` text (request `---` response).
    pub fn register_service_definition(&mut self, type_name: &str, text: &str) -> Result<ServiceSchema> {
        let name = normalize_type_name(type_name);
        let mut request_lines = Vec::new();
        let mut response_lines = Vec::new();
        let mut in_response = false;
        for line in text.lines() {
            if line.trim() == "---" {
                if in_response {
                    return Err(MsgError::Definition {
                        type_name: name,
                        line: request_lines.len() + response_lines.len() + 2,
                        reason: "more than one '---' separator".to_string(),
                    });
                }
                in_response = true;
            } else if in_response {
                response_lines.push(line);
            } else {
                request_lines.push(line);
            }
        }
        if !in_response {
            return Err(MsgError::Definition {
                type_name: name,
                line: request_lines.len(),
                reason: "missing '---' separator".to_string(),
            });
        }

        let request = parse_definition(&format!("{name}_Request"), &request_lines.join("\n"))?;
        let response = parse_definition(&format!("{name}_Response"), &response_lines.join("\n"))?;
        Ok(self.register_service(&name, request, response))
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.messages.contains_key(&normalize_type_name(type_name))
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Registered message type names, sorted.
    pub fn type_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.messages.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl SchemaResolver for Registry {
    fn resolve_message(&self, type_name: &str) -> Result<Arc<MessageSchema>> {
        let name = normalize_type_name(type_name);
        self.messages
            .get(&name)
            .cloned()
            .ok_or(MsgError::UnknownType(name))
    }

    fn resolve_service(&self, type_name: &str) -> Result<ServiceSchema> {
        let name = normalize_type_name(type_name);
        self.services
            .get(&name)
            .cloned()
            .ok_or(MsgError::UnknownType(name))
    }
}

/// Parse `.msg` definition text into a schema.
///
/// Comments, blank lines and constants are skipped; default values after the
/// field name are ignored. Bare type names resolve against the package of
/// `type_name`.
pub fn parse_definition(type_name: &str, text: &str) -> Result<MessageSchema> {
    let normalized = normalize_type_name(type_name);
    let package = package_of(&normalized).map(str::to_string);
    let mut schema = MessageSchema::new(&normalized);

    for (index, raw) in text.lines().enumerate() {
        let line_no = index + 1;
        let line = raw.split('#').next().unwrap_or("").trim();
        if line.is_empty() {
            continue;
        }

        let definition_error = |reason: String| MsgError::Definition {
            type_name: normalized.clone(),
            line: line_no,
            reason,
        };

        let mut tokens = line.split_whitespace();
        let type_token = tokens.next().unwrap_or("");
        let name_token = tokens
            .next()
            .ok_or_else(|| definition_error(format!("missing field name after '{type_token}'")))?;

        // Constants: `TYPE NAME=value` or `TYPE NAME = value`
        let next = tokens.next();
        if name_token.contains('=') || next.is_some_and(|t| t.starts_with('=')) {
            continue;
        }

        if !is_valid_field_name(name_token) {
            return Err(definition_error(format!("invalid field name '{name_token}'")));
        }
        if schema.index_of(name_token).is_some() {
            return Err(definition_error(format!("duplicate field '{name_token}'")));
        }

        let field_type = FieldType::parse_in(type_token, package.as_deref())
            .map_err(|e| definition_error(e.to_string()))?;
        schema = schema.with_field(name_token, field_type);
    }

    Ok(schema)
}

fn is_valid_field_name(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PrimitiveType;

    #[test]
    fn test_builtins_registered() {
        let registry = Registry::with_builtins();
        assert!(registry.contains("builtin_interfaces/msg/Time"));
        assert!(registry.contains("std_msgs/msg/Header"));
        let header = registry.resolve_message("std_msgs/msg/Header").unwrap();
        assert!(header.is_header());
        assert_eq!(header.field_type("stamp"), Some(&FieldType::Time));
    }

    #[test]
    fn test_unknown_type_is_not_found() {
        let registry = Registry::new();
        let err = registry.resolve_message("pkg/msg/Nope").unwrap_err();
        assert!(matches!(err, MsgError::UnknownType(ref n) if n == "pkg/Nope"));
        assert_eq!(err.category(), crate::ErrorCategory::NotFound);
    }

    #[test]
    fn test_parse_definition_skips_comments_and_constants() {
        let text = "\
# A sample message
int32 DEBUG=1
string NAME = \"x\"
Header header   # stamp + frame
float64 x 0.5
Point[] points
sequence<uint8> blob
";
        let schema = parse_definition("geometry_msgs/msg/Sample", text).unwrap();
        assert_eq!(schema.name(), "geometry_msgs/Sample");
        let names: Vec<&str> = schema.fields().iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["header", "x", "points", "blob"]);
        assert_eq!(
            schema.field_type("header"),
            Some(&FieldType::Message("std_msgs/Header".to_string()))
        );
        assert_eq!(
            schema.field_type("points"),
            Some(&FieldType::sequence(FieldType::Message(
                "geometry_msgs/Point".to_string()
            )))
        );
        assert_eq!(
            schema.field_type("x"),
            Some(&FieldType::Primitive(PrimitiveType::Float64))
        );
    }

    #[test]
    fn test_parse_definition_reports_line() {
        let err = parse_definition("pkg/Bad", "int32 ok\nint32\n").unwrap_err();
        match err {
            MsgError::Definition { line, .. } => assert_eq!(line, 2),
            other => panic!("unexpected error: {other}"),
        }
        assert!(parse_definition("pkg/Bad", "int32 1abc").is_err());
        assert!(parse_definition("pkg/Bad", "int32 a\nint32 a").is_err());
        assert!(parse_definition("pkg/Bad", "wstring a").is_err());
    }

    #[test]
    fn test_register_service_definition() {
        let mut registry = Registry::with_builtins();
        let service = registry
            .register_service_definition("std_srvs/srv/SetBool", "bool data\n---\nbool success\nstring message\n")
            .unwrap();
        assert_eq!(service.request.name(), "std_srvs/SetBool_Request");
        assert_eq!(service.response.len(), 2);
        let resolved = registry.resolve_service("std_srvs/SetBool").unwrap();
        assert_eq!(resolved, service);
        assert!(registry.contains("std_srvs/SetBool_Response"));
    }

    #[test]
    fn test_service_definition_needs_separator() {
        let mut registry = Registry::new();
        assert!(registry.register_service_definition("pkg/S", "bool a").is_err());
        assert!(registry
            .register_service_definition("pkg/S", "bool a\n---\n---\n")
            .is_err());
    }

    #[test]
    fn test_type_names_sorted() {
        let registry = Registry::with_builtins();
        assert_eq!(
            registry.type_names(),
            vec![
                "builtin_interfaces/Duration",
                "builtin_interfaces/Time",
                "std_msgs/Header"
            ]
        );
    }
}
