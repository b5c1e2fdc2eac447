//! Schema export: the machine-readable description of a registry.

use std::collections::BTreeMap;

use opkit_core::TypeDescriptor;
use serde::{Deserialize, Serialize};

use super::operation::Descriptor;
use super::registry::Registry;

/// Exported shape of one operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct OperationSchema {
    pub operation: String,
    pub input: TypeDescriptor,
    pub output: TypeDescriptor,
    /// Names of the declared groups. The root group is implied.
    pub groups: Vec<String>,
}

impl OperationSchema {
    #[must_use]
    pub fn of(desc: &dyn Descriptor) -> Self {
        Self {
            operation: desc.operation().to_string(),
            input: desc.input(),
            output: desc.output(),
            groups: desc.groups().iter().map(|g| g.name().to_string()).collect(),
        }
    }
}

/// Operation name to schema, in name order.
pub type ApiSchema = BTreeMap<String, OperationSchema>;

/// Exports every registered operation.
#[must_use]
pub fn export(registry: &Registry) -> ApiSchema {
    registry
        .list()
        .iter()
        .map(|desc| (desc.operation().to_string(), OperationSchema::of(desc.as_ref())))
        .collect()
}

/// Renders the help text for one operation: name, description (omitted when
/// empty), then the input and output schemas as indented JSON.
///
/// # Errors
///
/// Returns an error if a schema fails to serialize.
pub fn render_help(desc: &dyn Descriptor) -> Result<String, serde_json::Error> {
    let input = serde_json::to_string_pretty(&desc.input())?;
    let output = serde_json::to_string_pretty(&desc.output())?;

    let mut help = format!("{}\n\n", desc.operation());
    if !desc.description().is_empty() {
        help.push_str(desc.description());
        help.push_str("\n\n");
    }
    help.push_str(&format!("Input schema:\n{input}\n\nOutput schema:\n{output}"));
    Ok(help)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use opkit_core::{describe_struct, ExecutionContext};
    use serde::{Deserialize, Serialize};
    use serde_json::json;

    use super::*;
    use crate::dispatch::{Group, Operation};

    describe_struct! {
        #[derive(Debug, Clone, Serialize, Deserialize)]
        pub struct Lookup {
            pub id: String,
            pub tags: Vec<String> => "optional:true",
        }
    }

    describe_struct! {
        #[derive(Debug, Clone, Serialize, Deserialize)]
        pub struct Found {
            pub hit: bool,
        }
    }

    fn registry() -> Registry {
        let reads = Arc::new(Group::new("reads"));
        Registry::builder()
            .register(
                Operation::from_fn(|_: &ExecutionContext, _: &Lookup| Ok(Found { hit: true }))
                    .with_operation("lookup")
                    .with_description("Finds a record")
                    .with_group(reads)
                    .build(),
            )
            .register(
                Operation::from_fn(|_: &ExecutionContext, _: &Lookup| Ok(Found { hit: false }))
                    .with_operation("absent")
                    .build(),
            )
            .build()
    }

    #[test]
    fn export_is_sorted_by_operation() {
        let schema = registry().export();
        let names: Vec<_> = schema.keys().cloned().collect();
        assert_eq!(names, ["absent", "lookup"]);
        assert_eq!(schema["lookup"].groups, ["reads"]);
        assert!(schema["absent"].groups.is_empty());
    }

    #[test]
    fn export_uses_pascal_case_keys() {
        let schema = registry().export();
        let doc = serde_json::to_value(&schema["lookup"]).unwrap();
        assert_eq!(doc["Operation"], json!("lookup"));
        assert_eq!(doc["Groups"], json!(["reads"]));
        assert_eq!(doc["Input"]["Kind"], json!("object"));
        assert_eq!(doc["Input"]["Fields"][0]["Name"], json!("id"));
        assert_eq!(doc["Input"]["Fields"][1]["Optional"], json!(true));
        assert_eq!(doc["Output"]["Fields"][0]["Type"]["Kind"], json!("bool"));
    }

    #[test]
    fn export_is_pure() {
        let registry = registry();
        assert_eq!(registry.export(), registry.export());
    }

    #[test]
    fn help_lists_both_schemas() {
        let registry = registry();
        let desc = registry.get("lookup").unwrap();
        let help = render_help(desc.as_ref()).unwrap();
        assert!(help.starts_with("lookup\n\nFinds a record\n\nInput schema:\n{"));
        assert!(help.contains("\n\nOutput schema:\n{"));
        assert!(help.contains("\"Name\": \"hit\""));
    }

    #[test]
    fn help_omits_empty_description() {
        let registry = registry();
        let desc = registry.get("absent").unwrap();
        let help = render_help(desc.as_ref()).unwrap();
        assert!(help.starts_with("absent\n\nInput schema:\n{"));
    }
}
