use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// structs and types

// the closed set of transformations a job token may request
//
// unknown names stay as strings in the descriptor and are rejected by the
// executor, so a bad token cannot fail deserialization wholesale
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    DecryptCrypt4gh,
    AddRecipientCrypt4gh,
    ValidateCrypt4gh,
    PreviewZip,
    ExtractZip,
    PreviewImage,
    CreateZip,
}

impl StepKind {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "decrypt_crypt4gh" => Some(StepKind::DecryptCrypt4gh),
            "add_recipient_crypt4gh" => Some(StepKind::AddRecipientCrypt4gh),
            "validate_crypt4gh" => Some(StepKind::ValidateCrypt4gh),
            "preview_zip" => Some(StepKind::PreviewZip),
            "extract_zip" => Some(StepKind::ExtractZip),
            "preview_image" => Some(StepKind::PreviewImage),
            "create_zip" => Some(StepKind::CreateZip),
            _ => None,
        }
    }
}

// one entry of a job's pipeline_steps list
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StepDescriptor {
    #[serde(rename = "type")]
    pub step_type: String,

    #[serde(default)]
    pub arguments: StepArgs,
}

// free-form step arguments; which keys are recognised depends on the step
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StepArgs(pub Map<String, Value>);

impl StepArgs {
    pub fn str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    pub fn u32(&self, key: &str) -> Option<u32> {
        self.0.get(key).and_then(Value::as_u64).map(|v| v as u32)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

// the claims document carried by a job token, minus iat/exp
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct JobPayload {
    pub pipeline_steps: Vec<StepDescriptor>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_kind_round_trip() {
        for name in [
            "decrypt_crypt4gh",
            "add_recipient_crypt4gh",
            "validate_crypt4gh",
            "preview_zip",
            "extract_zip",
            "preview_image",
            "create_zip",
        ] {
            let kind = StepKind::from_name(name).unwrap();
            assert_eq!(serde_json::to_value(kind).unwrap(), name);
        }

        assert!(StepKind::from_name("reticulate_splines").is_none());
    }

    #[test]
    fn descriptor_accepts_unknown_types() {
        let descriptor: StepDescriptor =
            serde_json::from_value(serde_json::json!({"type": "nonsense"})).unwrap();

        assert_eq!(descriptor.step_type, "nonsense");
        assert!(descriptor.arguments.is_empty());
    }

    #[test]
    fn args_typed_getters() {
        let args: StepArgs = serde_json::from_value(serde_json::json!({
            "source_url": "http://localhost:9000/file.zip",
            "max_width": 100,
        }))
        .unwrap();

        assert_eq!(args.str("source_url"), Some("http://localhost:9000/file.zip"));
        assert_eq!(args.u32("max_width"), Some(100));
        assert_eq!(args.str("max_width"), None);
        assert_eq!(args.u32("missing"), None);
    }
}
