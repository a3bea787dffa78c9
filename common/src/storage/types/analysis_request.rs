use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::AppError;

pub const PREMIUM_TIER: &str = "premium";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    Simple,
    #[default]
    Standard,
    Detailed,
    Comprehensive,
}

impl Complexity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Complexity::Simple => "simple",
            Complexity::Standard => "standard",
            Complexity::Detailed => "detailed",
            Complexity::Comprehensive => "comprehensive",
        }
    }

    /// Multiplier applied to the base processing estimate.
    pub fn duration_factor(&self) -> f64 {
        match self {
            Complexity::Simple => 0.7,
            Complexity::Standard => 1.0,
            Complexity::Detailed => 1.5,
            Complexity::Comprehensive => 2.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnalysisRequirements {
    pub complexity: Complexity,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A campaign analysis submission.
///
/// Only the fields the scheduler looks at are typed; everything else the caller
/// sends is kept in `extensions` and handed to the executor untouched.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisRequest {
    pub files: Vec<Value>,
    pub realtime: bool,
    pub user_tier: String,
    pub requirements: AnalysisRequirements,
    #[serde(flatten)]
    pub extensions: Map<String, Value>,
}

impl AnalysisRequest {
    /// Parses and validates a raw submission.
    ///
    /// # Arguments
    /// * `value` - The JSON body as received from the caller
    ///
    /// # Returns
    /// * `Result<AnalysisRequest, AppError>` - `AppError::Validation` when a required
    ///   field is missing, has the wrong type, or carries an unknown complexity.
    pub fn from_value(value: Value) -> Result<Self, AppError> {
        if !value.is_object() {
            return Err(AppError::Validation(
                "analysis request must be a JSON object".into(),
            ));
        }

        let request: Self = serde_json::from_value(value)
            .map_err(|err| AppError::Validation(format!("malformed analysis request: {err}")))?;
        request.validate()?;

        Ok(request)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.user_tier.trim().is_empty() {
            return Err(AppError::Validation("userTier must not be empty".into()));
        }
        Ok(())
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    pub fn is_premium(&self) -> bool {
        self.user_tier == PREMIUM_TIER
    }

    pub fn complexity(&self) -> Complexity {
        self.requirements.complexity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn valid_body() -> Value {
        json!({
            "files": [{ "name": "q3_campaign.pptx" }, { "name": "budget.csv" }],
            "realtime": true,
            "userTier": "premium",
            "requirements": { "complexity": "detailed", "sections": ["reach"] },
            "campaignName": "Autumn launch"
        })
    }

    #[test]
    fn test_parses_valid_request() {
        let request = AnalysisRequest::from_value(valid_body()).expect("valid request");

        assert_eq!(request.file_count(), 2);
        assert!(request.realtime);
        assert!(request.is_premium());
        assert_eq!(request.complexity(), Complexity::Detailed);
        assert_eq!(
            request.requirements.extra.get("sections"),
            Some(&json!(["reach"]))
        );
        assert_eq!(
            request.extensions.get("campaignName"),
            Some(&json!("Autumn launch"))
        );
    }

    #[test]
    fn test_extensions_survive_serialization() {
        let request = AnalysisRequest::from_value(valid_body()).expect("valid request");
        let value = serde_json::to_value(&request).expect("serialize");

        assert_eq!(value, valid_body());
    }

    #[test]
    fn test_rejects_missing_fields() {
        let mut body = valid_body();
        body.as_object_mut().expect("object").remove("files");

        let err = AnalysisRequest::from_value(body).expect_err("missing files");
        assert!(matches!(err, AppError::Validation(msg) if msg.contains("files")));
    }

    #[test]
    fn test_rejects_unknown_complexity() {
        let mut body = valid_body();
        body["requirements"]["complexity"] = json!("extreme");

        let err = AnalysisRequest::from_value(body).expect_err("unknown complexity");
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn test_rejects_wrong_types_and_shapes() {
        let mut body = valid_body();
        body["realtime"] = json!("yes");
        assert!(matches!(
            AnalysisRequest::from_value(body),
            Err(AppError::Validation(_))
        ));

        assert!(matches!(
            AnalysisRequest::from_value(json!(["not", "an", "object"])),
            Err(AppError::Validation(_))
        ));

        let mut body = valid_body();
        body["userTier"] = json!("   ");
        assert!(matches!(
            AnalysisRequest::from_value(body),
            Err(AppError::Validation(msg)) if msg.contains("userTier")
        ));
    }

    #[test]
    fn test_duration_factors() {
        assert!((Complexity::Simple.duration_factor() - 0.7).abs() < f64::EPSILON);
        assert!((Complexity::Comprehensive.duration_factor() - 2.0).abs() < f64::EPSILON);
        assert_eq!(Complexity::default(), Complexity::Standard);
        assert_eq!(Complexity::Detailed.as_str(), "detailed");
    }
}
